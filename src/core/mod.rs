//! Core domain models for pipeline configuration
//!
//! This module defines the loaded configuration, pipelines, steps, and the
//! schema machinery plugins use to decode raw step bodies.

pub mod config;
pub mod context;
pub mod pipeline;
pub mod schema;
pub mod step;

pub use config::{load, App, Config, LoadOptions};
pub use context::EvalContext;
pub use pipeline::Pipeline;
pub use schema::{Configurable, Diagnostic, Diagnostics, Schema, Severity};
pub use step::{PluginUse, Step, StepKind};
