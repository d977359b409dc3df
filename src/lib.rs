//! pipeplane - pipeline configuration compiler and project control plane

pub mod cli;
pub mod compile;
pub mod core;
pub mod error;
pub mod persistence;
pub mod server;

// Re-export commonly used types
pub use compile::{CompiledPipeline, CompiledStep, CompiledStepKind, OwnerRef};
pub use core::{load, Config, Configurable, Diagnostics, EvalContext, LoadOptions, Pipeline, Schema, Step, StepKind};
pub use error::{Code, ConfigError, ServiceError};
