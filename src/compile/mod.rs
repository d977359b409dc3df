//! Pipeline compilation into the persisted protocol form

pub mod compiler;
pub mod proto;

pub use compiler::{ExecConfig, EXEC_PLUGIN};
pub use proto::{CompiledPipeline, CompiledStep, CompiledStepKind, OwnerRef};
