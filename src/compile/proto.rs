//! Persisted form of compiled pipelines

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Identifies a pipeline across the whole system
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerRef {
    pub project: String,
    pub pipeline: String,
}

impl OwnerRef {
    pub fn new(project: impl Into<String>, pipeline: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            pipeline: pipeline.into(),
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.pipeline)
    }
}

/// A pipeline ready for persistence and dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPipeline {
    pub owner: OwnerRef,
    pub name: String,

    /// Steps keyed by name; ordering is carried by `depends_on`
    pub steps: BTreeMap<String, CompiledStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledStep {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    pub kind: CompiledStepKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompiledStepKind {
    /// Run a command inside a container image
    Exec {
        image_url: String,
        #[serde(default)]
        command: Option<String>,
        #[serde(default)]
        args: Vec<String>,
        /// The step body exactly as declared
        raw_config: Value,
    },

    /// Run another pipeline
    PipelineRef { owner: OwnerRef },
}

impl CompiledStep {
    /// Owner of the pipeline this step runs, if it is a pipeline step
    pub fn pipeline_ref(&self) -> Option<&OwnerRef> {
        match &self.kind {
            CompiledStepKind::PipelineRef { owner } => Some(owner),
            CompiledStepKind::Exec { .. } => None,
        }
    }
}
