//! Entities managed by the project service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A project: the namespace applications and pipelines live in
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Project {
    pub name: String,

    #[serde(default)]
    pub applications: Vec<Application>,

    /// Where the project's configuration is fetched from
    #[serde(default)]
    pub data_source: Option<DataSource>,

    #[serde(default)]
    pub data_source_poll: Option<DataSourcePoll>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_data_source(mut self, source: DataSource) -> Self {
        self.data_source = Some(source);
        self
    }

    pub fn with_poll(mut self, poll: DataSourcePoll) -> Self {
        self.data_source_poll = Some(poll);
        self
    }

    /// Index of the named application, if the project has it
    pub fn app(&self, name: &str) -> Option<usize> {
        self.applications.iter().position(|a| a.name == name)
    }

    /// Whether init jobs must be queued to discover the project's applications
    ///
    /// True for a git-backed project that is not polled automatically.
    pub fn needs_remote_init(&self) -> bool {
        match &self.data_source {
            Some(DataSource::Git { .. }) => {}
            _ => return false,
        }

        !matches!(&self.data_source_poll, Some(poll) if poll.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataSource {
    Local,
    Git {
        url: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        reference: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataSourcePoll {
    pub enabled: bool,
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub project: String,
    pub name: String,

    /// Signal sent to the application when its files change
    #[serde(default)]
    pub file_change_signal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,

    /// Projects with activity in this workspace
    #[serde(default)]
    pub projects: Vec<String>,
}

impl Workspace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            projects: Vec::new(),
        }
    }
}

/// Identifier assigned to a queued job
pub type JobId = Uuid;

/// Descriptor of work to queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub application: ApplicationRef,
    pub workspace: String,
    pub operation: JobOperation,
    #[serde(default)]
    pub target_runner: RunnerRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRef {
    pub project: String,
    #[serde(default)]
    pub application: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOperation {
    /// Discover the applications of a project from its data source
    Init,
}

/// Which runner may pick up a job
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerRef {
    #[default]
    Any,
    Id(String),
}

/// A job accepted by the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub job: Job,
    pub queued_at: DateTime<Utc>,
}
