//! Service layer around the compiler: projects, applications, workspaces,
//! stored pipelines and the job queue

pub mod queue;
pub mod service;
pub mod types;
pub mod validate;

pub use queue::{InMemoryJobQueue, JobQueue};
pub use service::{ProjectDetails, ProjectService, DEFAULT_WORKSPACE};
pub use types::{
    Application, ApplicationRef, DataSource, DataSourcePoll, Job, JobId, JobOperation, Project,
    QueuedJob, RunnerRef, Workspace,
};
