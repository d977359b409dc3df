//! Job queue collaborator

use crate::server::types::{Job, JobId, QueuedJob};
use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Append-only queue accepting job descriptors
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn queue_job(&self, job: Job) -> Result<JobId>;
}

/// In-memory queue, optionally bounded
pub struct InMemoryJobQueue {
    jobs: Mutex<Vec<QueuedJob>>,
    capacity: Option<usize>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            capacity: None,
        }
    }

    /// Reject jobs once `capacity` jobs are queued
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            capacity: Some(capacity),
        }
    }

    /// Snapshot of every queued job, oldest first
    pub async fn jobs(&self) -> Vec<QueuedJob> {
        self.jobs.lock().await.clone()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn queue_job(&self, job: Job) -> Result<JobId> {
        let mut jobs = self.jobs.lock().await;
        if let Some(capacity) = self.capacity {
            if jobs.len() >= capacity {
                bail!("job queue is full ({} jobs)", capacity);
            }
        }

        let id = Uuid::new_v4();
        jobs.push(QueuedJob {
            id,
            job,
            queued_at: Utc::now(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::types::{ApplicationRef, JobOperation, RunnerRef};

    fn init_job(workspace: &str) -> Job {
        Job {
            application: ApplicationRef {
                project: "foo".to_string(),
                application: None,
            },
            workspace: workspace.to_string(),
            operation: JobOperation::Init,
            target_runner: RunnerRef::Any,
        }
    }

    #[tokio::test]
    async fn test_queue_assigns_ids() {
        let queue = InMemoryJobQueue::new();
        let a = queue.queue_job(init_job("default")).await.unwrap();
        let b = queue.queue_job(init_job("prod")).await.unwrap();

        assert_ne!(a, b);
        let jobs = queue.jobs().await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, a);
        assert_eq!(jobs[1].job.workspace, "prod");
    }

    #[tokio::test]
    async fn test_bounded_queue_rejects_when_full() {
        let queue = InMemoryJobQueue::with_capacity(1);
        queue.queue_job(init_job("default")).await.unwrap();
        assert!(queue.queue_job(init_job("prod")).await.is_err());
    }
}
