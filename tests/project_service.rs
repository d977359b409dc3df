//! Project service against in-memory collaborators

mod helpers;

use helpers::*;
use pipeplane::compile::OwnerRef;
use pipeplane::error::{Code, ServiceError};
use pipeplane::persistence::{InMemoryStateStore, StateStore};
use pipeplane::server::{DataSource, InMemoryJobQueue, Project, ProjectService, Workspace};
use std::sync::Arc;

fn service(queue: Arc<InMemoryJobQueue>) -> (Arc<InMemoryStateStore>, ProjectService) {
    let store = Arc::new(InMemoryStateStore::new());
    let service = ProjectService::new(store.clone(), queue);
    (store, service)
}

fn git_project(name: &str) -> Project {
    Project::new(name).with_data_source(DataSource::Git {
        url: "https://example.com/repo.git".to_string(),
        path: None,
        reference: None,
    })
}

#[tokio::test]
async fn test_upsert_pipelines_persists_compiled_protos() {
    let (store, service) = service(Arc::new(InMemoryJobQueue::new()));
    service.upsert_project(Project::new("foo")).await.unwrap();

    let config = load_fixture("nested_pipes.yaml");
    let owners = service.upsert_pipelines(&config).await.unwrap();
    assert_eq!(
        owners,
        vec![OwnerRef::new("foo", "nested"), OwnerRef::new("foo", "foo")]
    );

    let stored = store.pipeline_get(&OwnerRef::new("foo", "nested")).await.unwrap();
    assert!(stored.is_some());
    assert_eq!(store.pipeline_list("foo").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_upsert_pipelines_compile_failure_stores_nothing() {
    let (store, service) = service(Arc::new(InMemoryJobQueue::new()));
    service.upsert_project(Project::new("foo")).await.unwrap();

    let config = load_fixture("invalid_step.yaml");
    let err = service.upsert_pipelines(&config).await.unwrap_err();
    assert_eq!(err.code(), Code::Internal);
    assert!(store.pipeline_list("foo").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upsert_pipelines_requires_project() {
    let (_store, service) = service(Arc::new(InMemoryJobQueue::new()));
    let err = service
        .upsert_pipelines(&load_fixture("exec_step.yaml"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn test_git_project_queues_init_per_workspace() {
    let queue = Arc::new(InMemoryJobQueue::new());
    let (store, service) = service(queue.clone());
    store.workspace_put(&Workspace::new("dev")).await.unwrap();
    store.workspace_put(&Workspace::new("prod")).await.unwrap();

    service.upsert_project(git_project("foo")).await.unwrap();

    let jobs = queue.jobs().await;
    let workspaces: Vec<&str> = jobs.iter().map(|j| j.job.workspace.as_str()).collect();
    assert_eq!(workspaces, vec!["dev", "prod"]);
    assert!(jobs.iter().all(|j| j.job.application.project == "foo"));
}

#[tokio::test]
async fn test_queue_failure_aborts_remaining_workspaces() {
    let queue = Arc::new(InMemoryJobQueue::with_capacity(1));
    let (store, service) = service(queue.clone());
    store.workspace_put(&Workspace::new("dev")).await.unwrap();
    store.workspace_put(&Workspace::new("prod")).await.unwrap();

    let err = service.upsert_project(git_project("foo")).await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert!(err.to_string().starts_with("failed queueing init job"));

    // The first job stays queued and the project itself was stored
    assert_eq!(queue.jobs().await.len(), 1);
    assert!(store.project_get("foo").await.unwrap().is_some());
}
