//! Persistence layer for projects, applications, workspaces and compiled pipelines

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteStateStore;

use crate::compile::{CompiledPipeline, OwnerRef};
use crate::server::types::{Application, Project, Workspace};
use anyhow::{bail, Result};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Trait for storage backends
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Insert or replace a project
    async fn project_put(&self, project: &Project) -> Result<()>;

    async fn project_get(&self, name: &str) -> Result<Option<Project>>;

    async fn project_list(&self) -> Result<Vec<Project>>;

    /// Workspaces the project has activity in
    async fn project_list_workspaces(&self, project: &str) -> Result<Vec<Workspace>>;

    async fn app_get(&self, project: &str, name: &str) -> Result<Option<Application>>;

    /// Insert or replace an application inside its project
    ///
    /// Fails if the project does not exist.
    async fn app_put(&self, app: &Application) -> Result<Application>;

    async fn workspace_put(&self, workspace: &Workspace) -> Result<()>;

    async fn workspace_list(&self) -> Result<Vec<Workspace>>;

    /// Insert or replace a compiled pipeline, keyed by its owner
    async fn pipeline_put(&self, pipeline: &CompiledPipeline) -> Result<()>;

    async fn pipeline_get(&self, owner: &OwnerRef) -> Result<Option<CompiledPipeline>>;

    async fn pipeline_list(&self, project: &str) -> Result<Vec<CompiledPipeline>>;
}

/// Insert `app` into `project`, replacing an application with the same name
pub(crate) fn upsert_app(project: &mut Project, app: &Application) {
    match project.app(&app.name) {
        Some(idx) => project.applications[idx] = app.clone(),
        None => project.applications.push(app.clone()),
    }
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryStateStore {
    projects: RwLock<BTreeMap<String, Project>>,
    workspaces: RwLock<BTreeMap<String, Workspace>>,
    pipelines: RwLock<BTreeMap<OwnerRef, CompiledPipeline>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(BTreeMap::new()),
            workspaces: RwLock::new(BTreeMap::new()),
            pipelines: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn project_put(&self, project: &Project) -> Result<()> {
        let mut projects = self.projects.write().await;
        projects.insert(project.name.clone(), project.clone());
        Ok(())
    }

    async fn project_get(&self, name: &str) -> Result<Option<Project>> {
        let projects = self.projects.read().await;
        Ok(projects.get(name).cloned())
    }

    async fn project_list(&self) -> Result<Vec<Project>> {
        let projects = self.projects.read().await;
        Ok(projects.values().cloned().collect())
    }

    async fn project_list_workspaces(&self, project: &str) -> Result<Vec<Workspace>> {
        let workspaces = self.workspaces.read().await;
        Ok(workspaces
            .values()
            .filter(|w| w.projects.iter().any(|p| p == project))
            .cloned()
            .collect())
    }

    async fn app_get(&self, project: &str, name: &str) -> Result<Option<Application>> {
        let projects = self.projects.read().await;
        Ok(projects
            .get(project)
            .and_then(|p| p.app(name).map(|idx| p.applications[idx].clone())))
    }

    async fn app_put(&self, app: &Application) -> Result<Application> {
        let mut projects = self.projects.write().await;
        let Some(project) = projects.get_mut(&app.project) else {
            bail!("project '{}' does not exist", app.project);
        };
        upsert_app(project, app);
        Ok(app.clone())
    }

    async fn workspace_put(&self, workspace: &Workspace) -> Result<()> {
        let mut workspaces = self.workspaces.write().await;
        workspaces.insert(workspace.name.clone(), workspace.clone());
        Ok(())
    }

    async fn workspace_list(&self) -> Result<Vec<Workspace>> {
        let workspaces = self.workspaces.read().await;
        Ok(workspaces.values().cloned().collect())
    }

    async fn pipeline_put(&self, pipeline: &CompiledPipeline) -> Result<()> {
        let mut pipelines = self.pipelines.write().await;
        pipelines.insert(pipeline.owner.clone(), pipeline.clone());
        Ok(())
    }

    async fn pipeline_get(&self, owner: &OwnerRef) -> Result<Option<CompiledPipeline>> {
        let pipelines = self.pipelines.read().await;
        Ok(pipelines.get(owner).cloned())
    }

    async fn pipeline_list(&self, project: &str) -> Result<Vec<CompiledPipeline>> {
        let pipelines = self.pipelines.read().await;
        Ok(pipelines
            .values()
            .filter(|p| p.owner.project == project)
            .cloned()
            .collect())
    }
}
