//! Project service: CRUD over projects and applications, pipeline upserts,
//! and init job queueing

use crate::compile::OwnerRef;
use crate::core::Config;
use crate::error::ServiceError;
use crate::persistence::StateStore;
use crate::server::queue::JobQueue;
use crate::server::types::{
    Application, ApplicationRef, Job, JobId, JobOperation, Project, RunnerRef, Workspace,
};
use crate::server::validate;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Workspace used when none exist yet
pub const DEFAULT_WORKSPACE: &str = "default";

/// A project together with the workspaces it has activity in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDetails {
    pub project: Project,
    pub workspaces: Vec<Workspace>,
}

/// Service handling project, application and pipeline requests
pub struct ProjectService {
    state: Arc<dyn StateStore>,
    queue: Arc<dyn JobQueue>,
}

impl ProjectService {
    pub fn new(state: Arc<dyn StateStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { state, queue }
    }

    fn state(&self) -> &dyn StateStore {
        self.state.as_ref()
    }

    /// Log a collaborator failure and wrap it for the caller
    fn externalize(context: &str, err: anyhow::Error) -> ServiceError {
        error!(error = %format!("{:#}", err), "{}", context);
        ServiceError::external(context, err)
    }

    /// Create or replace a project
    ///
    /// Projects backed by git without polling get one init job per workspace
    /// so their application list gets populated.
    pub async fn upsert_project(&self, project: Project) -> Result<Project, ServiceError> {
        validate::validate_upsert_project(&project)?;

        self.state()
            .project_put(&project)
            .await
            .map_err(|e| Self::externalize("failed storing project", e))?;

        if project.needs_remote_init() {
            // TODO: only queue init jobs when the data source settings changed
            let jobs = self
                .queue_init_ops(&project)
                .await
                .map_err(|e| Self::externalize("failed queueing init job", e))?;
            info!(project = %project.name, jobs = jobs.len(), "queued init jobs");
        }

        Ok(project)
    }

    /// Queue an init job for every workspace, stopping at the first failure
    ///
    /// Jobs queued before a failure are not withdrawn.
    async fn queue_init_ops(&self, project: &Project) -> anyhow::Result<Vec<JobId>> {
        let mut workspaces = self.state().workspace_list().await?;
        if workspaces.is_empty() {
            workspaces.push(Workspace::new(DEFAULT_WORKSPACE));
        }

        let mut ids = Vec::with_capacity(workspaces.len());
        for workspace in workspaces {
            let id = self
                .queue
                .queue_job(Job {
                    application: ApplicationRef {
                        project: project.name.clone(),
                        application: None,
                    },
                    workspace: workspace.name.clone(),
                    operation: JobOperation::Init,
                    target_runner: RunnerRef::Any,
                })
                .await?;
            debug!(project = %project.name, workspace = %workspace.name, job = %id, "queued init job");
            ids.push(id);
        }

        Ok(ids)
    }

    pub async fn get_project(&self, name: &str) -> Result<ProjectDetails, ServiceError> {
        validate::validate_get_project(name)?;

        let project = self
            .state()
            .project_get(name)
            .await
            .map_err(|e| Self::externalize("failed loading project", e))?
            .ok_or_else(|| ServiceError::NotFound(format!("project '{}'", name)))?;

        let workspaces = self
            .state()
            .project_list_workspaces(name)
            .await
            .map_err(|e| Self::externalize("failed listing workspaces", e))?;

        Ok(ProjectDetails { project, workspaces })
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ServiceError> {
        self.state()
            .project_list()
            .await
            .map_err(|e| Self::externalize("failed listing projects", e))
    }

    pub async fn get_application(
        &self,
        project: &str,
        name: &str,
    ) -> Result<Application, ServiceError> {
        validate::validate_get_application(project, name)?;

        self.state()
            .app_get(project, name)
            .await
            .map_err(|e| Self::externalize("failed loading application", e))?
            .ok_or_else(|| ServiceError::NotFound(format!("application '{}/{}'", project, name)))
    }

    /// Create an application, or update the one the project already has
    pub async fn upsert_application(
        &self,
        project: &str,
        name: &str,
        file_change_signal: Option<String>,
    ) -> Result<Application, ServiceError> {
        validate::validate_upsert_application(project, name)?;

        let existing = self
            .state()
            .project_get(project)
            .await
            .map_err(|e| Self::externalize("failed loading project", e))?
            .ok_or_else(|| ServiceError::NotFound(format!("project '{}'", project)))?;

        let mut app = match existing.app(name) {
            Some(idx) => existing.applications[idx].clone(),
            None => Application {
                project: project.to_string(),
                name: name.to_string(),
                file_change_signal: None,
            },
        };
        app.file_change_signal = file_change_signal;

        self.state()
            .app_put(&app)
            .await
            .map_err(|e| Self::externalize("failed storing application", e))
    }

    /// Compile a configuration and store every resulting pipeline
    ///
    /// Compilation failures keep their own status (`Internal`); nothing is
    /// stored when compilation fails.
    pub async fn upsert_pipelines(&self, config: &Config) -> Result<Vec<OwnerRef>, ServiceError> {
        let exists = self
            .state()
            .project_get(&config.project)
            .await
            .map_err(|e| Self::externalize("failed loading project", e))?
            .is_some();
        if !exists {
            return Err(ServiceError::NotFound(format!("project '{}'", config.project)));
        }

        let protos = config.pipeline_protos()?;

        let mut owners = Vec::with_capacity(protos.len());
        for proto in &protos {
            self.state()
                .pipeline_put(proto)
                .await
                .map_err(|e| Self::externalize("failed storing pipeline", e))?;
            owners.push(proto.owner.clone());
        }

        info!(project = %config.project, pipelines = owners.len(), "stored pipelines");
        Ok(owners)
    }
}
