//! Request validation for the project service

use crate::error::ServiceError;
use crate::server::types::{DataSource, Project};

fn require_name(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::InvalidArgument(format!("{} must not be empty", field)));
    }
    if value.contains('/') {
        return Err(ServiceError::InvalidArgument(format!(
            "{} must not contain '/': {}",
            field, value
        )));
    }
    Ok(())
}

pub fn validate_upsert_project(project: &Project) -> Result<(), ServiceError> {
    require_name("project.name", &project.name)?;

    if let Some(DataSource::Git { url, .. }) = &project.data_source {
        if url.trim().is_empty() {
            return Err(ServiceError::InvalidArgument(
                "project.data_source.url must not be empty".to_string(),
            ));
        }
    }

    for app in &project.applications {
        require_name("project.applications.name", &app.name)?;
        if app.project != project.name {
            return Err(ServiceError::InvalidArgument(format!(
                "application '{}' belongs to project '{}', not '{}'",
                app.name, app.project, project.name
            )));
        }
    }

    Ok(())
}

pub fn validate_get_project(name: &str) -> Result<(), ServiceError> {
    require_name("project", name)
}

pub fn validate_get_application(project: &str, name: &str) -> Result<(), ServiceError> {
    require_name("application.project", project)?;
    require_name("application.application", name)
}

pub fn validate_upsert_application(project: &str, name: &str) -> Result<(), ServiceError> {
    require_name("project", project)?;
    require_name("name", name)
}
