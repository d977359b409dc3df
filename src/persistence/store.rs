//! SQLite-based persistence store
//!
//! Entities are stored as JSON documents keyed by name; compiled pipelines
//! are keyed by `(project, name)`.

use crate::compile::{CompiledPipeline, OwnerRef};
use crate::persistence::{upsert_app, StateStore};
use crate::server::types::{Application, Project, Workspace};
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// SQLite state store
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);

        // Every connection to ":memory:" opens its own database
        let max_connections = if db_path == ":memory:" { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("pipeplane");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("state.db");
        let db_path = db_path
            .to_str()
            .context("Database path is not valid UTF-8")?
            .to_string();
        Self::new(&db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                name TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS workspaces (
                name TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pipelines (
                project TEXT NOT NULL,
                name TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (project, name)
            );

            CREATE INDEX IF NOT EXISTS idx_pipelines_project ON pipelines(project);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn decode<T: DeserializeOwned>(row: &sqlx::sqlite::SqliteRow) -> Result<T> {
        let data: String = row.get("data");
        serde_json::from_str(&data).context("Failed to decode stored document")
    }
}

#[async_trait::async_trait]
impl StateStore for SqliteStateStore {
    async fn project_put(&self, project: &Project) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO projects (name, data, updated_at)
            VALUES (?1, ?2, datetime('now'))
            "#,
        )
        .bind(&project.name)
        .bind(serde_json::to_string(project)?)
        .execute(&self.pool)
        .await
        .context("Failed to save project")?;

        Ok(())
    }

    async fn project_get(&self, name: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT data FROM projects WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load project")?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn project_list(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT data FROM projects ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list projects")?;

        rows.iter().map(Self::decode).collect()
    }

    async fn project_list_workspaces(&self, project: &str) -> Result<Vec<Workspace>> {
        let all = self.workspace_list().await?;
        Ok(all
            .into_iter()
            .filter(|w| w.projects.iter().any(|p| p == project))
            .collect())
    }

    async fn app_get(&self, project: &str, name: &str) -> Result<Option<Application>> {
        let project = self.project_get(project).await?;
        Ok(project.and_then(|p| p.app(name).map(|idx| p.applications[idx].clone())))
    }

    async fn app_put(&self, app: &Application) -> Result<Application> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT data FROM projects WHERE name = ?1")
            .bind(&app.project)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load project")?;
        let Some(row) = row else {
            bail!("project '{}' does not exist", app.project);
        };

        let mut project: Project = Self::decode(&row)?;
        upsert_app(&mut project, app);

        sqlx::query("UPDATE projects SET data = ?2, updated_at = datetime('now') WHERE name = ?1")
            .bind(&project.name)
            .bind(serde_json::to_string(&project)?)
            .execute(&mut *tx)
            .await
            .context("Failed to save application")?;

        tx.commit().await?;
        Ok(app.clone())
    }

    async fn workspace_put(&self, workspace: &Workspace) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO workspaces (name, data) VALUES (?1, ?2)")
            .bind(&workspace.name)
            .bind(serde_json::to_string(workspace)?)
            .execute(&self.pool)
            .await
            .context("Failed to save workspace")?;

        Ok(())
    }

    async fn workspace_list(&self) -> Result<Vec<Workspace>> {
        let rows = sqlx::query("SELECT data FROM workspaces ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list workspaces")?;

        rows.iter().map(Self::decode).collect()
    }

    async fn pipeline_put(&self, pipeline: &CompiledPipeline) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO pipelines (project, name, data, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            "#,
        )
        .bind(&pipeline.owner.project)
        .bind(&pipeline.owner.pipeline)
        .bind(serde_json::to_string(pipeline)?)
        .execute(&self.pool)
        .await
        .context("Failed to save pipeline")?;

        Ok(())
    }

    async fn pipeline_get(&self, owner: &OwnerRef) -> Result<Option<CompiledPipeline>> {
        let row = sqlx::query("SELECT data FROM pipelines WHERE project = ?1 AND name = ?2")
            .bind(&owner.project)
            .bind(&owner.pipeline)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load pipeline")?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn pipeline_list(&self, project: &str) -> Result<Vec<CompiledPipeline>> {
        let rows = sqlx::query("SELECT data FROM pipelines WHERE project = ?1 ORDER BY name ASC")
            .bind(project)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list pipelines")?;

        rows.iter().map(Self::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Config, LoadOptions};

    #[tokio::test]
    async fn test_sqlite_store() {
        let store = SqliteStateStore::new(":memory:").await.unwrap();

        store.project_put(&Project::new("foo")).await.unwrap();
        store
            .app_put(&Application {
                project: "foo".to_string(),
                name: "web".to_string(),
                file_change_signal: None,
            })
            .await
            .unwrap();

        let loaded = store.project_get("foo").await.unwrap().unwrap();
        assert_eq!(loaded.applications.len(), 1);
        assert!(store.app_get("foo", "web").await.unwrap().is_some());
        assert!(store.project_get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_pipeline_roundtrip() {
        let yaml = r#"
project: foo
pipelines:
  - name: foo
    steps:
      - name: test
        image_url: example.com/test
        use:
          type: exec
          command: make
"#;
        let config = Config::from_yaml(yaml, &LoadOptions::default()).unwrap();
        let protos = config.pipeline_protos().unwrap();

        let store = SqliteStateStore::new(":memory:").await.unwrap();
        store.pipeline_put(&protos[0]).await.unwrap();

        let loaded = store.pipeline_get(&protos[0].owner).await.unwrap().unwrap();
        assert_eq!(loaded, protos[0]);
        assert_eq!(store.pipeline_list("foo").await.unwrap().len(), 1);
    }
}
