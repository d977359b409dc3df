use anyhow::{Context, Result};
use pipeplane::cli::commands::{ApplyCommand, CompileCommand, ShowCommand, ValidateCommand};
use pipeplane::cli::output::*;
use pipeplane::cli::{Cli, Command};
use pipeplane::core::{load, Config, EvalContext, LoadOptions};
use pipeplane::persistence::{InMemoryStateStore, StateStore};
use pipeplane::server::{InMemoryJobQueue, Project, ProjectService};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let options = LoadOptions::new().with_workspace(cli.workspace.clone());

    // Execute command
    match &cli.command {
        Command::Validate(cmd) => validate_config(cmd, &options)?,
        Command::Compile(cmd) => compile_config(cmd, &options)?,
        Command::Show(cmd) => show_pipeline(cmd, &options)?,
        Command::Apply(cmd) => apply_config(cmd, &options).await?,
    }

    Ok(())
}

/// Load a configuration, exiting with a formatted error on failure
fn load_or_exit(file: &str, options: &LoadOptions) -> Config {
    match load(file, options) {
        Ok(config) => config,
        Err(e) => {
            println!("{}", format_config_error(&e));
            std::process::exit(1);
        }
    }
}

fn validate_config(cmd: &ValidateCommand, options: &LoadOptions) -> Result<()> {
    println!("{} Validating configuration...", INFO);

    let config = load_or_exit(&cmd.file, options);
    println!("{} Configuration is valid!", CHECK);
    println!("  Project: {}", style(&config.project).bold());
    println!("  Pipelines: {}", style(config.pipelines().len()).cyan());
    println!("  Applications: {}", style(config.apps.len()).cyan());

    Ok(())
}

fn compile_config(cmd: &CompileCommand, options: &LoadOptions) -> Result<()> {
    let config = load_or_exit(&cmd.file, options);

    let protos = match config.pipeline_protos() {
        Ok(protos) => protos,
        Err(e) => {
            println!("{}", format_config_error(&e));
            std::process::exit(1);
        }
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&protos)?);
        return Ok(());
    }

    println!(
        "{} Compiled {} pipeline(s) for project {}",
        CHECK,
        style(protos.len()).cyan(),
        style(&config.project).bold()
    );
    for proto in &protos {
        print!("{}", format_compiled(proto));
    }

    Ok(())
}

fn show_pipeline(cmd: &ShowCommand, options: &LoadOptions) -> Result<()> {
    let config = load_or_exit(&cmd.file, options);

    let ctx = if cmd.var.is_empty() {
        None
    } else {
        Some(
            cmd.var
                .iter()
                .fold(EvalContext::new(), |ctx, (k, v)| ctx.with_variable(k, v)),
        )
    };

    match config.pipeline(&cmd.pipeline, ctx.as_ref()) {
        Ok(Some(pipeline)) => {
            print!("{}", format_pipeline(pipeline));
            let refs: Vec<&str> = pipeline.references().collect();
            if !refs.is_empty() {
                println!("{} References: {}", INFO, refs.join(", "));
            }
        }
        Ok(None) => {
            println!("{} Pipeline {} not found", WARN, style(&cmd.pipeline).bold());
            std::process::exit(1);
        }
        Err(e) => {
            println!("{}", format_config_error(&e));
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn apply_config(cmd: &ApplyCommand, options: &LoadOptions) -> Result<()> {
    let config = load_or_exit(&cmd.file, options);

    // Set up persistence
    let store: Arc<dyn StateStore> = if cmd.in_memory {
        Arc::new(InMemoryStateStore::new())
    } else {
        open_store(cmd.db.as_deref()).await?
    };
    let service = ProjectService::new(store.clone(), Arc::new(InMemoryJobQueue::new()));

    if store.project_get(&config.project).await?.is_none() {
        service
            .upsert_project(Project::new(config.project.clone()))
            .await
            .context("Failed to create project")?;
        println!("{} Created project {}", INFO, style(&config.project).bold());
    }

    for app in &config.apps {
        service
            .upsert_application(&config.project, &app.name, None)
            .await
            .with_context(|| format!("Failed to register application {}", app.name))?;
    }

    match service.upsert_pipelines(&config).await {
        Ok(owners) => {
            println!(
                "{} Stored {} pipeline(s)",
                CHECK,
                style(owners.len()).cyan()
            );
            for owner in owners {
                println!("  {}", style(owner).bold());
            }
            Ok(())
        }
        Err(e) => {
            println!("{} [{}] {}", CROSS, style(e.code()).yellow(), style(&e).red());
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "sqlite")]
async fn open_store(db: Option<&str>) -> Result<Arc<dyn StateStore>> {
    use pipeplane::persistence::SqliteStateStore;

    let store = match db {
        Some(path) => SqliteStateStore::new(path).await?,
        None => SqliteStateStore::with_default_path().await?,
    };
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(_db: Option<&str>) -> Result<Arc<dyn StateStore>> {
    anyhow::bail!("built without sqlite support; use --in-memory")
}
