//! Configuration loading from YAML
//!
//! A configuration source declares a project, optional variables and
//! applications, and any number of named pipelines. Loading parses the
//! source, applies the workspace filter, renders `image_url` templates and
//! validates the structural invariants of the pipeline graph.

use crate::core::{
    context::EvalContext,
    pipeline::Pipeline,
    step::{Step, StepKind},
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, instrument};

/// Maximum configuration source size (1 MiB)
const MAX_CONFIG_SIZE: usize = 1024 * 1024;

/// Options controlling how a configuration source is materialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Workspace whose conditionally-included blocks are kept
    pub workspace: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            workspace: "default".to_string(),
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = workspace.into();
        self
    }
}

/// Top-level document as written in YAML
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    project: String,

    #[serde(default)]
    variables: BTreeMap<String, Value>,

    #[serde(default)]
    apps: Vec<RawApp>,

    #[serde(default)]
    pipelines: Vec<RawPipeline>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawApp {
    name: String,

    #[serde(flatten)]
    body: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPipeline {
    name: String,

    /// Workspaces this pipeline is included in (absent = all)
    #[serde(default)]
    workspaces: Option<Vec<String>>,

    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    name: String,

    #[serde(default)]
    workspaces: Option<Vec<String>>,

    #[serde(default)]
    image_url: Option<String>,

    #[serde(default)]
    depends_on: Vec<String>,

    #[serde(default, rename = "use")]
    use_: Option<RawUse>,

    #[serde(default)]
    pipeline: Option<RawPipeline>,

    #[serde(default)]
    pipeline_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawUse {
    #[serde(rename = "type")]
    plugin: String,

    #[serde(flatten)]
    body: BTreeMap<String, Value>,
}

/// Application block; its body is opaque to the pipeline compiler
#[derive(Debug, Clone, PartialEq)]
pub struct App {
    pub name: String,
    pub body: Value,
}

/// A loaded configuration
///
/// Immutable once built; safe to share between readers.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Project namespace every pipeline belongs to
    pub project: String,

    /// Application blocks in declaration order
    pub apps: Vec<App>,

    variables: EvalContext,
    pipelines: Vec<Pipeline>,
}

/// Load a configuration file
pub fn load<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Config, ConfigError> {
    Config::from_file(path, options)
}

impl Config {
    /// Build a configuration directly, without structural validation
    pub fn new(project: impl Into<String>, pipelines: Vec<Pipeline>) -> Self {
        Self {
            project: project.into(),
            apps: Vec::new(),
            variables: EvalContext::new(),
            pipelines,
        }
    }

    pub fn with_variables(mut self, variables: EvalContext) -> Self {
        self.variables = variables;
        self
    }

    /// Load configuration from a YAML file
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_file<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let io_error = |e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        };

        let metadata = std::fs::metadata(path).map_err(io_error)?;
        if metadata.len() > MAX_CONFIG_SIZE as u64 {
            return Err(ConfigError::parse(
                &path.display().to_string(),
                format!("source is {} bytes (max: {})", metadata.len(), MAX_CONFIG_SIZE),
            ));
        }

        let content = std::fs::read_to_string(path).map_err(io_error)?;
        debug!(size = content.len(), "read configuration file");
        Self::parse(&content, &path.display().to_string(), options)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str, options: &LoadOptions) -> Result<Self, ConfigError> {
        Self::parse(yaml, "<inline>", options)
    }

    fn parse(yaml: &str, source_name: &str, options: &LoadOptions) -> Result<Self, ConfigError> {
        if yaml.len() > MAX_CONFIG_SIZE {
            return Err(ConfigError::parse(
                source_name,
                format!("source is {} bytes (max: {})", yaml.len(), MAX_CONFIG_SIZE),
            ));
        }

        let raw: RawConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::from_yaml(source_name, e))?;

        let variables = parse_variables(&raw.variables)?;
        let loader = Loader {
            source_name,
            workspace: &options.workspace,
            variables: &variables,
        };

        let pipelines = raw
            .pipelines
            .iter()
            .filter(|p| loader.included(&p.workspaces))
            .map(|p| loader.pipeline(p))
            .collect::<Result<Vec<_>, _>>()?;

        let apps = raw
            .apps
            .into_iter()
            .map(|a| App {
                name: a.name,
                body: Value::Mapping(a.body.into_iter().map(|(k, v)| (Value::String(k), v)).collect()),
            })
            .collect();

        let config = Config {
            project: raw.project,
            apps,
            variables,
            pipelines,
        };
        config.validate()?;

        debug!(
            project = %config.project,
            pipelines = config.pipelines.len(),
            workspace = %options.workspace,
            "loaded configuration"
        );
        Ok(config)
    }

    /// Validate the structural invariants of the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.is_empty() {
            return Err(ConfigError::Validation("project name must not be empty".to_string()));
        }

        let mut app_names = HashSet::new();
        for app in &self.apps {
            if !app_names.insert(app.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate application name: {}",
                    app.name
                )));
            }
        }

        let mut pipeline_names = HashSet::new();
        for pipeline in &self.pipelines {
            if !pipeline_names.insert(pipeline.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate pipeline name: {}",
                    pipeline.name
                )));
            }
        }

        // Embedded pipelines are checked with the same rules as top-level ones
        let mut pending: Vec<&Pipeline> = self.pipelines.iter().collect();
        while let Some(pipeline) = pending.pop() {
            validate_pipeline(pipeline)?;
            pending.extend(pipeline.embedded());
        }

        Ok(())
    }

    /// Top-level pipelines in declaration order
    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    /// Variables declared by the configuration
    pub fn variables(&self) -> &EvalContext {
        &self.variables
    }

    /// Look up a top-level pipeline by name
    ///
    /// Returns `Ok(None)` when no pipeline has that name. With an evaluation
    /// context, every plugin body reachable from the pipeline is re-rendered
    /// and an undeclared variable is reported as an error.
    pub fn pipeline(
        &self,
        name: &str,
        ctx: Option<&EvalContext>,
    ) -> Result<Option<&Pipeline>, ConfigError> {
        let Some(pipeline) = self.pipelines.iter().find(|p| p.name == name) else {
            return Ok(None);
        };

        if let Some(ctx) = ctx {
            let ctx = self.variables.merged(Some(ctx));
            let mut pending = vec![pipeline];
            while let Some(current) = pending.pop() {
                for step in &current.steps {
                    match &step.kind {
                        StepKind::Plugin(use_) => {
                            let mut missing = Vec::new();
                            ctx.render_value(&use_.body, &mut missing);
                            if let Some(var) = missing.first() {
                                return Err(ConfigError::parse(
                                    &format!("pipeline \"{}\"", name),
                                    format!(
                                        "step \"{}\" references undeclared variable \"{}\"",
                                        step.name, var
                                    ),
                                ));
                            }
                        }
                        StepKind::Embedded(p) => pending.push(p),
                        StepKind::Reference(_) => {}
                    }
                }
            }
        }

        Ok(Some(pipeline))
    }
}

fn parse_variables(raw: &BTreeMap<String, Value>) -> Result<EvalContext, ConfigError> {
    let mut ctx = EvalContext::new();
    for (key, value) in raw {
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                return Err(ConfigError::Validation(format!(
                    "Variable '{}' must be a string, number or bool",
                    key
                )))
            }
        };
        ctx.set_variable(key.clone(), rendered);
    }
    Ok(ctx)
}

/// Converts raw YAML declarations into the domain model
struct Loader<'a> {
    source_name: &'a str,
    workspace: &'a str,
    variables: &'a EvalContext,
}

impl Loader<'_> {
    fn included(&self, workspaces: &Option<Vec<String>>) -> bool {
        match workspaces {
            Some(list) => list.iter().any(|w| w == self.workspace),
            None => true,
        }
    }

    /// A step embedding a pipeline is dropped along with that pipeline
    fn step_included(&self, raw: &RawStep) -> bool {
        self.included(&raw.workspaces)
            && raw
                .pipeline
                .as_ref()
                .map_or(true, |embedded| self.included(&embedded.workspaces))
    }

    fn pipeline(&self, raw: &RawPipeline) -> Result<Pipeline, ConfigError> {
        let steps = raw
            .steps
            .iter()
            .filter(|s| self.step_included(s))
            .map(|s| self.step(&raw.name, s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Pipeline::new(raw.name.clone(), steps))
    }

    fn step(&self, pipeline: &str, raw: &RawStep) -> Result<Step, ConfigError> {
        let declared = [raw.use_.is_some(), raw.pipeline.is_some(), raw.pipeline_ref.is_some()]
            .iter()
            .filter(|set| **set)
            .count();
        if declared != 1 {
            return Err(ConfigError::Validation(format!(
                "Step '{}' in pipeline '{}' must declare exactly one of 'use', 'pipeline' or 'pipeline_ref' (found {})",
                raw.name, pipeline, declared
            )));
        }

        if raw.image_url.is_some() && raw.use_.is_none() {
            return Err(ConfigError::Validation(format!(
                "Step '{}' in pipeline '{}' sets 'image_url' but does not use a plugin",
                raw.name, pipeline
            )));
        }

        let step = if let Some(use_) = &raw.use_ {
            let image_url = match &raw.image_url {
                Some(template) => self.variables.render(template).map_err(|missing| {
                    ConfigError::parse(
                        self.source_name,
                        format!(
                            "step '{}' image_url references undeclared variable '{}'",
                            raw.name,
                            missing.join("', '")
                        ),
                    )
                })?,
                None => String::new(),
            };
            let body = Value::Mapping(
                use_.body
                    .iter()
                    .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                    .collect(),
            );
            Step::plugin(raw.name.clone(), use_.plugin.clone(), image_url, body)
        } else if let Some(embedded) = &raw.pipeline {
            Step::embedded(raw.name.clone(), self.pipeline(embedded)?)
        } else {
            let target = raw.pipeline_ref.clone().unwrap_or_default();
            Step::reference(raw.name.clone(), target)
        };

        Ok(step.with_depends_on(raw.depends_on.iter().cloned()))
    }
}

fn validate_pipeline(pipeline: &Pipeline) -> Result<(), ConfigError> {
    if pipeline.name.is_empty() {
        return Err(ConfigError::Validation("pipeline name must not be empty".to_string()));
    }

    let mut seen = HashSet::new();
    for step in &pipeline.steps {
        if step.name.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Pipeline '{}' has a step with an empty name",
                pipeline.name
            )));
        }
        if !seen.insert(step.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate step name '{}' in pipeline '{}'",
                step.name, pipeline.name
            )));
        }
    }

    for step in &pipeline.steps {
        for dep in &step.depends_on {
            if !seen.contains(dep.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Step '{}' depends on non-existent step '{}'",
                    step.name, dep
                )));
            }
        }
        if let StepKind::Reference(target) = &step.kind {
            if target.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Step '{}' has an empty pipeline_ref",
                    step.name
                )));
            }
        }
    }

    Ok(())
}
