//! Nested pipeline hoisting and reference compilation
//!
//! Turns a loaded [`Config`] into a flat list of [`CompiledPipeline`]s.
//! Pipelines embedded inside steps are hoisted into their own entries and
//! the embedding step is rewritten to an owner reference; steps naming a
//! sibling pipeline are resolved to the same reference shape.
//!
//! Output order: each top-level pipeline is preceded by every pipeline it
//! embeds (children before parents); top-level pipelines otherwise keep
//! declaration order. Referenced pipelines are not pulled forward.

use crate::compile::proto::{CompiledPipeline, CompiledStep, CompiledStepKind, OwnerRef};
use crate::core::{
    config::Config,
    pipeline::Pipeline,
    schema::{Configurable, Schema},
    step::{PluginUse, Step, StepKind},
};
use crate::error::ConfigError;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Plugin type the compiler knows how to translate
pub const EXEC_PLUGIN: &str = "exec";

/// Schema of the `exec` plugin body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl Configurable for ExecConfig {
    fn schema(&mut self) -> Schema<'_> {
        Schema::new()
            .optional("command", &mut self.command)
            .optional("args", &mut self.args)
    }
}

impl Config {
    /// Compile every declared pipeline into its persisted form
    ///
    /// Any structural problem fails the whole call with
    /// [`ConfigError::Internal`]; no partial list is returned.
    pub fn pipeline_protos(&self) -> Result<Vec<CompiledPipeline>, ConfigError> {
        Compiler::new(self).compile()
    }
}

fn internal(message: String) -> ConfigError {
    ConfigError::Internal(message)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Find a cycle in a directed graph without recursion
///
/// Returns the cycle as a path whose first and last element are the same node.
fn find_cycle<'a>(nodes: &[&'a str], edges: &HashMap<&'a str, Vec<&'a str>>) -> Option<Vec<&'a str>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    for &start in nodes {
        if marks.contains_key(start) {
            continue;
        }

        marks.insert(start, Mark::InProgress);
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];

        loop {
            let Some(top) = stack.last_mut() else { break };
            let node = top.0;
            let next = edges.get(node).and_then(|out| out.get(top.1)).copied();
            top.1 += 1;

            match next {
                Some(child) => match marks.get(child) {
                    Some(Mark::InProgress) => {
                        let from = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                        let mut cycle: Vec<&str> = stack[from..].iter().map(|(n, _)| *n).collect();
                        cycle.push(child);
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child, Mark::InProgress);
                        stack.push((child, 0));
                    }
                },
                None => {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                }
            }
        }
    }

    None
}

struct Compiler<'a> {
    config: &'a Config,
    top_level: HashMap<&'a str, &'a Pipeline>,
}

impl<'a> Compiler<'a> {
    fn new(config: &'a Config) -> Self {
        Self {
            config,
            top_level: HashMap::new(),
        }
    }

    fn owner(&self, pipeline: &str) -> OwnerRef {
        OwnerRef::new(self.config.project.clone(), pipeline)
    }

    fn compile(mut self) -> Result<Vec<CompiledPipeline>, ConfigError> {
        for pipeline in self.config.pipelines() {
            if self.top_level.insert(pipeline.name.as_str(), pipeline).is_some() {
                return Err(internal(format!(
                    "pipeline '{}' is declared more than once in project '{}'",
                    pipeline.name, self.config.project
                )));
            }
        }

        self.check_pipeline_graph()?;

        let mut compiled = Vec::new();
        for root in self.config.pipelines() {
            // Post-order over embedded pipelines: children are emitted first
            let mut stack: Vec<(&Pipeline, bool)> = vec![(root, false)];
            while let Some((pipeline, expanded)) = stack.pop() {
                if expanded {
                    let proto = self.compile_pipeline(pipeline)?;
                    debug!(owner = %proto.owner, steps = proto.steps.len(), "compiled pipeline");
                    compiled.push(proto);
                } else {
                    stack.push((pipeline, true));
                    let children: Vec<&Pipeline> = pipeline.embedded().collect();
                    stack.extend(children.into_iter().rev().map(|p| (p, false)));
                }
            }
        }

        info!(
            project = %self.config.project,
            pipelines = compiled.len(),
            "compiled pipeline configuration"
        );
        Ok(compiled)
    }

    /// Check name uniqueness, dangling references and cycles across every
    /// top-level and embedded pipeline
    fn check_pipeline_graph(&self) -> Result<(), ConfigError> {
        let mut names: Vec<&str> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();

        let mut pending: Vec<&Pipeline> = self.config.pipelines().iter().rev().collect();
        while let Some(pipeline) = pending.pop() {
            let name = pipeline.name.as_str();
            if !seen.insert(name) {
                return Err(internal(format!(
                    "pipeline name '{}' collides with another pipeline in project '{}'",
                    name, self.config.project
                )));
            }
            names.push(name);

            let out = edges.entry(name).or_default();
            for step in &pipeline.steps {
                match &step.kind {
                    StepKind::Embedded(child) => {
                        out.push(child.name.as_str());
                        pending.push(child);
                    }
                    StepKind::Reference(target) => {
                        if !self.top_level.contains_key(target.as_str()) {
                            return Err(internal(format!(
                                "step '{}' in pipeline '{}' references unknown pipeline '{}'",
                                step.name, name, target
                            )));
                        }
                        out.push(target.as_str());
                    }
                    StepKind::Plugin(_) => {}
                }
            }
        }

        if let Some(cycle) = find_cycle(&names, &edges) {
            return Err(internal(format!(
                "pipeline cycle detected: {}",
                cycle.join(" -> ")
            )));
        }

        Ok(())
    }

    fn compile_pipeline(&self, pipeline: &Pipeline) -> Result<CompiledPipeline, ConfigError> {
        let mut steps = BTreeMap::new();
        for step in &pipeline.steps {
            let compiled = self.compile_step(pipeline, step)?;
            if steps.insert(step.name.clone(), compiled).is_some() {
                return Err(internal(format!(
                    "step name '{}' is used more than once in pipeline '{}'",
                    step.name, pipeline.name
                )));
            }
        }

        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in &pipeline.steps {
            for dep in &step.depends_on {
                if !steps.contains_key(dep) {
                    return Err(internal(format!(
                        "step '{}' in pipeline '{}' depends on unknown step '{}'",
                        step.name, pipeline.name, dep
                    )));
                }
            }
            edges.insert(
                step.name.as_str(),
                step.depends_on.iter().map(String::as_str).collect(),
            );
        }

        let names: Vec<&str> = pipeline.steps.iter().map(|s| s.name.as_str()).collect();
        if let Some(cycle) = find_cycle(&names, &edges) {
            return Err(internal(format!(
                "dependency cycle in pipeline '{}': {}",
                pipeline.name,
                cycle.join(" -> ")
            )));
        }

        Ok(CompiledPipeline {
            owner: self.owner(&pipeline.name),
            name: pipeline.name.clone(),
            steps,
        })
    }

    fn compile_step(&self, pipeline: &Pipeline, step: &Step) -> Result<CompiledStep, ConfigError> {
        let kind = match &step.kind {
            StepKind::Plugin(use_) => self.compile_exec(pipeline, step, use_)?,
            StepKind::Embedded(child) => CompiledStepKind::PipelineRef {
                owner: self.owner(&child.name),
            },
            StepKind::Reference(target) => CompiledStepKind::PipelineRef {
                owner: self.owner(target),
            },
        };

        Ok(CompiledStep {
            name: step.name.clone(),
            depends_on: step.depends_on.clone(),
            kind,
        })
    }

    fn compile_exec(
        &self,
        pipeline: &Pipeline,
        step: &Step,
        use_: &PluginUse,
    ) -> Result<CompiledStepKind, ConfigError> {
        if use_.plugin != EXEC_PLUGIN {
            return Err(internal(format!(
                "step '{}' in pipeline '{}' uses unsupported plugin type '{}'",
                step.name, pipeline.name, use_.plugin
            )));
        }

        if use_.image_url.is_empty() {
            return Err(internal(format!(
                "exec step '{}' in pipeline '{}' has no image_url",
                step.name, pipeline.name
            )));
        }

        let mut exec = ExecConfig::default();
        let diags = step.configure(&mut exec, Some(self.config.variables()));
        if diags.has_errors() {
            return Err(internal(format!(
                "failed to decode exec step '{}' in pipeline '{}': {}",
                step.name, pipeline.name, diags
            )));
        }
        for diag in diags.iter() {
            warn!(pipeline = %pipeline.name, step = %step.name, "{}", diag);
        }

        Ok(CompiledStepKind::Exec {
            image_url: use_.image_url.clone(),
            command: exec.command,
            args: exec.args,
            raw_config: use_.body.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;
    use serde_yaml::Value;

    fn exec(name: &str) -> Step {
        Step::plugin(name, EXEC_PLUGIN, "example.com/test", Value::Null)
    }

    fn names(protos: &[CompiledPipeline]) -> Vec<&str> {
        protos.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_find_cycle() {
        let nodes = vec!["a", "b", "c"];
        let mut edges = HashMap::new();
        edges.insert("a", vec!["b"]);
        edges.insert("b", vec!["c"]);
        edges.insert("c", vec![]);
        assert!(find_cycle(&nodes, &edges).is_none());

        edges.insert("c", vec!["a"]);
        assert_eq!(find_cycle(&nodes, &edges), Some(vec!["a", "b", "c", "a"]));
    }

    #[test]
    fn test_find_cycle_self_loop() {
        let nodes = vec!["a"];
        let mut edges = HashMap::new();
        edges.insert("a", vec!["a"]);
        assert_eq!(find_cycle(&nodes, &edges), Some(vec!["a", "a"]));
    }

    #[test]
    fn test_single_exec_pipeline() {
        let config = Config::new("proj", vec![Pipeline::new("foo", vec![exec("build")])]);
        let protos = config.pipeline_protos().unwrap();

        assert_eq!(names(&protos), vec!["foo"]);
        assert_eq!(protos[0].owner, OwnerRef::new("proj", "foo"));
        match &protos[0].steps["build"].kind {
            CompiledStepKind::Exec { image_url, command, .. } => {
                assert_eq!(image_url, "example.com/test");
                assert_eq!(command, &None);
            }
            other => panic!("expected exec step, got {:?}", other),
        }
    }

    #[test]
    fn test_deeply_embedded_children_come_first() {
        let inner = Pipeline::new("inner", vec![exec("a")]);
        let middle = Pipeline::new("middle", vec![Step::embedded("run-inner", inner)]);
        let side = Pipeline::new("side", vec![exec("b")]);
        let root = Pipeline::new(
            "root",
            vec![Step::embedded("run-middle", middle), Step::embedded("run-side", side)],
        );

        let protos = Config::new("proj", vec![root]).pipeline_protos().unwrap();
        assert_eq!(names(&protos), vec!["inner", "middle", "side", "root"]);
    }

    #[test]
    fn test_duplicate_step_names_fail() {
        let config = Config::new("proj", vec![Pipeline::new("foo", vec![exec("a"), exec("a")])]);
        let err = config.pipeline_protos().unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }

    #[test]
    fn test_duplicate_top_level_names_fail() {
        let config = Config::new(
            "proj",
            vec![Pipeline::new("foo", vec![]), Pipeline::new("foo", vec![])],
        );
        assert_eq!(config.pipeline_protos().unwrap_err().code(), Code::Internal);
    }

    #[test]
    fn test_embedded_name_collision_fails() {
        let config = Config::new(
            "proj",
            vec![
                Pipeline::new("foo", vec![Step::embedded("pipe", Pipeline::new("bar", vec![]))]),
                Pipeline::new("bar", vec![]),
            ],
        );
        let err = config.pipeline_protos().unwrap_err();
        assert!(matches!(err, ConfigError::Internal(_)));
        assert!(err.to_string().contains("bar"));
    }

    #[test]
    fn test_dangling_reference_is_internal() {
        let config = Config::new(
            "proj",
            vec![Pipeline::new("foo", vec![Step::reference("pipe", "ghost")])],
        );
        let err = config.pipeline_protos().unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_reference_cycle_fails() {
        let config = Config::new(
            "proj",
            vec![
                Pipeline::new("foo", vec![Step::reference("to-bar", "bar")]),
                Pipeline::new("bar", vec![Step::reference("to-foo", "foo")]),
            ],
        );
        let err = config.pipeline_protos().unwrap_err();
        assert!(err.to_string().contains("foo -> bar -> foo"), "{}", err);
    }

    #[test]
    fn test_embedded_pipeline_referencing_its_parent_fails() {
        let nested = Pipeline::new("nested", vec![Step::reference("back", "foo")]);
        let config = Config::new(
            "proj",
            vec![Pipeline::new("foo", vec![Step::embedded("pipe", nested)])],
        );
        assert_eq!(config.pipeline_protos().unwrap_err().code(), Code::Internal);
    }

    #[test]
    fn test_self_reference_fails() {
        let config = Config::new(
            "proj",
            vec![Pipeline::new("foo", vec![Step::reference("again", "foo")])],
        );
        assert!(config.pipeline_protos().is_err());
    }

    #[test]
    fn test_dependency_cycle_fails() {
        let config = Config::new(
            "proj",
            vec![Pipeline::new(
                "foo",
                vec![
                    exec("a").with_depends_on(["b"]),
                    exec("b").with_depends_on(["a"]),
                ],
            )],
        );
        let err = config.pipeline_protos().unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert!(err.to_string().contains("dependency cycle"));
    }

    #[test]
    fn test_unknown_dependency_is_internal() {
        let config = Config::new(
            "proj",
            vec![Pipeline::new("foo", vec![exec("a").with_depends_on(["zzz"])])],
        );
        assert_eq!(config.pipeline_protos().unwrap_err().code(), Code::Internal);
    }

    #[test]
    fn test_unsupported_plugin_fails() {
        let step = Step::plugin("a", "docker", "example.com/test", Value::Null);
        let config = Config::new("proj", vec![Pipeline::new("foo", vec![step])]);
        let err = config.pipeline_protos().unwrap_err();
        assert!(err.to_string().contains("docker"));
    }

    #[test]
    fn test_exec_without_image_fails() {
        let step = Step::plugin("a", EXEC_PLUGIN, "", Value::Null);
        let config = Config::new("proj", vec![Pipeline::new("foo", vec![step])]);
        assert_eq!(config.pipeline_protos().unwrap_err().code(), Code::Internal);
    }

    #[test]
    fn test_exec_body_is_decoded_and_carried() {
        let body: Value = serde_yaml::from_str("command: make\nargs: [build, test]").unwrap();
        let step = Step::plugin("a", EXEC_PLUGIN, "example.com/test", body.clone());
        let config = Config::new("proj", vec![Pipeline::new("foo", vec![step])]);

        let protos = config.pipeline_protos().unwrap();
        assert_eq!(
            protos[0].steps["a"].kind,
            CompiledStepKind::Exec {
                image_url: "example.com/test".to_string(),
                command: Some("make".to_string()),
                args: vec!["build".to_string(), "test".to_string()],
                raw_config: body,
            }
        );
    }

    #[test]
    fn test_exec_decode_errors_are_internal() {
        let body: Value = serde_yaml::from_str("command: make\nunknown: 1").unwrap();
        let step = Step::plugin("a", EXEC_PLUGIN, "example.com/test", body);
        let config = Config::new("proj", vec![Pipeline::new("foo", vec![step])]);

        let err = config.pipeline_protos().unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert!(err.to_string().contains("unknown"));
    }

    #[test]
    fn test_compilation_does_not_mutate_config() {
        let nested = Pipeline::new("nested", vec![exec("inner")]);
        let config = Config::new(
            "proj",
            vec![Pipeline::new("foo", vec![Step::embedded("pipe", nested)])],
        );
        let before = config.clone();
        let first = config.pipeline_protos().unwrap();
        let second = config.pipeline_protos().unwrap();

        assert_eq!(config, before);
        assert_eq!(first, second);
    }
}
