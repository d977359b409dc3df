//! Step domain model

use crate::core::{
    context::EvalContext,
    pipeline::Pipeline,
    schema::{Configurable, Diagnostics},
};
use serde_yaml::Value;

/// A single step in a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Step name, unique within its pipeline
    pub name: String,

    /// Names of steps this step must follow, in declared order
    pub depends_on: Vec<String>,

    /// What the step does
    pub kind: StepKind,
}

/// The three shapes a step can take; exactly one is ever populated
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// Invoke a plugin with a raw configuration body
    Plugin(PluginUse),

    /// Run a pipeline declared inline
    Embedded(Pipeline),

    /// Run a sibling top-level pipeline by name
    Reference(String),
}

/// Plugin invocation details
#[derive(Debug, Clone, PartialEq)]
pub struct PluginUse {
    /// Plugin type, e.g. `exec`
    pub plugin: String,

    /// Image the plugin runs in
    pub image_url: String,

    /// Undecoded attribute tree, interpreted once the plugin schema is known
    pub body: Value,
}

impl Step {
    /// Create a plugin invocation step
    pub fn plugin(
        name: impl Into<String>,
        plugin: impl Into<String>,
        image_url: impl Into<String>,
        body: Value,
    ) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            kind: StepKind::Plugin(PluginUse {
                plugin: plugin.into(),
                image_url: image_url.into(),
                body,
            }),
        }
    }

    /// Create a step that embeds a pipeline inline
    pub fn embedded(name: impl Into<String>, pipeline: Pipeline) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            kind: StepKind::Embedded(pipeline),
        }
    }

    /// Create a step that references a top-level pipeline by name
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            kind: StepKind::Reference(target.into()),
        }
    }

    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Image URL of a plugin step; `None` for pipeline steps
    pub fn image_url(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Plugin(use_) => Some(use_.image_url.as_str()),
            _ => None,
        }
    }

    /// The embedded pipeline, if this step declares one inline
    pub fn pipeline(&self) -> Option<&Pipeline> {
        match &self.kind {
            StepKind::Embedded(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    /// Raw plugin body; `None` for pipeline steps
    pub fn body(&self) -> Option<&Value> {
        match &self.kind {
            StepKind::Plugin(use_) => Some(&use_.body),
            _ => None,
        }
    }

    /// Decode the raw plugin body into `target`
    ///
    /// String attributes are rendered against `ctx` first. Every problem is
    /// reported through the returned diagnostics; `target` keeps whatever
    /// could be decoded.
    pub fn configure<C: Configurable + ?Sized>(
        &self,
        target: &mut C,
        ctx: Option<&EvalContext>,
    ) -> Diagnostics {
        let mut diags = Diagnostics::new();

        let body = match &self.kind {
            StepKind::Plugin(use_) => &use_.body,
            _ => {
                diags.error(
                    "Step has no plugin configuration",
                    format!("step \"{}\" runs a pipeline, not a plugin", self.name),
                );
                return diags;
            }
        };

        let empty = EvalContext::new();
        let ctx = ctx.unwrap_or(&empty);
        let mut missing = Vec::new();
        let rendered = ctx.render_value(body, &mut missing);
        for name in missing {
            diags.error(
                "Unknown variable",
                format!("step \"{}\" references undeclared variable \"{}\"", self.name, name),
            );
        }

        diags.extend(target.schema().decode(&rendered));
        diags
    }
}
