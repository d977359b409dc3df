//! Pipeline domain model

use crate::core::step::{Step, StepKind};

/// A named, ordered sequence of steps
///
/// A pipeline is either declared at the top level of a configuration or
/// embedded inside a step; both have the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Steps in declaration order
    pub steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Pipelines declared inline by this pipeline's steps (direct children only)
    pub fn embedded(&self) -> impl Iterator<Item = &Pipeline> {
        self.steps.iter().filter_map(|s| match &s.kind {
            StepKind::Embedded(p) => Some(p),
            _ => None,
        })
    }

    /// Names of top-level pipelines referenced by this pipeline's steps
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|s| match &s.kind {
            StepKind::Reference(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    #[test]
    fn test_steps_keep_declaration_order() {
        let pipeline = Pipeline::new(
            "foo",
            vec![
                Step::plugin("zero", "exec", "example.com/test", Value::Null),
                Step::plugin("one", "exec", "example.com/second", Value::Null),
                Step::reference("two", "other").with_depends_on(["zero"]),
            ],
        );

        let names: Vec<_> = pipeline.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zero", "one", "two"]);
        assert_eq!(pipeline.step("two").unwrap().depends_on, vec!["zero".to_string()]);
        assert!(pipeline.step("three").is_none());
    }

    #[test]
    fn test_embedded_and_references() {
        let nested = Pipeline::new("bar", vec![]);
        let pipeline = Pipeline::new(
            "foo",
            vec![
                Step::embedded("pipe", nested),
                Step::reference("other", "pipe2"),
            ],
        );

        let embedded: Vec<_> = pipeline.embedded().map(|p| p.name.as_str()).collect();
        assert_eq!(embedded, vec!["bar"]);
        let refs: Vec<_> = pipeline.references().collect();
        assert_eq!(refs, vec!["pipe2"]);
    }
}
