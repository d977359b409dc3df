//! Evaluation context - variables available to `{{ name }}` interpolation

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::value::TaggedValue;
use serde_yaml::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Variables used when rendering step configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalContext {
    /// Variable name to rendered value
    pub variables: HashMap<String, String>,
}

impl EvalContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Set a variable
    pub fn set_variable(&mut self, key: String, value: String) {
        self.variables.insert(key, value);
    }

    /// Get a variable
    pub fn get_variable(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    /// Layer `other` on top of this context; its values win on conflict
    pub fn merged(&self, other: Option<&EvalContext>) -> EvalContext {
        let mut merged = self.clone();
        if let Some(other) = other {
            merged.variables.extend(other.variables.clone());
        }
        merged
    }

    /// Render a template, returning the names of every undeclared variable on failure
    pub fn render(&self, template: &str) -> Result<String, Vec<String>> {
        let mut missing = Vec::new();
        let rendered = placeholder().replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match self.variables.get(name) {
                Some(value) => value.clone(),
                None => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        });

        if missing.is_empty() {
            Ok(rendered.into_owned())
        } else {
            Err(missing)
        }
    }

    /// Render every string leaf of a YAML tree
    ///
    /// Leaves that fail to render are kept as-is; the undeclared names are
    /// appended to `missing`.
    pub fn render_value(&self, value: &Value, missing: &mut Vec<String>) -> Value {
        match value {
            Value::String(s) => match self.render(s) {
                Ok(rendered) => Value::String(rendered),
                Err(names) => {
                    missing.extend(names);
                    value.clone()
                }
            },
            Value::Sequence(items) => {
                Value::Sequence(items.iter().map(|v| self.render_value(v, missing)).collect())
            }
            Value::Mapping(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v, missing)))
                    .collect(),
            ),
            Value::Tagged(tagged) => Value::Tagged(Box::new(TaggedValue {
                tag: tagged.tag.clone(),
                value: self.render_value(&tagged.value, missing),
            })),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_variables() {
        let mut ctx = EvalContext::new();
        ctx.set_variable("foo".to_string(), "bar".to_string());

        assert_eq!(ctx.get_variable("foo"), Some(&"bar".to_string()));
        assert_eq!(ctx.get_variable("baz"), None);
    }

    #[test]
    fn test_render_template() {
        let ctx = EvalContext::new().with_variable("registry", "example.com");
        assert_eq!(ctx.render("{{ registry }}/test").unwrap(), "example.com/test");
        assert_eq!(ctx.render("{{registry}}/x").unwrap(), "example.com/x");
        assert_eq!(ctx.render("plain").unwrap(), "plain");
    }

    #[test]
    fn test_render_reports_missing() {
        let ctx = EvalContext::new();
        let missing = ctx.render("{{ a }}-{{ b }}").unwrap_err();
        assert_eq!(missing, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_merged_overrides() {
        let base = EvalContext::new().with_variable("a", "1").with_variable("b", "2");
        let over = EvalContext::new().with_variable("b", "3");
        let merged = base.merged(Some(&over));
        assert_eq!(merged.get_variable("a"), Some(&"1".to_string()));
        assert_eq!(merged.get_variable("b"), Some(&"3".to_string()));
    }

    #[test]
    fn test_render_value_keeps_tags() {
        let ctx = EvalContext::new().with_variable("cmd", "make");
        let value: Value = serde_yaml::from_str("command: !shell \"{{ cmd }} build\"").unwrap();

        let mut missing = Vec::new();
        let rendered = ctx.render_value(&value, &mut missing);
        assert!(missing.is_empty());

        match &rendered["command"] {
            Value::Tagged(tagged) => {
                assert_eq!(tagged.tag, "shell");
                assert_eq!(tagged.value, Value::String("make build".to_string()));
            }
            other => panic!("expected tagged value, got {:?}", other),
        }
    }

    #[test]
    fn test_render_value_tree() {
        let ctx = EvalContext::new().with_variable("name", "qubit");
        let value: Value = serde_yaml::from_str("foo: \"{{ name }}\"\nargs: [\"{{ name }}\", \"{{ nope }}\"]").unwrap();
        let mut missing = Vec::new();
        let rendered = ctx.render_value(&value, &mut missing);

        assert_eq!(rendered["foo"], Value::String("qubit".into()));
        assert_eq!(rendered["args"][0], Value::String("qubit".into()));
        assert_eq!(missing, vec!["nope".to_string()]);
    }
}
