//! Plugin configuration schemas and decode diagnostics
//!
//! A plugin declares which attributes it accepts by registering slots on a
//! [`Schema`]. Decoding a raw step body against that schema never fails hard:
//! every problem found in one attempt is collected into [`Diagnostics`].

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use std::fmt;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single decode or validation problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.summary)
        } else {
            write!(f, "{}: {}", self.summary, self.detail)
        }
    }
}

/// Accumulated diagnostics from one decode attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    pub fn warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        f.write_str(&rendered.join("; "))
    }
}

/// A typed target a raw attribute can be decoded into
pub trait Slot {
    fn assign(&mut self, value: Value) -> Result<(), serde_yaml::Error>;
}

impl<T: DeserializeOwned> Slot for T {
    fn assign(&mut self, value: Value) -> Result<(), serde_yaml::Error> {
        *self = serde_yaml::from_value(value)?;
        Ok(())
    }
}

struct Field<'a> {
    name: &'static str,
    required: bool,
    slot: &'a mut dyn Slot,
}

/// Set of attributes a plugin accepts, bound to the slots that receive them
#[derive(Default)]
pub struct Schema<'a> {
    fields: Vec<Field<'a>>,
}

impl<'a> Schema<'a> {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Register an attribute that must be present
    pub fn required(mut self, name: &'static str, slot: &'a mut dyn Slot) -> Self {
        self.fields.push(Field { name, required: true, slot });
        self
    }

    /// Register an attribute that may be omitted; the slot keeps its current value
    pub fn optional(mut self, name: &'static str, slot: &'a mut dyn Slot) -> Self {
        self.fields.push(Field { name, required: false, slot });
        self
    }

    /// Decode a raw body into the registered slots
    pub fn decode(mut self, body: &Value) -> Diagnostics {
        let mut diags = Diagnostics::new();

        let empty = Mapping::new();
        let attrs = match body {
            Value::Mapping(map) => map,
            Value::Null => &empty,
            other => {
                diags.error(
                    "Invalid configuration body",
                    format!("expected a mapping of attributes, found {}", kind_of(other)),
                );
                return diags;
            }
        };

        for key in attrs.keys() {
            let known = key
                .as_str()
                .map(|k| self.fields.iter().any(|f| f.name == k))
                .unwrap_or(false);
            if !known {
                diags.error(
                    "Unsupported argument",
                    format!("an argument named {} is not expected here", describe_key(key)),
                );
            }
        }

        for field in self.fields.iter_mut() {
            match attrs.get(field.name) {
                Some(Value::Null) if !field.required => {
                    diags.warning(
                        "Null attribute value",
                        format!("attribute \"{}\" is null; its default is kept", field.name),
                    );
                }
                Some(value) => {
                    if let Err(e) = field.slot.assign(value.clone()) {
                        diags.error(
                            "Incorrect attribute value type",
                            format!("attribute \"{}\": {}", field.name, e),
                        );
                    }
                }
                None if field.required => {
                    diags.error(
                        "Missing required argument",
                        format!("the argument \"{}\" is required, but no definition was found", field.name),
                    );
                }
                None => {}
            }
        }

        diags
    }
}

/// A plugin configuration type that can be decoded from a step body
pub trait Configurable {
    fn schema(&mut self) -> Schema<'_>;
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn describe_key(key: &Value) -> String {
    match key.as_str() {
        Some(k) => format!("\"{}\"", k),
        None => format!("of type {}", kind_of(key)),
    }
}
