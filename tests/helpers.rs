//! Shared fixtures for integration tests
#![allow(dead_code)]

use pipeplane::core::{load, Config, Configurable, LoadOptions, Schema};

const TESTDATA: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/testdata/pipelines/");

/// Path of a fixture under `tests/testdata/pipelines`
pub fn fixture_path(name: &str) -> String {
    format!("{}{}", TESTDATA, name)
}

/// Load a fixture with the default workspace
pub fn load_fixture(name: &str) -> Config {
    load_fixture_in(name, "default")
}

pub fn load_fixture_in(name: &str, workspace: &str) -> Config {
    let options = LoadOptions::new().with_workspace(workspace);
    load(fixture_path(name), &options)
        .unwrap_or_else(|e| panic!("failed to load fixture {}: {}", name, e))
}

/// Plugin body used by the `test` plugin fixtures
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TestStepConfig {
    pub foo: String,
    pub bar: Option<String>,
}

impl TestStepConfig {
    pub fn new(foo: &str, bar: Option<&str>) -> Self {
        Self {
            foo: foo.to_string(),
            bar: bar.map(str::to_string),
        }
    }
}

impl Configurable for TestStepConfig {
    fn schema(&mut self) -> Schema<'_> {
        Schema::new()
            .required("foo", &mut self.foo)
            .optional("bar", &mut self.bar)
    }
}
