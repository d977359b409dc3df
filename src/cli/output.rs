//! CLI output formatting

use crate::compile::{CompiledPipeline, CompiledStepKind};
use crate::core::{Pipeline, StepKind};
use crate::error::ConfigError;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");

/// Format a declared step kind for display
pub fn format_step_kind(kind: &StepKind) -> String {
    match kind {
        StepKind::Plugin(use_) => format!(
            "{} {}",
            style(&use_.plugin).cyan(),
            style(&use_.image_url).dim()
        ),
        StepKind::Embedded(p) => format!("{} {}", style("pipeline").yellow(), style(&p.name).bold()),
        StepKind::Reference(name) => format!("{} {}", style("ref").yellow(), style(name).bold()),
    }
}

/// Format a declared pipeline as an indented tree
pub fn format_pipeline(pipeline: &Pipeline) -> String {
    let mut out = String::new();
    let mut pending: Vec<(&Pipeline, usize)> = vec![(pipeline, 0)];

    while let Some((current, depth)) = pending.pop() {
        let indent = "  ".repeat(depth);
        out.push_str(&format!("{}{}\n", indent, style(&current.name).bold()));
        for step in &current.steps {
            let deps = if step.depends_on.is_empty() {
                String::new()
            } else {
                format!(" (after {})", step.depends_on.join(", "))
            };
            out.push_str(&format!(
                "{}  - {}: {}{}\n",
                indent,
                step.name,
                format_step_kind(&step.kind),
                style(deps).dim()
            ));
        }
        pending.extend(current.embedded().collect::<Vec<_>>().into_iter().rev().map(|p| (p, depth + 1)));
    }

    out
}

/// Format a compiled pipeline for display
pub fn format_compiled(pipeline: &CompiledPipeline) -> String {
    let mut out = format!("{} {}\n", INFO, style(&pipeline.owner).bold());
    for (name, step) in &pipeline.steps {
        let kind = match &step.kind {
            CompiledStepKind::Exec { image_url, command, .. } => format!(
                "exec {}{}",
                style(image_url).dim(),
                command.as_ref().map(|c| format!(" `{}`", c)).unwrap_or_default()
            ),
            CompiledStepKind::PipelineRef { owner } => {
                format!("-> {}", style(owner).yellow())
            }
        };
        out.push_str(&format!("    {}: {}\n", name, kind));
    }
    out
}

/// Format a configuration error with its status code
pub fn format_config_error(err: &ConfigError) -> String {
    format!(
        "{} [{}] {}",
        CROSS,
        style(err.code()).yellow(),
        style(err).red()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Step;
    use serde_yaml::Value;

    #[test]
    fn test_format_pipeline_tree() {
        console::set_colors_enabled(false);
        let nested = Pipeline::new("bar", vec![Step::plugin("boo", "exec", "img", Value::Null)]);
        let pipeline = Pipeline::new(
            "foo",
            vec![
                Step::plugin("test", "exec", "example.com/test", Value::Null),
                Step::embedded("pipe", nested).with_depends_on(["test"]),
            ],
        );

        let out = format_pipeline(&pipeline);
        assert!(out.contains("foo\n"));
        assert!(out.contains("  - pipe: pipeline bar (after test)"));
        assert!(out.contains("  bar\n"));
        assert!(out.contains("    - boo: exec img"));
    }
}
