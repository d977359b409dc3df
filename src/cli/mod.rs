//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{ApplyCommand, CompileCommand, ShowCommand, ValidateCommand};
use std::ffi::OsString;

/// Pipeline configuration compiler
#[derive(Debug, Parser, Clone)]
#[command(name = "pipeplane")]
#[command(author = "Pipeplane Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Compile declarative pipeline configuration into executable graphs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace whose conditional blocks are included
    #[arg(short, long, global = true, default_value = "default")]
    pub workspace: String,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate a configuration file
    Validate(ValidateCommand),

    /// Compile every pipeline in a configuration file
    Compile(CompileCommand),

    /// Show one pipeline as declared
    Show(ShowCommand),

    /// Compile and store pipelines for a project
    Apply(ApplyCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile_command() {
        let cli = Cli::try_parse_from(["pipeplane", "compile", "-f", "pipeline.yaml", "--json"]).unwrap();
        assert_eq!(cli.workspace, "default");
        match cli.command {
            Command::Compile(cmd) => {
                assert_eq!(cmd.file, "pipeline.yaml");
                assert!(cmd.json);
            }
            other => panic!("expected compile, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_show_with_variables() {
        let cli = Cli::try_parse_from([
            "pipeplane", "--workspace", "prod", "show", "-f", "p.yaml", "-p", "foo", "--var", "cmd=make",
        ])
        .unwrap();
        assert_eq!(cli.workspace, "prod");
        match cli.command {
            Command::Show(cmd) => {
                assert_eq!(cmd.pipeline, "foo");
                assert_eq!(cmd.var, vec![("cmd".to_string(), "make".to_string())]);
            }
            other => panic!("expected show, got {:?}", other),
        }
    }
}
