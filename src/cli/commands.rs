//! CLI command definitions

use clap::Args;

/// Validate a configuration file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to configuration YAML file
    #[arg(short, long)]
    pub file: String,
}

/// Compile every pipeline in a configuration file
#[derive(Debug, Args, Clone)]
pub struct CompileCommand {
    /// Path to configuration YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show one pipeline as declared
#[derive(Debug, Args, Clone)]
pub struct ShowCommand {
    /// Path to configuration YAML file
    #[arg(short, long)]
    pub file: String,

    /// Pipeline name
    #[arg(short, long)]
    pub pipeline: String,

    /// Variable overrides used to check step bodies (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,
}

/// Compile and store pipelines for a project
#[derive(Debug, Args, Clone)]
pub struct ApplyCommand {
    /// Path to configuration YAML file
    #[arg(short, long)]
    pub file: String,

    /// SQLite database path (defaults to the local data directory)
    #[arg(long)]
    pub db: Option<String>,

    /// Keep state in memory only
    #[arg(long)]
    pub in_memory: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}
