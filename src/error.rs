//! Error types shared by the loader, the compiler and the service layer

use std::fmt;
use thiserror::Error;

/// Status category an error is reported with at the RPC boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    InvalidArgument,
    NotFound,
    Internal,
    Unavailable,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Code::InvalidArgument => "InvalidArgument",
            Code::NotFound => "NotFound",
            Code::Internal => "Internal",
            Code::Unavailable => "Unavailable",
        };
        f.write_str(name)
    }
}

/// Position inside a configuration source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors produced while loading or compiling a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {source_name}{}: {message}", location.map(|l| format!(" at {}", l)).unwrap_or_default())]
    Parse {
        source_name: String,
        location: Option<Location>,
        message: String,
    },

    #[error("validation error: {0}")]
    Validation(String),

    /// Inconsistency found while hoisting and resolving pipeline references
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConfigError {
    pub(crate) fn parse(source_name: &str, message: impl Into<String>) -> Self {
        ConfigError::Parse {
            source_name: source_name.to_string(),
            location: None,
            message: message.into(),
        }
    }

    pub(crate) fn from_yaml(source_name: &str, err: serde_yaml::Error) -> Self {
        ConfigError::Parse {
            source_name: source_name.to_string(),
            location: err.location().map(|l| Location {
                line: l.line(),
                column: l.column(),
            }),
            message: err.to_string(),
        }
    }

    /// Status code the boundary layer reports this error with
    pub fn code(&self) -> Code {
        match self {
            ConfigError::Io { .. } => Code::Unavailable,
            ConfigError::Parse { .. } | ConfigError::Validation(_) => Code::InvalidArgument,
            ConfigError::Internal(_) => Code::Internal,
        }
    }
}

/// Errors returned by the project service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A storage or queue collaborator failed
    #[error("{context}: {cause:#}")]
    External {
        context: String,
        cause: anyhow::Error,
    },
}

impl ServiceError {
    pub(crate) fn external(context: impl Into<String>, cause: anyhow::Error) -> Self {
        ServiceError::External {
            context: context.into(),
            cause,
        }
    }

    /// Status code the boundary layer reports this error with
    pub fn code(&self) -> Code {
        match self {
            ServiceError::InvalidArgument(_) => Code::InvalidArgument,
            ServiceError::NotFound(_) => Code::NotFound,
            ServiceError::Config(e) => e.code(),
            ServiceError::External { .. } => Code::Unavailable,
        }
    }
}
