//! Error types for the generator pipeline

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single configuration field that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Field path, e.g. `items[2].port`
    pub field: String,
    /// What is wrong with the field
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Wrapper so a violation list renders one per line inside an error message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violations(pub Vec<Violation>);

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for violation in &self.0 {
            write!(f, "\n  - {}", violation)?;
        }
        Ok(())
    }
}

/// Errors that abort a generator run
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Config file could not be read or parsed
    #[error("Failed to load config '{path}': {message}")]
    ConfigLoad { path: PathBuf, message: String },

    /// Config text is not valid JSON or TOML
    #[error("Invalid config syntax: {0}")]
    ConfigSyntax(String),

    /// One or more required fields are missing or malformed
    #[error("Configuration errors:{0}")]
    ConfigInvalid(Violations),

    /// The runtime command could not be started at all
    #[error("config.items[{index}] ({container}): failed to run '{program}': {source}")]
    Spawn {
        index: usize,
        container: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The inspection command exited non-zero
    #[error("config.items[{index}] ({container}): inspection exited with {}: {}", exit_label(.code), .stderr.trim())]
    InspectionFailed {
        index: usize,
        container: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The inspection command succeeded but returned an empty array
    #[error("config.items[{index}] ({container}): no items in inspection result")]
    NoInspectionResult { index: usize, container: String },

    /// The inspection output was not the JSON shape we expect
    #[error("config.items[{index}] ({container}): malformed inspection output: {source}")]
    MalformedInspection {
        index: usize,
        container: String,
        #[source]
        source: serde_json::Error,
    },

    /// Creating the output directory or writing the file failed
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl GenerateError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            GenerateError::ConfigLoad { .. } | GenerateError::ConfigSyntax(_) => 1,
            GenerateError::ConfigInvalid(_) => 2,
            GenerateError::Spawn { .. }
            | GenerateError::InspectionFailed { .. }
            | GenerateError::NoInspectionResult { .. }
            | GenerateError::MalformedInspection { .. } => 3,
            GenerateError::Io { .. } => 4,
        }
    }

    /// Index of the config item that triggered the failure, if any
    pub fn item_index(&self) -> Option<usize> {
        match self {
            GenerateError::Spawn { index, .. }
            | GenerateError::InspectionFailed { index, .. }
            | GenerateError::NoInspectionResult { index, .. }
            | GenerateError::MalformedInspection { index, .. } => Some(*index),
            _ => None,
        }
    }
}
