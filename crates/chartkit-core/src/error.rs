//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A path segment did not resolve to a table
    #[error("{key:?} is not a table")]
    NoTable { key: String },

    /// A path did not resolve to a non-table value
    #[error("{key:?} is not a value")]
    NoValue { key: String },

    #[error("YAML path cannot be empty")]
    EmptyPath,

    #[error("Invalid values: {message}")]
    InvalidValues { message: String },

    #[error("Invalid chart type: {value}")]
    InvalidChartType { value: String },

    #[error("Invalid glob pattern '{pattern}': {message}")]
    GlobPattern { pattern: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// True for the recoverable "no such table / value" lookup misses
    pub fn is_lookup_miss(&self) -> bool {
        matches!(self, Self::NoTable { .. } | Self::NoValue { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
