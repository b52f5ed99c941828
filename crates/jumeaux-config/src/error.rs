//! Error types for configuration resolution

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that abort a run before any request is dispatched
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML
    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid include path
    #[error("invalid include path '{path}': {reason}")]
    InvalidIncludePath { path: String, reason: String },

    /// Circular include detected
    #[error("circular include detected: {path}")]
    CircularInclude { path: PathBuf },

    /// Environment variable not found
    #[error("environment variable '{var}' not set")]
    EnvVarNotFound { var: String },

    /// A required field is absent after merging every document
    #[error("required configuration field '{field}' is missing")]
    MissingField { field: &'static str },

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// No stage is registered under this name
    #[error("unknown {category} stage '{name}' (class '{cls_name}')")]
    UnknownStage {
        category: String,
        name: String,
        cls_name: String,
    },

    /// A stage rejected its own configuration
    #[error("invalid config for stage '{stage}': {reason}")]
    InvalidStageConfig { stage: String, reason: String },

    /// An endpoint's HTTP client could not be built
    #[error("cannot build HTTP client for endpoint '{endpoint}': {reason}")]
    HttpClient { endpoint: String, reason: String },
}
