//! Runtime errors raised by stages

use std::path::PathBuf;
use thiserror::Error;

/// Result type for stage operations
pub type StageResult<T> = Result<T, StageError>;

/// Errors a stage raises while running
///
/// Load-time validation failures are `ConfigError`s instead.
#[derive(Debug, Error)]
pub enum StageError {
    /// An input could not be turned into requests
    #[error("stage '{stage}' cannot read requests from {path}: {reason}")]
    Source {
        stage: String,
        path: PathBuf,
        reason: String,
    },

    /// A hook failed to write its output
    #[error("stage '{stage}' failed to write {path}: {source}")]
    Write {
        stage: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be serialized for output
    #[error("stage '{stage}' cannot serialize output: {source}")]
    Serialize {
        stage: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A response body could not be parsed into a structured value
#[derive(Debug, Clone, Error)]
#[error("projection '{stage}' cannot parse response: {reason}")]
pub struct ProjectionError {
    pub stage: String,
    pub reason: String,
}
