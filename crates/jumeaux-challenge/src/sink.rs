//! Durable storage of response bodies

use async_trait::async_trait;
use jumeaux_core::Which;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// A body could not be stored; the trial continues without a file
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write response body to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Stores one endpoint's body for one trial
#[async_trait]
pub trait ResponseSink: Send + Sync {
    /// Returns the stored location relative to the report directory
    async fn store(
        &self,
        key: &str,
        which: Which,
        filename: &str,
        body: &[u8],
    ) -> PersistenceResult<String>;
}

/// Writes bodies under `<root>/<key>/<one|other>/<filename>`
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ResponseSink for FileSink {
    async fn store(
        &self,
        key: &str,
        which: Which,
        filename: &str,
        body: &[u8],
    ) -> PersistenceResult<String> {
        let dir = self.root.join(key).join(which.as_str());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PersistenceError::Write {
                path: dir.clone(),
                source: e,
            })?;

        let path = dir.join(filename);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| PersistenceError::Write {
                path: path.clone(),
                source: e,
            })?;

        Ok(format!("{}/{}", which.as_str(), filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_partitions_by_key_and_endpoint() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path());

        let stored = sink
            .store("abc", Which::Other, "(1)first", b"{}")
            .await
            .unwrap();

        assert_eq!(stored, "other/(1)first");
        let content = std::fs::read(dir.path().join("abc/other/(1)first")).unwrap();
        assert_eq!(content, b"{}");
    }

    #[tokio::test]
    async fn test_store_failure() {
        let dir = TempDir::new().unwrap();
        // A file where the key directory should be
        std::fs::write(dir.path().join("abc"), b"").unwrap();
        let sink = FileSink::new(dir.path());

        let result = sink.store("abc", Which::One, "(1)x", b"{}").await;
        assert!(matches!(result, Err(PersistenceError::Write { .. })));
    }
}
