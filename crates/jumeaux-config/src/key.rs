//! Deterministic report key

use crate::error::{ConfigError, ConfigResult};
use jumeaux_core::RunConfig;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// One raw input file, read before the run starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSource {
    pub path: PathBuf,
    pub content: Vec<u8>,
}

impl InputSource {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn read(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::new(path, content))
    }
}

/// Hex SHA-256 of the resolved config and every input's path and content
pub fn report_key(config: &RunConfig, inputs: &[InputSource]) -> String {
    let mut hasher = Sha256::new();

    // Serializing plain data structs cannot fail; the fallback keeps the key total
    let canonical = serde_json::to_vec(config).unwrap_or_default();
    hasher.update(&canonical);

    for input in inputs {
        hasher.update(input.path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update((input.content.len() as u64).to_be_bytes());
        hasher.update(&input.content);
    }

    hex::encode(hasher.finalize())
}
