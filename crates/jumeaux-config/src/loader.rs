//! YAML configuration loader with custom tag support
//!
//! Supported tags:
//! - `!include path` - Splice another YAML file, resolved relative to the including file
//! - `!env_var VAR` - Environment variable substitution

use crate::document::ConfigDocument;
use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// YAML loader that resolves `!include` and `!env_var` tags
#[derive(Debug, Default)]
pub struct YamlLoader {
    /// Track included files to detect circular includes
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = path.as_ref().to_path_buf();
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    /// Load a configuration document from a YAML file
    pub fn load_document(&mut self, path: impl AsRef<Path>) -> ConfigResult<ConfigDocument> {
        let path = path.as_ref();
        let value = self.load_file(path)?;
        document_from_value(value, path)
    }

    /// Process a YAML value, handling custom tags
    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    let processed_key = self.process_value(k, source_path)?;
                    let processed_value = self.process_value(v, source_path)?;
                    result.insert(processed_key, processed_value);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => {
                let result: ConfigResult<Vec<Value>> = seq
                    .into_iter()
                    .map(|v| self.process_value(v, source_path))
                    .collect();
                Ok(Value::Sequence(result?))
            }
            _ => Ok(value),
        }
    }

    /// Process a tagged value
    fn process_tagged(
        &mut self,
        tagged: serde_yaml::value::TaggedValue,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        let value = tagged.value;

        trace!("Processing tag '{}' with value {:?}", tag, value);

        match tag.as_str() {
            "!include" => {
                let include_path = value_to_path(&value, source_path)?;
                debug!("Including file: {:?}", include_path);
                self.load_file(&include_path)
            }
            "!env_var" => process_env_var(value),
            _ => {
                // Unknown tag, keep it as-is but process the inner value
                let processed = self.process_value(value, source_path)?;
                Ok(Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
                    tag: tagged.tag,
                    value: processed,
                })))
            }
        }
    }
}

/// Deserialize a processed YAML value into a configuration document
pub fn document_from_value(value: Value, source_path: &Path) -> ConfigResult<ConfigDocument> {
    // An empty file is an empty layer
    if value.is_null() {
        return Ok(ConfigDocument::default());
    }

    serde_yaml::from_value(value).map_err(|e| ConfigError::ParseYaml {
        path: source_path.to_path_buf(),
        source: e,
    })
}

/// Load every configuration file in order
pub fn load_documents<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<Vec<ConfigDocument>> {
    let mut loader = YamlLoader::new();
    paths.iter().map(|p| loader.load_document(p)).collect()
}

fn process_env_var(value: Value) -> ConfigResult<Value> {
    let var_name = match value {
        Value::String(s) => s,
        _ => {
            return Err(ConfigError::InvalidValue {
                key: "!env_var".to_string(),
                reason: "environment variable name must be a string".to_string(),
            })
        }
    };

    let env_value = std::env::var(&var_name).map_err(|_| ConfigError::EnvVarNotFound {
        var: var_name.clone(),
    })?;

    debug!("Substituted env var: {}", var_name);
    Ok(Value::String(env_value))
}

/// Convert a YAML value to a path, resolving relative to the source file
fn value_to_path(value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
    let path_str = match value {
        Value::String(s) => s.clone(),
        _ => {
            return Err(ConfigError::InvalidIncludePath {
                path: format!("{:?}", value),
                reason: "path must be a string".to_string(),
            })
        }
    };

    let path = Path::new(&path_str);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    let base_dir = source_path.parent().unwrap_or_else(|| Path::new("."));
    Ok(base_dir.join(path))
}
