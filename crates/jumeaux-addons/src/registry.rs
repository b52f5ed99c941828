//! Registry of named stage factories
//!
//! Stages are looked up by category, qualified name and implementation
//! class once at startup; the resulting [`Pipeline`] holds the executable
//! instances and is never re-resolved per request.

use dashmap::DashMap;
use jumeaux_config::{ConfigError, ConfigResult};
use jumeaux_core::{PipelineConfig, StageCategory, StageDescriptor, DEFAULT_CLS_NAME};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::builtins;
use crate::pipeline::{Loaded, Pipeline};
use crate::stage::Stage;

/// Builds a stage instance from its descriptor, validating its config
pub type StageFactory = Arc<dyn Fn(&StageDescriptor) -> ConfigResult<Stage> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StageKey {
    category: StageCategory,
    name: String,
    cls_name: String,
}

/// Maps `(category, name, cls_name)` to a stage factory
pub struct StageRegistry {
    factories: DashMap<StageKey, StageFactory>,
}

impl StageRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Create a registry with every built-in stage registered
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtins::register_all(&registry);
        registry
    }

    /// Register a factory under the default implementation class
    pub fn register<F>(&self, category: StageCategory, name: impl Into<String>, factory: F)
    where
        F: Fn(&StageDescriptor) -> ConfigResult<Stage> + Send + Sync + 'static,
    {
        self.register_class(category, name, DEFAULT_CLS_NAME, factory);
    }

    /// Register a factory under an explicit implementation class
    pub fn register_class<F>(
        &self,
        category: StageCategory,
        name: impl Into<String>,
        cls_name: impl Into<String>,
        factory: F,
    ) where
        F: Fn(&StageDescriptor) -> ConfigResult<Stage> + Send + Sync + 'static,
    {
        let key = StageKey {
            category,
            name: name.into(),
            cls_name: cls_name.into(),
        };
        debug!(category = %key.category, name = %key.name, cls_name = %key.cls_name, "Registering stage");
        self.factories.insert(key, Arc::new(factory));
    }

    pub fn has_stage(&self, category: StageCategory, name: &str, cls_name: &str) -> bool {
        self.factories.contains_key(&StageKey {
            category,
            name: name.to_string(),
            cls_name: cls_name.to_string(),
        })
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate one stage
    pub fn build(&self, category: StageCategory, descriptor: &StageDescriptor) -> ConfigResult<Stage> {
        let key = StageKey {
            category,
            name: descriptor.name.clone(),
            cls_name: descriptor.cls_name.clone(),
        };

        // Clone the factory out so the map shard is not held while it runs
        let factory = self
            .factories
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConfigError::UnknownStage {
                category: category.to_string(),
                name: descriptor.name.clone(),
                cls_name: descriptor.cls_name.clone(),
            })?;

        let stage = factory(descriptor)?;
        if stage.category() != category {
            return Err(ConfigError::InvalidStageConfig {
                stage: descriptor.name.clone(),
                reason: format!(
                    "stage is a {} stage but is configured under {}",
                    stage.category(),
                    category
                ),
            });
        }

        debug!(category = %category, stage = %descriptor.name, "Loaded stage");
        Ok(stage)
    }

    /// Instantiate every stage of a pipeline, skipping tagged ones
    ///
    /// The request source is always loaded; skip tags apply to the list
    /// categories only.
    pub fn load(
        &self,
        config: &PipelineConfig,
        skip_tags: &BTreeSet<String>,
    ) -> ConfigResult<Pipeline> {
        let source = match self.build(StageCategory::RequestSource, &config.request_source)? {
            Stage::RequestSource(source) => Loaded::new(&config.request_source.name, source),
            other => {
                return Err(ConfigError::InvalidStageConfig {
                    stage: config.request_source.name.clone(),
                    reason: format!("stage is a {} stage", other.category()),
                })
            }
        };
        let mut pipeline = Pipeline::new(source);

        for category in StageCategory::ALL {
            if category == StageCategory::RequestSource {
                continue;
            }

            for descriptor in config.stages(category) {
                if descriptor.is_skipped_by(skip_tags) {
                    info!(category = %category, stage = %descriptor.name, "Skipping stage by tag");
                    continue;
                }

                let stage = self.build(category, descriptor)?;
                pipeline.push(descriptor, stage);
            }
        }

        Ok(pipeline)
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize a stage's config, naming the stage and key on failure
///
/// An absent config is treated as an empty mapping so stages whose keys
/// all have defaults need no config block.
pub fn stage_config<T: DeserializeOwned>(descriptor: &StageDescriptor) -> ConfigResult<T> {
    let value = descriptor
        .config
        .clone()
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

    serde_json::from_value(value).map_err(|e| ConfigError::InvalidStageConfig {
        stage: descriptor.name.clone(),
        reason: e.to_string(),
    })
}
