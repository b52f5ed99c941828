//! Request transforms: sampling, filtering, deduplication

use jumeaux_config::{ConfigError, ConfigResult};
use jumeaux_core::{Request, StageCategory, StageDescriptor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::registry::stage_config;
use crate::stage::{RequestTransform, Stage};
use crate::StageRegistry;

pub fn register(registry: &StageRegistry) {
    registry.register(StageCategory::RequestTransform, "request_transform/head", |d| {
        Ok(Stage::RequestTransform(Arc::new(Head {
            config: stage_config(d)?,
        })))
    });
    registry.register(StageCategory::RequestTransform, "request_transform/random", |d| {
        Ok(Stage::RequestTransform(Arc::new(Random {
            config: stage_config(d)?,
        })))
    });
    registry.register(StageCategory::RequestTransform, "request_transform/filter", |d| {
        Ok(Stage::RequestTransform(Arc::new(Filter::from_descriptor(d)?)))
    });
    registry.register(StageCategory::RequestTransform, "request_transform/dedup", |_| {
        Ok(Stage::RequestTransform(Arc::new(Dedup)))
    });
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeadConfig {
    pub size: usize,
}

/// Keep the first `size` requests
pub struct Head {
    config: HeadConfig,
}

impl RequestTransform for Head {
    fn apply(&self, mut requests: Vec<Request>) -> Vec<Request> {
        requests.truncate(self.config.size);
        requests
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RandomConfig {
    pub size: usize,
    pub seed: Option<u64>,
}

/// Sample `size` requests in random order
pub struct Random {
    config: RandomConfig,
}

impl RequestTransform for Random {
    fn apply(&self, mut requests: Vec<Request>) -> Vec<Request> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        requests.shuffle(&mut rng);
        requests.truncate(self.config.size);
        requests
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterConfig {
    path: String,
    #[serde(default)]
    negative: bool,
}

/// Keep requests whose path matches, or does not match when `negative`
pub struct Filter {
    path: Regex,
    negative: bool,
}

impl Filter {
    fn from_descriptor(descriptor: &StageDescriptor) -> ConfigResult<Self> {
        let config: FilterConfig = stage_config(descriptor)?;
        let path = Regex::new(&config.path).map_err(|e| ConfigError::InvalidStageConfig {
            stage: descriptor.name.clone(),
            reason: format!("invalid regex for 'path': {}", e),
        })?;

        Ok(Self {
            path,
            negative: config.negative,
        })
    }
}

impl RequestTransform for Filter {
    fn apply(&self, requests: Vec<Request>) -> Vec<Request> {
        requests
            .into_iter()
            .filter(|request| self.path.is_match(&request.path) != self.negative)
            .collect()
    }
}

/// Drop requests equal to an earlier one, keeping the first
pub struct Dedup;

impl RequestTransform for Dedup {
    fn apply(&self, requests: Vec<Request>) -> Vec<Request> {
        let mut seen = HashSet::new();
        requests
            .into_iter()
            .filter(|request| {
                // Requests have no Hash impl; their canonical JSON stands in
                let key = serde_json::to_string(request).unwrap_or_default();
                seen.insert(key)
            })
            .collect()
    }
}
