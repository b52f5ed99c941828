//! Response transforms

use jumeaux_config::{ConfigError, ConfigResult};
use jumeaux_core::{RawResponse, Request, StageCategory, StageDescriptor, Which};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

use crate::registry::stage_config;
use crate::stage::{ResponseTransform, Stage};
use crate::StageRegistry;

pub fn register(registry: &StageRegistry) {
    registry.register(StageCategory::ResponseTransform, "response_transform/mask", |d| {
        Ok(Stage::ResponseTransform(Arc::new(Mask::from_descriptor(d)?)))
    });
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    One,
    Other,
    #[default]
    Both,
}

impl Target {
    fn includes(&self, which: Which) -> bool {
        matches!(
            (self, which),
            (Target::Both, _) | (Target::One, Which::One) | (Target::Other, Which::Other)
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternConfig {
    regex: String,
    replacement: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MaskConfig {
    #[serde(default)]
    target: Target,
    patterns: Vec<PatternConfig>,
}

/// Replace volatile parts of text bodies (timestamps, ids) before comparison
pub struct Mask {
    target: Target,
    patterns: Vec<(Regex, String)>,
}

impl Mask {
    fn from_descriptor(descriptor: &StageDescriptor) -> ConfigResult<Self> {
        let config: MaskConfig = stage_config(descriptor)?;
        let patterns = config
            .patterns
            .into_iter()
            .map(|pattern| {
                Regex::new(&pattern.regex)
                    .map(|re| (re, pattern.replacement))
                    .map_err(|e| ConfigError::InvalidStageConfig {
                        stage: descriptor.name.clone(),
                        reason: format!("invalid regex for 'patterns.regex': {}", e),
                    })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(Self {
            target: config.target,
            patterns,
        })
    }
}

impl ResponseTransform for Mask {
    fn apply(&self, mut response: RawResponse, which: Which, _request: &Request) -> RawResponse {
        if !self.target.includes(which) {
            return response;
        }
        // Binary bodies are left untouched
        let Some(text) = response.text() else {
            return response;
        };

        let masked = self
            .patterns
            .iter()
            .fold(text.to_string(), |text, (re, replacement)| {
                re.replace_all(&text, replacement.as_str()).into_owned()
            });
        response.body = masked.into_bytes();
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mask(config: serde_json::Value) -> Mask {
        Mask::from_descriptor(&StageDescriptor::new("response_transform/mask").with_config(config))
            .unwrap()
    }

    #[test]
    fn test_mask_both() {
        let mask = mask(json!({
            "patterns": [{"regex": "\"time\":\\s*\"[^\"]*\"", "replacement": "\"time\": \"*\""}]
        }));
        let response = RawResponse::new("http://one/", 200, r#"{"time": "12:00", "a": 1}"#);

        let masked = mask.apply(response, Which::Other, &Request::new("/"));
        assert_eq!(masked.text(), Some(r#"{"time": "*", "a": 1}"#));
    }

    #[test]
    fn test_mask_target_one_only() {
        let mask = mask(json!({
            "target": "one",
            "patterns": [{"regex": "\\d+", "replacement": "N"}]
        }));

        let one = mask.apply(RawResponse::new("u", 200, "id=42"), Which::One, &Request::new("/"));
        let other = mask.apply(RawResponse::new("u", 200, "id=42"), Which::Other, &Request::new("/"));
        assert_eq!(one.text(), Some("id=N"));
        assert_eq!(other.text(), Some("id=42"));
    }

    #[test]
    fn test_mask_requires_patterns() {
        let result =
            Mask::from_descriptor(&StageDescriptor::new("response_transform/mask").with_config(json!({})));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidStageConfig { reason, .. }) if reason.contains("patterns")
        ));
    }
}
