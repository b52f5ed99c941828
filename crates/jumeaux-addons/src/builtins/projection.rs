//! Response projections ("res2dict")

use jumeaux_core::{RawResponse, StageCategory};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ProjectionError;
use crate::registry::stage_config;
use crate::stage::{ResponseProjection, Stage};
use crate::StageRegistry;

pub const JSON: &str = "response_projection/json";
pub const YAML: &str = "response_projection/yaml";

pub fn register(registry: &StageRegistry) {
    registry.register(StageCategory::ResponseProjection, JSON, |d| {
        Ok(Stage::ResponseProjection(Arc::new(JsonProjection {
            config: stage_config(d)?,
        })))
    });
    registry.register(StageCategory::ResponseProjection, YAML, |d| {
        Ok(Stage::ResponseProjection(Arc::new(YamlProjection {
            config: stage_config(d)?,
        })))
    });
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectionConfig {
    /// Parse regardless of the response's MIME type
    #[serde(default)]
    pub force: bool,
}

pub(crate) fn is_json_mime(mime: &str) -> bool {
    mime == "application/json" || mime == "text/json" || mime.ends_with("+json")
}

fn is_yaml_mime(mime: &str) -> bool {
    mime.ends_with("yaml") || mime.ends_with("yml")
}

/// Parse JSON bodies
pub struct JsonProjection {
    config: ProjectionConfig,
}

impl ResponseProjection for JsonProjection {
    fn project(
        &self,
        response: &RawResponse,
        current: Option<Value>,
    ) -> Result<Option<Value>, ProjectionError> {
        if current.is_some() {
            return Ok(current);
        }
        let handles = self.config.force || response.mime_type().is_some_and(|m| is_json_mime(&m));
        if !handles {
            return Ok(None);
        }

        serde_json::from_slice(&response.body)
            .map(Some)
            .map_err(|e| ProjectionError {
                stage: JSON.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Parse YAML bodies
pub struct YamlProjection {
    config: ProjectionConfig,
}

impl ResponseProjection for YamlProjection {
    fn project(
        &self,
        response: &RawResponse,
        current: Option<Value>,
    ) -> Result<Option<Value>, ProjectionError> {
        if current.is_some() {
            return Ok(current);
        }
        let handles = self.config.force || response.mime_type().is_some_and(|m| is_yaml_mime(&m));
        if !handles {
            return Ok(None);
        }

        serde_yaml::from_slice(&response.body)
            .map(Some)
            .map_err(|e| ProjectionError {
                stage: YAML.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_projection(force: bool) -> JsonProjection {
        JsonProjection {
            config: ProjectionConfig { force },
        }
    }

    #[test]
    fn test_json_by_mime() {
        let response = RawResponse::new("u", 200, r#"{"items":[1,2,3]}"#)
            .with_content_type("application/json; charset=utf-8");
        let value = json_projection(false).project(&response, None).unwrap();
        assert_eq!(value, Some(json!({"items": [1, 2, 3]})));
    }

    #[test]
    fn test_json_skips_other_mime() {
        let response = RawResponse::new("u", 200, "<html/>").with_content_type("text/html");
        assert_eq!(json_projection(false).project(&response, None).unwrap(), None);
    }

    #[test]
    fn test_json_force() {
        let response = RawResponse::new("u", 200, "[1]");
        assert_eq!(
            json_projection(true).project(&response, None).unwrap(),
            Some(json!([1]))
        );
    }

    #[test]
    fn test_json_parse_error_is_reported() {
        let response =
            RawResponse::new("u", 200, "{not json").with_content_type("application/json");
        let result = json_projection(false).project(&response, None);
        assert!(matches!(result, Err(ProjectionError { stage, .. }) if stage == JSON));
    }

    #[test]
    fn test_earlier_projection_wins() {
        let response = RawResponse::new("u", 200, "a: 1").with_content_type("application/yaml");
        let earlier = Some(json!({"from": "earlier"}));
        let yaml = YamlProjection {
            config: ProjectionConfig::default(),
        };
        assert_eq!(yaml.project(&response, earlier.clone()).unwrap(), earlier);
    }

    #[test]
    fn test_yaml() {
        let response =
            RawResponse::new("u", 200, "a: 1\nb: [x, y]\n").with_content_type("application/x-yaml");
        let yaml = YamlProjection {
            config: ProjectionConfig::default(),
        };
        assert_eq!(
            yaml.project(&response, None).unwrap(),
            Some(json!({"a": 1, "b": ["x", "y"]}))
        );
    }
}
