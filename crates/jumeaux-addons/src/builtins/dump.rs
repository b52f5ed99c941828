//! Dump stages: rewrite bodies right before they are stored

use jumeaux_core::{RawResponse, StageCategory};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::projection::{is_json_mime, ProjectionConfig};
use crate::registry::stage_config;
use crate::stage::{Dump, DumpPayload, Stage};
use crate::StageRegistry;

pub fn register(registry: &StageRegistry) {
    registry.register(StageCategory::Dump, "dump/json", |d| {
        Ok(Stage::Dump(Arc::new(JsonDump {
            config: stage_config(d)?,
        })))
    });
}

/// Recursively rebuild objects with their keys in sorted order
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Pretty-print with four-space indentation
fn to_pretty(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// Pretty-print JSON bodies with sorted keys
pub struct JsonDump {
    config: ProjectionConfig,
}

impl Dump for JsonDump {
    fn dump(&self, response: &RawResponse, payload: DumpPayload) -> DumpPayload {
        let handles = self.config.force || response.mime_type().is_some_and(|m| is_json_mime(&m));
        if !handles {
            return payload;
        }

        let pretty = serde_json::from_slice::<Value>(&payload.body)
            .and_then(|value| to_pretty(&sort_keys(value)));
        match pretty {
            Ok(body) => DumpPayload {
                body,
                encoding: Some("utf-8".to_string()),
            },
            Err(e) => {
                debug!(url = %response.url, "Body kept as-is, not JSON: {}", e);
                payload
            }
        }
    }
}
