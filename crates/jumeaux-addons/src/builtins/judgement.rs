//! Judgement stages

use jumeaux_config::{ConfigError, ConfigResult};
use jumeaux_core::{StageCategory, StageDescriptor};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::condition::AnyCondition;
use crate::registry::stage_config;
use crate::stage::{Judgement, JudgementPayload, JudgementReference, Stage};
use crate::StageRegistry;

pub fn register(registry: &StageRegistry) {
    registry.register(StageCategory::Judgement, "judgement/same", |d| {
        Ok(Stage::Judgement(Arc::new(Same::from_descriptor(d)?)))
    });
    registry.register(StageCategory::Judgement, "judgement/ignore_properties", |d| {
        Ok(Stage::Judgement(Arc::new(IgnoreProperties::from_descriptor(d)?)))
    });
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SameConfig {
    when_any: Vec<String>,
}

/// Regard a trial as same when any expression holds
pub struct Same {
    condition: AnyCondition,
}

impl Same {
    fn from_descriptor(descriptor: &StageDescriptor) -> ConfigResult<Self> {
        let config: SameConfig = stage_config(descriptor)?;
        Ok(Self {
            condition: AnyCondition::new(&descriptor.name, config.when_any)?,
        })
    }
}

impl Judgement for Same {
    fn judge(
        &self,
        payload: JudgementPayload,
        reference: &JudgementReference<'_>,
    ) -> JudgementPayload {
        if payload.regard_as_same {
            return payload;
        }

        JudgementPayload {
            regard_as_same: self.condition.any(reference.to_context()),
            ..payload
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionConfig {
    /// Request path regex this condition is limited to
    path: Option<String>,
    #[serde(default)]
    changed: Vec<String>,
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    removed: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IgnoreConfig {
    title: String,
    conditions: Vec<ConditionConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IgnorePropertiesConfig {
    ignores: Vec<IgnoreConfig>,
}

struct Condition {
    path: Option<Regex>,
    changed: Vec<Regex>,
    added: Vec<Regex>,
    removed: Vec<Regex>,
}

struct Ignore {
    title: String,
    conditions: Vec<Condition>,
}

/// Remove diff keys matching configured property patterns
///
/// Patterns match whole diff paths such as `root.items[0].id`. A trial
/// whose remaining diff keys become empty is regarded as same.
pub struct IgnoreProperties {
    ignores: Vec<Ignore>,
}

impl IgnoreProperties {
    fn from_descriptor(descriptor: &StageDescriptor) -> ConfigResult<Self> {
        let config: IgnorePropertiesConfig = stage_config(descriptor)?;
        let compile = |key: &str, pattern: &str, anchored: bool| {
            let source = if anchored {
                format!("^(?:{})$", pattern)
            } else {
                pattern.to_string()
            };
            Regex::new(&source).map_err(|e| ConfigError::InvalidStageConfig {
                stage: descriptor.name.clone(),
                reason: format!("invalid regex for '{}': {}", key, e),
            })
        };
        let compile_all = |key: &str, patterns: &[String]| {
            patterns
                .iter()
                .map(|p| compile(key, p, true))
                .collect::<ConfigResult<Vec<_>>>()
        };

        let mut ignores = Vec::with_capacity(config.ignores.len());
        for ignore in config.ignores {
            let mut conditions = Vec::with_capacity(ignore.conditions.len());
            for condition in ignore.conditions {
                conditions.push(Condition {
                    path: condition
                        .path
                        .as_deref()
                        .map(|p| compile("path", p, false))
                        .transpose()?,
                    changed: compile_all("changed", &condition.changed)?,
                    added: compile_all("added", &condition.added)?,
                    removed: compile_all("removed", &condition.removed)?,
                });
            }
            ignores.push(Ignore {
                title: ignore.title,
                conditions,
            });
        }

        Ok(Self { ignores })
    }
}

fn unmatched(keys: Vec<String>, patterns: &[Regex]) -> Vec<String> {
    keys.into_iter()
        .filter(|key| !patterns.iter().any(|p| p.is_match(key)))
        .collect()
}

impl Judgement for IgnoreProperties {
    fn judge(
        &self,
        payload: JudgementPayload,
        reference: &JudgementReference<'_>,
    ) -> JudgementPayload {
        let Some(mut keys) = payload.remaining_diff_keys.clone() else {
            return payload;
        };

        for ignore in &self.ignores {
            for condition in &ignore.conditions {
                if let Some(path) = &condition.path {
                    if !path.is_match(reference.path) {
                        continue;
                    }
                }
                keys.changed = unmatched(keys.changed, &condition.changed);
                keys.added = unmatched(keys.added, &condition.added);
                keys.removed = unmatched(keys.removed, &condition.removed);
            }
            debug!(title = %ignore.title, remaining = keys.all().count(), "Applied ignore");
        }

        JudgementPayload {
            regard_as_same: payload.regard_as_same || keys.is_empty(),
            remaining_diff_keys: Some(keys),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jumeaux_core::{DiffKeys, HeaderMap, QueryMap, RawResponse, Status};
    use serde_json::json;

    struct Fixture {
        qs: QueryMap,
        headers: HeaderMap,
        one: RawResponse,
        other: RawResponse,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                qs: [("q".to_string(), vec!["1".to_string()])].into_iter().collect(),
                headers: HeaderMap::new(),
                one: RawResponse::new("http://one/api", 200, r#"{"a":1,"time":1}"#),
                other: RawResponse::new("http://other/api", 200, r#"{"a":1,"time":2}"#),
            }
        }

        fn reference<'a>(&'a self, path: &'a str) -> JudgementReference<'a> {
            JudgementReference {
                name: "case",
                path,
                qs: &self.qs,
                headers: &self.headers,
                res_one: &self.one,
                res_other: &self.other,
                dict_one: None,
                dict_other: None,
                status: Status::Different,
            }
        }
    }

    fn payload(changed: &[&str]) -> JudgementPayload {
        JudgementPayload {
            remaining_diff_keys: Some(DiffKeys {
                changed: changed.iter().map(|s| s.to_string()).collect(),
                added: vec![],
                removed: vec![],
            }),
            regard_as_same: false,
        }
    }

    fn ignore_properties(config: serde_json::Value) -> IgnoreProperties {
        IgnoreProperties::from_descriptor(
            &StageDescriptor::new("judgement/ignore_properties").with_config(config),
        )
        .unwrap()
    }

    #[test]
    fn test_same_when_any() {
        let same = Same::from_descriptor(
            &StageDescriptor::new("judgement/same").with_config(json!({
                "when_any": ["name == 'other'", "qs.q[0] == '1' and res_one.status_code == 200"]
            })),
        )
        .unwrap();
        let fixture = Fixture::new();

        let result = same.judge(payload(&["root.time"]), &fixture.reference("/api"));
        assert!(result.regard_as_same);
    }

    #[test]
    fn test_same_not_matching() {
        let same = Same::from_descriptor(
            &StageDescriptor::new("judgement/same")
                .with_config(json!({"when_any": ["path | regex_match('^/web')"]})),
        )
        .unwrap();
        let fixture = Fixture::new();

        let result = same.judge(payload(&["root.time"]), &fixture.reference("/api"));
        assert!(!result.regard_as_same);
    }

    #[test]
    fn test_same_requires_when_any() {
        let result = Same::from_descriptor(&StageDescriptor::new("judgement/same"));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidStageConfig { reason, .. }) if reason.contains("when_any")
        ));
    }

    #[test]
    fn test_ignore_all_keys_regards_same() {
        let stage = ignore_properties(json!({
            "ignores": [{"title": "time", "conditions": [{"changed": ["root\\.time"]}]}]
        }));
        let fixture = Fixture::new();

        let result = stage.judge(payload(&["root.time"]), &fixture.reference("/api"));
        assert!(result.regard_as_same);
        assert!(result.remaining_diff_keys.unwrap().is_empty());
    }

    #[test]
    fn test_ignore_some_keys_narrows() {
        let stage = ignore_properties(json!({
            "ignores": [{"title": "time", "conditions": [{"changed": ["root\\.time"]}]}]
        }));
        let fixture = Fixture::new();

        let result = stage.judge(
            payload(&["root.time", "root.timestamp"]),
            &fixture.reference("/api"),
        );
        assert!(!result.regard_as_same);
        assert_eq!(
            result.remaining_diff_keys.unwrap().changed,
            vec!["root.timestamp".to_string()]
        );
    }

    #[test]
    fn test_ignore_limited_by_path() {
        let stage = ignore_properties(json!({
            "ignores": [{
                "title": "web only",
                "conditions": [{"path": "^/web", "changed": ["root\\.time"]}]
            }]
        }));
        let fixture = Fixture::new();

        let result = stage.judge(payload(&["root.time"]), &fixture.reference("/api"));
        assert!(!result.regard_as_same);

        let result = stage.judge(payload(&["root.time"]), &fixture.reference("/web/a"));
        assert!(result.regard_as_same);
    }

    #[test]
    fn test_ignore_without_diff_keys_is_noop() {
        let stage = ignore_properties(json!({
            "ignores": [{"title": "all", "conditions": [{"changed": [".*"]}]}]
        }));
        let fixture = Fixture::new();

        let result = stage.judge(JudgementPayload::default(), &fixture.reference("/api"));
        assert_eq!(result, JudgementPayload::default());
    }
}
