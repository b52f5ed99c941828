//! Equivalence of two responses
//!
//! The structural verdict comes from byte identity, then from the projected
//! values compared as ordered trees, then with every array normalized into
//! a canonical order. Judgement stages may then move a non-same trial into
//! the same summary bucket without changing its structural status.

use jumeaux_addons::{JudgementPayload, JudgementReference, Pipeline};
use jumeaux_core::{DiffKeys, RawResponse, Request, Status, SummaryBucket};
use serde_json::Value;
use tracing::warn;

/// Outcome of judging one pair of responses
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: Status,
    pub summary_status: SummaryBucket,
    pub diff_keys: Option<DiffKeys>,
}

/// Judge two successful responses to the same request
pub fn judge(
    pipeline: &Pipeline,
    request: &Request,
    name: &str,
    one: &RawResponse,
    other: &RawResponse,
) -> Verdict {
    if one.body == other.body {
        return Verdict {
            status: Status::Same,
            summary_status: SummaryBucket::Same,
            diff_keys: None,
        };
    }

    let (dict_one, dict_other) = match (pipeline.project(one), pipeline.project(other)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
            // Unparseable counts as different, never as a crash
            warn!(path = %request.path, "{}", e);
            (None, None)
        }
    };

    let (status, diff_keys) = match (&dict_one, &dict_other) {
        (Some(a), Some(b)) => {
            let status = if a == b {
                Status::Same
            } else if normalize_order(a.clone()) == normalize_order(b.clone()) {
                Status::SameWithoutOrder
            } else {
                Status::Different
            };
            (status, Some(diff(a, b)))
        }
        _ => (Status::Different, None),
    };

    if status == Status::Same {
        return Verdict {
            status,
            summary_status: SummaryBucket::Same,
            diff_keys,
        };
    }

    let reference = JudgementReference {
        name,
        path: &request.path,
        qs: &request.qs,
        headers: &request.headers,
        res_one: one,
        res_other: other,
        dict_one: dict_one.as_ref(),
        dict_other: dict_other.as_ref(),
        status,
    };
    let payload = pipeline.judge(
        JudgementPayload {
            remaining_diff_keys: diff_keys.clone(),
            regard_as_same: false,
        },
        &reference,
    );

    Verdict {
        status,
        summary_status: if payload.regard_as_same {
            SummaryBucket::Same
        } else {
            status.bucket()
        },
        diff_keys,
    }
}

/// Recursively sort every array into a canonical order
///
/// Elements are ordered by their serialized form after their own
/// normalization, so nested arrays compare independently of order too.
pub fn normalize_order(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut keyed: Vec<(String, Value)> = items
                .into_iter()
                .map(normalize_order)
                .map(|item| (item.to_string(), item))
                .collect();
            keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Array(keyed.into_iter().map(|(_, item)| item).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_order(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Paths at which `one` and `other` diverge, rooted at `root`
pub fn diff(one: &Value, other: &Value) -> DiffKeys {
    let mut keys = DiffKeys::default();
    walk("root", one, other, &mut keys);
    keys.normalized()
}

fn walk(path: &str, one: &Value, other: &Value, keys: &mut DiffKeys) {
    match (one, other) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, value) in a {
                let child = format!("{}.{}", path, key);
                match b.get(key) {
                    Some(other_value) => walk(&child, value, other_value, keys),
                    None => keys.removed.push(child),
                }
            }
            for key in b.keys().filter(|key| !a.contains_key(*key)) {
                keys.added.push(format!("{}.{}", path, key));
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
                walk(&format!("{}[{}]", path, i), x, y, keys);
            }
            for i in b.len()..a.len() {
                keys.removed.push(format!("{}[{}]", path, i));
            }
            for i in a.len()..b.len() {
                keys.added.push(format!("{}[{}]", path, i));
            }
        }
        _ => {
            if one != other {
                keys.changed.push(path.to_string());
            }
        }
    }
}
