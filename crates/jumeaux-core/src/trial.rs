//! Trial: one request dispatched to both endpoints, with its verdict

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::trial_time;
use crate::{HeaderMap, QueryMap, RawResponse};

/// Structural verdict of a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Same,
    Different,
    SameWithoutOrder,
    Failure,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Same => "same",
            Status::Different => "different",
            Status::SameWithoutOrder => "same_without_order",
            Status::Failure => "failure",
        }
    }

    /// Summary bucket of this verdict when no judgement overrides it
    pub fn bucket(&self) -> SummaryBucket {
        match self {
            Status::Same => SummaryBucket::Same,
            Status::Different | Status::SameWithoutOrder => SummaryBucket::Different,
            Status::Failure => SummaryBucket::Failure,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification used for the summary counts
///
/// Differs from the structural [`Status`] when a judgement stage regards a
/// different trial as same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryBucket {
    Same,
    Different,
    Failure,
}

/// Key paths at which two projected responses diverge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffKeys {
    #[serde(default)]
    pub changed: Vec<String>,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl DiffKeys {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    /// All paths regardless of kind
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.changed
            .iter()
            .chain(self.added.iter())
            .chain(self.removed.iter())
    }

    /// Keep only the paths that are also present in `previous`
    pub fn restricted_to(mut self, previous: &DiffKeys) -> Self {
        self.changed.retain(|k| previous.changed.contains(k));
        self.added.retain(|k| previous.added.contains(k));
        self.removed.retain(|k| previous.removed.contains(k));
        self
    }

    /// Sort and deduplicate every list
    pub fn normalized(mut self) -> Self {
        for keys in [&mut self.changed, &mut self.added, &mut self.removed] {
            keys.sort();
            keys.dedup();
        }
        self
    }
}

/// What was observed on one endpoint for one trial
///
/// A failed endpoint carries only its URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointOutcome {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Stored body path relative to the report's response directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl EndpointOutcome {
    /// Degenerate outcome of an endpoint whose call failed
    pub fn failed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_code: None,
            byte: None,
            response_sec: None,
            content_type: None,
            mime_type: None,
            encoding: None,
            file: None,
        }
    }

    pub fn from_response(response: &RawResponse, file: Option<String>) -> Self {
        Self {
            url: response.url.clone(),
            status_code: Some(response.status_code),
            byte: Some(response.byte_count()),
            response_sec: Some(response.response_sec()),
            content_type: response.content_type().map(String::from),
            mime_type: response.mime_type(),
            encoding: response.encoding.clone(),
            file,
        }
    }
}

/// Immutable result of one request dispatched to both endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Position of the request in submission order, starting at 1
    pub seq: u64,
    pub name: String,
    #[serde(with = "trial_time")]
    pub request_time: NaiveDateTime,
    /// Structural verdict
    pub status: Status,
    /// Bucket counted in the summary, after judgement overrides
    pub summary_status: SummaryBucket,
    pub path: String,
    pub queries: QueryMap,
    pub headers: HeaderMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_keys: Option<DiffKeys>,
    pub one: EndpointOutcome,
    pub other: EndpointOutcome,
}

impl Trial {
    /// Whether a judgement stage moved this trial into the same bucket
    pub fn regarded_as_same(&self) -> bool {
        self.status != Status::Same && self.summary_status == SummaryBucket::Same
    }
}
