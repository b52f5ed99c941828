//! Sealed report of a challenge run

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::time::summary_time;
use crate::{Concurrency, EndpointSpec, OutputConfig, PipelineConfig, Trial};

/// Version of the report document layout
pub const REPORT_SCHEMA_VERSION: &str = "1";

/// Per-bucket trial counts; same-without-order is counted as different
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub same: u64,
    pub different: u64,
    pub failure: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSummary {
    #[serde(with = "summary_time")]
    pub start: NaiveDateTime,
    #[serde(with = "summary_time")]
    pub end: NaiveDateTime,
    pub elapsed_sec: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub time: TimeSummary,
    pub one: EndpointSpec,
    pub other: EndpointSpec,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: StatusCounts,
    pub output: OutputConfig,
    pub concurrency: Concurrency,
}

/// The result of a run; trials are sorted by seq
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub version: String,
    /// Deterministic hash of the run inputs, computed before dispatch
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ignore rules of the judgement stages that excluded response paths
    #[serde(default)]
    pub ignores: Vec<serde_json::Value>,
    pub pipeline: PipelineConfig,
    pub summary: Summary,
    pub trials: Vec<Trial>,
    /// Key of the report this run retried, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_hash: Option<String>,
}
