//! Fully resolved run configuration
//!
//! These are the output of the layered merge in `jumeaux-config`. They are
//! built once per run and shared read-only by every worker.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::EndpointSpec;

/// Implementation class assigned to stages that do not name one
pub const DEFAULT_CLS_NAME: &str = "Executor";

fn default_cls_name() -> String {
    DEFAULT_CLS_NAME.to_string()
}

/// Stage categories of the pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCategory {
    RequestSource,
    RequestTransform,
    ResponseTransform,
    ResponseProjection,
    Judgement,
    PersistenceCriteria,
    Dump,
    PostTrialHook,
    FinalHook,
}

impl StageCategory {
    pub const ALL: [StageCategory; 9] = [
        StageCategory::RequestSource,
        StageCategory::RequestTransform,
        StageCategory::ResponseTransform,
        StageCategory::ResponseProjection,
        StageCategory::Judgement,
        StageCategory::PersistenceCriteria,
        StageCategory::Dump,
        StageCategory::PostTrialHook,
        StageCategory::FinalHook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageCategory::RequestSource => "request_source",
            StageCategory::RequestTransform => "request_transform",
            StageCategory::ResponseTransform => "response_transform",
            StageCategory::ResponseProjection => "response_projection",
            StageCategory::Judgement => "judgement",
            StageCategory::PersistenceCriteria => "persistence_criteria",
            StageCategory::Dump => "dump",
            StageCategory::PostTrialHook => "post_trial_hook",
            StageCategory::FinalHook => "final_hook",
        }
    }
}

impl fmt::Display for StageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, independently configured stage instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// Qualified name, e.g. "request_transform/head"
    pub name: String,

    #[serde(default = "default_cls_name")]
    pub cls_name: String,

    /// Stage-specific configuration, validated by the stage at load time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl StageDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cls_name: default_cls_name(),
            config: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Whether any of this stage's tags is in `skip_tags`
    pub fn is_skipped_by(&self, skip_tags: &BTreeSet<String>) -> bool {
        !self.tags.is_disjoint(skip_tags)
    }
}

/// Resolved pipeline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub request_source: StageDescriptor,
    #[serde(default)]
    pub request_transform: Vec<StageDescriptor>,
    #[serde(default)]
    pub response_transform: Vec<StageDescriptor>,
    #[serde(default)]
    pub response_projection: Vec<StageDescriptor>,
    #[serde(default)]
    pub judgement: Vec<StageDescriptor>,
    #[serde(default)]
    pub persistence_criteria: Vec<StageDescriptor>,
    #[serde(default)]
    pub dump: Vec<StageDescriptor>,
    #[serde(default)]
    pub post_trial_hook: Vec<StageDescriptor>,
    #[serde(default)]
    pub final_hook: Vec<StageDescriptor>,
}

impl PipelineConfig {
    pub fn new(request_source: StageDescriptor) -> Self {
        Self {
            request_source,
            request_transform: Vec::new(),
            response_transform: Vec::new(),
            response_projection: Vec::new(),
            judgement: Vec::new(),
            persistence_criteria: Vec::new(),
            dump: Vec::new(),
            post_trial_hook: Vec::new(),
            final_hook: Vec::new(),
        }
    }

    /// Stages of a category in configured order
    pub fn stages(&self, category: StageCategory) -> &[StageDescriptor] {
        match category {
            StageCategory::RequestSource => std::slice::from_ref(&self.request_source),
            StageCategory::RequestTransform => &self.request_transform,
            StageCategory::ResponseTransform => &self.response_transform,
            StageCategory::ResponseProjection => &self.response_projection,
            StageCategory::Judgement => &self.judgement,
            StageCategory::PersistenceCriteria => &self.persistence_criteria,
            StageCategory::Dump => &self.dump,
            StageCategory::PostTrialHook => &self.post_trial_hook,
            StageCategory::FinalHook => &self.final_hook,
        }
    }
}

/// Where persisted response bodies go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub encoding: String,
    pub response_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            encoding: "utf8".to_string(),
            response_dir: PathBuf::from("responses"),
        }
    }
}

/// Worker pool shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concurrency {
    pub threads: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processes: Option<usize>,
}

impl Concurrency {
    /// Number of workers dispatching trials in parallel
    pub fn workers(&self) -> usize {
        self.processes.unwrap_or(self.threads).max(1)
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self {
            threads: 1,
            processes: None,
        }
    }
}

/// Everything a challenge run needs, resolved from all config layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub one: EndpointSpec,
    pub other: EndpointSpec,
    pub output: OutputConfig,
    pub concurrency: Concurrency,
    /// Additional attempts after the first on transport failure
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub input_files: Vec<PathBuf>,
    pub pipeline: PipelineConfig,
}
