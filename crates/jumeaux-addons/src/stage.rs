//! Capability contracts of the pipeline stage categories
//!
//! Every configured stage instance implements exactly one of these traits.
//! All stages are shared by every worker, so they are `Send + Sync` and take
//! `&self`; the only stages with side effects are the hooks.

use async_trait::async_trait;
use jumeaux_config::InputSource;
use jumeaux_core::{
    DiffKeys, HeaderMap, OutputConfig, QueryMap, RawResponse, Report, Request, StageCategory,
    Status, SummaryBucket, Trial, Which,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{ProjectionError, StageResult};

/// Lazy sequence of requests read from one input
pub type RequestStream<'a> = Box<dyn Iterator<Item = StageResult<Request>> + Send + 'a>;

/// Turns raw input content into requests
pub trait RequestSource: Send + Sync {
    fn produce<'a>(&'a self, input: &'a InputSource) -> RequestStream<'a>;
}

/// Filters, samples or reorders the request list
pub trait RequestTransform: Send + Sync {
    fn apply(&self, requests: Vec<Request>) -> Vec<Request>;
}

/// Normalizes one side's response before persistence and comparison
pub trait ResponseTransform: Send + Sync {
    fn apply(&self, response: RawResponse, which: Which, request: &Request) -> RawResponse;
}

/// Parses a response body into a structured value ("res2dict")
///
/// `current` is the value produced by the previous projection stage; a
/// stage that does not handle the response passes it through.
pub trait ResponseProjection: Send + Sync {
    fn project(
        &self,
        response: &RawResponse,
        current: Option<Value>,
    ) -> Result<Option<Value>, ProjectionError>;
}

/// State threaded through the judgement stages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgementPayload {
    /// Diff keys not yet explained by an earlier stage; `None` when the
    /// responses could not be compared structurally
    pub remaining_diff_keys: Option<DiffKeys>,
    pub regard_as_same: bool,
}

/// Everything a judgement stage may inspect about the trial
#[derive(Debug, Clone, Copy)]
pub struct JudgementReference<'a> {
    pub name: &'a str,
    pub path: &'a str,
    pub qs: &'a QueryMap,
    pub headers: &'a HeaderMap,
    pub res_one: &'a RawResponse,
    pub res_other: &'a RawResponse,
    pub dict_one: Option<&'a Value>,
    pub dict_other: Option<&'a Value>,
    /// Structural verdict before any judgement stage ran
    pub status: Status,
}

impl JudgementReference<'_> {
    /// Expression context exposed to condition-based stages
    pub fn to_context(&self) -> Value {
        json!({
            "name": self.name,
            "path": self.path,
            "qs": self.qs,
            "headers": self.headers,
            "status": self.status,
            "res_one": response_view(self.res_one),
            "res_other": response_view(self.res_other),
            "dict_one": self.dict_one,
            "dict_other": self.dict_other,
        })
    }
}

fn response_view(response: &RawResponse) -> Value {
    json!({
        "url": response.url,
        "status_code": response.status_code,
        "headers": response.headers,
        "text": response.text(),
        "byte": response.byte_count(),
        "content_type": response.content_type(),
        "mime_type": response.mime_type(),
        "encoding": response.encoding,
    })
}

/// One step of the judgement fold
///
/// A stage may only move `regard_as_same` from false to true and narrow
/// `remaining_diff_keys`; the pipeline discards anything else.
pub trait Judgement: Send + Sync {
    fn judge(&self, payload: JudgementPayload, reference: &JudgementReference<'_>)
        -> JudgementPayload;
}

/// What a persistence criterion may inspect
#[derive(Debug, Clone, Copy)]
pub struct PersistenceReference<'a> {
    pub status: Status,
    pub summary_status: SummaryBucket,
    pub path: &'a str,
    pub qs: &'a QueryMap,
    pub headers: &'a HeaderMap,
    pub res_one: &'a RawResponse,
    pub res_other: &'a RawResponse,
}

/// Decides whether a trial's response bodies are stored
pub trait PersistenceCriterion: Send + Sync {
    fn should_persist(&self, reference: &PersistenceReference<'_>) -> bool;
}

/// Body about to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpPayload {
    pub body: Vec<u8>,
    pub encoding: Option<String>,
}

/// Rewrites a body right before it is stored
pub trait Dump: Send + Sync {
    fn dump(&self, response: &RawResponse, payload: DumpPayload) -> DumpPayload;
}

/// Observes every finished trial
#[async_trait]
pub trait PostTrialHook: Send + Sync {
    async fn observe(&self, trial: &Trial) -> StageResult<()>;
}

/// Observes the sealed report
#[async_trait]
pub trait FinalHook: Send + Sync {
    async fn finalize(&self, report: &Report, output: &OutputConfig) -> StageResult<()>;
}

/// An executable stage instance, tagged by category
#[derive(Clone)]
pub enum Stage {
    RequestSource(Arc<dyn RequestSource>),
    RequestTransform(Arc<dyn RequestTransform>),
    ResponseTransform(Arc<dyn ResponseTransform>),
    ResponseProjection(Arc<dyn ResponseProjection>),
    Judgement(Arc<dyn Judgement>),
    PersistenceCriterion(Arc<dyn PersistenceCriterion>),
    Dump(Arc<dyn Dump>),
    PostTrialHook(Arc<dyn PostTrialHook>),
    FinalHook(Arc<dyn FinalHook>),
}

impl Stage {
    pub fn category(&self) -> StageCategory {
        match self {
            Stage::RequestSource(_) => StageCategory::RequestSource,
            Stage::RequestTransform(_) => StageCategory::RequestTransform,
            Stage::ResponseTransform(_) => StageCategory::ResponseTransform,
            Stage::ResponseProjection(_) => StageCategory::ResponseProjection,
            Stage::Judgement(_) => StageCategory::Judgement,
            Stage::PersistenceCriterion(_) => StageCategory::PersistenceCriteria,
            Stage::Dump(_) => StageCategory::Dump,
            Stage::PostTrialHook(_) => StageCategory::PostTrialHook,
            Stage::FinalHook(_) => StageCategory::FinalHook,
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stage({})", self.category())
    }
}
