//! Core types for jumeaux
//!
//! This crate provides the data model shared by every stage of a challenge
//! run: the logical [`Request`], the two compared [`EndpointSpec`]s, the
//! [`RawResponse`] captured from each endpoint, the immutable [`Trial`]
//! produced per request, and the sealed [`Report`] aggregated at the end.
//!
//! The fully resolved [`RunConfig`] and [`PipelineConfig`] also live here
//! because a report embeds them verbatim.

mod clock;
mod config;
mod endpoint;
mod report;
mod request;
mod response;
pub mod time;
mod trial;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    Concurrency, OutputConfig, PipelineConfig, RunConfig, StageCategory, StageDescriptor,
    DEFAULT_CLS_NAME,
};
pub use endpoint::{EndpointSpec, Which};
pub use report::{Report, StatusCounts, Summary, TimeSummary, REPORT_SCHEMA_VERSION};
pub use request::{HeaderMap, QueryMap, Request};
pub use response::{round_secs, RawResponse};
pub use trial::{DiffKeys, EndpointOutcome, Status, SummaryBucket, Trial};
