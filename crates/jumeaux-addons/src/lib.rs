//! Pipeline stages for jumeaux
//!
//! Every processing step of a challenge run is a named, independently
//! configured stage. The [`StageRegistry`] maps each stage's qualified name
//! and implementation class to a factory; loading a resolved
//! [`jumeaux_core::PipelineConfig`] through it yields a [`Pipeline`] of
//! executable instances, each implementing one capability trait:
//!
//! - [`RequestSource`] - input file to requests
//! - [`RequestTransform`] - filter, sample or reorder requests
//! - [`ResponseTransform`] - normalize a response before comparison
//! - [`ResponseProjection`] - parse a body into a structured value
//! - [`Judgement`] - override the structural verdict
//! - [`PersistenceCriterion`] - decide whether bodies are stored
//! - [`Dump`] - rewrite a body before it is stored
//! - [`PostTrialHook`] / [`FinalHook`] - observe trials and the report

pub mod builtins;
mod condition;
mod error;
mod pipeline;
mod registry;
mod stage;

pub use condition::AnyCondition;
pub use error::{ProjectionError, StageError, StageResult};
pub use pipeline::{Loaded, Pipeline};
pub use registry::{stage_config, StageFactory, StageRegistry};
pub use stage::{
    Dump, DumpPayload, FinalHook, Judgement, JudgementPayload, JudgementReference,
    PersistenceCriterion, PersistenceReference, PostTrialHook, RequestSource, RequestStream,
    RequestTransform, ResponseProjection, ResponseTransform, Stage,
};
