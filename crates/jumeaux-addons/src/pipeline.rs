//! Loaded pipeline: executable stage instances in configured order

use jumeaux_config::InputSource;
use jumeaux_core::{OutputConfig, RawResponse, Report, Request, StageDescriptor, Trial, Which};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{ProjectionError, StageResult};
use crate::stage::{
    Dump, DumpPayload, FinalHook, Judgement, JudgementPayload, JudgementReference,
    PersistenceCriterion, PersistenceReference, PostTrialHook, RequestSource, RequestTransform,
    ResponseProjection, ResponseTransform, Stage,
};

/// A stage instance with the name it was configured under
pub struct Loaded<T: ?Sized> {
    pub name: String,
    pub stage: Arc<T>,
}

impl<T: ?Sized> Loaded<T> {
    pub fn new(name: impl Into<String>, stage: Arc<T>) -> Self {
        Self {
            name: name.into(),
            stage,
        }
    }
}

impl<T: ?Sized> Clone for Loaded<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            stage: self.stage.clone(),
        }
    }
}

/// The stages of one run, shared read-only by every worker
pub struct Pipeline {
    request_source: Loaded<dyn RequestSource>,
    request_transform: Vec<Loaded<dyn RequestTransform>>,
    response_transform: Vec<Loaded<dyn ResponseTransform>>,
    response_projection: Vec<Loaded<dyn ResponseProjection>>,
    judgement: Vec<Loaded<dyn Judgement>>,
    persistence_criteria: Vec<Loaded<dyn PersistenceCriterion>>,
    dump: Vec<Loaded<dyn Dump>>,
    post_trial_hook: Vec<Loaded<dyn PostTrialHook>>,
    final_hook: Vec<Loaded<dyn FinalHook>>,
    ignores: Vec<Value>,
}

impl Pipeline {
    pub fn new(request_source: Loaded<dyn RequestSource>) -> Self {
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
            ignores: Vec::new(),
        }
    }

    /// Append a stage to its category
    pub fn push(&mut self, descriptor: &StageDescriptor, stage: Stage) {
        let name = descriptor.name.clone();
        match stage {
            Stage::RequestSource(s) => self.request_source = Loaded::new(name, s),
            Stage::RequestTransform(s) => self.request_transform.push(Loaded::new(name, s)),
            Stage::ResponseTransform(s) => self.response_transform.push(Loaded::new(name, s)),
            Stage::ResponseProjection(s) => self.response_projection.push(Loaded::new(name, s)),
            Stage::Judgement(s) => {
                self.ignores.extend(ignores_of(descriptor));
                self.judgement.push(Loaded::new(name, s));
            }
            Stage::PersistenceCriterion(s) => {
                self.persistence_criteria.push(Loaded::new(name, s))
            }
            Stage::Dump(s) => self.dump.push(Loaded::new(name, s)),
            Stage::PostTrialHook(s) => self.post_trial_hook.push(Loaded::new(name, s)),
            Stage::FinalHook(s) => self.final_hook.push(Loaded::new(name, s)),
        }
    }

    /// Ignore rules of the loaded `ignore_properties` judgement stages
    pub fn ignores(&self) -> &[Value] {
        &self.ignores
    }

    /// Read every input through the request source, then transform
    pub fn produce_requests(&self, inputs: &[InputSource]) -> StageResult<Vec<Request>> {
        let mut requests = Vec::new();
        for input in inputs {
            for request in self.request_source.stage.produce(input) {
                requests.push(request?);
            }
            debug!(
                stage = %self.request_source.name,
                input = ?input.path,
                total = requests.len(),
                "Read requests"
            );
        }

        Ok(self.transform_requests(requests))
    }

    pub fn transform_requests(&self, requests: Vec<Request>) -> Vec<Request> {
        self.request_transform
            .iter()
            .fold(requests, |requests, transform| {
                let before = requests.len();
                let after = transform.stage.apply(requests);
                debug!(stage = %transform.name, before, after = after.len(), "Transformed requests");
                after
            })
    }

    pub fn transform_response(
        &self,
        response: RawResponse,
        which: Which,
        request: &Request,
    ) -> RawResponse {
        self.response_transform
            .iter()
            .fold(response, |response, transform| {
                transform.stage.apply(response, which, request)
            })
    }

    pub fn has_projection(&self) -> bool {
        !self.response_projection.is_empty()
    }

    /// Run every projection stage; `None` means no stage handled the body
    pub fn project(&self, response: &RawResponse) -> Result<Option<Value>, ProjectionError> {
        let mut current = None;
        for projection in &self.response_projection {
            current = projection.stage.project(response, current)?;
        }
        Ok(current)
    }

    /// Fold the judgement stages over `initial`
    ///
    /// `regard_as_same` never returns to false and the remaining diff keys
    /// only ever shrink, whatever an individual stage returns.
    pub fn judge(
        &self,
        initial: JudgementPayload,
        reference: &JudgementReference<'_>,
    ) -> JudgementPayload {
        self.judgement.iter().fold(initial, |payload, judgement| {
            let next = judgement.stage.judge(payload.clone(), reference);
            let remaining_diff_keys = match (payload.remaining_diff_keys, next.remaining_diff_keys)
            {
                (Some(previous), Some(next)) => Some(next.restricted_to(&previous)),
                (previous, _) => previous,
            };
            let regard_as_same = payload.regard_as_same || next.regard_as_same;
            debug!(stage = %judgement.name, regard_as_same, "Judged");

            JudgementPayload {
                remaining_diff_keys,
                regard_as_same,
            }
        })
    }

    /// Whether any criterion asks for the bodies to be stored
    pub fn should_persist(&self, reference: &PersistenceReference<'_>) -> bool {
        self.persistence_criteria
            .iter()
            .any(|criterion| criterion.stage.should_persist(reference))
    }

    pub fn dump(&self, response: &RawResponse, payload: DumpPayload) -> DumpPayload {
        self.dump
            .iter()
            .fold(payload, |payload, dump| dump.stage.dump(response, payload))
    }

    /// Notify the post-trial hooks; hook failures are logged only
    pub async fn did_challenge(&self, trial: &Trial) {
        for hook in &self.post_trial_hook {
            if let Err(e) = hook.stage.observe(trial).await {
                warn!(stage = %hook.name, seq = trial.seq, "Post-trial hook failed: {}", e);
            }
        }
    }

    /// Hand the sealed report to the final hooks; failures are logged only
    pub async fn finalize(&self, report: &Report, output: &OutputConfig) {
        for hook in &self.final_hook {
            if let Err(e) = hook.stage.finalize(report, output).await {
                error!(stage = %hook.name, "Final hook failed: {}", e);
            }
        }
    }
}

fn ignores_of(descriptor: &StageDescriptor) -> Vec<Value> {
    if !descriptor.name.ends_with("ignore_properties") {
        return Vec::new();
    }

    descriptor
        .config
        .as_ref()
        .and_then(|config| config.get("ignores"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
