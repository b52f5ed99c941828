//! Dual dispatch of one request with retry on transport failure

use jumeaux_addons::{DumpPayload, PersistenceReference, Pipeline};
use jumeaux_core::{
    Clock, EndpointOutcome, EndpointSpec, RawResponse, Request, RunConfig, Status, SummaryBucket,
    SystemClock, Trial, Which,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::client::{HttpClient, TransportError};
use crate::judge::{judge, Verdict};
use crate::sink::ResponseSink;

/// Wait before the first retry; doubles with each further attempt
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Upper bound of a single wait between retries
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// Turns one request into one trial
pub struct Dispatcher {
    one: EndpointSpec,
    other: EndpointSpec,
    one_client: Arc<dyn HttpClient>,
    other_client: Arc<dyn HttpClient>,
    pipeline: Arc<Pipeline>,
    sink: Arc<dyn ResponseSink>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl Dispatcher {
    pub fn new(
        config: &RunConfig,
        pipeline: Arc<Pipeline>,
        one_client: Arc<dyn HttpClient>,
        other_client: Arc<dyn HttpClient>,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        Self {
            one: config.one.clone(),
            other: config.other.clone(),
            one_client,
            other_client,
            pipeline,
            sink,
            clock: Arc::new(SystemClock),
            max_retries: config.max_retries,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Dispatch `request` to both endpoints and judge the result
    ///
    /// Never fails: transport failures that outlast the retry budget
    /// become a failure trial.
    pub async fn dispatch(&self, request: &Request, seq: u64, total: usize, key: &str) -> Trial {
        let request_time = self.clock.now();
        let name = request.display_name(seq);
        let url_one = self.one.render_url(request);
        let url_other = self.other.render_url(request);

        let mut attempt = 0;
        let (res_one, res_other) = loop {
            let (one, other) = tokio::join!(
                self.one_client.get(&url_one, &request.headers),
                self.other_client.get(&url_other, &request.headers)
            );

            let (one, other) = match (one, other) {
                (Ok(one), Ok(other)) => break (one, other),
                failed => failed,
            };

            let reason = describe_failure(&one, &other);
            if attempt < self.max_retries {
                attempt += 1;
                warn!(
                    seq,
                    attempt,
                    "[{} / {}] Transport failure, retrying: {}",
                    seq,
                    total,
                    reason
                );
                tokio::time::sleep(retry_delay(self.retry_backoff, attempt)).await;
                continue;
            }

            error!(seq, "[{} / {}] Giving up after {} retries: {}", seq, total, attempt, reason);
            let trial = Trial {
                one: outcome_or_failed(&one, url_one),
                other: outcome_or_failed(&other, url_other),
                ..self.failure_trial(request, seq, request_time)
            };
            self.pipeline.did_challenge(&trial).await;
            return trial;
        };

        let res_one = self
            .pipeline
            .transform_response(res_one, Which::One, request);
        let res_other = self
            .pipeline
            .transform_response(res_other, Which::Other, request);

        let verdict = judge(&self.pipeline, request, &name, &res_one, &res_other);
        let Verdict {
            status,
            summary_status,
            diff_keys,
        } = verdict;

        let persist = self.pipeline.should_persist(&PersistenceReference {
            status,
            summary_status,
            path: &request.path,
            qs: &request.qs,
            headers: &request.headers,
            res_one: &res_one,
            res_other: &res_other,
        });
        let (stored_one, stored_other) = if persist {
            (
                self.store(key, Which::One, seq, &name, &res_one).await,
                self.store(key, Which::Other, seq, &name, &res_other).await,
            )
        } else {
            (None, None)
        };

        info!(
            "[{} / {}] {} ({} - {}) <{:.2}s - {:.2}s> {}",
            seq,
            total,
            if summary_status == SummaryBucket::Same { "O" } else { "X" },
            res_one.status_code,
            res_other.status_code,
            res_one.response_sec(),
            res_other.response_sec(),
            name
        );

        let trial = Trial {
            seq,
            name,
            request_time,
            status,
            summary_status,
            path: request.path.clone(),
            queries: request.qs.clone(),
            headers: request.headers.clone(),
            diff_keys,
            one: outcome(&res_one, stored_one),
            other: outcome(&res_other, stored_other),
        };
        self.pipeline.did_challenge(&trial).await;
        trial
    }

    /// A failure trial with URL-only outcomes for both endpoints
    pub fn failure_trial(
        &self,
        request: &Request,
        seq: u64,
        request_time: chrono::NaiveDateTime,
    ) -> Trial {
        Trial {
            seq,
            name: request.display_name(seq),
            request_time,
            status: Status::Failure,
            summary_status: SummaryBucket::Failure,
            path: request.path.clone(),
            queries: request.qs.clone(),
            headers: request.headers.clone(),
            diff_keys: None,
            one: EndpointOutcome::failed(self.one.render_url(request)),
            other: EndpointOutcome::failed(self.other.render_url(request)),
        }
    }

    /// Failure trial stamped with the current time
    pub fn failure_trial_now(&self, request: &Request, seq: u64) -> Trial {
        self.failure_trial(request, seq, self.clock.now())
    }

    async fn store(
        &self,
        key: &str,
        which: Which,
        seq: u64,
        name: &str,
        response: &RawResponse,
    ) -> Option<StoredBody> {
        let filename = format!("({}){}", seq, name).replace(['/', '\\'], "_");
        let payload = self.pipeline.dump(
            response,
            DumpPayload {
                body: response.body.clone(),
                encoding: response.encoding.clone(),
            },
        );

        match self.sink.store(key, which, &filename, &payload.body).await {
            Ok(file) => Some(StoredBody {
                file,
                encoding: payload.encoding,
            }),
            Err(e) => {
                warn!(seq, which = %which, "Response body not stored: {}", e);
                None
            }
        }
    }
}

/// Wait before retry `attempt` (1-based), doubling up to [`MAX_RETRY_BACKOFF`]
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .unwrap_or(MAX_RETRY_BACKOFF)
        .min(MAX_RETRY_BACKOFF)
}

/// A persisted body and the encoding its bytes were written in
struct StoredBody {
    file: String,
    encoding: Option<String>,
}

/// The stored body's encoding replaces the response encoding
fn outcome(response: &RawResponse, stored: Option<StoredBody>) -> EndpointOutcome {
    match stored {
        Some(stored) => EndpointOutcome {
            encoding: stored.encoding.or_else(|| response.encoding.clone()),
            ..EndpointOutcome::from_response(response, Some(stored.file))
        },
        None => EndpointOutcome::from_response(response, None),
    }
}

fn describe_failure(
    one: &Result<RawResponse, TransportError>,
    other: &Result<RawResponse, TransportError>,
) -> String {
    match (one, other) {
        (Err(a), Err(b)) => format!("one: {}, other: {}", a, b),
        (Err(a), _) => format!("one: {}", a),
        (_, Err(b)) => format!("other: {}", b),
        _ => String::new(),
    }
}

/// Successful side keeps its outcome; a failed side is reduced to its URL
fn outcome_or_failed(result: &Result<RawResponse, TransportError>, url: String) -> EndpointOutcome {
    match result {
        Ok(response) => EndpointOutcome::from_response(response, None),
        Err(_) => EndpointOutcome::failed(url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::ScriptedClient;
    use crate::sink::FileSink;
    use chrono::NaiveDate;
    use jumeaux_addons::StageRegistry;
    use jumeaux_config::resolve;
    use jumeaux_config::{ConfigDocument, EndpointPatch, PipelinePatch};
    use jumeaux_core::{FixedClock, StageDescriptor};
    use serde_json::json;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn config(max_retries: u32, judgement: Vec<StageDescriptor>) -> RunConfig {
        resolve(&[ConfigDocument {
            one: Some(EndpointPatch {
                host: Some("http://one".into()),
                ..Default::default()
            }),
            other: Some(EndpointPatch {
                host: Some("http://other".into()),
                ..Default::default()
            }),
            max_retries: Some(max_retries),
            pipeline: Some(PipelinePatch {
                request_source: Some(StageDescriptor::new("request_source/plain")),
                response_projection: Some(vec![StageDescriptor::new(
                    "response_projection/json",
                )]),
                judgement: Some(judgement),
                dump: Some(vec![StageDescriptor::new("dump/json")]),
                ..Default::default()
            }),
            ..Default::default()
        }])
        .unwrap()
    }

    struct Setup {
        dispatcher: Dispatcher,
        one: Arc<ScriptedClient>,
        other: Arc<ScriptedClient>,
        dir: TempDir,
    }

    fn setup(max_retries: u32, one: ScriptedClient, other: ScriptedClient) -> Setup {
        setup_with(max_retries, vec![], one, other)
    }

    fn setup_with(
        max_retries: u32,
        judgement: Vec<StageDescriptor>,
        one: ScriptedClient,
        other: ScriptedClient,
    ) -> Setup {
        let config = config(max_retries, judgement);
        let pipeline = StageRegistry::with_builtins()
            .load(&config.pipeline, &BTreeSet::new())
            .unwrap();
        let dir = TempDir::new().unwrap();
        let one = Arc::new(one);
        let other = Arc::new(other);
        let clock = FixedClock(
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_micro_opt(3, 4, 5, 678)
                .unwrap(),
        );

        let dispatcher = Dispatcher::new(
            &config,
            Arc::new(pipeline),
            one.clone(),
            other.clone(),
            Arc::new(FileSink::new(dir.path())),
        )
        .with_clock(Arc::new(clock))
        .with_retry_backoff(Duration::ZERO);

        Setup {
            dispatcher,
            one,
            other,
            dir,
        }
    }

    #[tokio::test]
    async fn test_different_trial_is_persisted() {
        let s = setup(
            0,
            ScriptedClient::new().route("http://one/a", 200, r#"{"x":1}"#),
            ScriptedClient::new().route("http://other/a", 200, r#"{"x":2}"#),
        );

        let trial = s.dispatcher.dispatch(&Request::new("/a"), 1, 1, "key").await;

        assert_eq!(trial.status, Status::Different);
        assert_eq!(trial.name, "1");
        assert_eq!(trial.one.file.as_deref(), Some("one/(1)1"));
        assert_eq!(trial.other.file.as_deref(), Some("other/(1)1"));
        let stored = std::fs::read_to_string(s.dir.path().join("key/other/(1)1")).unwrap();
        assert_eq!(stored, "{\n    \"x\": 2\n}");
        assert_eq!(trial.other.encoding.as_deref(), Some("utf-8"));
        assert_eq!(
            trial.diff_keys.unwrap().changed,
            vec!["root.x".to_string()]
        );
    }

    #[tokio::test]
    async fn test_same_trial_not_persisted() {
        let s = setup(
            0,
            ScriptedClient::new().route("http://one/a", 200, r#"{"x":1}"#),
            ScriptedClient::new().route("http://other/a", 200, r#"{"x":1}"#),
        );

        let trial = s.dispatcher.dispatch(&Request::new("/a"), 3, 5, "key").await;
        assert_eq!(trial.status, Status::Same);
        assert_eq!(trial.one.file, None);
        assert!(!s.dir.path().join("key").exists());
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let s = setup(
            2,
            ScriptedClient::new().route("http://one/a", 200, "{}"),
            ScriptedClient::new()
                .failing(2)
                .route("http://other/a", 200, "{}"),
        );

        let trial = s.dispatcher.dispatch(&Request::new("/a"), 1, 1, "key").await;
        assert_eq!(trial.status, Status::Same);
        // The whole pair is retried
        assert_eq!(s.one.calls(), 3);
        assert_eq!(s.other.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_both_url_only() {
        let s = setup(
            2,
            ScriptedClient::new().failing(usize::MAX),
            ScriptedClient::new().failing(usize::MAX),
        );

        let request = Request::new("/challenge").with_query("q1", "1");
        let trial = s.dispatcher.dispatch(&request, 1, 1, "key").await;

        assert_eq!(trial.status, Status::Failure);
        assert_eq!(trial.summary_status, SummaryBucket::Failure);
        assert_eq!(s.one.calls(), 3);
        assert_eq!(
            serde_json::to_value(&trial.one).unwrap(),
            json!({"url": "http://one/challenge?q1=1"})
        );
        assert_eq!(
            serde_json::to_value(&trial.other).unwrap(),
            json!({"url": "http://other/challenge?q1=1"})
        );
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let s = setup(
            0,
            ScriptedClient::new().route("http://one/a", 200, "{}"),
            ScriptedClient::new().failing(1),
        );

        let trial = s.dispatcher.dispatch(&Request::new("/a"), 1, 1, "key").await;
        assert_eq!(trial.status, Status::Failure);
        assert_eq!(s.other.calls(), 1);
        // Only the failed side is reduced to its URL
        assert_eq!(trial.one.status_code, Some(200));
        assert_eq!(trial.other.status_code, None);
        assert_eq!(trial.other.url, "http://other/a");
    }

    #[tokio::test]
    async fn test_named_request_file_sanitized() {
        let s = setup(
            0,
            ScriptedClient::new().route("http://one/a", 200, "[1]"),
            ScriptedClient::new().route("http://other/a", 200, "[2]"),
        );

        let request = Request::new("/a").with_name("a/b");
        let trial = s.dispatcher.dispatch(&request, 7, 9, "key").await;
        assert_eq!(trial.name, "a/b");
        assert_eq!(trial.one.file.as_deref(), Some("one/(7)a_b"));
    }

    #[tokio::test]
    async fn test_regarded_as_same_not_persisted() {
        let ignore_time = StageDescriptor::new("judgement/ignore_properties").with_config(json!({
            "ignores": [{"title": "time", "conditions": [{"changed": ["root\\.time"]}]}]
        }));
        let s = setup_with(
            0,
            vec![ignore_time],
            ScriptedClient::new().route("http://one/a", 200, r#"{"time":1}"#),
            ScriptedClient::new().route("http://other/a", 200, r#"{"time":2}"#),
        );

        let trial = s.dispatcher.dispatch(&Request::new("/a"), 1, 1, "key").await;
        assert_eq!(trial.status, Status::Different);
        assert_eq!(trial.summary_status, SummaryBucket::Same);
        assert_eq!(trial.one.file, None);
        assert_eq!(trial.other.file, None);
        assert!(!s.dir.path().join("key").exists());
    }

    #[test]
    fn test_retry_delay_doubles_then_caps() {
        let base = Duration::from_millis(200);
        assert_eq!(retry_delay(base, 1), Duration::from_millis(200));
        assert_eq!(retry_delay(base, 2), Duration::from_millis(400));
        assert_eq!(retry_delay(base, 4), Duration::from_millis(1600));
        assert_eq!(retry_delay(base, 12), MAX_RETRY_BACKOFF);
        assert_eq!(retry_delay(base, u32::MAX), MAX_RETRY_BACKOFF);
        assert_eq!(retry_delay(Duration::from_secs(3600), 1), MAX_RETRY_BACKOFF);
        assert_eq!(retry_delay(Duration::ZERO, 30), Duration::ZERO);
    }
}
