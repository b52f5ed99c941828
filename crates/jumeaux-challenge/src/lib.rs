//! The challenge: dispatch every request to both endpoints and report
//!
//! ```text
//!  requests ──► Scheduler ──► Dispatcher ──► one / other (HTTP, retry)
//!                  │               │
//!                  │               └──► response transforms ──► judge ──► Trial
//!                  ▼
//!             Aggregator ──► Report ──► final hooks
//! ```
//!
//! A [`Challenge`] owns the resolved configuration, the loaded pipeline and
//! the two endpoint clients. Every request yields exactly one trial, and
//! the trials of a report are always sorted by seq.

pub mod aggregator;
pub mod client;
pub mod dispatcher;
pub mod judge;
pub mod scheduler;
pub mod sink;

pub use aggregator::Aggregator;
pub use client::{HttpClient, ReqwestClient, TransportError, DEFAULT_TIMEOUT};
pub use dispatcher::{Dispatcher, DEFAULT_RETRY_BACKOFF, MAX_RETRY_BACKOFF};
pub use judge::Verdict;
pub use scheduler::Scheduler;
pub use sink::{FileSink, PersistenceError, PersistenceResult, ResponseSink};

use jumeaux_addons::Pipeline;
use jumeaux_config::ConfigResult;
use jumeaux_core::{Clock, Report, Request, RunConfig, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// One configured run against two endpoints
pub struct Challenge {
    config: RunConfig,
    pipeline: Arc<Pipeline>,
    one_client: Arc<dyn HttpClient>,
    other_client: Arc<dyn HttpClient>,
    sink: Arc<dyn ResponseSink>,
    clock: Arc<dyn Clock>,
    retry_backoff: Duration,
}

impl Challenge {
    /// Real HTTP clients and bodies stored under `output.response_dir`
    pub fn new(config: RunConfig, pipeline: Pipeline) -> ConfigResult<Self> {
        let one_client = ReqwestClient::for_endpoint(&config.one, DEFAULT_TIMEOUT)?;
        let other_client = ReqwestClient::for_endpoint(&config.other, DEFAULT_TIMEOUT)?;
        Ok(Self::with_clients(
            config,
            pipeline,
            Arc::new(one_client),
            Arc::new(other_client),
        ))
    }

    pub fn with_clients(
        config: RunConfig,
        pipeline: Pipeline,
        one_client: Arc<dyn HttpClient>,
        other_client: Arc<dyn HttpClient>,
    ) -> Self {
        let sink = Arc::new(FileSink::new(config.output.response_dir.clone()));
        Self {
            config,
            pipeline: Arc::new(pipeline),
            one_client,
            other_client,
            sink,
            clock: Arc::new(SystemClock),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResponseSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Dispatch every request, seal the report and run the final hooks
    pub async fn run(
        &self,
        requests: Vec<Request>,
        key: &str,
        retry_hash: Option<String>,
    ) -> Report {
        let dispatcher = Dispatcher::new(
            &self.config,
            self.pipeline.clone(),
            self.one_client.clone(),
            self.other_client.clone(),
            self.sink.clone(),
        )
        .with_clock(self.clock.clone())
        .with_retry_backoff(self.retry_backoff);

        let workers = self.config.concurrency.workers();
        info!(
            key,
            requests = requests.len(),
            workers,
            "Challenge started: {} - {}",
            self.config.one.host,
            self.config.other.host
        );

        let start = self.clock.now();
        let trials = Scheduler::new(Arc::new(dispatcher), workers)
            .run(requests, key)
            .await;
        let end = self.clock.now();

        let mut aggregator = Aggregator::new();
        aggregator.extend(trials);
        let report = aggregator.build(
            &self.config,
            start,
            end,
            key,
            self.pipeline.ignores().to_vec(),
            retry_hash,
        );

        self.pipeline.finalize(&report, &self.config.output).await;
        report
    }
}

/// Requests of a previous report's trials, in seq order
pub fn replay_requests(report: &Report) -> Vec<Request> {
    let mut trials: Vec<_> = report.trials.iter().collect();
    trials.sort_by_key(|trial| trial.seq);

    trials
        .into_iter()
        .map(|trial| Request {
            // Names that only echo the seq are dropped so the replay renumbers
            name: (trial.name != trial.seq.to_string()).then(|| trial.name.clone()),
            path: trial.path.clone(),
            qs: trial.queries.clone(),
            headers: trial.headers.clone(),
        })
        .collect()
}
