//! Bounded parallel dispatch of a request list

use futures::FutureExt;
use jumeaux_core::{Request, Trial};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::dispatcher::Dispatcher;

/// Runs dispatches on at most `workers` concurrent tasks
pub struct Scheduler {
    dispatcher: Arc<Dispatcher>,
    workers: usize,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<Dispatcher>, workers: usize) -> Self {
        Self {
            dispatcher,
            workers: workers.max(1),
        }
    }

    /// Dispatch every request and return the trials sorted by seq
    ///
    /// Seqs are assigned in submission order starting at 1. Every request
    /// yields exactly one trial; a dispatch that panics or whose task never
    /// completes is recorded as a failure.
    pub async fn run(&self, requests: Vec<Request>, key: &str) -> Vec<Trial> {
        let requests: Vec<Arc<Request>> = requests.into_iter().map(Arc::new).collect();
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let key: Arc<str> = Arc::from(key);
        let mut tasks: JoinSet<Trial> = JoinSet::new();

        debug!(total, workers = self.workers, "Scheduling requests");

        for (index, request) in requests.iter().enumerate() {
            let seq = index as u64 + 1;
            let request = request.clone();
            let semaphore = semaphore.clone();
            let dispatcher = self.dispatcher.clone();
            let key = key.clone();

            tasks.spawn(async move {
                // The semaphore is never closed, so the permit is always granted
                let _permit = semaphore.acquire_owned().await.ok();

                let dispatched = AssertUnwindSafe(dispatcher.dispatch(&request, seq, total, &key))
                    .catch_unwind()
                    .await;
                match dispatched {
                    Ok(trial) => trial,
                    Err(_) => {
                        error!(seq, "Dispatch panicked, recording failure");
                        dispatcher.failure_trial_now(&request, seq)
                    }
                }
            });
        }

        let mut trials = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(trial) => trials.push(trial),
                Err(e) => error!("Dispatch task did not complete: {}", e),
            }
        }

        if trials.len() < total {
            let completed: HashSet<u64> = trials.iter().map(|trial| trial.seq).collect();
            for (index, request) in requests.iter().enumerate() {
                let seq = index as u64 + 1;
                if !completed.contains(&seq) {
                    warn!(seq, "No trial returned for request, recording failure");
                    trials.push(self.dispatcher.failure_trial_now(request, seq));
                }
            }
        }

        trials.sort_by_key(|trial| trial.seq);
        trials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::ScriptedClient;
    use crate::client::HttpClient;
    use crate::client::TransportError;
    use crate::sink::FileSink;
    use async_trait::async_trait;
    use jumeaux_addons::StageRegistry;
    use jumeaux_config::{resolve, ConfigDocument, EndpointPatch, PipelinePatch};
    use chrono::{NaiveDate, NaiveDateTime};
    use jumeaux_core::{Clock, HeaderMap, RawResponse, StageDescriptor, Status, SystemClock};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Later paths answer faster, so completion order is reversed
    struct SlowFirst;

    #[async_trait]
    impl HttpClient for SlowFirst {
        async fn get(&self, url: &str, _headers: &HeaderMap) -> Result<RawResponse, TransportError> {
            let n: u64 = url.rsplit('/').next().and_then(|n| n.parse().ok()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(50u64.saturating_sub(n * 5))).await;
            Ok(RawResponse::new(url, 200, "{}"))
        }
    }

    /// Tracks the highest number of in-flight calls
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl HttpClient for Gauge {
        async fn get(&self, url: &str, _headers: &HeaderMap) -> Result<RawResponse, TransportError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(RawResponse::new(url, 200, "{}"))
        }
    }

    /// Panics on one path
    struct Panicking;

    #[async_trait]
    impl HttpClient for Panicking {
        async fn get(&self, url: &str, _headers: &HeaderMap) -> Result<RawResponse, TransportError> {
            if url.ends_with("/boom") {
                panic!("client bug");
            }
            Ok(RawResponse::new(url, 200, "{}"))
        }
    }

    /// Panics on its first `panics` readings
    struct FlakyClock {
        panics: usize,
        calls: AtomicUsize,
    }

    impl Clock for FlakyClock {
        fn now(&self) -> NaiveDateTime {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.panics {
                panic!("clock unavailable");
            }
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 5)
                .unwrap()
        }
    }

    fn dispatcher(one: Arc<dyn HttpClient>, other: Arc<dyn HttpClient>) -> (Arc<Dispatcher>, tempfile::TempDir) {
        dispatcher_with_clock(one, other, Arc::new(SystemClock))
    }

    fn dispatcher_with_clock(
        one: Arc<dyn HttpClient>,
        other: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> (Arc<Dispatcher>, tempfile::TempDir) {
        let config = resolve(&[ConfigDocument {
            one: Some(EndpointPatch {
                host: Some("http://one".into()),
                ..Default::default()
            }),
            other: Some(EndpointPatch {
                host: Some("http://other".into()),
                ..Default::default()
            }),
            max_retries: Some(0),
            pipeline: Some(PipelinePatch {
                request_source: Some(StageDescriptor::new("request_source/plain")),
                ..Default::default()
            }),
            ..Default::default()
        }])
        .unwrap();
        let pipeline = StageRegistry::with_builtins()
            .load(&config.pipeline, &BTreeSet::new())
            .unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(
            &config,
            Arc::new(pipeline),
            one,
            other,
            Arc::new(FileSink::new(dir.path())),
        )
        .with_clock(clock)
        .with_retry_backoff(Duration::ZERO);
        (Arc::new(dispatcher), dir)
    }

    fn requests(n: usize) -> Vec<Request> {
        (0..n).map(|i| Request::new(format!("/{}", i))).collect()
    }

    #[tokio::test]
    async fn test_trials_sorted_by_seq_despite_completion_order() {
        let (dispatcher, _dir) = dispatcher(Arc::new(SlowFirst), Arc::new(SlowFirst));
        let trials = Scheduler::new(dispatcher, 4).run(requests(10), "key").await;

        let seqs: Vec<u64> = trials.iter().map(|t| t.seq).collect();
        assert_eq!(seqs, (1..=10).collect::<Vec<_>>());
        assert_eq!(trials[0].path, "/0");
        assert_eq!(trials[9].path, "/9");
    }

    #[tokio::test]
    async fn test_worker_bound_respected() {
        let gauge = Arc::new(Gauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let (dispatcher, _dir) = dispatcher(gauge.clone(), Arc::new(ScriptedClient::new()));

        let trials = Scheduler::new(dispatcher, 3).run(requests(12), "key").await;
        assert_eq!(trials.len(), 12);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_every_request_appears_once_under_failure() {
        let failing = Arc::new(ScriptedClient::new().failing(usize::MAX));
        let (dispatcher, _dir) = dispatcher(failing.clone(), failing);

        let trials = Scheduler::new(dispatcher, 2).run(requests(5), "key").await;
        assert_eq!(trials.len(), 5);
        assert!(trials.iter().all(|t| t.status == Status::Failure));
    }

    #[tokio::test]
    async fn test_panic_becomes_failure_trial() {
        let (dispatcher, _dir) = dispatcher(Arc::new(Panicking), Arc::new(Panicking));
        let requests = vec![Request::new("/ok"), Request::new("/boom"), Request::new("/ok")];

        let trials = Scheduler::new(dispatcher, 2).run(requests, "key").await;
        let statuses: Vec<Status> = trials.iter().map(|t| t.status).collect();
        assert_eq!(statuses, vec![Status::Same, Status::Failure, Status::Same]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (dispatcher, _dir) = dispatcher(
            Arc::new(ScriptedClient::new()),
            Arc::new(ScriptedClient::new()),
        );
        assert!(Scheduler::new(dispatcher, 1).run(vec![], "key").await.is_empty());
    }

    #[tokio::test]
    async fn test_lost_task_still_yields_failure_trial() {
        // The dispatch panics, then the failure trial of the task panics too
        let clock = Arc::new(FlakyClock {
            panics: 2,
            calls: AtomicUsize::new(0),
        });
        let (dispatcher, _dir) = dispatcher_with_clock(
            Arc::new(ScriptedClient::new()),
            Arc::new(ScriptedClient::new()),
            clock,
        );

        let trials = Scheduler::new(dispatcher, 1)
            .run(vec![Request::new("/lost")], "key")
            .await;
        assert_eq!(trials.len(), 1);
        assert_eq!(trials[0].seq, 1);
        assert_eq!(trials[0].path, "/lost");
        assert_eq!(trials[0].status, Status::Failure);
    }
}
