//! Seal trials into a report

use chrono::NaiveDateTime;
use jumeaux_core::{
    Report, RunConfig, StatusCounts, Summary, SummaryBucket, TimeSummary, Trial,
    REPORT_SCHEMA_VERSION,
};
use serde_json::Value;

/// Owns the growing trial collection until the report is built
#[derive(Debug, Default)]
pub struct Aggregator {
    trials: Vec<Trial>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trial: Trial) {
        self.trials.push(trial);
    }

    pub fn extend(&mut self, trials: impl IntoIterator<Item = Trial>) {
        self.trials.extend(trials);
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Build the immutable report
    ///
    /// `key` must have been computed from the resolved inputs before
    /// dispatch; it is not derived from the results.
    pub fn build(
        mut self,
        config: &RunConfig,
        start: NaiveDateTime,
        end: NaiveDateTime,
        key: &str,
        ignores: Vec<Value>,
        retry_hash: Option<String>,
    ) -> Report {
        self.trials.sort_by_key(|trial| trial.seq);

        let mut status = StatusCounts::default();
        for trial in &self.trials {
            match trial.summary_status {
                SummaryBucket::Same => status.same += 1,
                SummaryBucket::Different => status.different += 1,
                SummaryBucket::Failure => status.failure += 1,
            }
        }

        Report {
            version: REPORT_SCHEMA_VERSION.to_string(),
            key: key.to_string(),
            title: config.title.clone(),
            description: config.description.clone(),
            ignores,
            pipeline: config.pipeline.clone(),
            summary: Summary {
                time: TimeSummary {
                    start,
                    end,
                    elapsed_sec: (end - start).num_seconds().max(0) as u64,
                },
                one: config.one.clone(),
                other: config.other.clone(),
                tags: config.tags.clone(),
                status,
                output: config.output.clone(),
                concurrency: config.concurrency,
            },
            trials: self.trials,
            retry_hash,
        }
    }
}
