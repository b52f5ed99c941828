//! Post-trial and final hooks

use async_trait::async_trait;
use jumeaux_core::{OutputConfig, Report, StageCategory, Trial};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{StageError, StageResult};
use crate::registry::stage_config;
use crate::stage::{FinalHook, PostTrialHook, Stage};
use crate::StageRegistry;

pub const JSONL: &str = "post_trial_hook/jsonl";
pub const JSON_REPORT: &str = "final_hook/json";
pub const SUMMARY: &str = "final_hook/summary";

pub fn register(registry: &StageRegistry) {
    registry.register(StageCategory::PostTrialHook, JSONL, |d| {
        let config: JsonlConfig = stage_config(d)?;
        Ok(Stage::PostTrialHook(Arc::new(JsonlHook {
            path: config.path,
            lock: Mutex::new(()),
        })))
    });
    registry.register(StageCategory::FinalHook, JSON_REPORT, |d| {
        Ok(Stage::FinalHook(Arc::new(JsonReportHook {
            config: stage_config(d)?,
        })))
    });
    registry.register(StageCategory::FinalHook, SUMMARY, |_| {
        Ok(Stage::FinalHook(Arc::new(SummaryHook)))
    });
}

async fn ensure_parent(stage: &str, path: &Path) -> StageResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StageError::Write {
                stage: stage.to_string(),
                path: parent.to_path_buf(),
                source: e,
            }),
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonlConfig {
    path: PathBuf,
}

/// Append every finished trial to a file as one JSON line
pub struct JsonlHook {
    path: PathBuf,
    /// Serializes appends from concurrent workers
    lock: Mutex<()>,
}

#[async_trait]
impl PostTrialHook for JsonlHook {
    async fn observe(&self, trial: &Trial) -> StageResult<()> {
        let mut line = serde_json::to_vec(trial).map_err(|e| StageError::Serialize {
            stage: JSONL.to_string(),
            source: e,
        })?;
        line.push(b'\n');

        let write_error = |e| StageError::Write {
            stage: JSONL.to_string(),
            path: self.path.clone(),
            source: e,
        };

        let _guard = self.lock.lock().await;
        ensure_parent(JSONL, &self.path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(write_error)?;
        file.write_all(&line).await.map_err(write_error)?;
        file.flush().await.map_err(write_error)?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonReportConfig {
    /// Defaults to `<response_dir>/<key>/report.json`
    pub path: Option<PathBuf>,
}

/// Write the sealed report as pretty JSON
pub struct JsonReportHook {
    config: JsonReportConfig,
}

#[async_trait]
impl FinalHook for JsonReportHook {
    async fn finalize(&self, report: &Report, output: &OutputConfig) -> StageResult<()> {
        let path = self
            .config
            .path
            .clone()
            .unwrap_or_else(|| output.response_dir.join(&report.key).join("report.json"));

        let body = serde_json::to_vec_pretty(report).map_err(|e| StageError::Serialize {
            stage: JSON_REPORT.to_string(),
            source: e,
        })?;

        ensure_parent(JSON_REPORT, &path).await?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| StageError::Write {
                stage: JSON_REPORT.to_string(),
                path: path.clone(),
                source: e,
            })?;

        debug!(path = ?path, "Wrote report");
        Ok(())
    }
}

/// Log the status counts of the report
pub struct SummaryHook;

#[async_trait]
impl FinalHook for SummaryHook {
    async fn finalize(&self, report: &Report, _output: &OutputConfig) -> StageResult<()> {
        let status = &report.summary.status;
        info!(
            key = %report.key,
            same = status.same,
            different = status.different,
            failure = status.failure,
            elapsed_sec = report.summary.time.elapsed_sec,
            "Challenge finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use jumeaux_core::{
        Concurrency, EndpointOutcome, EndpointSpec, PipelineConfig, StageDescriptor, Status,
        StatusCounts, Summary, SummaryBucket, TimeSummary, REPORT_SCHEMA_VERSION,
    };
    use tempfile::TempDir;

    fn time() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap()
    }

    fn trial(seq: u64) -> Trial {
        Trial {
            seq,
            name: seq.to_string(),
            request_time: time(),
            status: Status::Same,
            summary_status: SummaryBucket::Same,
            path: "/a".into(),
            queries: Default::default(),
            headers: Default::default(),
            diff_keys: None,
            one: EndpointOutcome::failed("http://one/a"),
            other: EndpointOutcome::failed("http://other/a"),
        }
    }

    fn report(output: &OutputConfig) -> Report {
        Report {
            version: REPORT_SCHEMA_VERSION.to_string(),
            key: "abc123".into(),
            title: None,
            description: None,
            ignores: vec![],
            pipeline: PipelineConfig::new(StageDescriptor::new("request_source/plain")),
            summary: Summary {
                time: TimeSummary {
                    start: time(),
                    end: time(),
                    elapsed_sec: 0,
                },
                one: EndpointSpec::new("http://one"),
                other: EndpointSpec::new("http://other"),
                tags: vec![],
                status: StatusCounts {
                    same: 1,
                    different: 0,
                    failure: 0,
                },
                output: output.clone(),
                concurrency: Concurrency::default(),
            },
            trials: vec![trial(1)],
            retry_hash: None,
        }
    }

    #[tokio::test]
    async fn test_jsonl_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/trials.jsonl");
        let hook = JsonlHook {
            path: path.clone(),
            lock: Mutex::new(()),
        };

        hook.observe(&trial(1)).await.unwrap();
        hook.observe(&trial(2)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: Trial = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.seq, 2);
    }

    #[tokio::test]
    async fn test_json_report_default_path() {
        let dir = TempDir::new().unwrap();
        let output = OutputConfig {
            encoding: "utf8".into(),
            response_dir: dir.path().to_path_buf(),
        };
        let hook = JsonReportHook {
            config: JsonReportConfig::default(),
        };

        hook.finalize(&report(&output), &output).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("abc123/report.json")).unwrap();
        let parsed: Report = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, report(&output));
    }

    #[tokio::test]
    async fn test_summary_hook() {
        let output = OutputConfig::default();
        assert!(SummaryHook.finalize(&report(&output), &output).await.is_ok());
    }
}
