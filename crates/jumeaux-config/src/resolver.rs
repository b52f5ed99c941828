//! Fold configuration layers into one resolved run configuration

use crate::document::{ConfigDocument, EndpointPatch, Merge, OutputPatch, PipelinePatch};
use crate::error::{ConfigError, ConfigResult};
use jumeaux_core::{
    Concurrency, EndpointSpec, OutputConfig, PipelineConfig, Report, RunConfig, StageDescriptor,
};
use serde_json::json;
use tracing::debug;

/// Retries after the first attempt when no document sets `max_retries`
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_PERSISTENCE_CRITERION: &str = "persistence_criteria/general";

/// Merge `documents` in order (base first, most specific last)
pub fn resolve(documents: &[ConfigDocument]) -> ConfigResult<RunConfig> {
    let mut merged = ConfigDocument::default();
    for document in documents {
        merged.merge(document.clone());
    }
    debug!("Merged {} configuration documents: {:?}", documents.len(), merged);

    finish(merged)
}

/// Rebuild a run configuration from a previous report, then apply `overrides`
pub fn resolve_from_report(
    report: &Report,
    overrides: &[ConfigDocument],
) -> ConfigResult<RunConfig> {
    let summary = &report.summary;
    let mut layers = vec![ConfigDocument {
        one: Some(endpoint_patch(&summary.one)),
        other: Some(endpoint_patch(&summary.other)),
        output: Some(OutputPatch {
            encoding: Some(summary.output.encoding.clone()),
            response_dir: Some(summary.output.response_dir.clone()),
        }),
        threads: Some(1),
        title: report.title.clone(),
        description: report.description.clone(),
        tags: Some(summary.tags.clone()),
        pipeline: Some(PipelinePatch::from(&report.pipeline)),
        ..Default::default()
    }];
    layers.extend(overrides.iter().cloned());

    resolve(&layers)
}

fn endpoint_patch(endpoint: &EndpointSpec) -> EndpointPatch {
    EndpointPatch {
        name: endpoint.name.clone(),
        host: Some(endpoint.host.clone()),
        proxy: endpoint.proxy.clone(),
    }
}

impl From<&PipelineConfig> for PipelinePatch {
    fn from(pipeline: &PipelineConfig) -> Self {
        PipelinePatch {
            merge: Default::default(),
            request_source: Some(pipeline.request_source.clone()),
            request_transform: Some(pipeline.request_transform.clone()),
            response_transform: Some(pipeline.response_transform.clone()),
            response_projection: Some(pipeline.response_projection.clone()),
            judgement: Some(pipeline.judgement.clone()),
            persistence_criteria: Some(pipeline.persistence_criteria.clone()),
            dump: Some(pipeline.dump.clone()),
            post_trial_hook: Some(pipeline.post_trial_hook.clone()),
            final_hook: Some(pipeline.final_hook.clone()),
        }
    }
}

fn finish(merged: ConfigDocument) -> ConfigResult<RunConfig> {
    let one = endpoint(merged.one, "one.host")?;
    let other = endpoint(merged.other, "other.host")?;
    let pipeline = pipeline(merged.pipeline.unwrap_or_default())?;

    let defaults = OutputConfig::default();
    let output = merged.output.unwrap_or_default();
    let output = OutputConfig {
        encoding: output.encoding.unwrap_or(defaults.encoding),
        response_dir: output.response_dir.unwrap_or(defaults.response_dir),
    };

    let concurrency = concurrency(merged.threads, merged.processes)?;

    Ok(RunConfig {
        one,
        other,
        output,
        concurrency,
        max_retries: merged.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        title: merged.title,
        description: merged.description,
        tags: merged.tags.unwrap_or_default(),
        input_files: merged.input_files.unwrap_or_default(),
        pipeline,
    })
}

fn endpoint(patch: Option<EndpointPatch>, field: &'static str) -> ConfigResult<EndpointSpec> {
    let patch = patch.unwrap_or_default();
    let host = patch
        .host
        .filter(|host| !host.is_empty())
        .ok_or(ConfigError::MissingField { field })?;

    Ok(EndpointSpec {
        name: patch.name,
        host,
        proxy: patch.proxy,
    })
}

fn concurrency(threads: Option<usize>, processes: Option<usize>) -> ConfigResult<Concurrency> {
    if threads == Some(0) {
        return Err(ConfigError::InvalidValue {
            key: "threads".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if processes == Some(0) {
        return Err(ConfigError::InvalidValue {
            key: "processes".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    Ok(match processes {
        Some(processes) => Concurrency {
            threads: 1,
            processes: Some(processes),
        },
        None => Concurrency {
            threads: threads.unwrap_or(1),
            processes: None,
        },
    })
}

fn pipeline(patch: PipelinePatch) -> ConfigResult<PipelineConfig> {
    let request_source = patch
        .request_source
        .filter(|source| !source.name.is_empty())
        .ok_or(ConfigError::MissingField {
            field: "pipeline.request_source.name",
        })?;

    let mut persistence_criteria = patch.persistence_criteria.unwrap_or_default();
    if persistence_criteria.is_empty() {
        debug!("No persistence criteria configured, persisting different trials only");
        persistence_criteria.push(
            StageDescriptor::new(DEFAULT_PERSISTENCE_CRITERION)
                .with_config(json!({"statuses": ["different"]})),
        );
    }

    Ok(PipelineConfig {
        request_source,
        request_transform: patch.request_transform.unwrap_or_default(),
        response_transform: patch.response_transform.unwrap_or_default(),
        response_projection: patch.response_projection.unwrap_or_default(),
        judgement: patch.judgement.unwrap_or_default(),
        persistence_criteria,
        dump: patch.dump.unwrap_or_default(),
        post_trial_hook: patch.post_trial_hook.unwrap_or_default(),
        final_hook: patch.final_hook.unwrap_or_default(),
    })
}
