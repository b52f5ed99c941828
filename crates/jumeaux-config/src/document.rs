//! Partial configuration documents
//!
//! Each configuration layer (base file, overrides, command-line arguments)
//! is one [`ConfigDocument`]. Every field is optional; the merge rule of a
//! field is declared by the [`Merge`] impl of the struct that owns it.

use jumeaux_core::StageDescriptor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Combine a later layer into an earlier one
pub trait Merge {
    fn merge(&mut self, later: Self);
}

/// Last non-absent value wins
fn last_wins<T>(earlier: &mut Option<T>, later: Option<T>) {
    if later.is_some() {
        *earlier = later;
    }
}

/// Field-wise merge of nested partial structs
fn merge_nested<T: Merge>(earlier: &mut Option<T>, later: Option<T>) {
    match (earlier.as_mut(), later) {
        (Some(current), Some(later)) => current.merge(later),
        (None, Some(later)) => *earlier = Some(later),
        (_, None) => {}
    }
}

/// How a document's pipeline lists combine with earlier layers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Append this document's stages after the earlier ones
    #[default]
    Extend,
    /// Replace every category this document names
    Override,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPatch {
    pub name: Option<String>,
    pub host: Option<String>,
    pub proxy: Option<String>,
}

impl Merge for EndpointPatch {
    fn merge(&mut self, later: Self) {
        last_wins(&mut self.name, later.name);
        last_wins(&mut self.host, later.host);
        last_wins(&mut self.proxy, later.proxy);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPatch {
    pub encoding: Option<String>,
    pub response_dir: Option<PathBuf>,
}

impl Merge for OutputPatch {
    fn merge(&mut self, later: Self) {
        last_wins(&mut self.encoding, later.encoding);
        last_wins(&mut self.response_dir, later.response_dir);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelinePatch {
    /// Merge mode of this document's lists; not carried across layers
    #[serde(default)]
    pub merge: MergeMode,
    pub request_source: Option<StageDescriptor>,
    pub request_transform: Option<Vec<StageDescriptor>>,
    pub response_transform: Option<Vec<StageDescriptor>>,
    pub response_projection: Option<Vec<StageDescriptor>>,
    pub judgement: Option<Vec<StageDescriptor>>,
    pub persistence_criteria: Option<Vec<StageDescriptor>>,
    pub dump: Option<Vec<StageDescriptor>>,
    pub post_trial_hook: Option<Vec<StageDescriptor>>,
    pub final_hook: Option<Vec<StageDescriptor>>,
}

fn merge_list(
    earlier: &mut Option<Vec<StageDescriptor>>,
    later: Option<Vec<StageDescriptor>>,
    mode: MergeMode,
) {
    let Some(later) = later else {
        return;
    };

    match (mode, earlier.as_mut()) {
        (MergeMode::Extend, Some(current)) => current.extend(later),
        _ => *earlier = Some(later),
    }
}

impl Merge for PipelinePatch {
    fn merge(&mut self, later: Self) {
        let mode = later.merge;
        // A single stage, so it is replaced rather than extended
        last_wins(&mut self.request_source, later.request_source);
        merge_list(&mut self.request_transform, later.request_transform, mode);
        merge_list(&mut self.response_transform, later.response_transform, mode);
        merge_list(&mut self.response_projection, later.response_projection, mode);
        merge_list(&mut self.judgement, later.judgement, mode);
        merge_list(&mut self.persistence_criteria, later.persistence_criteria, mode);
        merge_list(&mut self.dump, later.dump, mode);
        merge_list(&mut self.post_trial_hook, later.post_trial_hook, mode);
        merge_list(&mut self.final_hook, later.final_hook, mode);
    }
}

/// One configuration layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    pub one: Option<EndpointPatch>,
    pub other: Option<EndpointPatch>,
    pub output: Option<OutputPatch>,
    pub threads: Option<usize>,
    pub processes: Option<usize>,
    pub max_retries: Option<u32>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub input_files: Option<Vec<PathBuf>>,
    pub pipeline: Option<PipelinePatch>,
}

impl Merge for ConfigDocument {
    fn merge(&mut self, later: Self) {
        merge_nested(&mut self.one, later.one);
        merge_nested(&mut self.other, later.other);
        merge_nested(&mut self.output, later.output);
        last_wins(&mut self.threads, later.threads);
        last_wins(&mut self.processes, later.processes);
        last_wins(&mut self.max_retries, later.max_retries);
        last_wins(&mut self.title, later.title);
        last_wins(&mut self.description, later.description);
        last_wins(&mut self.tags, later.tags);
        last_wins(&mut self.input_files, later.input_files);
        merge_nested(&mut self.pipeline, later.pipeline);
    }
}
