//! Persistence criteria

use jumeaux_core::{StageCategory, Status, SummaryBucket};
use serde::Deserialize;
use std::sync::Arc;

use crate::registry::stage_config;
use crate::stage::{PersistenceCriterion, PersistenceReference, Stage};
use crate::StageRegistry;

pub fn register(registry: &StageRegistry) {
    registry.register(StageCategory::PersistenceCriteria, "persistence_criteria/general", |d| {
        Ok(Stage::PersistenceCriterion(Arc::new(General {
            config: stage_config(d)?,
        })))
    });
    registry.register(StageCategory::PersistenceCriteria, "persistence_criteria/free", |_| {
        Ok(Stage::PersistenceCriterion(Arc::new(Free)))
    });
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    pub statuses: Vec<Status>,
}

/// Persist trials whose judged status is listed
///
/// A trial that the judgement stages regard as same counts as `same`,
/// whatever its structural status.
pub struct General {
    config: GeneralConfig,
}

impl PersistenceCriterion for General {
    fn should_persist(&self, reference: &PersistenceReference<'_>) -> bool {
        let status = match reference.summary_status {
            SummaryBucket::Same => Status::Same,
            _ => reference.status,
        };
        self.config.statuses.contains(&status)
    }
}

/// Persist every trial
pub struct Free;

impl PersistenceCriterion for Free {
    fn should_persist(&self, _reference: &PersistenceReference<'_>) -> bool {
        true
    }
}
