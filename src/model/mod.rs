//! Logistic regression of the binary mortality label on categorical
//! demographic predictors.

pub mod cache;
pub mod design;
pub mod logit;
pub mod search;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::{OUTCOME_FIELD, PREDICTOR_FIELDS, RACE_FIELD};
use crate::error::Result;
use crate::pipeline::ingestion::RawTable;

pub use cache::ModelCache;
pub use design::{Design, Factor};
pub use logit::{fit, fit_with_interactions, Coefficient, FitOptions, FittedModel};
pub use search::{interaction_search, SearchOptions, SearchReport};

/// Race excluded from training by default
pub const DEFAULT_EXCLUDED_RACE: &str = "American Indian or Alaska Native";

/// What to fit and which rows to leave out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSpec {
    pub outcome: String,
    pub predictors: Vec<String>,
    pub excluded_races: Vec<String>,
    pub options: FitOptions,
}

impl Default for TrainingSpec {
    fn default() -> Self {
        Self {
            outcome: OUTCOME_FIELD.to_string(),
            predictors: PREDICTOR_FIELDS.iter().map(|p| p.to_string()).collect(),
            excluded_races: vec![DEFAULT_EXCLUDED_RACE.to_string()],
            options: FitOptions::default(),
        }
    }
}

impl TrainingSpec {
    /// Drop rows whose race is excluded. Tables without a race column pass
    /// through unchanged.
    pub fn prepare(&self, data: &RawTable) -> RawTable {
        let Some(race_col) = data.column_index(RACE_FIELD) else {
            return data.clone();
        };
        if self.excluded_races.is_empty() {
            return data.clone();
        }
        let prepared = data.filter_rows(|row| {
            let race = row.get(race_col).map(|r| r.trim()).unwrap_or("");
            !self.excluded_races.iter().any(|x| x.trim().eq_ignore_ascii_case(race))
        });
        info!(
            rows = data.len(),
            excluded = data.len() - prepared.len(),
            "prepared training frame"
        );
        prepared
    }

    /// Prepare `data` and fit the main-effects model on it
    pub fn fit(&self, data: &RawTable) -> Result<FittedModel> {
        fit(&self.prepare(data), &self.outcome, &self.predictors, &self.options)
    }
}
