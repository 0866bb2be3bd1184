//! Exploratory search over pairwise interaction terms.
//!
//! Rows are split once with a seeded shuffle; the main-effects model and one
//! model per predictor pair are fit on the training part and scored by
//! out-of-sample R-squared of their predicted probabilities.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use super::design::{cell, training_column};
use super::logit::{fit_with_interactions, FitOptions, FittedModel};
use crate::error::{PipelineError, Result};
use crate::pipeline::ingestion::RawTable;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// share of rows used for fitting
    pub train_fraction: f64,
    pub seed: u64,
    pub fit: FitOptions,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            seed: 42,
            fit: FitOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Scored {
        r_squared: f64,
        scored_rows: usize,
        /// test rows with a level the training split never saw
        skipped_rows: usize,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub formula: String,
    pub interaction: Option<(String, String)>,
    pub outcome: CandidateOutcome,
}

impl Candidate {
    pub fn r_squared(&self) -> Option<f64> {
        match self.outcome {
            CandidateOutcome::Scored { r_squared, .. } => Some(r_squared),
            CandidateOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub baseline: Candidate,
    pub candidates: Vec<Candidate>,
}

impl SearchReport {
    /// Highest scoring model, the baseline included
    pub fn best(&self) -> Option<&Candidate> {
        std::iter::once(&self.baseline)
            .chain(&self.candidates)
            .filter(|c| c.r_squared().is_some_and(f64::is_finite))
            .max_by(|a, b| {
                a.r_squared()
                    .unwrap_or(f64::NEG_INFINITY)
                    .total_cmp(&b.r_squared().unwrap_or(f64::NEG_INFINITY))
            })
    }

    pub fn render(&self) -> String {
        let mut lines = vec![format!(
            "Interaction search: {} training rows, {} test rows",
            self.train_rows, self.test_rows
        )];
        for candidate in std::iter::once(&self.baseline).chain(&self.candidates) {
            let line = match &candidate.outcome {
                CandidateOutcome::Scored {
                    r_squared,
                    scored_rows,
                    skipped_rows,
                } => format!(
                    "  {:<70} R2 = {:>8.4}  (scored {}, skipped {})",
                    candidate.formula, r_squared, scored_rows, skipped_rows
                ),
                CandidateOutcome::Failed { reason } => {
                    format!("  {:<70} failed: {}", candidate.formula, reason)
                }
            };
            lines.push(line);
        }
        if let Some(best) = self.best() {
            lines.push(format!("Best: {}", best.formula));
        }
        lines.join("\n")
    }
}

/// Seeded train/test split of the table's rows
pub fn split(data: &RawTable, train_fraction: f64, seed: u64) -> Result<(RawTable, RawTable)> {
    if data.len() < 2 {
        return Err(PipelineError::Config(format!(
            "need at least 2 rows to split, got {}",
            data.len()
        )));
    }
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(PipelineError::Config(format!(
            "train fraction must be in (0, 1), got {}",
            train_fraction
        )));
    }
    let mut order: Vec<usize> = (0..data.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let train_rows = ((data.len() as f64) * train_fraction).round() as usize;
    let train_rows = train_rows.clamp(1, data.len() - 1);
    let pick = |indices: &[usize]| RawTable::new(data.headers.clone(), indices.iter().map(|&i| data.rows[i].clone()).collect());
    Ok((pick(&order[..train_rows]), pick(&order[train_rows..])))
}

/// Out-of-sample R-squared of `model` on `test`
fn score(model: &FittedModel, test: &RawTable, outcome: &str) -> Result<CandidateOutcome> {
    let outcome_col = training_column(test, outcome)?;
    let columns = model
        .predictors()
        .iter()
        .map(|p| Ok((p.to_string(), training_column(test, p)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut observed = Vec::new();
    let mut predicted = Vec::new();
    let mut skipped_rows = 0;
    for row in &test.rows {
        let input: HashMap<String, String> = columns
            .iter()
            .map(|(name, col)| (name.clone(), cell(row, *col).to_string()))
            .collect();
        match model.predict(&input) {
            Ok(p) => {
                let y = match cell(row, outcome_col).trim() {
                    "1" => 1.0,
                    _ => 0.0,
                };
                observed.push(y);
                predicted.push(p);
            }
            Err(PipelineError::UnseenLevel { .. }) => skipped_rows += 1,
            Err(e) => return Err(e),
        }
    }

    if observed.is_empty() {
        return Ok(CandidateOutcome::Failed {
            reason: "no test rows could be scored".to_string(),
        });
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    let sst: f64 = observed.iter().map(|y| (y - mean).powi(2)).sum();
    if sst == 0.0 {
        return Ok(CandidateOutcome::Failed {
            reason: "held-out outcomes have no variance".to_string(),
        });
    }
    let sse: f64 = observed
        .iter()
        .zip(&predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();

    Ok(CandidateOutcome::Scored {
        r_squared: 1.0 - sse / sst,
        scored_rows: observed.len(),
        skipped_rows,
    })
}

fn evaluate(
    train: &RawTable,
    test: &RawTable,
    outcome: &str,
    predictors: &[String],
    interaction: Option<(String, String)>,
    options: &FitOptions,
) -> Result<Candidate> {
    let interactions: Vec<(String, String)> = interaction.iter().cloned().collect();
    let mut formula = format!("{} ~ {}", outcome, predictors.join(" + "));
    if let Some((a, b)) = &interaction {
        formula.push_str(&format!(" + {}:{}", a, b));
    }

    let outcome_result = match fit_with_interactions(train, outcome, predictors, &interactions, options) {
        Ok(model) => score(&model, test, outcome)?,
        Err(PipelineError::Fit(e)) => CandidateOutcome::Failed { reason: e.to_string() },
        Err(e) => return Err(e),
    };
    Ok(Candidate {
        formula,
        interaction,
        outcome: outcome_result,
    })
}

/// Score the main-effects model and every pairwise interaction of `predictors`.
pub fn interaction_search(
    data: &RawTable,
    outcome: &str,
    predictors: &[String],
    options: &SearchOptions,
) -> Result<SearchReport> {
    let span = info_span!("interaction_search", seed = options.seed);
    let _enter = span.enter();

    let (train, test) = split(data, options.train_fraction, options.seed)?;
    let baseline = evaluate(&train, &test, outcome, predictors, None, &options.fit)?;
    if let CandidateOutcome::Failed { reason } = &baseline.outcome {
        warn!(reason = %reason, "baseline model could not be scored");
    }

    let mut candidates = Vec::new();
    for (i, a) in predictors.iter().enumerate() {
        for b in &predictors[i + 1..] {
            candidates.push(evaluate(
                &train,
                &test,
                outcome,
                predictors,
                Some((a.clone(), b.clone())),
                &options.fit,
            )?);
        }
    }

    let report = SearchReport {
        train_rows: train.len(),
        test_rows: test.len(),
        baseline,
        candidates,
    };
    info!(
        candidates = report.candidates.len(),
        best = report.best().map(|c| c.formula.as_str()).unwrap_or("none"),
        "interaction search finished"
    );
    Ok(report)
}
