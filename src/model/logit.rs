//! Binary logistic regression fitted by Newton-Raphson (iteratively
//! reweighted least squares).

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::design::{cell, training_column, Design};
use crate::error::{FitError, PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::ingestion::RawTable;

const MIN_WEIGHT: f64 = 1e-10;
const PROBABILITY_FLOOR: f64 = 1e-15;
const PIVOT_TOLERANCE: f64 = 1e-9;

/// Iteration limits for the Newton solver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    pub max_iterations: usize,
    /// converged once no coefficient moves more than this
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z: f64,
}

/// A fitted `outcome ~ predictors` model and the data it was fit on
#[derive(Debug, Clone)]
pub struct FittedModel {
    outcome: String,
    design: Design,
    coefficients: Vec<Coefficient>,
    log_likelihood: f64,
    null_log_likelihood: f64,
    observations: usize,
    iterations: usize,
    converged: bool,
    training: Arc<RawTable>,
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn bernoulli_log_likelihood(y: &[f64], p: &[f64]) -> f64 {
    y.iter()
        .zip(p)
        .map(|(&y, &p)| {
            let p = p.clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR);
            y * p.ln() + (1.0 - y) * (1.0 - p).ln()
        })
        .sum()
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting. A pivot at
/// or below `tolerance` times the largest diagonal entry fails with its
/// column index.
fn solve(a: &[Vec<f64>], b: &[f64], tolerance: f64) -> std::result::Result<Vec<f64>, usize> {
    let n = b.len();
    let scale = a
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].abs())
        .fold(0.0_f64, f64::max);
    if !(scale > 0.0 && scale.is_finite()) {
        return Err(0);
    }
    let mut m: Vec<Vec<f64>> = a
        .iter()
        .zip(b)
        .map(|(row, &rhs)| {
            let mut r = row.clone();
            r.push(rhs);
            r
        })
        .collect();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        if m[pivot][col].abs() <= tolerance * scale {
            return Err(col);
        }
        m.swap(col, pivot);
        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            if factor != 0.0 {
                for k in col..=n {
                    m[row][k] -= factor * m[col][k];
                }
            }
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| m[row][k] * x[k]).sum();
        x[row] = (m[row][n] - tail) / m[row][row];
    }
    Ok(x)
}

/// Unweighted `X' X`; singular exactly when the design columns are linearly
/// dependent
fn gram(x: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let width = x.first().map(Vec::len).unwrap_or(0);
    let mut g = vec![vec![0.0; width]; width];
    for row in x {
        for j in 0..width {
            if row[j] == 0.0 {
                continue;
            }
            for k in 0..width {
                g[j][k] += row[j] * row[k];
            }
        }
    }
    g
}

/// `X' W X` and `X' (y - p)` for the current fit
fn normal_equations(x: &[Vec<f64>], y: &[f64], p: &[f64]) -> (Vec<Vec<f64>>, Vec<f64>) {
    let width = x.first().map(Vec::len).unwrap_or(0);
    let mut info = vec![vec![0.0; width]; width];
    let mut score = vec![0.0; width];
    for ((row, &yi), &pi) in x.iter().zip(y).zip(p) {
        let w = (pi * (1.0 - pi)).max(MIN_WEIGHT);
        let resid = yi - pi;
        for j in 0..width {
            if row[j] == 0.0 {
                continue;
            }
            score[j] += row[j] * resid;
            for k in j..width {
                info[j][k] += w * row[j] * row[k];
            }
        }
    }
    for j in 0..width {
        for k in 0..j {
            info[j][k] = info[k][j];
        }
    }
    (info, score)
}

fn linear_predictor(row: &[f64], beta: &[f64]) -> f64 {
    row.iter().zip(beta).map(|(x, b)| x * b).sum()
}

fn parse_outcome(raw: &str, row: usize) -> std::result::Result<f64, FitError> {
    match raw.trim() {
        "0" => Ok(0.0),
        "1" => Ok(1.0),
        other => Err(FitError::InvalidOutcome {
            row,
            value: other.to_string(),
        }),
    }
}

/// Fit `outcome ~ predictors` treating every predictor as categorical.
pub fn fit(data: &RawTable, outcome: &str, predictors: &[String], options: &FitOptions) -> Result<FittedModel> {
    fit_with_interactions(data, outcome, predictors, &[], options)
}

/// Fit with additional pairwise interaction terms.
pub fn fit_with_interactions(
    data: &RawTable,
    outcome: &str,
    predictors: &[String],
    interactions: &[(String, String)],
    options: &FitOptions,
) -> Result<FittedModel> {
    let started = Instant::now();
    match fit_inner(data, outcome, predictors, interactions, options) {
        Ok(model) => {
            info!(
                formula = %model.formula(),
                observations = model.observations,
                iterations = model.iterations,
                log_likelihood = model.log_likelihood,
                pseudo_r_squared = model.pseudo_r_squared(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "fitted logistic model"
            );
            if !model.converged {
                warn!(
                    formula = %model.formula(),
                    iterations = model.iterations,
                    "maximum iterations reached before convergence; some levels may be separated"
                );
            }
            metrics::model::fit_completed(model.iterations);
            Ok(model)
        }
        Err(e) => {
            warn!(error = %e, "logistic fit failed");
            let reason = match &e {
                PipelineError::Fit(FitError::EmptyDataset) => "empty_dataset",
                PipelineError::Fit(FitError::TooFewOutcomes { .. }) => "too_few_outcomes",
                PipelineError::Fit(FitError::InvalidOutcome { .. }) => "invalid_outcome",
                PipelineError::Fit(FitError::SingleLevel { .. }) => "single_level",
                PipelineError::Fit(FitError::RankDeficient { .. }) => "rank_deficient",
                _ => "input",
            };
            metrics::model::fit_failed(reason);
            Err(e)
        }
    }
}

fn fit_inner(
    data: &RawTable,
    outcome: &str,
    predictors: &[String],
    interactions: &[(String, String)],
    options: &FitOptions,
) -> Result<FittedModel> {
    if data.is_empty() {
        return Err(FitError::EmptyDataset.into());
    }
    let outcome_col = training_column(data, outcome)?;
    let y = data
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| parse_outcome(cell(row, outcome_col), i + 1))
        .collect::<std::result::Result<Vec<f64>, FitError>>()?;
    let positives = y.iter().filter(|&&v| v == 1.0).count();
    let distinct = usize::from(positives > 0) + usize::from(positives < y.len());
    if distinct < 2 {
        return Err(FitError::TooFewOutcomes { distinct }.into());
    }

    let design = Design::from_table(data, predictors, interactions)?;
    let x = data
        .rows
        .iter()
        .map(|row| Ok(design.encode(&design.training_indices(data, row)?)))
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let width = design.width();
    let zeros = vec![0.0; width];
    solve(&gram(&x), &zeros, PIVOT_TOLERANCE).map_err(|col| FitError::RankDeficient {
        column: design.columns[col].clone(),
    })?;

    // X has full rank, so X'WX stays positive definite while the weights are
    // floored. Separated levels shrink their weights toward the floor and the
    // steps decay without reaching the tolerance.
    let mut beta = zeros;
    let mut iterations = 0;
    let mut converged = false;
    while iterations < options.max_iterations {
        iterations += 1;
        let p: Vec<f64> = x.iter().map(|row| sigmoid(linear_predictor(row, &beta))).collect();
        let (info, score) = normal_equations(&x, &y, &p);
        let Ok(step) = solve(&info, &score, 0.0) else {
            debug!(iteration = iterations, "weighted system became singular");
            break;
        };

        let largest = step.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        if !largest.is_finite() {
            debug!(iteration = iterations, "non-finite newton step");
            break;
        }
        for (b, s) in beta.iter_mut().zip(&step) {
            *b += s;
        }
        debug!(iteration = iterations, max_step = largest, "newton step");
        if largest < options.tolerance {
            converged = true;
            break;
        }
    }

    let p: Vec<f64> = x.iter().map(|row| sigmoid(linear_predictor(row, &beta))).collect();
    let (info, _) = normal_equations(&x, &y, &p);
    let std_errors = covariance_diagonal(&info).unwrap_or_else(|_| vec![f64::INFINITY; width]);

    let coefficients = design
        .columns
        .iter()
        .zip(beta.iter().zip(&std_errors))
        .map(|(name, (&estimate, &variance))| {
            let std_error = variance.max(0.0).sqrt();
            Coefficient {
                name: name.clone(),
                estimate,
                std_error,
                z: estimate / std_error,
            }
        })
        .collect();

    let n = y.len() as f64;
    let mean = positives as f64 / n;
    let null_log_likelihood = n * (mean * mean.ln() + (1.0 - mean) * (1.0 - mean).ln());

    Ok(FittedModel {
        outcome: outcome.to_string(),
        coefficients,
        log_likelihood: bernoulli_log_likelihood(&y, &p),
        null_log_likelihood,
        observations: y.len(),
        iterations,
        converged,
        design,
        training: Arc::new(data.clone()),
    })
}

/// Diagonal of `info`'s inverse, one solve per unit vector
fn covariance_diagonal(info: &[Vec<f64>]) -> std::result::Result<Vec<f64>, usize> {
    let n = info.len();
    (0..n)
        .map(|j| {
            let mut unit = vec![0.0; n];
            unit[j] = 1.0;
            solve(info, &unit, 0.0).map(|col| col[j])
        })
        .collect()
}

impl FittedModel {
    /// Probability of the positive outcome for one observation.
    ///
    /// Every predictor must be present and use a level seen in training.
    pub fn predict(&self, input: &HashMap<String, String>) -> Result<f64> {
        let indices = self.design.input_indices(input)?;
        let row = self.design.encode(&indices);
        let beta: Vec<f64> = self.coefficients.iter().map(|c| c.estimate).collect();
        let probability = sigmoid(linear_predictor(&row, &beta));
        if !probability.is_finite() {
            let described = self
                .design
                .factors
                .iter()
                .zip(&indices)
                .map(|(f, &i)| format!("{}={}", f.name, f.levels[i]))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(PipelineError::UnseenLevel {
                field: "input".to_string(),
                value: described,
            });
        }
        Ok(probability)
    }

    pub fn outcome(&self) -> &str {
        &self.outcome
    }

    pub fn predictors(&self) -> Vec<&str> {
        self.design.factors.iter().map(|f| f.name.as_str()).collect()
    }

    /// `outcome ~ a + b + a:b`
    pub fn formula(&self) -> String {
        let mut terms = self.predictors().iter().map(|p| p.to_string()).collect::<Vec<_>>();
        for &(a, b) in &self.design.interactions {
            terms.push(format!("{}:{}", self.design.factors[a].name, self.design.factors[b].name));
        }
        format!("{} ~ {}", self.outcome, terms.join(" + "))
    }

    pub fn coefficients(&self) -> &[Coefficient] {
        &self.coefficients
    }

    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.coefficients.iter().find(|c| c.name == name).map(|c| c.estimate)
    }

    /// Observed levels per predictor, reference first
    pub fn levels(&self) -> BTreeMap<String, Vec<String>> {
        self.design.levels()
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn null_log_likelihood(&self) -> f64 {
        self.null_log_likelihood
    }

    /// McFadden's pseudo R-squared
    pub fn pseudo_r_squared(&self) -> f64 {
        1.0 - self.log_likelihood / self.null_log_likelihood
    }

    pub fn observations(&self) -> usize {
        self.observations
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// False when the iteration limit was hit first, typically because a
    /// level has only one outcome value. Predictions stay finite either way.
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn training_data(&self) -> &RawTable {
        &self.training
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        let width = self
            .coefficients
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0)
            .max(9);
        let _ = writeln!(out, "Logit regression: {}", self.formula());
        let _ = writeln!(out, "Observations:       {}", self.observations);
        let _ = writeln!(out, "Iterations:         {}", self.iterations);
        let _ = writeln!(out, "Converged:          {}", self.converged);
        let _ = writeln!(out, "Log-likelihood:     {:.4}", self.log_likelihood);
        let _ = writeln!(out, "LL-Null:            {:.4}", self.null_log_likelihood);
        let _ = writeln!(out, "Pseudo R-squared:   {:.4}", self.pseudo_r_squared());
        let _ = writeln!(out);
        let _ = writeln!(out, "{:<width$} {:>10} {:>10} {:>8}", "term", "coef", "std err", "z");
        for c in &self.coefficients {
            let _ = writeln!(
                out,
                "{:<width$} {:>10.4} {:>10.4} {:>8.3}",
                c.name, c.estimate, c.std_error, c.z
            );
        }
        out
    }
}
