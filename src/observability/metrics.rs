//! Pipeline metrics on the `metrics` facade.
//!
//! Recording functions are grouped by phase. Without an installed recorder
//! every call is a no-op, so the CLI and tests never need to initialize one.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::{PipelineError, Result};

/// Every metric name the pipeline records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Clean metrics
    CleanRowsCleaned,
    CleanRowsDropped,

    // Merge metrics
    MergeRowsJoined,

    // Model metrics
    ModelFitCompleted,
    ModelFitFailed,
    ModelFitIterations,
    ModelPredictionServed,
    ModelPredictionRejected,

    // Cache metrics
    CacheHit,
    CacheMiss,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::CleanRowsCleaned => "mortality_clean_rows_cleaned_total",
            MetricName::CleanRowsDropped => "mortality_clean_rows_dropped_total",
            MetricName::MergeRowsJoined => "mortality_merge_rows_joined_total",
            MetricName::ModelFitCompleted => "mortality_model_fit_completed_total",
            MetricName::ModelFitFailed => "mortality_model_fit_failed_total",
            MetricName::ModelFitIterations => "mortality_model_fit_iterations",
            MetricName::ModelPredictionServed => "mortality_model_prediction_served_total",
            MetricName::ModelPredictionRejected => "mortality_model_prediction_rejected_total",
            MetricName::CacheHit => "mortality_cache_hit_total",
            MetricName::CacheMiss => "mortality_cache_miss_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            CleanRowsCleaned,
            CleanRowsDropped,
            MergeRowsJoined,
            ModelFitCompleted,
            ModelFitFailed,
            ModelFitIterations,
            ModelPredictionServed,
            ModelPredictionRejected,
            CacheHit,
            CacheMiss,
        ]
        .into_iter()
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the in-process Prometheus recorder. Calling again is a no-op.
pub fn init_metrics() -> Result<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| PipelineError::Config(format!("Failed to install Prometheus recorder: {}", e)))?;
    let _ = METRICS_HANDLE.set(handle);
    info!("Metrics recorder installed");
    Ok(())
}

/// Prometheus text exposition of everything recorded so far
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

// ============================================================================
// Clean Metrics
// ============================================================================

pub mod clean {
    use super::MetricName;

    pub fn rows_cleaned(source: &str, rows: usize) {
        ::metrics::counter!(MetricName::CleanRowsCleaned.as_str(), "source" => source.to_string())
            .increment(rows as u64);
    }

    pub fn rows_dropped(source: &str, rows: usize) {
        ::metrics::counter!(MetricName::CleanRowsDropped.as_str(), "source" => source.to_string())
            .increment(rows as u64);
    }
}

// ============================================================================
// Merge Metrics
// ============================================================================

pub mod merge {
    use super::MetricName;

    /// Rows written by a merge driven by `primary`
    pub fn rows_joined(primary: &str, rows: usize) {
        ::metrics::counter!(MetricName::MergeRowsJoined.as_str(), "primary" => primary.to_string())
            .increment(rows as u64);
    }
}

// ============================================================================
// Model Metrics
// ============================================================================

pub mod model {
    use super::MetricName;

    pub fn fit_completed(iterations: usize) {
        ::metrics::counter!(MetricName::ModelFitCompleted.as_str()).increment(1);
        ::metrics::histogram!(MetricName::ModelFitIterations.as_str()).record(iterations as f64);
    }

    pub fn fit_failed(reason: &str) {
        ::metrics::counter!(MetricName::ModelFitFailed.as_str(), "reason" => reason.to_string()).increment(1);
    }

    pub fn prediction_served() {
        ::metrics::counter!(MetricName::ModelPredictionServed.as_str()).increment(1);
    }

    /// A request referencing a level or field the model cannot score
    pub fn prediction_rejected(field: &str) {
        ::metrics::counter!(MetricName::ModelPredictionRejected.as_str(), "field" => field.to_string())
            .increment(1);
    }
}

// ============================================================================
// Cache Metrics
// ============================================================================

pub mod cache {
    use super::MetricName;

    pub fn hit() {
        ::metrics::counter!(MetricName::CacheHit.as_str()).increment(1);
    }

    pub fn miss() {
        ::metrics::counter!(MetricName::CacheMiss.as_str()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_are_unique_and_prefixed() {
        let names: HashSet<&str> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        assert_eq!(names.len(), MetricName::all_metrics().count());
        assert!(names.iter().all(|n| n.starts_with("mortality_")));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        clean::rows_cleaned("regional", 3);
        model::prediction_rejected("education");
        cache::miss();
    }
}
