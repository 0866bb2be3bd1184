use std::fmt;
use thiserror::Error;

/// Shape a raw value was expected to have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Percentage,
    Currency,
    Range,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Number => "numeric",
            ValueKind::Percentage => "percentage",
            ValueKind::Currency => "currency",
            ValueKind::Range => "range",
        };
        write!(f, "{}", name)
    }
}

/// Reasons a logistic model cannot be fit
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("training dataset is empty")]
    EmptyDataset,

    #[error("outcome has {distinct} distinct value(s); at least 2 are required")]
    TooFewOutcomes { distinct: usize },

    #[error("row {row}: outcome value '{value}' is not 0 or 1")]
    InvalidOutcome { row: usize, value: String },

    #[error("predictor '{factor}' has a single level '{level}' in the training data")]
    SingleLevel { factor: String, level: String },

    #[error("design matrix is rank deficient at column '{column}'")]
    RankDeficient { column: String },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("invalid {kind} value '{value}'")]
    Format { kind: ValueKind, value: String },

    #[error("{source_id} row {row}: field '{field}' {reason}")]
    RowFormat {
        source_id: String,
        row: usize,
        field: String,
        reason: String,
    },

    #[error("{source_id}: missing column '{column}'")]
    MissingColumn { source_id: String, column: String },

    #[error("{source_id}: more than one record for state '{state}'")]
    DuplicateKey { source_id: String, state: String },

    #[error("column '{column}' is provided by both '{first}' and '{second}'; supply a rename")]
    ColumnCollision {
        column: String,
        first: String,
        second: String,
    },

    #[error("unknown state '{0}'")]
    UnknownState(String),

    #[error("model fit failed: {0}")]
    Fit(#[from] FitError),

    #[error("{field} level '{value}' not present in training data")]
    UnseenLevel { field: String, value: String },

    #[error("missing predictor '{0}'")]
    MissingPredictor(String),
}

impl PipelineError {
    pub(crate) fn format(kind: ValueKind, value: &str) -> Self {
        PipelineError::Format {
            kind,
            value: value.to_string(),
        }
    }

    pub(crate) fn row(source_id: &str, row: usize, field: &str, reason: impl Into<String>) -> Self {
        PipelineError::RowFormat {
            source_id: source_id.to_string(),
            row,
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
