//! Per-source cleaning of raw tables into canonical rows.

pub mod cleaners;
pub mod registry;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::STATE_COLUMN;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::ingestion::{RawTable, SchemaRow, SourceSchema};
use crate::pipeline::processing::normalize::normalize_state_name;
use crate::pipeline::processing::states;

pub use registry::{CleanSummary, CleanerRegistry};

/// What a cleaner decided about one raw row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome<R> {
    Keep(R),
    /// Known non-data row (aggregate, footer); the reason is logged
    Drop(String),
}

/// A row filtered out during cleaning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedRow {
    pub row: usize,
    pub reason: String,
}

/// Output of one cleaner run
#[derive(Debug, Clone)]
pub struct Cleaned<R> {
    pub source_id: String,
    pub records: Vec<R>,
    pub dropped: Vec<DroppedRow>,
    /// State names kept in the table that have no abbreviation
    pub incomplete: Vec<String>,
}

impl<R> Cleaned<R> {
    fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            records: Vec::new(),
            dropped: Vec::new(),
            incomplete: Vec::new(),
        }
    }
}

/// Trait for source-specific cleaning of one raw table
pub trait SourceCleaner {
    type Record: Serialize;

    /// Human readable name for logs
    fn name(&self) -> &str;

    /// Declared raw layout, including any configured header overrides
    fn schema(&self) -> &SourceSchema;

    /// Header of the cleaned table
    fn output_columns(&self) -> &'static [&'static str];

    fn clean_row(&self, row: &SchemaRow<'_>) -> Result<RowOutcome<Self::Record>>;

    /// Join key of a record, for sources keyed by state
    fn state_key<'r>(&self, _record: &'r Self::Record) -> Option<&'r str> {
        None
    }

    fn source_id(&self) -> &str {
        &self.schema().source_id
    }

    /// Clean every row. Any malformed row fails the whole table.
    fn clean(&self, raw: &RawTable) -> Result<Cleaned<Self::Record>> {
        let bound = self.schema().bind(raw)?;
        let mut cleaned = Cleaned::new(self.source_id());
        let mut seen = HashSet::new();

        for row in bound.rows() {
            match self.clean_row(&row)? {
                RowOutcome::Keep(record) => {
                    if let Some(state) = self.state_key(&record).map(str::to_string) {
                        if !states::is_known_state(&state) {
                            warn!(source = self.source_id(), row = row.index(), state = %state, "state has no abbreviation; row flagged incomplete");
                            cleaned.incomplete.push(state.clone());
                        }
                        if !seen.insert(state.clone()) {
                            return Err(PipelineError::DuplicateKey {
                                source_id: self.source_id().to_string(),
                                state,
                            });
                        }
                    }
                    cleaned.records.push(record);
                }
                RowOutcome::Drop(reason) => {
                    debug!(source = self.source_id(), row = row.index(), reason = %reason, "dropped row");
                    cleaned.dropped.push(DroppedRow {
                        row: row.index(),
                        reason,
                    });
                }
            }
        }

        info!(
            source = self.source_id(),
            cleaner = self.name(),
            read = bound.len(),
            kept = cleaned.records.len(),
            dropped = cleaned.dropped.len(),
            incomplete = cleaned.incomplete.len(),
            "cleaned source table"
        );
        metrics::clean::rows_cleaned(self.source_id(), cleaned.records.len());
        metrics::clean::rows_dropped(self.source_id(), cleaned.dropped.len());
        Ok(cleaned)
    }
}

/// Canonical state key of a row, or `None` for rows that are not a state
/// (blank key, national aggregate).
pub(crate) fn read_state(row: &SchemaRow<'_>) -> Result<Option<String>> {
    let key = normalize_state_name(row.get(STATE_COLUMN)?);
    if key.is_empty() || states::is_national_aggregate(&key) {
        return Ok(None);
    }
    Ok(Some(key))
}

/// Parse a field with `parse`, reporting failures against the row.
pub(crate) fn parse_field<T, F>(row: &SchemaRow<'_>, field: &str, parse: F) -> Result<T>
where
    F: FnOnce(&str) -> Result<T>,
{
    let value = row.get(field)?;
    parse(value).map_err(|e| row.error(field, e.to_string()))
}

pub(crate) const NOT_A_STATE: &str = "blank state or national aggregate";
