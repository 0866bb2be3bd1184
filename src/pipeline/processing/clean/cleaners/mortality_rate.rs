use crate::constants::{MORTALITY_RATE_SOURCE, MORTRATE_CSV_COLUMNS};
use crate::error::Result;
use crate::pipeline::ingestion::{SchemaRow, SourceSchema};
use crate::pipeline::processing::clean::{read_state, RowOutcome, SourceCleaner, NOT_A_STATE};
use crate::pipeline::processing::normalize::is_missing_sentinel;
use crate::types::{MortalityRate, MortalityRateRecord};

/// Cleaner for the state maternal mortality rate table
pub struct MortalityRateCleaner {
    schema: SourceSchema,
}

impl MortalityRateCleaner {
    pub fn new() -> Self {
        Self::with_schema(Self::default_schema())
    }

    pub fn with_schema(schema: SourceSchema) -> Self {
        Self { schema }
    }

    pub fn default_schema() -> SourceSchema {
        SourceSchema::new(
            MORTALITY_RATE_SOURCE,
            &[
                ("state", "state"),
                ("mortality_rate", "mortality_rate"),
                ("unknown", "unknown"),
            ],
        )
    }
}

impl Default for MortalityRateCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceCleaner for MortalityRateCleaner {
    type Record = MortalityRateRecord;

    fn name(&self) -> &str {
        "Maternal Mortality Rate Cleaner"
    }

    fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    fn output_columns(&self) -> &'static [&'static str] {
        &MORTRATE_CSV_COLUMNS
    }

    fn clean_row(&self, row: &SchemaRow<'_>) -> Result<RowOutcome<MortalityRateRecord>> {
        let Some(state) = read_state(row)? else {
            return Ok(RowOutcome::Drop(NOT_A_STATE.to_string()));
        };

        let raw_rate = row.get("mortality_rate")?.trim();
        let mortality_rate = if raw_rate.is_empty() || is_missing_sentinel(raw_rate) {
            None
        } else {
            let rate = raw_rate.parse::<MortalityRate>().map_err(|_| {
                row.error(
                    "mortality_rate",
                    format!("'{}' is neither a number nor a low-high range", raw_rate),
                )
            })?;
            Some(rate)
        };

        Ok(RowOutcome::Keep(MortalityRateRecord {
            state,
            mortality_rate,
            unknown: row.get("unknown")?.trim().to_string(),
        }))
    }

    fn state_key<'r>(&self, record: &'r MortalityRateRecord) -> Option<&'r str> {
        Some(&record.state)
    }
}
