use crate::constants::{HEALTH_SYSTEM_SOURCE, HLTHSYS_CSV_COLUMNS};
use crate::error::Result;
use crate::pipeline::ingestion::{SchemaRow, SourceSchema};
use crate::pipeline::processing::clean::{read_state, RowOutcome, SourceCleaner, NOT_A_STATE};
use crate::pipeline::processing::normalize::normalize_label;
use crate::types::PerformanceRecord;

/// Cleaner for the health system performance for women table
pub struct HealthSystemCleaner {
    schema: SourceSchema,
}

impl HealthSystemCleaner {
    pub fn new() -> Self {
        Self::with_schema(Self::default_schema())
    }

    pub fn with_schema(schema: SourceSchema) -> Self {
        Self { schema }
    }

    pub fn default_schema() -> SourceSchema {
        SourceSchema::new(
            HEALTH_SYSTEM_SOURCE,
            &[
                ("state", "state"),
                ("performance_category", "performance_category"),
                ("unknown", "unknown"),
            ],
        )
    }
}

impl Default for HealthSystemCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceCleaner for HealthSystemCleaner {
    type Record = PerformanceRecord;

    fn name(&self) -> &str {
        "Health System Performance Cleaner"
    }

    fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    fn output_columns(&self) -> &'static [&'static str] {
        &HLTHSYS_CSV_COLUMNS
    }

    fn clean_row(&self, row: &SchemaRow<'_>) -> Result<RowOutcome<PerformanceRecord>> {
        let Some(state) = read_state(row)? else {
            return Ok(RowOutcome::Drop(NOT_A_STATE.to_string()));
        };

        let performance_category = normalize_label(row.get("performance_category")?);
        if performance_category.is_empty() {
            return Err(row.error("performance_category", "is empty"));
        }

        Ok(RowOutcome::Keep(PerformanceRecord {
            state,
            performance_category,
            unknown: row.get("unknown")?.trim().to_string(),
        }))
    }

    fn state_key<'r>(&self, record: &'r PerformanceRecord) -> Option<&'r str> {
        Some(&record.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::pipeline::ingestion::RawTable;

    #[test]
    fn test_normalizes_categories() {
        let table = RawTable::from_reader(
            "state,rank,performance_category,unknown\n\
             Maine,1,Top Quartile \u{2013} Best , 7 \n\
             Texas,50,BOTTOM QUARTILE,9\n"
                .as_bytes(),
        )
        .unwrap();
        let cleaned = HealthSystemCleaner::new().clean(&table).unwrap();

        assert_eq!(cleaned.records.len(), 2);
        assert_eq!(cleaned.records[0].performance_category, "top quartile - best");
        assert_eq!(cleaned.records[0].unknown, "7");
        assert_eq!(cleaned.records[1].performance_category, "bottom quartile");
    }

    #[test]
    fn test_empty_category_fails() {
        let table =
            RawTable::from_reader("state,performance_category,unknown\nMaine,  ,1\n".as_bytes()).unwrap();
        assert!(matches!(
            HealthSystemCleaner::new().clean(&table),
            Err(PipelineError::RowFormat { row: 1, .. })
        ));
    }

    #[test]
    fn test_schema_drift_is_reported() {
        let table = RawTable::from_reader("state,category\nMaine,top\n".as_bytes()).unwrap();
        assert!(matches!(
            HealthSystemCleaner::new().clean(&table),
            Err(PipelineError::MissingColumn { .. })
        ));
    }
}
