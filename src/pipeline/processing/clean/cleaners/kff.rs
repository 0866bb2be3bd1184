//! Cleaners for the KFF women's health profile tables.
//!
//! All four tables are scraped from the same JSON endpoint family and share a
//! layout: one row per location, the first row often the national total.

use crate::constants::{
    CESAREAN_COLUMNS, COVERAGE_COLUMNS, EARNINGS_COLUMNS, KFF_CESAREAN_SOURCE, KFF_COVERAGE_SOURCE,
    KFF_EARNINGS_SOURCE, KFF_MORTALITY_COLUMNS, KFF_MORTALITY_SOURCE,
};
use crate::error::Result;
use crate::pipeline::ingestion::{SchemaRow, SourceSchema};
use crate::pipeline::processing::clean::{parse_field, read_state, RowOutcome, SourceCleaner, NOT_A_STATE};
use crate::pipeline::processing::normalize::{parse_currency, parse_number, parse_percentage};
use crate::types::{CesareanRecord, CoverageRecord, EarningsRecord, KffMortalityRecord};

macro_rules! state_keyed_cleaner {
    ($cleaner:ident) => {
        impl $cleaner {
            pub fn new() -> Self {
                Self::with_schema(Self::default_schema())
            }

            pub fn with_schema(schema: SourceSchema) -> Self {
                Self { schema }
            }
        }

        impl Default for $cleaner {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

/// Maternal deaths per 100,000 live births
pub struct KffMortalityCleaner {
    schema: SourceSchema,
}

state_keyed_cleaner!(KffMortalityCleaner);

impl KffMortalityCleaner {
    pub fn default_schema() -> SourceSchema {
        SourceSchema::new(
            KFF_MORTALITY_SOURCE,
            &[
                ("state", "state"),
                ("Maternal Mortality Rate per 100,000 live Births", "mortality"),
            ],
        )
    }
}

impl SourceCleaner for KffMortalityCleaner {
    type Record = KffMortalityRecord;

    fn name(&self) -> &str {
        "KFF Maternal Mortality Cleaner"
    }

    fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    fn output_columns(&self) -> &'static [&'static str] {
        &KFF_MORTALITY_COLUMNS
    }

    fn clean_row(&self, row: &SchemaRow<'_>) -> Result<RowOutcome<KffMortalityRecord>> {
        let Some(state) = read_state(row)? else {
            return Ok(RowOutcome::Drop(NOT_A_STATE.to_string()));
        };
        Ok(RowOutcome::Keep(KffMortalityRecord {
            state,
            mortality: parse_field(row, "mortality", parse_number)?,
        }))
    }

    fn state_key<'r>(&self, record: &'r KffMortalityRecord) -> Option<&'r str> {
        Some(&record.state)
    }
}

/// Health coverage; the scraper labels the location column `Employer`
pub struct CoverageCleaner {
    schema: SourceSchema,
}

state_keyed_cleaner!(CoverageCleaner);

impl CoverageCleaner {
    pub fn default_schema() -> SourceSchema {
        SourceSchema::new(
            KFF_COVERAGE_SOURCE,
            &[("Employer", "state"), ("Uninsured", "uninsured")],
        )
    }
}

impl SourceCleaner for CoverageCleaner {
    type Record = CoverageRecord;

    fn name(&self) -> &str {
        "KFF Coverage Cleaner"
    }

    fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    fn output_columns(&self) -> &'static [&'static str] {
        &COVERAGE_COLUMNS
    }

    fn clean_row(&self, row: &SchemaRow<'_>) -> Result<RowOutcome<CoverageRecord>> {
        let Some(state) = read_state(row)? else {
            return Ok(RowOutcome::Drop(NOT_A_STATE.to_string()));
        };
        Ok(RowOutcome::Keep(CoverageRecord {
            state,
            uninsured: parse_field(row, "uninsured", parse_percentage)?,
        }))
    }

    fn state_key<'r>(&self, record: &'r CoverageRecord) -> Option<&'r str> {
        Some(&record.state)
    }
}

/// Median weekly earnings
pub struct EarningsCleaner {
    schema: SourceSchema,
}

state_keyed_cleaner!(EarningsCleaner);

impl EarningsCleaner {
    pub fn default_schema() -> SourceSchema {
        SourceSchema::new(
            KFF_EARNINGS_SOURCE,
            &[
                ("state", "state"),
                ("women_weekly", "women_earnings"),
                ("ratio", "ratio_earnings"),
            ],
        )
    }
}

impl SourceCleaner for EarningsCleaner {
    type Record = EarningsRecord;

    fn name(&self) -> &str {
        "KFF Earnings Cleaner"
    }

    fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    fn output_columns(&self) -> &'static [&'static str] {
        &EARNINGS_COLUMNS
    }

    fn clean_row(&self, row: &SchemaRow<'_>) -> Result<RowOutcome<EarningsRecord>> {
        let Some(state) = read_state(row)? else {
            return Ok(RowOutcome::Drop(NOT_A_STATE.to_string()));
        };
        Ok(RowOutcome::Keep(EarningsRecord {
            state,
            women_earnings: parse_field(row, "women_earnings", parse_currency)?,
            ratio_earnings: parse_field(row, "ratio_earnings", parse_percentage)?,
        }))
    }

    fn state_key<'r>(&self, record: &'r EarningsRecord) -> Option<&'r str> {
        Some(&record.state)
    }
}

/// Share of births by cesarean delivery
pub struct CesareanCleaner {
    schema: SourceSchema,
}

state_keyed_cleaner!(CesareanCleaner);

impl CesareanCleaner {
    pub fn default_schema() -> SourceSchema {
        SourceSchema::new(KFF_CESAREAN_SOURCE, &[("state", "state"), ("cesarean", "cesarean")])
    }
}

impl SourceCleaner for CesareanCleaner {
    type Record = CesareanRecord;

    fn name(&self) -> &str {
        "KFF Cesarean Cleaner"
    }

    fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    fn output_columns(&self) -> &'static [&'static str] {
        &CESAREAN_COLUMNS
    }

    fn clean_row(&self, row: &SchemaRow<'_>) -> Result<RowOutcome<CesareanRecord>> {
        let Some(state) = read_state(row)? else {
            return Ok(RowOutcome::Drop(NOT_A_STATE.to_string()));
        };
        Ok(RowOutcome::Keep(CesareanRecord {
            state,
            cesarean: parse_field(row, "cesarean", parse_percentage)?,
        }))
    }

    fn state_key<'r>(&self, record: &'r CesareanRecord) -> Option<&'r str> {
        Some(&record.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::pipeline::ingestion::RawTable;

    fn table(text: &str) -> RawTable {
        RawTable::from_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_mortality_handles_sentinels_and_totals() {
        let raw = table(
            "state,\"Maternal Mortality Rate per 100,000 live Births\"\n\
             United States,23.8\nAlabama,36.2\nAlaska,NSD\n",
        );
        let cleaned = KffMortalityCleaner::new().clean(&raw).unwrap();

        assert_eq!(cleaned.records.len(), 2);
        assert_eq!(cleaned.records[0].mortality, Some(36.2));
        assert_eq!(cleaned.records[1].mortality, None);
        assert_eq!(cleaned.dropped.len(), 1);
    }

    #[test]
    fn test_coverage_reads_employer_column_as_state() {
        let raw = table("Employer,Uninsured\nTexas,20%\n");
        let cleaned = CoverageCleaner::new().clean(&raw).unwrap();
        assert_eq!(cleaned.records[0].state, "texas");
        assert_eq!(cleaned.records[0].uninsured, Some(0.2));
    }

    #[test]
    fn test_earnings_strip_currency_and_percent() {
        let raw = table("state,women_weekly,men_weekly,ratio\nOhio,\"$1,024.50\",$1200,85%\n");
        let cleaned = EarningsCleaner::new().clean(&raw).unwrap();
        let ohio = &cleaned.records[0];
        assert_eq!(ohio.women_earnings, Some(1024.5));
        assert_eq!(ohio.ratio_earnings, Some(0.85));
    }

    #[test]
    fn test_bad_value_is_a_row_error() {
        let raw = table("state,cesarean\nOhio,31.5%\nUtah,lots\n");
        match CesareanCleaner::new().clean(&raw) {
            Err(PipelineError::RowFormat { source_id, row, field, reason }) => {
                assert_eq!(source_id, KFF_CESAREAN_SOURCE);
                assert_eq!(row, 2);
                assert_eq!(field, "cesarean");
                assert!(reason.contains("lots"));
            }
            other => panic!("expected RowFormat, got {:?}", other.map(|c| c.records)),
        }
    }
}
