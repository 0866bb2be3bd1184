use crate::constants::{REGIONAL_CSV_COLUMNS, REGIONAL_SOURCE};
use crate::error::Result;
use crate::pipeline::ingestion::{RawTable, SchemaRow, SourceSchema};
use crate::pipeline::processing::binarize::Binarizer;
use crate::pipeline::processing::clean::{RowOutcome, SourceCleaner};
use crate::pipeline::processing::normalize::{clean_education, leading_number, normalize_dash};
use crate::types::RegionalRecord;

/// Cleaner for the CDC WONDER region x race x education x age export
pub struct RegionalCleaner {
    schema: SourceSchema,
    binarizer: Binarizer,
}

impl RegionalCleaner {
    pub fn new(binarizer: Binarizer) -> Self {
        Self::with_schema(Self::default_schema(), binarizer)
    }

    pub fn with_schema(schema: SourceSchema, binarizer: Binarizer) -> Self {
        Self { schema, binarizer }
    }

    pub fn default_schema() -> SourceSchema {
        SourceSchema::new(
            REGIONAL_SOURCE,
            &[
                ("Census Region", "region"),
                ("Single Race 6", "race"),
                ("Education", "education"),
                ("Ten-Year Age Groups Code", "ten_year_age_groups"),
                ("Deaths", "deaths"),
                ("% of Total Deaths", "percent_total_deaths"),
            ],
        )
        .with_optional("Notes", "notes")
    }

    pub fn binarizer(&self) -> Binarizer {
        self.binarizer
    }
}

impl Default for RegionalCleaner {
    fn default() -> Self {
        Self::new(Binarizer::default())
    }
}

/// `"Census Region 1: Northeast"` becomes `"Northeast"`.
pub fn canonical_region(raw: &str) -> String {
    let name = raw.split_once(':').map(|(_, rest)| rest).unwrap_or(raw).trim();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Cleaned records as a string table in `REGIONAL_CSV_COLUMNS` order, the
/// shape the regression engine trains on.
pub fn regional_frame(records: &[RegionalRecord]) -> RawTable {
    RawTable::new(
        REGIONAL_CSV_COLUMNS.iter().map(|c| c.to_string()).collect(),
        records.iter().map(RegionalRecord::to_row).collect(),
    )
}

impl SourceCleaner for RegionalCleaner {
    type Record = RegionalRecord;

    fn name(&self) -> &str {
        "Regional Mortality Breakdown Cleaner"
    }

    fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    fn output_columns(&self) -> &'static [&'static str] {
        &REGIONAL_CSV_COLUMNS
    }

    fn clean_row(&self, row: &SchemaRow<'_>) -> Result<RowOutcome<RegionalRecord>> {
        if row
            .optional("notes")
            .is_some_and(|n| n.trim().eq_ignore_ascii_case("total"))
        {
            return Ok(RowOutcome::Drop("total row".to_string()));
        }
        let raw_region = row.get("region")?;
        if raw_region.trim().is_empty() {
            return Ok(RowOutcome::Drop("footer row without a region".to_string()));
        }

        let region = canonical_region(raw_region);
        if region.is_empty() {
            return Err(row.error("region", format!("'{}' has no region name", raw_region.trim())));
        }

        let race = row.get("race")?.trim().to_string();
        if race.is_empty() {
            return Err(row.error("race", "is empty"));
        }

        let education = clean_education(row.get("education")?);
        let ten_year_age_groups = normalize_dash(row.get("ten_year_age_groups")?.trim()).to_lowercase();
        if ten_year_age_groups.is_empty() {
            return Err(row.error("ten_year_age_groups", "is empty"));
        }

        let raw_deaths = row.get("deaths")?.trim();
        let deaths = raw_deaths
            .replace(',', "")
            .parse::<u32>()
            .map_err(|_| row.error("deaths", format!("'{}' is not a death count", raw_deaths)))?;

        let raw_percent = row.get("percent_total_deaths")?;
        let percent_total_deaths = leading_number(raw_percent).ok_or_else(|| {
            row.error(
                "percent_total_deaths",
                format!("'{}' has no leading number", raw_percent.trim()),
            )
        })?;
        if !(0.0..=100.0).contains(&percent_total_deaths) {
            return Err(row.error(
                "percent_total_deaths",
                format!("{} is outside 0-100", percent_total_deaths),
            ));
        }

        let mortality_rate = percent_total_deaths / 100.0;
        Ok(RowOutcome::Keep(RegionalRecord {
            region,
            race,
            education,
            ten_year_age_groups,
            deaths,
            percent_total_deaths,
            mortality_rate,
            mortality_binary: self.binarizer.label(mortality_rate),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    const HEADER: &str = "Notes,Census Region,Census Region Code,Single Race 6,Education,Ten-Year Age Groups,Ten-Year Age Groups Code,Deaths,% of Total Deaths\n";

    fn clean(body: &str) -> Result<crate::pipeline::processing::clean::Cleaned<RegionalRecord>> {
        let table = RawTable::from_reader(format!("{}{}", HEADER, body).as_bytes()).unwrap();
        RegionalCleaner::default().clean(&table)
    }

    #[test]
    fn test_canonical_region() {
        assert_eq!(canonical_region("Census Region 1: Northeast"), "Northeast");
        assert_eq!(canonical_region("Census Region 3: SOUTH"), "South");
        assert_eq!(canonical_region("midwest"), "Midwest");
        assert_eq!(canonical_region(""), "");
    }

    #[test]
    fn test_cleans_fields_and_derives_binary() {
        let cleaned = clean(
            ",Census Region 1: Northeast,CENS-R1,White,Bachelor?s degree (BA; AB; BS),15-24 years,15-24,12,0.5 (Unreliable)\n\
             ,Census Region 3: South,CENS-R3,Black or African American,Not Available,25-34 years,25-34,\"1,204\",3.75%\n\
             ,Census Region 2: Midwest,CENS-R2,Asian,\"Some college credit, but not a degree.\",35-44 years,35-44,40,1.0\n",
        )
        .unwrap();

        assert_eq!(cleaned.records.len(), 3);
        let first = &cleaned.records[0];
        assert_eq!(first.region, "Northeast");
        assert_eq!(first.race, "White");
        assert_eq!(first.education, "Bachelor's degree (BA; AB; BS)");
        assert_eq!(first.ten_year_age_groups, "15-24");
        assert_eq!(first.deaths, 12);
        assert_eq!(first.percent_total_deaths, 0.5);
        assert_eq!(first.mortality_rate, 0.005);
        assert_eq!(first.mortality_binary, 0);

        let second = &cleaned.records[1];
        assert_eq!(second.education, "unknown");
        assert_eq!(second.deaths, 1204);
        assert_eq!(second.mortality_binary, 1);

        // exactly at the cutoff is not high mortality
        let third = &cleaned.records[2];
        assert_eq!(third.education, "Some college credit, but not a degree");
        assert_eq!(third.mortality_rate, 0.01);
        assert_eq!(third.mortality_binary, 0);
    }

    #[test]
    fn test_total_and_footer_rows_are_dropped() {
        let cleaned = clean(
            ",Census Region 1: Northeast,CENS-R1,White,Not Available,15-24 years,15-24,12,0.5\n\
             Total,Census Region 1: Northeast,CENS-R1,,,,,500,25.0\n\
             \"Dataset: Natality, 2016-2022\",,,,,,,,\n",
        )
        .unwrap();

        assert_eq!(cleaned.records.len(), 1);
        assert_eq!(cleaned.dropped.len(), 2);
    }

    #[test]
    fn test_percent_outside_range_fails() {
        let result = clean(",Census Region 4: West,CENS-R4,Asian,Not Available,15-24 years,15-24,3,140.0\n");
        match result {
            Err(PipelineError::RowFormat { field, row, .. }) => {
                assert_eq!(field, "percent_total_deaths");
                assert_eq!(row, 1);
            }
            other => panic!("expected RowFormat, got {:?}", other.map(|c| c.records)),
        }
    }

    #[test]
    fn test_frame_matches_canonical_columns() {
        let cleaned = clean(",Census Region 4: West,CENS-R4,Asian,Not Available,15-24 years,15-24,3,2.5\n").unwrap();
        let frame = regional_frame(&cleaned.records);
        assert_eq!(frame.headers.len(), REGIONAL_CSV_COLUMNS.len());
        assert_eq!(frame.rows[0][0], "West");
        assert_eq!(frame.rows[0][7], "1");
    }
}
