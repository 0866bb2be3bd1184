use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use super::cleaners::{
    CesareanCleaner, CoverageCleaner, EarningsCleaner, HealthSystemCleaner, KffMortalityCleaner,
    MortalityRateCleaner, RegionalCleaner,
};
use super::SourceCleaner;
use crate::constants::{
    HEALTH_SYSTEM_SOURCE, KFF_CESAREAN_SOURCE, KFF_COVERAGE_SOURCE, KFF_EARNINGS_SOURCE,
    KFF_MORTALITY_SOURCE, MORTALITY_RATE_SOURCE, REGIONAL_SOURCE,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::ingestion::{write_records, ColumnMapping, RawTable, SourceSchema};
use crate::pipeline::processing::binarize::Binarizer;

/// What one file-to-file cleaning run did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanSummary {
    pub source_id: String,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
    pub incomplete: Vec<String>,
    pub output: PathBuf,
}

/// Object-safe view of a cleaner that reads and writes files
pub trait FileCleaner: Send + Sync {
    fn cleaner_name(&self) -> &str;

    fn clean_file(&self, input: &Path, output: &Path) -> Result<CleanSummary>;
}

impl<C> FileCleaner for C
where
    C: SourceCleaner + Send + Sync,
{
    fn cleaner_name(&self) -> &str {
        self.name()
    }

    fn clean_file(&self, input: &Path, output: &Path) -> Result<CleanSummary> {
        let raw = RawTable::read_csv(input)?;
        let cleaned = self.clean(&raw)?;
        write_records(output, self.output_columns(), &cleaned.records)?;
        info!(source = %cleaned.source_id, output = %output.display(), "wrote cleaned table");

        Ok(CleanSummary {
            source_id: cleaned.source_id,
            rows_read: raw.len(),
            rows_kept: cleaned.records.len(),
            rows_dropped: cleaned.dropped.len(),
            incomplete: cleaned.incomplete,
            output: output.to_path_buf(),
        })
    }
}

/// Registry of the built-in source cleaners, keyed by source id
pub struct CleanerRegistry {
    cleaners: HashMap<String, Box<dyn FileCleaner>>,
}

impl CleanerRegistry {
    /// Built-in cleaners with their default raw headers and the default cutoff
    pub fn new() -> Self {
        Self::with_settings(Binarizer::default(), &HashMap::new())
    }

    /// Built-in cleaners with configured header overrides and cutoff
    pub fn with_settings(binarizer: Binarizer, overrides: &HashMap<String, Vec<ColumnMapping>>) -> Self {
        let schema = |default: SourceSchema| match overrides.get(&default.source_id) {
            Some(columns) => default.with_overrides(columns),
            None => default,
        };

        let mut registry = Self {
            cleaners: HashMap::new(),
        };
        registry.register(
            MORTALITY_RATE_SOURCE,
            Box::new(MortalityRateCleaner::with_schema(schema(MortalityRateCleaner::default_schema()))),
        );
        registry.register(
            HEALTH_SYSTEM_SOURCE,
            Box::new(HealthSystemCleaner::with_schema(schema(HealthSystemCleaner::default_schema()))),
        );
        registry.register(
            REGIONAL_SOURCE,
            Box::new(RegionalCleaner::with_schema(
                schema(RegionalCleaner::default_schema()),
                binarizer,
            )),
        );
        registry.register(
            KFF_MORTALITY_SOURCE,
            Box::new(KffMortalityCleaner::with_schema(schema(KffMortalityCleaner::default_schema()))),
        );
        registry.register(
            KFF_COVERAGE_SOURCE,
            Box::new(CoverageCleaner::with_schema(schema(CoverageCleaner::default_schema()))),
        );
        registry.register(
            KFF_EARNINGS_SOURCE,
            Box::new(EarningsCleaner::with_schema(schema(EarningsCleaner::default_schema()))),
        );
        registry.register(
            KFF_CESAREAN_SOURCE,
            Box::new(CesareanCleaner::with_schema(schema(CesareanCleaner::default_schema()))),
        );
        registry
    }

    pub fn register(&mut self, source_id: &str, cleaner: Box<dyn FileCleaner>) {
        self.cleaners.insert(source_id.to_string(), cleaner);
    }

    pub fn get_cleaner(&self, source_id: &str) -> Option<&dyn FileCleaner> {
        self.cleaners.get(source_id).map(|c| c.as_ref())
    }

    /// Clean `input` into `output` with the cleaner registered for `source_id`
    pub fn clean_file(&self, source_id: &str, input: &Path, output: &Path) -> Result<CleanSummary> {
        let cleaner = self
            .get_cleaner(source_id)
            .ok_or_else(|| PipelineError::Config(format!("no cleaner registered for source: {}", source_id)))?;
        cleaner.clean_file(input, output)
    }

    pub fn list_sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self.cleaners.keys().map(|k| k.as_str()).collect();
        sources.sort_unstable();
        sources
    }
}

impl Default for CleanerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::all_sources;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_registry_has_every_built_in_source() {
        let registry = CleanerRegistry::new();
        let mut expected = all_sources();
        expected.sort_unstable();
        assert_eq!(registry.list_sources(), expected);
    }

    #[test]
    fn test_unknown_source_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let result = CleanerRegistry::new().clean_file(
            "nowhere",
            &dir.path().join("in.csv"),
            &dir.path().join("out.csv"),
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_clean_file_writes_canonical_header() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("raw.csv");
        let output = dir.path().join("clean/hlthsys.csv");
        fs::write(
            &input,
            "state,rank,performance_category,unknown\nMaine,1,Top,7\nUnited States,0,Middle,1\n",
        )
        .unwrap();

        let summary = CleanerRegistry::new()
            .clean_file(HEALTH_SYSTEM_SOURCE, &input, &output)
            .unwrap();
        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.rows_kept, 1);
        assert_eq!(summary.rows_dropped, 1);

        let written = fs::read_to_string(&output).unwrap();
        assert_eq!(written, "state,performance_category,unknown\nmaine,top,7\n");
    }

    #[test]
    fn test_overrides_rename_raw_headers() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("raw.csv");
        let output = dir.path().join("out.csv");
        fs::write(&input, "Location,Cesarean Rate\nOhio,30%\n").unwrap();

        let mut overrides = HashMap::new();
        overrides.insert(
            KFF_CESAREAN_SOURCE.to_string(),
            vec![
                ColumnMapping {
                    raw: "Location".to_string(),
                    field: "state".to_string(),
                    required: true,
                },
                ColumnMapping {
                    raw: "Cesarean Rate".to_string(),
                    field: "cesarean".to_string(),
                    required: true,
                },
            ],
        );
        let registry = CleanerRegistry::with_settings(Binarizer::default(), &overrides);
        let summary = registry.clean_file(KFF_CESAREAN_SOURCE, &input, &output).unwrap();

        assert_eq!(summary.rows_kept, 1);
        assert_eq!(fs::read_to_string(&output).unwrap(), "state,cesarean\nohio,0.3\n");
    }
}
