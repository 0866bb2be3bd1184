use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::constants::{
    ABBREVIATION_COLUMN, HEALTH_SYSTEM_SOURCE, KFF_CESAREAN_SOURCE, KFF_COVERAGE_SOURCE, KFF_EARNINGS_SOURCE,
    KFF_MORTALITY_SOURCE, MORTALITY_RATE_SOURCE, OUTCOME_FIELD, PREDICTOR_FIELDS, REGIONAL_SOURCE,
};
use crate::error::{PipelineError, Result};
use crate::model::{FitOptions, SearchOptions, TrainingSpec, DEFAULT_EXCLUDED_RACE};
use crate::pipeline::ingestion::ColumnMapping;
use crate::pipeline::processing::binarize::{Binarizer, DEFAULT_THRESHOLD};
use crate::pipeline::processing::clean::CleanerRegistry;
use crate::pipeline::processing::merge::{JoinMode, MergeOptions};
use crate::pipeline::processing::states::StateScope;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const CONFIG_ENV_VAR: &str = "MORTALITY_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub sources: HashMap<String, SourceConfig>,
    pub merge: MergeConfig,
    pub kff: KffConfig,
    pub model: ModelConfig,
    pub search: SearchConfig,
    pub server: ServerConfig,
}

/// Where raw tables are read from and results are written to
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub clean_dir: PathBuf,
    /// raw file name per source id, when it differs from `<source_id>.csv`
    pub raw_files: HashMap<String, String>,
    pub merged_output: PathBuf,
    pub kff_output: PathBuf,
    /// defaults to the cleaned regional table
    pub training_data: Option<PathBuf>,
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            clean_dir: PathBuf::from("data/clean"),
            raw_files: HashMap::new(),
            merged_output: PathBuf::from("data/merged/merged.csv"),
            kff_output: PathBuf::from("data/merged/kff_merged.csv"),
            training_data: None,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl PathsConfig {
    pub fn raw_input(&self, source_id: &str) -> PathBuf {
        let file = self
            .raw_files
            .get(source_id)
            .cloned()
            .unwrap_or_else(|| format!("{}.csv", source_id));
        self.raw_dir.join(file)
    }

    pub fn cleaned_output(&self, source_id: &str) -> PathBuf {
        self.clean_dir.join(format!("{}_clean.csv", source_id))
    }

    pub fn training_data(&self) -> PathBuf {
        self.training_data
            .clone()
            .unwrap_or_else(|| self.cleaned_output(REGIONAL_SOURCE))
    }
}

/// Raw header overrides for one source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub columns: Vec<ColumnMapping>,
}

/// Mortality-rate with health-system performance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub mode: JoinMode,
    pub primary: String,
    pub scope: StateScope,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            mode: JoinMode::LeftOuter,
            primary: HEALTH_SYSTEM_SOURCE.to_string(),
            scope: StateScope::StatesAndDistrict,
        }
    }
}

impl MergeConfig {
    pub fn options(&self) -> MergeOptions {
        MergeOptions {
            mode: self.mode,
            primary: Some(self.primary.clone()),
            scope: self.scope,
            abbreviation_column: None,
        }
    }
}

/// The four KFF tables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KffConfig {
    pub mode: JoinMode,
    pub primary: String,
    pub scope: StateScope,
}

impl Default for KffConfig {
    fn default() -> Self {
        Self {
            mode: JoinMode::Inner,
            primary: KFF_MORTALITY_SOURCE.to_string(),
            scope: StateScope::StatesAndDistrict,
        }
    }
}

impl KffConfig {
    pub fn options(&self) -> MergeOptions {
        MergeOptions {
            mode: self.mode,
            primary: Some(self.primary.clone()),
            scope: self.scope,
            abbreviation_column: Some(ABBREVIATION_COLUMN.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// share of deaths above which a group counts as high mortality
    pub threshold: f64,
    pub outcome: String,
    pub predictors: Vec<String>,
    pub excluded_races: Vec<String>,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let fit = FitOptions::default();
        Self {
            threshold: DEFAULT_THRESHOLD,
            outcome: OUTCOME_FIELD.to_string(),
            predictors: PREDICTOR_FIELDS.iter().map(|p| p.to_string()).collect(),
            excluded_races: vec![DEFAULT_EXCLUDED_RACE.to_string()],
            max_iterations: fit.max_iterations,
            tolerance: fit.tolerance,
        }
    }
}

impl ModelConfig {
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }

    pub fn training_spec(&self) -> TrainingSpec {
        TrainingSpec {
            outcome: self.outcome.clone(),
            predictors: self.predictors.clone(),
            excluded_races: self.excluded_races.clone(),
            options: self.fit_options(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub train_fraction: f64,
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let defaults = SearchOptions::default();
        Self {
            train_fraction: defaults.train_fraction,
            seed: defaults.seed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8050,
        }
    }
}

impl Config {
    /// Load from `path`, else `$MORTALITY_CONFIG`, else `config.toml`.
    ///
    /// A missing default file yields the built-in configuration; a missing
    /// file that was asked for explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
        let config_path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        if explicit.is_none() && !config_path.exists() {
            debug!("no {} found; using built-in configuration", DEFAULT_CONFIG_PATH);
            let config = Config::default();
            config.validate()?;
            return Ok(config);
        }

        let config_content = fs::read_to_string(&config_path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&config_content)?;
        info!(path = %config_path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.model.threshold;
        if !(threshold.is_finite() && threshold > 0.0 && threshold < 1.0) {
            return Err(PipelineError::Config(format!(
                "model.threshold must be in (0, 1), got {}",
                threshold
            )));
        }
        if self.model.predictors.is_empty() {
            return Err(PipelineError::Config("model.predictors must not be empty".to_string()));
        }
        if self.model.max_iterations == 0 || !(self.model.tolerance > 0.0) {
            return Err(PipelineError::Config(
                "model.max_iterations and model.tolerance must be positive".to_string(),
            ));
        }
        let fraction = self.search.train_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(PipelineError::Config(format!(
                "search.train_fraction must be in (0, 1), got {}",
                fraction
            )));
        }
        if ![MORTALITY_RATE_SOURCE, HEALTH_SYSTEM_SOURCE].contains(&self.merge.primary.as_str()) {
            return Err(PipelineError::Config(format!(
                "merge.primary '{}' is not a merged source",
                self.merge.primary
            )));
        }
        let kff_sources = [
            KFF_MORTALITY_SOURCE,
            KFF_COVERAGE_SOURCE,
            KFF_EARNINGS_SOURCE,
            KFF_CESAREAN_SOURCE,
        ];
        if !kff_sources.contains(&self.kff.primary.as_str()) {
            return Err(PipelineError::Config(format!(
                "kff.primary '{}' is not a KFF source",
                self.kff.primary
            )));
        }
        Ok(())
    }

    pub fn binarizer(&self) -> Result<Binarizer> {
        Binarizer::new(self.model.threshold)
    }

    /// Built-in cleaners with this configuration's header overrides and cutoff
    pub fn cleaner_registry(&self) -> Result<CleanerRegistry> {
        let overrides = self
            .sources
            .iter()
            .map(|(id, source)| (id.clone(), source.columns.clone()))
            .collect();
        Ok(CleanerRegistry::with_settings(self.binarizer()?, &overrides))
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            train_fraction: self.search.train_fraction,
            seed: self.search.seed,
            fit: self.model.fit_options(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.model.threshold, 0.01);
        assert_eq!(config.merge.mode, JoinMode::LeftOuter);
        assert_eq!(config.merge.primary, HEALTH_SYSTEM_SOURCE);
        assert_eq!(config.kff.mode, JoinMode::Inner);
        assert_eq!(config.server.port, 8050);
        assert_eq!(
            config.paths.training_data(),
            PathBuf::from("data/clean/regional_clean.csv")
        );
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [paths]
            raw_dir = "input"
            raw_files = { kff_coverage = "coverage.csv" }

            [sources.kff_coverage]
            columns = [{ raw = "Location", field = "state" }]

            [merge]
            mode = "inner"
            scope = "states"

            [model]
            threshold = 0.02
            predictors = ["region", "race"]

            [search]
            seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.raw_input(KFF_COVERAGE_SOURCE), PathBuf::from("input/coverage.csv"));
        assert_eq!(config.paths.raw_input(REGIONAL_SOURCE), PathBuf::from("input/regional.csv"));
        assert_eq!(config.sources["kff_coverage"].columns[0].raw, "Location");
        assert!(config.sources["kff_coverage"].columns[0].required);
        assert_eq!(config.merge.mode, JoinMode::Inner);
        assert_eq!(config.merge.primary, HEALTH_SYSTEM_SOURCE);
        assert_eq!(config.merge.scope, StateScope::States);
        assert_eq!(config.binarizer().unwrap().threshold(), 0.02);
        assert_eq!(config.model.training_spec().predictors, vec!["region", "race"]);
        assert_eq!(config.search_options().seed, 7);
        assert_eq!(config.search_options().train_fraction, 0.8);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for content in [
            "[model]\nthreshold = 1.5",
            "[model]\nthreshold = 0.0",
            "[model]\npredictors = []",
            "[search]\ntrain_fraction = 1.0",
            "[merge]\nprimary = \"regional\"",
            "[kff]\nprimary = \"health_system\"",
        ] {
            assert!(
                matches!(Config::from_toml_str(content), Err(PipelineError::Config(_))),
                "accepted: {}",
                content
            );
        }
    }

    #[test]
    fn test_malformed_toml_is_a_toml_error() {
        assert!(matches!(
            Config::from_toml_str("[model\nthreshold = "),
            Err(PipelineError::Toml(_))
        ));
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let shipped = Config::from_toml_str(include_str!("../config.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(shipped.merge.mode, defaults.merge.mode);
        assert_eq!(shipped.merge.scope, defaults.merge.scope);
        assert_eq!(shipped.kff.primary, defaults.kff.primary);
        assert_eq!(shipped.model.predictors, defaults.model.predictors);
        assert_eq!(shipped.model.excluded_races, defaults.model.excluded_races);
        assert_eq!(shipped.paths.training_data(), defaults.paths.training_data());
        assert!(shipped.sources.is_empty());
    }
}
