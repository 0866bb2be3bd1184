//! File-to-file pipeline steps, in data-flow order. The CLI is a thin layer
//! over these.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, info_span};

use crate::config::Config;
use crate::constants::{
    HEALTH_SYSTEM_SOURCE, KFF_CESAREAN_SOURCE, KFF_COVERAGE_SOURCE, KFF_EARNINGS_SOURCE, KFF_MORTALITY_SOURCE,
    MORTALITY_RATE_SOURCE, REGIONAL_SOURCE, STATE_COLUMN,
};
use crate::error::Result;
use crate::model::{interaction_search, FittedModel, SearchReport};
use crate::pipeline::ingestion::RawTable;
use crate::pipeline::processing::clean::{CleanSummary, CleanerRegistry};
use crate::pipeline::processing::merge::{merge, KeyedTable, MergeOptions, RenameMap};

pub const KFF_SOURCES: [&str; 4] = [
    KFF_MORTALITY_SOURCE,
    KFF_COVERAGE_SOURCE,
    KFF_EARNINGS_SOURCE,
    KFF_CESAREAN_SOURCE,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeSummary {
    pub output: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub cleaned: Vec<CleanSummary>,
    pub merged: MergeSummary,
    pub regional: CleanSummary,
    pub kff_cleaned: Vec<CleanSummary>,
    pub kff_merged: MergeSummary,
}

fn clean_sources(config: &Config, registry: &CleanerRegistry, sources: &[&str]) -> Result<Vec<CleanSummary>> {
    sources
        .iter()
        .map(|source_id| {
            let span = info_span!("clean", source = %source_id);
            let _enter = span.enter();
            registry.clean_file(
                source_id,
                &config.paths.raw_input(source_id),
                &config.paths.cleaned_output(source_id),
            )
        })
        .collect()
}

fn merge_cleaned(
    config: &Config,
    sources: &[&str],
    renames: &RenameMap,
    options: &MergeOptions,
    output: PathBuf,
) -> Result<MergeSummary> {
    let tables = sources
        .iter()
        .map(|source_id| {
            let raw = RawTable::read_csv(config.paths.cleaned_output(source_id))?;
            KeyedTable::from_raw(source_id, &raw, STATE_COLUMN)
        })
        .collect::<Result<Vec<_>>>()?;

    let merged = merge(&tables, renames, options)?;
    merged.write_csv(&output)?;
    info!(output = %output.display(), rows = merged.len(), "wrote merged table");
    Ok(MergeSummary {
        output,
        rows: merged.len(),
        columns: merged.columns,
    })
}

/// Clean the mortality-rate and health-system tables
pub fn run_clean(config: &Config) -> Result<Vec<CleanSummary>> {
    let registry = config.cleaner_registry()?;
    clean_sources(config, &registry, &[MORTALITY_RATE_SOURCE, HEALTH_SYSTEM_SOURCE])
}

/// Join the cleaned mortality-rate and health-system tables
pub fn run_merge(config: &Config) -> Result<MergeSummary> {
    let span = info_span!("merge");
    let _enter = span.enter();
    let renames = RenameMap::new()
        .rename(MORTALITY_RATE_SOURCE, "unknown", "unknown_mortality")
        .rename(HEALTH_SYSTEM_SOURCE, "unknown", "unknown_performance");
    merge_cleaned(
        config,
        &[MORTALITY_RATE_SOURCE, HEALTH_SYSTEM_SOURCE],
        &renames,
        &config.merge.options(),
        config.paths.merged_output.clone(),
    )
}

/// Clean the regional breakdown and derive the binary label
pub fn run_regional(config: &Config) -> Result<CleanSummary> {
    let registry = config.cleaner_registry()?;
    let mut summaries = clean_sources(config, &registry, &[REGIONAL_SOURCE])?;
    Ok(summaries.remove(0))
}

/// Clean the four KFF tables and join them with abbreviations
pub fn run_kff(config: &Config) -> Result<(Vec<CleanSummary>, MergeSummary)> {
    let registry = config.cleaner_registry()?;
    let cleaned = clean_sources(config, &registry, &KFF_SOURCES)?;

    let span = info_span!("merge", kind = "kff");
    let _enter = span.enter();
    let merged = merge_cleaned(
        config,
        &KFF_SOURCES,
        &RenameMap::new(),
        &config.kff.options(),
        config.paths.kff_output.clone(),
    )?;
    Ok((cleaned, merged))
}

/// Every cleaning and merge step
pub fn run_all(config: &Config) -> Result<RunSummary> {
    let cleaned = run_clean(config)?;
    let merged = run_merge(config)?;
    let regional = run_regional(config)?;
    let (kff_cleaned, kff_merged) = run_kff(config)?;
    Ok(RunSummary {
        cleaned,
        merged,
        regional,
        kff_cleaned,
        kff_merged,
    })
}

/// The cleaned regional table minus excluded races
pub fn load_training_frame(config: &Config) -> Result<RawTable> {
    let raw = RawTable::read_csv(config.paths.training_data())?;
    Ok(config.model.training_spec().prepare(&raw))
}

pub fn fit_model(config: &Config) -> Result<FittedModel> {
    let spec = config.model.training_spec();
    let frame = load_training_frame(config)?;
    crate::model::fit(&frame, &spec.outcome, &spec.predictors, &spec.options)
}

pub fn search_interactions(config: &Config) -> Result<SearchReport> {
    let frame = load_training_frame(config)?;
    interaction_search(
        &frame,
        &config.model.outcome,
        &config.model.predictors,
        &config.search_options(),
    )
}
