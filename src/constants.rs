/// Source identifiers and the column layouts of every table the pipeline writes.
/// Downstream consumers read these headers by name; renaming one is a format change.

// Source identifiers (used in config, logs and errors)
pub const MORTALITY_RATE_SOURCE: &str = "mortality_rate";
pub const HEALTH_SYSTEM_SOURCE: &str = "health_system";
pub const REGIONAL_SOURCE: &str = "regional";
pub const KFF_MORTALITY_SOURCE: &str = "kff_maternal_mortality";
pub const KFF_COVERAGE_SOURCE: &str = "kff_coverage";
pub const KFF_EARNINGS_SOURCE: &str = "kff_earnings";
pub const KFF_CESAREAN_SOURCE: &str = "kff_cesarean";

// Join key and derived columns
pub const STATE_COLUMN: &str = "state";
pub const ABBREVIATION_COLUMN: &str = "abbrev";

// Cleaned per-source tables
pub const MORTRATE_CSV_COLUMNS: [&str; 3] = ["state", "mortality_rate", "unknown"];
pub const HLTHSYS_CSV_COLUMNS: [&str; 3] = ["state", "performance_category", "unknown"];
pub const REGIONAL_CSV_COLUMNS: [&str; 8] = [
    "region",
    "race",
    "education",
    "ten_year_age_groups",
    "deaths",
    "percent_total_deaths",
    "mortality_rate",
    "mortality_binary",
];
pub const KFF_MORTALITY_COLUMNS: [&str; 2] = ["state", "mortality"];
pub const COVERAGE_COLUMNS: [&str; 2] = ["state", "uninsured"];
pub const EARNINGS_COLUMNS: [&str; 3] = ["state", "women_earnings", "ratio_earnings"];
pub const CESAREAN_COLUMNS: [&str; 2] = ["state", "cesarean"];

// Merged tables
pub const MERGED_COLUMNS: [&str; 5] = [
    "state",
    "mortality_rate",
    "unknown_mortality",
    "performance_category",
    "unknown_performance",
];
pub const KFF_MERGED_COLUMNS: [&str; 7] = [
    "state",
    "mortality",
    "uninsured",
    "women_earnings",
    "ratio_earnings",
    "cesarean",
    "abbrev",
];

// Model fields
pub const OUTCOME_FIELD: &str = "mortality_binary";
pub const RACE_FIELD: &str = "race";
pub const PREDICTOR_FIELDS: [&str; 4] = ["region", "race", "education", "ten_year_age_groups"];

/// Every source with a built-in cleaner, in data-flow order
pub fn all_sources() -> Vec<&'static str> {
    vec![
        MORTALITY_RATE_SOURCE,
        HEALTH_SYSTEM_SOURCE,
        REGIONAL_SOURCE,
        KFF_MORTALITY_SOURCE,
        KFF_COVERAGE_SOURCE,
        KFF_EARNINGS_SOURCE,
        KFF_CESAREAN_SOURCE,
    ]
}
