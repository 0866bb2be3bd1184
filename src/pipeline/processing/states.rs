//! Fixed state name to postal abbreviation lookup.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::pipeline::processing::normalize::normalize_state_name;

pub const DISTRICT_OF_COLUMBIA: &str = "district of columbia";

const STATE_ABBREVIATIONS: [(&str, &str); 51] = [
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("district of columbia", "DC"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
];

/// Rows that summarise the whole country rather than one state
const NATIONAL_AGGREGATES: &[&str] = &["united states", "u.s.", "us", "usa", "national", "total"];

static STATE_TABLE: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| STATE_ABBREVIATIONS.iter().copied().collect());

/// Which geographic units a merged table covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StateScope {
    /// The 50 states only
    States,
    /// The 50 states plus the District of Columbia
    #[default]
    StatesAndDistrict,
}

impl StateScope {
    pub fn includes(&self, key: &str) -> bool {
        match self {
            StateScope::States => key != DISTRICT_OF_COLUMBIA,
            StateScope::StatesAndDistrict => true,
        }
    }
}

/// Two-letter code for a full state name (any casing or padding).
pub fn abbreviation_for(full_name: &str) -> Result<&'static str> {
    let key = normalize_state_name(full_name);
    STATE_TABLE
        .get(key.as_str())
        .copied()
        .ok_or(PipelineError::UnknownState(key))
}

pub fn is_known_state(full_name: &str) -> bool {
    abbreviation_for(full_name).is_ok()
}

/// Whether a row names the national total instead of a state
pub fn is_national_aggregate(full_name: &str) -> bool {
    let key = normalize_state_name(full_name);
    NATIONAL_AGGREGATES.contains(&key.as_str())
}

/// Canonical keys of every state in scope, alphabetical
pub fn state_keys(scope: StateScope) -> Vec<&'static str> {
    STATE_ABBREVIATIONS
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| scope.includes(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_states_resolve() {
        assert_eq!(abbreviation_for("california").unwrap(), "CA");
        assert_eq!(abbreviation_for("  New York ").unwrap(), "NY");
        assert_eq!(abbreviation_for("District of Columbia").unwrap(), "DC");
    }

    #[test]
    fn test_unknown_state_fails() {
        match abbreviation_for("nonexistent state") {
            Err(PipelineError::UnknownState(name)) => assert_eq!(name, "nonexistent state"),
            other => panic!("expected UnknownState, got {:?}", other),
        }
        assert!(!is_known_state("puerto rico"));
    }

    #[test]
    fn test_scope_sizes() {
        assert_eq!(state_keys(StateScope::States).len(), 50);
        assert_eq!(state_keys(StateScope::StatesAndDistrict).len(), 51);
    }

    #[test]
    fn test_abbreviations_are_unique() {
        let mut codes: Vec<&str> = STATE_ABBREVIATIONS.iter().map(|(_, code)| *code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 51);
    }

    #[test]
    fn test_national_aggregates() {
        assert!(is_national_aggregate("United States"));
        assert!(is_national_aggregate("U.S."));
        assert!(!is_national_aggregate("Utah"));
    }
}
