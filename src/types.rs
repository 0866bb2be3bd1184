use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{
    CESAREAN_COLUMNS, COVERAGE_COLUMNS, EARNINGS_COLUMNS, HLTHSYS_CSV_COLUMNS, KFF_MORTALITY_COLUMNS,
    MORTRATE_CSV_COLUMNS,
};
use crate::error::{PipelineError, Result, ValueKind};
use crate::pipeline::processing::normalize::{normalize_dash, split_range};

/// A cell of a keyed table; `None` is the missing marker
pub type Cell = Option<String>;

/// A cleaned record keyed by canonical state name
pub trait StateRecord {
    /// Output columns, the state key first
    fn columns() -> &'static [&'static str];

    fn state(&self) -> &str;

    /// Values for every column after the state key
    fn values(&self) -> Vec<Cell>;
}

/// Maternal mortality as published: a point value or a legend bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MortalityRate {
    Point(f64),
    Range { low: f64, high: f64 },
}

impl fmt::Display for MortalityRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MortalityRate::Point(v) => write!(f, "{}", v),
            MortalityRate::Range { low, high } => write!(f, "{}-{}", low, high),
        }
    }
}

impl FromStr for MortalityRate {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = normalize_dash(s.trim());
        // plain numbers first so exponents like `1e-5` are not read as ranges
        if let Some(point) = normalized.parse::<f64>().ok().filter(|v| v.is_finite()) {
            return Ok(MortalityRate::Point(point));
        }
        if normalized.contains('-') {
            let (low, high) = split_range(&normalized)?;
            return Ok(MortalityRate::Range { low, high });
        }
        Err(PipelineError::format(ValueKind::Number, s))
    }
}

impl Serialize for MortalityRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MortalityRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Cleaned row of the mortality rate table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MortalityRateRecord {
    pub state: String,
    pub mortality_rate: Option<MortalityRate>,
    /// Carried through verbatim
    pub unknown: String,
}

impl StateRecord for MortalityRateRecord {
    fn columns() -> &'static [&'static str] {
        &MORTRATE_CSV_COLUMNS
    }

    fn state(&self) -> &str {
        &self.state
    }

    fn values(&self) -> Vec<Cell> {
        vec![
            self.mortality_rate.map(|r| r.to_string()),
            Some(self.unknown.clone()),
        ]
    }
}

/// Cleaned row of the health system performance table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub state: String,
    pub performance_category: String,
    pub unknown: String,
}

impl StateRecord for PerformanceRecord {
    fn columns() -> &'static [&'static str] {
        &HLTHSYS_CSV_COLUMNS
    }

    fn state(&self) -> &str {
        &self.state
    }

    fn values(&self) -> Vec<Cell> {
        vec![Some(self.performance_category.clone()), Some(self.unknown.clone())]
    }
}

/// One (region, race, education, age group) cell of the CDC breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalRecord {
    pub region: String,
    pub race: String,
    pub education: String,
    pub ten_year_age_groups: String,
    pub deaths: u32,
    /// Share of all deaths, 0-100 scale
    pub percent_total_deaths: f64,
    /// The same share as a 0-1 fraction
    pub mortality_rate: f64,
    pub mortality_binary: u8,
}

impl RegionalRecord {
    /// Cells in `REGIONAL_CSV_COLUMNS` order
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.region.clone(),
            self.race.clone(),
            self.education.clone(),
            self.ten_year_age_groups.clone(),
            self.deaths.to_string(),
            self.percent_total_deaths.to_string(),
            self.mortality_rate.to_string(),
            self.mortality_binary.to_string(),
        ]
    }
}

/// KFF maternal deaths per 100,000 live births
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KffMortalityRecord {
    pub state: String,
    pub mortality: Option<f64>,
}

/// KFF share of women without health coverage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    pub state: String,
    pub uninsured: Option<f64>,
}

/// KFF median weekly earnings for women and the women-to-men ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsRecord {
    pub state: String,
    pub women_earnings: Option<f64>,
    pub ratio_earnings: Option<f64>,
}

/// KFF share of births delivered by cesarean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CesareanRecord {
    pub state: String,
    pub cesarean: Option<f64>,
}

fn number_cell(v: Option<f64>) -> Cell {
    v.map(|v| v.to_string())
}

impl StateRecord for KffMortalityRecord {
    fn columns() -> &'static [&'static str] {
        &KFF_MORTALITY_COLUMNS
    }

    fn state(&self) -> &str {
        &self.state
    }

    fn values(&self) -> Vec<Cell> {
        vec![number_cell(self.mortality)]
    }
}

impl StateRecord for CoverageRecord {
    fn columns() -> &'static [&'static str] {
        &COVERAGE_COLUMNS
    }

    fn state(&self) -> &str {
        &self.state
    }

    fn values(&self) -> Vec<Cell> {
        vec![number_cell(self.uninsured)]
    }
}

impl StateRecord for EarningsRecord {
    fn columns() -> &'static [&'static str] {
        &EARNINGS_COLUMNS
    }

    fn state(&self) -> &str {
        &self.state
    }

    fn values(&self) -> Vec<Cell> {
        vec![number_cell(self.women_earnings), number_cell(self.ratio_earnings)]
    }
}

impl StateRecord for CesareanRecord {
    fn columns() -> &'static [&'static str] {
        &CESAREAN_COLUMNS
    }

    fn state(&self) -> &str {
        &self.state
    }

    fn values(&self) -> Vec<Cell> {
        vec![number_cell(self.cesarean)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mortality_rate_parses_points_and_ranges() {
        assert_eq!("12.5".parse::<MortalityRate>().unwrap(), MortalityRate::Point(12.5));
        assert_eq!(
            "18.7\u{2013}25.3".parse::<MortalityRate>().unwrap(),
            MortalityRate::Range { low: 18.7, high: 25.3 }
        );
        assert!("n/a-ish".parse::<MortalityRate>().is_err());
        assert!("abc".parse::<MortalityRate>().is_err());
    }

    #[test]
    fn test_mortality_rate_exponent_is_a_point() {
        assert_eq!("1e-5".parse::<MortalityRate>().unwrap(), MortalityRate::Point(1e-5));
        assert_eq!("2.5E-3".parse::<MortalityRate>().unwrap(), MortalityRate::Point(0.0025));
        assert_eq!(
            "1.5-2.5".parse::<MortalityRate>().unwrap(),
            MortalityRate::Range { low: 1.5, high: 2.5 }
        );
    }

    #[test]
    fn test_mortality_rate_displays_with_plain_hyphen() {
        let rate = MortalityRate::Range { low: 0.0, high: 18.6 };
        assert_eq!(rate.to_string(), "0-18.6");
        assert_eq!(MortalityRate::Point(9.5).to_string(), "9.5");
    }

    #[test]
    fn test_state_record_values_follow_columns() {
        let record = EarningsRecord {
            state: "ohio".into(),
            women_earnings: Some(950.0),
            ratio_earnings: None,
        };
        assert_eq!(EarningsRecord::columns().len(), record.values().len() + 1);
        assert_eq!(record.values(), vec![Some("950".to_string()), None]);
    }
}
