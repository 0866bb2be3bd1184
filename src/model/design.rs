//! Treatment (dummy) coding of categorical predictors.
//!
//! Each factor's levels are sorted; the first is the reference and gets no
//! column. Interactions multiply the non-reference columns of two factors.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::{FitError, PipelineError, Result};
use crate::pipeline::ingestion::RawTable;

pub const INTERCEPT: &str = "Intercept";

fn level_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// One categorical predictor and the levels seen while fitting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Factor {
    pub name: String,
    /// sorted; `levels[0]` is the reference
    pub levels: Vec<String>,
    #[serde(skip)]
    lookup: HashMap<String, usize>,
}

impl Factor {
    /// Collect the distinct levels of `values`. Spelling is taken from the
    /// first occurrence; matching ignores case and padding.
    pub fn from_values<'a>(name: &str, values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut seen: BTreeMap<String, String> = BTreeMap::new();
        for value in values {
            seen.entry(level_key(value))
                .or_insert_with(|| value.trim().to_string());
        }
        let mut levels: Vec<String> = seen.into_values().collect();
        levels.sort();
        let lookup = levels.iter().enumerate().map(|(i, l)| (level_key(l), i)).collect();
        Self {
            name: name.to_string(),
            levels,
            lookup,
        }
    }

    pub fn reference(&self) -> &str {
        &self.levels[0]
    }

    pub fn level_index(&self, value: &str) -> Option<usize> {
        self.lookup.get(&level_key(value)).copied()
    }

    fn column_names(&self) -> Vec<String> {
        self.levels[1..]
            .iter()
            .map(|l| format!("{}[T.{}]", self.name, l))
            .collect()
    }

    /// Treatment-coded columns for level `index`
    fn encode(&self, index: usize) -> Vec<f64> {
        (1..self.levels.len())
            .map(|i| if i == index { 1.0 } else { 0.0 })
            .collect()
    }
}

/// Column layout of a design matrix: intercept, main effects, interactions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Design {
    pub factors: Vec<Factor>,
    /// pairs of indices into `factors`
    pub interactions: Vec<(usize, usize)>,
    pub columns: Vec<String>,
}

impl Design {
    /// Learn levels for `predictors` from `data`.
    pub fn from_table(data: &RawTable, predictors: &[String], interactions: &[(String, String)]) -> Result<Self> {
        let mut factors = Vec::with_capacity(predictors.len());
        for name in predictors {
            let col = training_column(data, name)?;
            let factor = Factor::from_values(name, data.rows.iter().map(|r| cell(r, col)));
            if factor.levels.len() < 2 {
                return Err(FitError::SingleLevel {
                    factor: name.clone(),
                    level: factor.levels.first().cloned().unwrap_or_default(),
                }
                .into());
            }
            factors.push(factor);
        }

        let position = |name: &str| {
            predictors
                .iter()
                .position(|p| p == name)
                .ok_or_else(|| PipelineError::Config(format!("interaction term '{}' is not a predictor", name)))
        };
        let mut pairs = Vec::with_capacity(interactions.len());
        for (a, b) in interactions {
            pairs.push((position(a)?, position(b)?));
        }

        let mut columns = vec![INTERCEPT.to_string()];
        for factor in &factors {
            columns.extend(factor.column_names());
        }
        for &(a, b) in &pairs {
            for left in factors[a].column_names() {
                for right in factors[b].column_names() {
                    columns.push(format!("{}:{}", left, right));
                }
            }
        }

        Ok(Self {
            factors,
            interactions: pairs,
            columns,
        })
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Design row for per-factor level indices
    pub fn encode(&self, level_indices: &[usize]) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.width());
        row.push(1.0);
        let main: Vec<Vec<f64>> = self
            .factors
            .iter()
            .zip(level_indices)
            .map(|(f, &i)| f.encode(i))
            .collect();
        for block in &main {
            row.extend_from_slice(block);
        }
        for &(a, b) in &self.interactions {
            for left in &main[a] {
                for right in &main[b] {
                    row.push(left * right);
                }
            }
        }
        row
    }

    /// Level indices of one training row; every level is known by construction.
    pub(crate) fn training_indices(&self, data: &RawTable, row: &[String]) -> Result<Vec<usize>> {
        self.factors
            .iter()
            .map(|f| {
                let col = training_column(data, &f.name)?;
                let value = cell(row, col);
                f.level_index(value).ok_or_else(|| PipelineError::UnseenLevel {
                    field: f.name.clone(),
                    value: value.to_string(),
                })
            })
            .collect()
    }

    /// Level indices for a prediction input keyed by predictor name
    pub fn input_indices(&self, input: &HashMap<String, String>) -> Result<Vec<usize>> {
        self.factors
            .iter()
            .map(|f| {
                let value = input
                    .get(&f.name)
                    .ok_or_else(|| PipelineError::MissingPredictor(f.name.clone()))?;
                f.level_index(value).ok_or_else(|| PipelineError::UnseenLevel {
                    field: f.name.clone(),
                    value: value.trim().to_string(),
                })
            })
            .collect()
    }

    pub fn levels(&self) -> BTreeMap<String, Vec<String>> {
        self.factors
            .iter()
            .map(|f| (f.name.clone(), f.levels.clone()))
            .collect()
    }
}

pub(crate) fn training_column(data: &RawTable, name: &str) -> Result<usize> {
    data.column_index(name).ok_or_else(|| PipelineError::MissingColumn {
        source_id: "training data".to_string(),
        column: name.to_string(),
    })
}

pub(crate) fn cell(row: &[String], col: usize) -> &str {
    row.get(col).map(String::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> RawTable {
        RawTable::new(
            vec!["region".into(), "race".into(), "y".into()],
            vec![
                vec!["West".into(), "Asian".into(), "0".into()],
                vec!["South".into(), "White".into(), "1".into()],
                vec!["Northeast".into(), "Asian".into(), "1".into()],
                vec!["south".into(), "White".into(), "0".into()],
            ],
        )
    }

    #[test]
    fn test_levels_sorted_and_case_folded() {
        let factor = Factor::from_values("region", ["West", "South", " south ", "Northeast"]);
        assert_eq!(factor.levels, vec!["Northeast", "South", "West"]);
        assert_eq!(factor.reference(), "Northeast");
        assert_eq!(factor.level_index("SOUTH"), Some(1));
        assert_eq!(factor.level_index("Midwest"), None);
    }

    #[test]
    fn test_columns_drop_reference_level() {
        let design = Design::from_table(&frame(), &["region".into(), "race".into()], &[]).unwrap();
        assert_eq!(
            design.columns,
            vec!["Intercept", "region[T.South]", "region[T.West]", "race[T.White]"]
        );
        assert_eq!(design.encode(&[2, 1]), vec![1.0, 0.0, 1.0, 1.0]);
        assert_eq!(design.encode(&[0, 0]), vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_interaction_columns() {
        let design = Design::from_table(
            &frame(),
            &["region".into(), "race".into()],
            &[("region".into(), "race".into())],
        )
        .unwrap();
        assert_eq!(design.width(), 6);
        assert_eq!(design.columns[4], "region[T.South]:race[T.White]");
        assert_eq!(design.encode(&[1, 1]), vec![1.0, 1.0, 0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_single_level_factor_is_rejected() {
        let mut data = frame();
        for row in &mut data.rows {
            row[1] = "Asian".into();
        }
        match Design::from_table(&data, &["race".into()], &[]) {
            Err(PipelineError::Fit(FitError::SingleLevel { factor, level })) => {
                assert_eq!(factor, "race");
                assert_eq!(level, "Asian");
            }
            other => panic!("expected SingleLevel, got {:?}", other),
        }
    }

    #[test]
    fn test_input_errors() {
        let design = Design::from_table(&frame(), &["region".into()], &[]).unwrap();
        let mut input = HashMap::new();
        assert!(matches!(
            design.input_indices(&input),
            Err(PipelineError::MissingPredictor(f)) if f == "region"
        ));
        input.insert("region".to_string(), "Midwest".to_string());
        assert!(matches!(
            design.input_indices(&input),
            Err(PipelineError::UnseenLevel { .. })
        ));
        input.insert("region".to_string(), " west ".to_string());
        assert_eq!(design.input_indices(&input).unwrap(), vec![2]);
    }
}
