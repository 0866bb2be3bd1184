//! Key-based joins of cleaned per-state tables.
//!
//! Every input is keyed by the canonical state name. Columns keep their
//! source names unless the caller renames them; two sources may never
//! contribute the same output column.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::STATE_COLUMN;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::ingestion::RawTable;
use crate::pipeline::processing::normalize::normalize_state_name;
use crate::pipeline::processing::states::{self, StateScope};
use crate::types::{Cell, StateRecord};

/// How rows missing from some inputs are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JoinMode {
    /// Only keys present in every input survive
    #[default]
    #[serde(rename = "inner")]
    Inner,
    /// Every key of the primary input survives; absent fields are missing
    #[serde(rename = "left", alias = "left_outer")]
    LeftOuter,
}

/// One cleaned table indexed by state key
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedTable {
    pub source_id: String,
    /// value columns, the key excluded
    pub columns: Vec<String>,
    rows: Vec<(String, Vec<Cell>)>,
    index: HashMap<String, usize>,
}

impl KeyedTable {
    pub fn new(source_id: &str, columns: Vec<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            columns,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a row; a second row for the same state is rejected
    pub fn insert(&mut self, key: &str, values: Vec<Cell>) -> Result<()> {
        let key = normalize_state_name(key);
        if self.index.contains_key(&key) {
            return Err(PipelineError::DuplicateKey {
                source_id: self.source_id.clone(),
                state: key,
            });
        }
        if values.len() != self.columns.len() {
            return Err(PipelineError::row(
                &self.source_id,
                self.rows.len() + 1,
                STATE_COLUMN,
                format!("'{}' has {} values for {} columns", key, values.len(), self.columns.len()),
            ));
        }
        self.index.insert(key.clone(), self.rows.len());
        self.rows.push((key, values));
        Ok(())
    }

    pub fn from_records<T: StateRecord>(source_id: &str, records: &[T]) -> Result<Self> {
        let columns = T::columns().iter().skip(1).map(|c| c.to_string()).collect();
        let mut table = Self::new(source_id, columns);
        for record in records {
            table.insert(record.state(), record.values())?;
        }
        Ok(table)
    }

    /// Index a table read from disk by `key_column`. Empty cells are missing.
    pub fn from_raw(source_id: &str, raw: &RawTable, key_column: &str) -> Result<Self> {
        let key_index = raw.column_index(key_column).ok_or_else(|| PipelineError::MissingColumn {
            source_id: source_id.to_string(),
            column: key_column.to_string(),
        })?;
        let columns = raw
            .headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key_index)
            .map(|(_, h)| h.clone())
            .collect();

        let mut table = Self::new(source_id, columns);
        for (i, row) in raw.rows.iter().enumerate() {
            let key = row.get(key_index).ok_or_else(|| {
                PipelineError::row(source_id, i + 1, key_column, "is missing from a short row")
            })?;
            let values = (0..raw.headers.len())
                .filter(|c| *c != key_index)
                .map(|c| row.get(c).filter(|v| !v.is_empty()).cloned())
                .collect();
            table.insert(key, values)?;
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&[Cell]> {
        self.index.get(key).map(|&i| self.rows[i].1.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|(k, _)| k.as_str())
    }
}

/// Output column renames, keyed by (source id, column)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameMap {
    renames: HashMap<(String, String), String>,
}

impl RenameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, source_id: &str, column: &str, to: &str) -> Self {
        self.renames
            .insert((source_id.to_string(), column.to_string()), to.to_string());
        self
    }

    fn output_name<'a>(&'a self, source_id: &str, column: &'a str) -> &'a str {
        self.renames
            .get(&(source_id.to_string(), column.to_string()))
            .map(String::as_str)
            .unwrap_or(column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOptions {
    pub mode: JoinMode,
    /// Source whose rows drive the output order (and survive a left join).
    /// The first input when unset.
    pub primary: Option<String>,
    pub scope: StateScope,
    /// Name of the abbreviation column to append, if any
    pub abbreviation_column: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            mode: JoinMode::Inner,
            primary: None,
            scope: StateScope::default(),
            abbreviation_column: None,
        }
    }
}

/// Result of a merge, the state key in the first column
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl MergedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<Cell>> {
        let i = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[i].clone()).collect())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter_map(|r| r.first().and_then(|c| c.as_deref()))
            .collect()
    }

    /// Write as CSV; missing cells are empty fields
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
        }
        wtr.flush()?;
        debug!(path = %path.display(), rows = self.rows.len(), "wrote merged table");
        Ok(())
    }
}

/// Join `sources` on the state key.
pub fn merge(sources: &[KeyedTable], renames: &RenameMap, options: &MergeOptions) -> Result<MergedTable> {
    let Some(first) = sources.first() else {
        return Err(PipelineError::Config("merge needs at least one source".to_string()));
    };
    let primary = match &options.primary {
        Some(id) => sources.iter().find(|s| &s.source_id == id).ok_or_else(|| {
            PipelineError::Config(format!("primary source '{}' is not one of the merged sources", id))
        })?,
        None => first,
    };

    let columns = output_columns(sources, renames, options)?;

    let mut rows = Vec::new();
    for key in primary.keys() {
        if !options.scope.includes(key) {
            debug!(state = key, "outside merge scope");
            continue;
        }
        if options.mode == JoinMode::Inner && !sources.iter().all(|s| s.contains(key)) {
            debug!(state = key, "not present in every source");
            continue;
        }

        let abbreviation = states::abbreviation_for(key)?;
        let mut row = Vec::with_capacity(columns.len());
        row.push(Some(key.to_string()));
        for source in sources {
            match source.get(key) {
                Some(values) => row.extend(values.iter().cloned()),
                None => row.extend(std::iter::repeat(None).take(source.columns.len())),
            }
        }
        if options.abbreviation_column.is_some() {
            row.push(Some(abbreviation.to_string()));
        }
        rows.push(row);
    }

    let source_ids: Vec<&str> = sources.iter().map(|s| s.source_id.as_str()).collect();
    info!(
        sources = ?source_ids,
        mode = ?options.mode,
        primary = %primary.source_id,
        rows = rows.len(),
        "merged tables"
    );
    metrics::merge::rows_joined(&primary.source_id, rows.len());

    Ok(MergedTable { columns, rows })
}

fn output_columns(sources: &[KeyedTable], renames: &RenameMap, options: &MergeOptions) -> Result<Vec<String>> {
    let mut owner: HashMap<String, String> = HashMap::new();
    owner.insert(STATE_COLUMN.to_string(), "join key".to_string());
    if let Some(abbrev) = &options.abbreviation_column {
        owner.insert(abbrev.clone(), "abbreviation".to_string());
    }

    let mut columns = vec![STATE_COLUMN.to_string()];
    for source in sources {
        for column in &source.columns {
            let name = renames.output_name(&source.source_id, column);
            if let Some(first) = owner.get(name) {
                return Err(PipelineError::ColumnCollision {
                    column: name.to_string(),
                    first: first.clone(),
                    second: source.source_id.clone(),
                });
            }
            owner.insert(name.to_string(), source.source_id.clone());
            columns.push(name.to_string());
        }
    }
    if let Some(abbrev) = &options.abbreviation_column {
        columns.push(abbrev.clone());
    }
    Ok(columns)
}

/// Keys present in every table, in the order of the first
pub fn common_keys(sources: &[KeyedTable]) -> Vec<String> {
    let Some(first) = sources.first() else {
        return Vec::new();
    };
    let rest: Vec<HashSet<&str>> = sources[1..].iter().map(|s| s.keys().collect()).collect();
    first
        .keys()
        .filter(|k| rest.iter().all(|set| set.contains(k)))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(source_id: &str, columns: &[&str], rows: &[(&str, &[&str])]) -> KeyedTable {
        let mut t = KeyedTable::new(source_id, columns.iter().map(|c| c.to_string()).collect());
        for (key, values) in rows {
            t.insert(key, values.iter().map(|v| Some(v.to_string())).collect())
                .unwrap();
        }
        t
    }

    fn cell(v: &str) -> Cell {
        Some(v.to_string())
    }

    #[test]
    fn test_single_table_merge_is_identity() {
        let t = table("a", &["x", "y"], &[("ohio", &["1", "2"]), ("utah", &["3", "4"])]);
        let merged = merge(&[t], &RenameMap::new(), &MergeOptions::default()).unwrap();

        assert_eq!(merged.columns, vec!["state", "x", "y"]);
        assert_eq!(
            merged.rows,
            vec![
                vec![cell("ohio"), cell("1"), cell("2")],
                vec![cell("utah"), cell("3"), cell("4")],
            ]
        );
    }

    #[test]
    fn test_self_merge_with_renamed_copy_keeps_every_row() {
        let t = table("a", &["x"], &[("ohio", &["1"]), ("utah", &["3"])]);
        let mut copy = t.clone();
        copy.source_id = "b".to_string();
        let renames = RenameMap::new().rename("b", "x", "x_copy");

        let merged = merge(&[t.clone(), copy], &renames, &MergeOptions::default()).unwrap();
        assert_eq!(merged.keys(), t.keys().collect::<Vec<_>>());
        assert_eq!(merged.column("x"), merged.column("x_copy"));
    }

    #[test]
    fn test_inner_join_only_keeps_shared_keys() {
        let a = table("a", &["x"], &[("ohio", &["1"]), ("utah", &["2"]), ("maine", &["3"])]);
        let b = table("b", &["y"], &[("maine", &["9"]), ("ohio", &["8"]), ("texas", &["7"])]);

        let merged = merge(&[a.clone(), b.clone()], &RenameMap::new(), &MergeOptions::default()).unwrap();
        assert_eq!(merged.keys(), vec!["ohio", "maine"]);
        for key in merged.keys() {
            assert!(a.contains(key) && b.contains(key));
        }
        assert_eq!(merged.keys(), common_keys(&[a, b]));
    }

    #[test]
    fn test_left_join_fills_missing_fields() {
        let a = table("a", &["x"], &[("ohio", &["1"])]);
        let b = table("b", &["y"], &[("ohio", &["8"]), ("texas", &["7"])]);
        let options = MergeOptions {
            mode: JoinMode::LeftOuter,
            primary: Some("b".to_string()),
            ..MergeOptions::default()
        };

        let merged = merge(&[a, b], &RenameMap::new(), &options).unwrap();
        assert_eq!(merged.columns, vec!["state", "x", "y"]);
        assert_eq!(merged.rows[1], vec![cell("texas"), None, cell("7")]);
    }

    #[test]
    fn test_collision_without_rename_fails() {
        let a = table("a", &["unknown"], &[("ohio", &["1"])]);
        let b = table("b", &["unknown"], &[("ohio", &["2"])]);
        match merge(&[a, b], &RenameMap::new(), &MergeOptions::default()) {
            Err(PipelineError::ColumnCollision { column, first, second }) => {
                assert_eq!(column, "unknown");
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("expected ColumnCollision, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_state_fails_merge() {
        let a = table("a", &["x"], &[("ohio", &["1"]), ("puerto rico", &["2"])]);
        assert!(matches!(
            merge(&[a], &RenameMap::new(), &MergeOptions::default()),
            Err(PipelineError::UnknownState(name)) if name == "puerto rico"
        ));
    }

    #[test]
    fn test_abbreviation_and_scope() {
        let a = table(
            "a",
            &["x"],
            &[("district of columbia", &["1"]), ("california", &["2"])],
        );
        let options = MergeOptions {
            scope: StateScope::States,
            abbreviation_column: Some("abbrev".to_string()),
            ..MergeOptions::default()
        };
        let merged = merge(&[a], &RenameMap::new(), &options).unwrap();
        assert_eq!(merged.columns, vec!["state", "x", "abbrev"]);
        assert_eq!(merged.rows, vec![vec![cell("california"), cell("2"), cell("CA")]]);
    }

    #[test]
    fn test_from_raw_treats_empty_cells_as_missing() {
        let raw = RawTable::from_reader("state,mortality_rate,unknown\nOhio,,3\n".as_bytes()).unwrap();
        let keyed = KeyedTable::from_raw("mortality_rate", &raw, "state").unwrap();
        assert_eq!(keyed.columns, vec!["mortality_rate", "unknown"]);
        assert_eq!(keyed.get("ohio"), Some(&[None, cell("3")][..]));
    }

    #[test]
    fn test_duplicate_key_in_input_fails() {
        let raw = RawTable::from_reader("state,x\nOhio,1\nohio,2\n".as_bytes()).unwrap();
        assert!(matches!(
            KeyedTable::from_raw("a", &raw, "state"),
            Err(PipelineError::DuplicateKey { .. })
        ));
    }
}
