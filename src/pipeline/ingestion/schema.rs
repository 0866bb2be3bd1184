use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::table::RawTable;
use crate::error::{PipelineError, Result};

/// One raw header and the canonical field it feeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub raw: String,
    pub field: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// Declared raw layout of a source table, addressed by header name
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSchema {
    pub source_id: String,
    pub columns: Vec<ColumnMapping>,
}

impl SourceSchema {
    pub fn new(source_id: &str, columns: &[(&str, &str)]) -> Self {
        Self {
            source_id: source_id.to_string(),
            columns: columns
                .iter()
                .map(|(raw, field)| ColumnMapping {
                    raw: raw.to_string(),
                    field: field.to_string(),
                    required: true,
                })
                .collect(),
        }
    }

    /// Add a column that may be absent from the raw header
    pub fn with_optional(mut self, raw: &str, field: &str) -> Self {
        self.columns.push(ColumnMapping {
            raw: raw.to_string(),
            field: field.to_string(),
            required: false,
        });
        self
    }

    /// Replace raw header names for the fields named in `overrides`
    pub fn with_overrides(mut self, overrides: &[ColumnMapping]) -> Self {
        for o in overrides {
            match self.columns.iter_mut().find(|c| c.field == o.field) {
                Some(existing) => *existing = o.clone(),
                None => self.columns.push(o.clone()),
            }
        }
        self
    }

    /// Resolve every declared column against the header row.
    pub fn bind<'a>(&'a self, table: &'a RawTable) -> Result<BoundTable<'a>> {
        let mut positions = HashMap::new();
        for column in &self.columns {
            let position = table.column_index(&column.raw);
            if position.is_none() && column.required {
                return Err(PipelineError::MissingColumn {
                    source_id: self.source_id.clone(),
                    column: column.raw.clone(),
                });
            }
            positions.insert(column.field.as_str(), position);
        }
        Ok(BoundTable {
            source_id: &self.source_id,
            table,
            positions,
        })
    }
}

/// A raw table whose columns have been checked against a schema
pub struct BoundTable<'a> {
    source_id: &'a str,
    table: &'a RawTable,
    positions: HashMap<&'a str, Option<usize>>,
}

impl<'a> BoundTable<'a> {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = SchemaRow<'_>> + '_ {
        self.table
            .rows
            .iter()
            .enumerate()
            .map(move |(i, cells)| SchemaRow {
                source_id: self.source_id,
                index: i + 1,
                cells,
                positions: &self.positions,
            })
    }
}

/// A data row read by canonical field name
pub struct SchemaRow<'a> {
    source_id: &'a str,
    index: usize,
    cells: &'a [String],
    positions: &'a HashMap<&'a str, Option<usize>>,
}

impl<'a> SchemaRow<'a> {
    /// 1-based data row number (the header is not counted)
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn source_id(&self) -> &str {
        self.source_id
    }

    /// Required field; a short row is a row format error.
    pub fn get(&self, field: &str) -> Result<&'a str> {
        match self.positions.get(field) {
            Some(Some(pos)) => self
                .cells
                .get(*pos)
                .map(String::as_str)
                .ok_or_else(|| self.error(field, "is missing from the row")),
            _ => Err(self.error(field, "is not declared for this source")),
        }
    }

    /// Optional field; absent column or short row is `None`.
    pub fn optional(&self, field: &str) -> Option<&'a str> {
        match self.positions.get(field) {
            Some(Some(pos)) => self.cells.get(*pos).map(String::as_str),
            _ => None,
        }
    }

    /// Row format error pointing at this row
    pub fn error(&self, field: &str, reason: impl Into<String>) -> PipelineError {
        PipelineError::row(self.source_id, self.index, field, reason)
    }
}
