use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// A delimited table exactly as read from disk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// column names from the header row
    pub headers: Vec<String>,
    /// each data row, one String per field
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let table = Self::from_reader(File::open(path)?)?;
        debug!(path = %path.display(), rows = table.rows.len(), "read table");
        Ok(table)
    }

    /// Rows may be ragged; binding to a schema reports short rows per field.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a header, exact match first, then case-insensitive
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers
            .iter()
            .position(|h| h == name)
            .or_else(|| self.headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
    }

    /// Copy of the table keeping only rows that satisfy `keep`
    pub fn filter_rows<F>(&self, keep: F) -> RawTable
    where
        F: Fn(&[String]) -> bool,
    {
        RawTable {
            headers: self.headers.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = writer_for(path.as_ref())?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Write typed records under an explicit header so empty tables still carry
/// their schema.
pub fn write_records<P, T>(path: P, headers: &[&str], records: &[T]) -> Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let path = path.as_ref();
    let mut wtr = writer_for(path)?;
    wtr.write_record(headers)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    debug!(path = %path.display(), rows = records.len(), "wrote table");
    Ok(())
}

fn writer_for(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(WriterBuilder::new().has_headers(false).from_path(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use tempfile::tempdir;

    #[test]
    fn test_reads_headers_and_ragged_rows() {
        let data = "state, rate ,unknown\nAlabama,12.1,x\nAlaska,9.0\n";
        let table = RawTable::from_reader(data.as_bytes()).unwrap();

        assert_eq!(table.headers, vec!["state", "rate", "unknown"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1], vec!["Alaska", "9.0"]);
        assert_eq!(table.column_index("RATE"), Some(1));
        assert_eq!(table.column_index("missing"), None);
    }

    #[test]
    fn test_write_records_keeps_header_for_empty_tables() {
        #[derive(Serialize)]
        struct Row {
            state: String,
            value: Option<f64>,
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        write_records::<_, Row>(&path, &["state", "value"], &[]).unwrap();
        let empty = RawTable::read_csv(&path).unwrap();
        assert_eq!(empty.headers, vec!["state", "value"]);
        assert!(empty.is_empty());

        let rows = vec![
            Row { state: "ohio".into(), value: Some(0.25) },
            Row { state: "utah".into(), value: None },
        ];
        write_records(&path, &["state", "value"], &rows).unwrap();
        let table = RawTable::read_csv(&path).unwrap();
        assert_eq!(table.rows, vec![vec!["ohio", "0.25"], vec!["utah", ""]]);
    }

    #[test]
    fn test_filter_rows() {
        let table = RawTable::new(
            vec!["a".into()],
            vec![vec!["1".into()], vec!["2".into()], vec!["3".into()]],
        );
        let odd = table.filter_rows(|row| row[0] != "2");
        assert_eq!(odd.len(), 2);
        assert_eq!(odd.headers, table.headers);
    }
}
