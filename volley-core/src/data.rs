use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

/// One row of named string values.
pub type Row = Arc<BTreeMap<String, String>>;

/// Supplies one row per iteration, shared by every worker of a run.
pub trait DataSource: Send + Sync + std::fmt::Debug {
    /// `None` when the source has no rows.
    fn next_row(&self) -> Option<Row>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rows loaded from a headered CSV file, served round-robin.
///
/// The cursor is a single lock-free counter. Under contention two workers may observe rows out
/// of order; a single worker always sees them in sequence.
#[derive(Debug, Default)]
pub struct CsvDataSource {
    rows: Vec<Row>,
    cursor: AtomicU64,
}

impl CsvDataSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let row: BTreeMap<String, String> = headers
                .iter()
                .zip(record.iter())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            rows.push(Arc::new(row));
        }

        tracing::debug!(rows = rows.len(), "csv data source loaded");
        Ok(Self::from_rows(rows))
    }

    pub fn from_rows<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Row>,
    {
        Self {
            rows: rows.into_iter().map(Into::into).collect(),
            cursor: AtomicU64::new(0),
        }
    }

    pub fn headers(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl DataSource for CsvDataSource {
    fn next_row(&self) -> Option<Row> {
        if self.rows.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.rows.len() as u64;
        self.rows.get(idx as usize).cloned()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}
