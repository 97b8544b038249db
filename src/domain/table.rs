// Raw uploaded table domain model
use serde::Serialize;
use thiserror::Error;

/// Number of rows shown when a table is previewed on the dashboard.
pub const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("uploaded file is empty")]
    Empty,

    #[error("uploaded file is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("uploaded file is not valid UTF-8 text")]
    NotUtf8,

    #[error("uploaded file is not valid CSV: {0}")]
    Malformed(String),
}

/// Rows of an uploaded CSV file, kept as text exactly as they were read.
/// No schema is enforced until normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn preview(&self, limit: usize) -> TablePreview {
        TablePreview {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(limit).cloned().collect(),
            total_rows: self.rows.len(),
        }
    }
}

/// First rows of a table as display text, used for every preview the dashboard shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePreview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
}
