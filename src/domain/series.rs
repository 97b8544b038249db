// Canonical {ds, y} series and the normalization that derives it from a raw table
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use super::table::{RawTable, TablePreview};

pub const DATE_COLUMN: &str = "Date";
pub const PRICE_COLUMN: &str = "Price";

/// A series needs at least this many points to be forecast.
pub const MIN_ROWS: usize = 2;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("column '{0}' not found in uploaded data")]
    MissingColumn(&'static str),

    #[error("row {row}: date '{value}' does not match format '{format}'")]
    InvalidDate {
        row: usize,
        value: String,
        format: String,
    },

    #[error("row {row}: price '{value}' is not a number")]
    InvalidPrice { row: usize, value: String },

    #[error("series has {0} valid rows after processing, at least 2 are required")]
    TooFewRows(usize),
}

/// How the `Date` column is turned into a `YYYY-MM-DD` timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateStrategy {
    /// Calendar-aware parse with a chrono format string; non-conforming values are rejected.
    Format(String),
    /// Legacy positional slicing of the last ten characters: year = [-4:],
    /// month = [-7:-5], day = [-10:-8]. No calendar validation, so
    /// `MM/DD/YYYY` input comes out as `YYYY-DD-MM`.
    Positional,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalPoint {
    pub ds: String,
    pub y: f64,
}

/// Normalized two-column series. Always holds at least [`MIN_ROWS`] finite points.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSeries {
    points: Vec<CanonicalPoint>,
}

impl CanonicalSeries {
    pub fn new(points: Vec<CanonicalPoint>) -> Result<Self, NormalizeError> {
        if points.len() < MIN_ROWS {
            return Err(NormalizeError::TooFewRows(points.len()));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[CanonicalPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn preview(&self, limit: usize) -> TablePreview {
        TablePreview {
            columns: vec!["ds".to_string(), "y".to_string()],
            rows: self
                .points
                .iter()
                .take(limit)
                .map(|p| vec![p.ds.clone(), p.y.to_string()])
                .collect(),
            total_rows: self.points.len(),
        }
    }
}

/// Map the `Date`/`Price` schema of an uploaded table onto `{ds, y}`.
///
/// Rows with an empty date or price are dropped. A price that is present but
/// not numeric fails the whole table, as does a date the format strategy
/// cannot parse.
pub fn normalize(table: &RawTable, strategy: &DateStrategy) -> Result<CanonicalSeries, NormalizeError> {
    let date_idx = table
        .column_index(DATE_COLUMN)
        .ok_or(NormalizeError::MissingColumn(DATE_COLUMN))?;
    let price_idx = table
        .column_index(PRICE_COLUMN)
        .ok_or(NormalizeError::MissingColumn(PRICE_COLUMN))?;

    let mut points = Vec::with_capacity(table.len());
    for (i, record) in table.rows().iter().enumerate() {
        // Line 1 of the file is the header.
        let row = i + 2;
        let raw_date = record.get(date_idx).map(String::as_str).unwrap_or("");
        let raw_price = record.get(price_idx).map(String::as_str).unwrap_or("");

        let y = parse_price(raw_price).ok_or_else(|| NormalizeError::InvalidPrice {
            row,
            value: raw_price.to_string(),
        })?;
        let ds = derive_timestamp(raw_date, strategy).map_err(|format| NormalizeError::InvalidDate {
            row,
            value: raw_date.to_string(),
            format,
        })?;

        if let (Some(ds), Some(y)) = (ds, y) {
            points.push(CanonicalPoint { ds, y });
        }
    }

    tracing::debug!(
        kept = points.len(),
        dropped = table.len() - points.len(),
        "normalized raw table"
    );
    CanonicalSeries::new(points)
}

/// Strip grouping commas and parse. `Some(None)` is a missing value,
/// `None` is a value that cannot be coerced.
fn parse_price(raw: &str) -> Option<Option<f64>> {
    let cleaned = raw.replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Some(None);
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_nan() => Some(None),
        Ok(v) if v.is_finite() => Some(Some(v)),
        _ => None,
    }
}

/// `Ok(None)` for an empty cell; `Err(format)` when the format strategy rejects the value.
fn derive_timestamp(raw: &str, strategy: &DateStrategy) -> Result<Option<String>, String> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    match strategy {
        DateStrategy::Format(format) => NaiveDate::parse_from_str(raw.trim(), format)
            .map(|date| Some(date.format(TIMESTAMP_FORMAT).to_string()))
            .map_err(|_| format.clone()),
        DateStrategy::Positional => Ok(Some(positional_timestamp(raw))),
    }
}

fn positional_timestamp(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let year = tail_slice(&chars, -4, None);
    let month = tail_slice(&chars, -7, Some(-5));
    let day = tail_slice(&chars, -10, Some(-8));
    format!("{}-{}-{}", year, month, day)
}

/// Slice with negative offsets from the end, clamped to the string like `s[start:end]`.
fn tail_slice(chars: &[char], start: isize, end: Option<isize>) -> String {
    let len = chars.len() as isize;
    let clamp = |offset: isize| (len + offset).clamp(0, len) as usize;
    let from = clamp(start);
    let to = end.map(clamp).unwrap_or(chars.len());
    if from >= to {
        return String::new();
    }
    chars[from..to].iter().collect()
}
