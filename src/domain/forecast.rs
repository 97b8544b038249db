// Forecast table domain model and the registry-facing predictor wrapper
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::model::{FittedModel, TrainError};
use super::table::TablePreview;

const BASE_COLUMNS: [&str; 9] = [
    "ds",
    "yhat",
    "yhat_lower",
    "yhat_upper",
    "trend",
    "trend_lower",
    "trend_upper",
    "additive_terms",
    "multiplicative_terms",
];

/// `ds`, `yhat`, `yhat_lower`, `yhat_upper`
const HEAD_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub trend: f64,
    pub trend_lower: f64,
    pub trend_upper: f64,
    pub additive_terms: f64,
    pub multiplicative_terms: f64,
    /// Seasonal component values, aligned with `ForecastTable::component_names`.
    pub components: Vec<f64>,
}

/// Predictions over the history dates followed by the future dates.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastTable {
    component_names: Vec<String>,
    rows: Vec<ForecastRow>,
}

impl ForecastTable {
    pub fn new(component_names: Vec<String>, rows: Vec<ForecastRow>) -> Self {
        Self {
            component_names,
            rows,
        }
    }

    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn component_names(&self) -> &[String] {
        &self.component_names
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Column order of the exported CSV.
    pub fn columns(&self) -> Vec<String> {
        BASE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.component_names.iter().cloned())
            .collect()
    }

    pub fn record(&self, row: &ForecastRow) -> Vec<String> {
        let mut record = vec![
            row.ds.format("%Y-%m-%d").to_string(),
            row.yhat.to_string(),
            row.yhat_lower.to_string(),
            row.yhat_upper.to_string(),
            row.trend.to_string(),
            row.trend_lower.to_string(),
            row.trend_upper.to_string(),
            row.additive_terms.to_string(),
            row.multiplicative_terms.to_string(),
        ];
        record.extend(row.components.iter().map(f64::to_string));
        record
    }

    /// First `limit` rows with only the date and the prediction band.
    pub fn head(&self, limit: usize) -> TablePreview {
        TablePreview {
            columns: BASE_COLUMNS[..HEAD_WIDTH].iter().map(|c| c.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .take(limit)
                .map(|r| {
                    let mut record = self.record(r);
                    record.truncate(HEAD_WIDTH);
                    record
                })
                .collect(),
            total_rows: self.rows.len(),
        }
    }
}

/// `periods` consecutive days following `last`.
pub fn make_future_dates(last: NaiveDate, periods: u32) -> Result<Vec<NaiveDate>, TrainError> {
    (1..=u64::from(periods))
        .map(|i| last.checked_add_days(Days::new(i)).ok_or(TrainError::DateOverflow))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// Inference surface of a model stored in the registry.
pub trait Predictor {
    fn predict(&self, ds: &[NaiveDate]) -> Vec<PredictionRow>;
}

/// Fitted model as persisted by the registry: given timestamps, returns
/// `{ds, yhat, yhat_lower, yhat_upper}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPredictor {
    model: FittedModel,
}

impl ForecastPredictor {
    pub fn new(model: FittedModel) -> Self {
        Self { model }
    }
}

impl Predictor for ForecastPredictor {
    fn predict(&self, ds: &[NaiveDate]) -> Vec<PredictionRow> {
        self.model
            .predict(ds)
            .rows()
            .iter()
            .map(|r| PredictionRow {
                ds: r.ds,
                yhat: r.yhat,
                yhat_lower: r.yhat_lower,
                yhat_upper: r.yhat_upper,
            })
            .collect()
    }
}
