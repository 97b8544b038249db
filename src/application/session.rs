// Session state holder: Empty -> Ingested -> Normalized -> Forecasted
use crate::domain::forecast::ForecastTable;
use crate::domain::series::CanonicalSeries;
use crate::domain::table::RawTable;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("no data uploaded yet")]
    NoData,

    #[error("data must be converted before training")]
    NotNormalized,

    #[error("no forecast available, train a model first")]
    NoForecast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStage {
    Empty,
    Ingested,
    Normalized,
    Forecasted,
}

/// Everything retained between dashboard interactions. Each stage owns the
/// results of the stages before it, so a new upload drops the series and
/// forecast derived from the previous file.
#[derive(Debug, Default)]
pub enum Session {
    #[default]
    Empty,
    Ingested {
        raw: RawTable,
    },
    Normalized {
        raw: RawTable,
        series: CanonicalSeries,
    },
    Forecasted {
        raw: RawTable,
        series: CanonicalSeries,
        forecast: ForecastTable,
    },
}

impl Session {
    pub fn stage(&self) -> SessionStage {
        match self {
            Session::Empty => SessionStage::Empty,
            Session::Ingested { .. } => SessionStage::Ingested,
            Session::Normalized { .. } => SessionStage::Normalized,
            Session::Forecasted { .. } => SessionStage::Forecasted,
        }
    }

    pub fn raw_table(&self) -> Option<&RawTable> {
        match self {
            Session::Empty => None,
            Session::Ingested { raw }
            | Session::Normalized { raw, .. }
            | Session::Forecasted { raw, .. } => Some(raw),
        }
    }

    pub fn series(&self) -> Option<&CanonicalSeries> {
        match self {
            Session::Normalized { series, .. } | Session::Forecasted { series, .. } => Some(series),
            _ => None,
        }
    }

    pub fn forecast(&self) -> Option<&ForecastTable> {
        match self {
            Session::Forecasted { forecast, .. } => Some(forecast),
            _ => None,
        }
    }

    /// A new upload is always accepted and discards everything derived earlier.
    pub fn ingest(&mut self, raw: RawTable) {
        *self = Session::Ingested { raw };
    }

    pub fn commit_series(&mut self, series: CanonicalSeries) -> Result<(), SessionError> {
        match std::mem::take(self) {
            Session::Empty => Err(SessionError::NoData),
            Session::Ingested { raw }
            | Session::Normalized { raw, .. }
            | Session::Forecasted { raw, .. } => {
                *self = Session::Normalized { raw, series };
                Ok(())
            }
        }
    }

    pub fn commit_forecast(&mut self, forecast: ForecastTable) -> Result<(), SessionError> {
        match std::mem::take(self) {
            Session::Normalized { raw, series } | Session::Forecasted { raw, series, .. } => {
                *self = Session::Forecasted {
                    raw,
                    series,
                    forecast,
                };
                Ok(())
            }
            other => {
                *self = other;
                Err(SessionError::NotNormalized)
            }
        }
    }
}
