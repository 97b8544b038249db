// User-tunable training hyperparameters
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CHANGEPOINT_PRIOR_SCALE_RANGE: RangeInclusive<f64> = 0.01..=0.5;
pub const DEFAULT_CHANGEPOINT_PRIOR_SCALE: f64 = 0.05;
pub const FORECAST_PERIODS_RANGE: RangeInclusive<u32> = 1..=365;
pub const DEFAULT_FORECAST_PERIODS: u32 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum HyperparameterError {
    #[error("changepoint prior scale {0} is outside 0.01..=0.5")]
    ChangepointPriorScale(f64),

    #[error("forecast periods {0} is outside 1..=365")]
    ForecastPeriods(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    #[default]
    Additive,
    Multiplicative,
}

impl SeasonalityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonalityMode::Additive => "additive",
            SeasonalityMode::Multiplicative => "multiplicative",
        }
    }
}

impl fmt::Display for SeasonalityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// How readily the trend is allowed to bend at changepoints.
    pub changepoint_prior_scale: f64,
    pub seasonality_mode: SeasonalityMode,
    /// Days to forecast past the last observation.
    pub forecast_periods: u32,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: DEFAULT_CHANGEPOINT_PRIOR_SCALE,
            seasonality_mode: SeasonalityMode::Additive,
            forecast_periods: DEFAULT_FORECAST_PERIODS,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<(), HyperparameterError> {
        if !CHANGEPOINT_PRIOR_SCALE_RANGE.contains(&self.changepoint_prior_scale) {
            return Err(HyperparameterError::ChangepointPriorScale(
                self.changepoint_prior_scale,
            ));
        }
        if !FORECAST_PERIODS_RANGE.contains(&self.forecast_periods) {
            return Err(HyperparameterError::ForecastPeriods(self.forecast_periods));
        }
        Ok(())
    }

    /// Run parameters as logged to the model registry.
    pub fn as_params(&self) -> Vec<(String, String)> {
        vec![
            (
                "changepoint_prior_scale".to_string(),
                self.changepoint_prior_scale.to_string(),
            ),
            (
                "seasonality_mode".to_string(),
                self.seasonality_mode.to_string(),
            ),
            (
                "forecast_periods".to_string(),
                self.forecast_periods.to_string(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let hp = Hyperparameters::default();
        assert_eq!(hp.changepoint_prior_scale, 0.05);
        assert_eq!(hp.forecast_periods, 30);
        assert_eq!(hp.seasonality_mode, SeasonalityMode::Additive);
        assert!(hp.validate().is_ok());
    }

    #[test]
    fn test_validate_bounds() {
        let mut hp = Hyperparameters {
            changepoint_prior_scale: 0.5,
            seasonality_mode: SeasonalityMode::Multiplicative,
            forecast_periods: 365,
        };
        assert!(hp.validate().is_ok());

        hp.changepoint_prior_scale = 0.6;
        assert_eq!(
            hp.validate(),
            Err(HyperparameterError::ChangepointPriorScale(0.6))
        );

        hp.changepoint_prior_scale = 0.01;
        hp.forecast_periods = 0;
        assert_eq!(hp.validate(), Err(HyperparameterError::ForecastPeriods(0)));
    }

    #[test]
    fn test_as_params() {
        let hp = Hyperparameters {
            changepoint_prior_scale: 0.1,
            seasonality_mode: SeasonalityMode::Multiplicative,
            forecast_periods: 7,
        };
        let params = hp.as_params();
        assert_eq!(params[0], ("changepoint_prior_scale".to_string(), "0.1".to_string()));
        assert_eq!(params[1], ("seasonality_mode".to_string(), "multiplicative".to_string()));
        assert_eq!(params[2], ("forecast_periods".to_string(), "7".to_string()));
    }

    #[test]
    fn test_seasonality_mode_serde() {
        let mode: SeasonalityMode = serde_json::from_str("\"multiplicative\"").unwrap();
        assert_eq!(mode, SeasonalityMode::Multiplicative);
        assert_eq!(serde_json::to_string(&SeasonalityMode::Additive).unwrap(), "\"additive\"");
    }
}
