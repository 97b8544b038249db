// Forecast service - Use case for fitting a model and building its report
use crate::domain::forecast::ForecastTable;
use crate::domain::hyperparams::Hyperparameters;
use crate::domain::model::{FittedModel, ModelSettings, TrainError, observations};
use crate::domain::report::ForecastReport;
use crate::domain::series::CanonicalSeries;
use crate::domain::table::PREVIEW_ROWS;

/// Result of one training run.
#[derive(Debug, Clone)]
pub struct TrainedForecast {
    pub model: FittedModel,
    pub table: ForecastTable,
    pub report: ForecastReport,
}

#[derive(Debug, Clone)]
pub struct ForecastService {
    settings: ModelSettings,
}

impl ForecastService {
    pub fn new(settings: ModelSettings) -> Self {
        Self { settings }
    }

    /// Fit, project `forecast_periods` days past the history and predict
    /// over history plus future. Pure: the same inputs give the same table.
    pub fn train(
        &self,
        series: &CanonicalSeries,
        hyperparameters: &Hyperparameters,
    ) -> Result<TrainedForecast, TrainError> {
        let observed = observations(series)?;
        let model = FittedModel::fit(series, hyperparameters, &self.settings)?;
        let dates = model.forecast_dates(hyperparameters.forecast_periods)?;
        let table = model.predict(&dates);
        let report = ForecastReport::build(
            &observed,
            &table,
            hyperparameters.forecast_periods,
            PREVIEW_ROWS,
        );

        tracing::info!(
            rows = table.len(),
            periods = hyperparameters.forecast_periods,
            mode = %hyperparameters.seasonality_mode,
            "forecast computed"
        );

        Ok(TrainedForecast {
            model,
            table,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hyperparams::SeasonalityMode;
    use crate::domain::series::CanonicalPoint;
    use chrono::{Days, NaiveDate};

    fn series(days: u64) -> CanonicalSeries {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        CanonicalSeries::new(
            (0..days)
                .map(|i| CanonicalPoint {
                    ds: (start + Days::new(i)).format("%Y-%m-%d").to_string(),
                    y: 1_000.0 + 5.0 * i as f64 + (i % 7) as f64,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_train_appends_horizon_rows() {
        let service = ForecastService::new(ModelSettings::default());
        let hp = Hyperparameters {
            changepoint_prior_scale: 0.1,
            seasonality_mode: SeasonalityMode::Additive,
            forecast_periods: 45,
        };
        let trained = service.train(&series(40), &hp).unwrap();

        assert_eq!(trained.table.len(), 40 + 45);
        let last = trained.table.rows().last().unwrap().ds;
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + Days::new(39 + 45));
        assert_eq!(trained.report.head.rows.len(), PREVIEW_ROWS);
        assert_eq!(trained.report.head.total_rows, 85);
        assert_eq!(trained.report.forecast_chart.series[3].points.len(), 40);
    }

    #[test]
    fn test_train_twice_gives_identical_tables() {
        let service = ForecastService::new(ModelSettings::default());
        let hp = Hyperparameters {
            seasonality_mode: SeasonalityMode::Multiplicative,
            ..Hyperparameters::default()
        };
        let data = series(35);
        let first = service.train(&data, &hp).unwrap();
        let second = service.train(&data, &hp).unwrap();
        assert_eq!(first.table, second.table);
    }
}
