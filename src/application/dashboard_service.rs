// Dashboard service - Upload, convert, train and download use cases over one session
use crate::application::forecast_service::ForecastService;
use crate::application::model_registry::{MODEL_ARTIFACT_NAME, ModelRegistry, RegistryRun};
use crate::application::session::{Session, SessionError, SessionStage};
use crate::domain::forecast::{ForecastPredictor, PredictionRow, Predictor};
use crate::domain::hyperparams::{
    DEFAULT_CHANGEPOINT_PRIOR_SCALE, DEFAULT_FORECAST_PERIODS, HyperparameterError,
    Hyperparameters, SeasonalityMode,
};
use crate::domain::model::{FittedModel, TrainError};
use crate::domain::report::ForecastReport;
use crate::domain::series::{DateStrategy, NormalizeError, normalize};
use crate::domain::table::{IngestError, PREVIEW_ROWS, TablePreview};
use crate::infrastructure::config::DashboardConfig;
use crate::infrastructure::csv_codec;
use bytes::Bytes;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("error loading data: {0}")]
    Ingest(#[from] IngestError),

    #[error("error converting data: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("invalid model parameters: {0}")]
    Hyperparameters(#[from] HyperparameterError),

    #[error("error training the model: {0}")]
    Train(#[from] TrainError),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("error exporting forecast: {0}")]
    Export(String),

    #[error("no model registry is configured")]
    RegistryDisabled,

    #[error("run '{run_id}' could not be loaded: {message}")]
    RunUnavailable { run_id: String, message: String },
}

impl DashboardError {
    /// Dashboard stage the failure belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            DashboardError::Ingest(_) => "ingestion",
            DashboardError::Normalize(_) | DashboardError::Session(SessionError::NoData) => {
                "normalization"
            }
            DashboardError::Hyperparameters(_)
            | DashboardError::Train(_)
            | DashboardError::Session(SessionError::NotNormalized) => "training",
            DashboardError::Export(_) | DashboardError::Session(SessionError::NoForecast) => {
                "download"
            }
            DashboardError::RegistryDisabled | DashboardError::RunUnavailable { .. } => "registry",
        }
    }
}

fn default_changepoint_prior_scale() -> f64 {
    DEFAULT_CHANGEPOINT_PRIOR_SCALE
}

fn default_forecast_periods() -> u32 {
    DEFAULT_FORECAST_PERIODS
}

/// Controls submitted with the "Train Model" action.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainRequest {
    #[serde(default = "default_changepoint_prior_scale")]
    pub changepoint_prior_scale: f64,
    #[serde(default)]
    pub seasonality_mode: SeasonalityMode,
    #[serde(default = "default_forecast_periods")]
    pub forecast_periods: u32,
    #[serde(default)]
    pub log_to_registry: bool,
}

impl TrainRequest {
    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            changepoint_prior_scale: self.changepoint_prior_scale,
            seasonality_mode: self.seasonality_mode,
            forecast_periods: self.forecast_periods,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistryOutcome {
    NotRequested,
    Disabled,
    Logged {
        run_id: String,
        experiment: String,
        model_uri: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainOutcome {
    pub report: ForecastReport,
    pub registry: RegistryOutcome,
}

#[derive(Clone)]
pub struct DashboardService {
    session: Arc<Mutex<Session>>,
    date_strategy: DateStrategy,
    artifact_path: PathBuf,
    max_upload_bytes: usize,
    forecast_service: ForecastService,
    registry: Option<Arc<dyn ModelRegistry>>,
}

impl DashboardService {
    pub fn new(config: &DashboardConfig, registry: Option<Arc<dyn ModelRegistry>>) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::default())),
            date_strategy: config.normalize.date_strategy(),
            artifact_path: config.normalize.artifact_path.clone(),
            max_upload_bytes: config.ingest.max_upload_bytes,
            forecast_service: ForecastService::new(config.forecast.clone()),
            registry,
        }
    }

    pub async fn stage(&self) -> SessionStage {
        self.session.lock().await.stage()
    }

    /// Parse an uploaded CSV and make it the session's raw table.
    pub async fn upload(&self, body: Bytes) -> Result<TablePreview, DashboardError> {
        if body.len() > self.max_upload_bytes {
            return Err(IngestError::TooLarge {
                size: body.len(),
                limit: self.max_upload_bytes,
            }
            .into());
        }

        let raw = csv_codec::read_raw_table(&body).inspect_err(|e| {
            tracing::error!("Upload rejected: {}", e);
        })?;
        let preview = raw.preview(PREVIEW_ROWS);

        self.session.lock().await.ingest(raw);
        tracing::info!(
            rows = preview.total_rows,
            columns = preview.columns.len(),
            "raw table ingested"
        );
        Ok(preview)
    }

    /// Convert the raw table to `{ds, y}` and keep it for training.
    pub async fn normalize(&self) -> Result<TablePreview, DashboardError> {
        let mut session = self.session.lock().await;
        let raw = session.raw_table().ok_or(SessionError::NoData)?;

        let series = normalize(raw, &self.date_strategy).inspect_err(|e| {
            tracing::error!("Normalization failed: {}", e);
        })?;
        let preview = series.preview(PREVIEW_ROWS);

        if let Err(e) = csv_codec::write_series_artifact(&self.artifact_path, &series).await {
            tracing::warn!(
                path = %self.artifact_path.display(),
                "Could not write converted data: {:#}",
                e
            );
        }

        session.commit_series(series)?;
        tracing::info!(rows = preview.total_rows, "series normalized");
        Ok(preview)
    }

    /// Fit on the current series, keep the forecast for download and
    /// optionally log the run. A registry failure is reported in the
    /// outcome and leaves the forecast in place.
    pub async fn train(&self, request: TrainRequest) -> Result<TrainOutcome, DashboardError> {
        let hyperparameters = request.hyperparameters();
        hyperparameters.validate()?;

        let mut session = self.session.lock().await;
        let series = session
            .series()
            .cloned()
            .ok_or(SessionError::NotNormalized)?;

        let forecast_service = self.forecast_service.clone();
        let trained = tokio::task::spawn_blocking(move || {
            forecast_service.train(&series, &hyperparameters)
        })
        .await
        .map_err(|e| TrainError::Interrupted(e.to_string()))?
        .inspect_err(|e| tracing::error!("Training failed: {}", e))?;

        session.commit_forecast(trained.table)?;
        drop(session);

        let registry = if request.log_to_registry {
            self.log_to_registry(&hyperparameters, trained.model).await
        } else {
            RegistryOutcome::NotRequested
        };

        Ok(TrainOutcome {
            report: trained.report,
            registry,
        })
    }

    /// The last forecast as CSV.
    pub async fn download_forecast(&self) -> Result<Vec<u8>, DashboardError> {
        let session = self.session.lock().await;
        let forecast = session.forecast().ok_or(SessionError::NoForecast)?;
        csv_codec::encode_forecast(forecast).map_err(|e| DashboardError::Export(e.to_string()))
    }

    /// Score `dates` with the model a previous training run logged.
    pub async fn predict_run(
        &self,
        run_id: &str,
        dates: &[NaiveDate],
    ) -> Result<Vec<PredictionRow>, DashboardError> {
        let registry = self.registry.as_ref().ok_or(DashboardError::RegistryDisabled)?;
        let predictor = registry.load_predictor(run_id).await.map_err(|e| {
            tracing::error!(backend = registry.backend(), run_id, "Loading run failed: {:#}", e);
            DashboardError::RunUnavailable {
                run_id: run_id.to_string(),
                message: format!("{:#}", e),
            }
        })?;
        Ok(predictor.predict(dates))
    }

    async fn log_to_registry(
        &self,
        hyperparameters: &Hyperparameters,
        model: FittedModel,
    ) -> RegistryOutcome {
        let Some(registry) = &self.registry else {
            return RegistryOutcome::Disabled;
        };

        let run = RegistryRun {
            params: hyperparameters.as_params(),
            model_name: MODEL_ARTIFACT_NAME.to_string(),
            predictor: ForecastPredictor::new(model),
        };

        match registry.log_run(&run).await {
            Ok(logged) => {
                tracing::info!(
                    backend = registry.backend(),
                    run_id = %logged.run_id,
                    "model logged to registry"
                );
                RegistryOutcome::Logged {
                    run_id: logged.run_id,
                    experiment: logged.experiment,
                    model_uri: logged.model_uri,
                }
            }
            Err(e) => {
                tracing::error!(backend = registry.backend(), "Registry logging failed: {:#}", e);
                RegistryOutcome::Failed {
                    error: format!("{:#}", e),
                }
            }
        }
    }
}
