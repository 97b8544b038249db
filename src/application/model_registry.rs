// Registry trait for experiment tracking of fitted models
use crate::domain::forecast::ForecastPredictor;
use async_trait::async_trait;
use serde::Serialize;

/// Directory name the fitted model is stored under inside a run.
pub const MODEL_ARTIFACT_NAME: &str = "prophet_model";

/// Everything recorded for one training run.
#[derive(Debug, Clone)]
pub struct RegistryRun {
    pub params: Vec<(String, String)>,
    pub model_name: String,
    pub predictor: ForecastPredictor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedRun {
    pub run_id: String,
    pub experiment: String,
    pub model_uri: String,
}

#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Record the run parameters and persist a loadable copy of the model
    async fn log_run(&self, run: &RegistryRun) -> anyhow::Result<LoggedRun>;

    /// Load the model stored by a previous `log_run`
    async fn load_predictor(&self, run_id: &str) -> anyhow::Result<ForecastPredictor>;
}
