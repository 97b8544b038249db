use crate::domain::model::ModelSettings;
use crate::domain::series::DateStrategy;
use serde::Deserialize;
use std::path::PathBuf;

/// Each changepoint adds a column to the normal equations.
const MAX_CHANGEPOINTS: usize = 500;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub server: ServerSettings,
    pub ingest: IngestSettings,
    pub normalize: NormalizeSettings,
    pub forecast: ModelSettings,
    pub registry: RegistrySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestSettings {
    pub max_upload_bytes: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DateStrategyKind {
    #[default]
    Format,
    Positional,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NormalizeSettings {
    pub date_strategy: DateStrategyKind,
    pub date_format: String,
    /// Where the converted `ds,y` table is written after each conversion.
    pub artifact_path: PathBuf,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            date_strategy: DateStrategyKind::Format,
            date_format: "%m/%d/%Y".to_string(),
            artifact_path: PathBuf::from("new_data.csv"),
        }
    }
}

impl NormalizeSettings {
    pub fn date_strategy(&self) -> DateStrategy {
        match self.date_strategy {
            DateStrategyKind::Format => DateStrategy::Format(self.date_format.clone()),
            DateStrategyKind::Positional => DateStrategy::Positional,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    #[default]
    None,
    File,
    Mlflow,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RegistrySettings {
    pub backend: RegistryBackend,
    pub tracking_uri: String,
    pub experiment_name: String,
    /// Root directory of the file backend.
    pub root: PathBuf,
    pub token: Option<String>,
    /// Upper bound on each request to the tracking server.
    pub timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::None,
            tracking_uri: "http://127.0.0.1:5000".to_string(),
            experiment_name: "price-forecast".to_string(),
            root: PathBuf::from("mlruns"),
            token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `config/dashboard.toml` if present, overridden by `DASHBOARD__*` variables
/// (e.g. `DASHBOARD__REGISTRY__BACKEND=mlflow`).
pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard").required(false))
        .add_source(
            config::Environment::with_prefix("DASHBOARD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: DashboardConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl DashboardConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let forecast = &self.forecast;
        let width = forecast.interval_width;
        anyhow::ensure!(
            width > 0.0 && width < 1.0,
            "forecast.interval_width must be between 0 and 1, got {}",
            width
        );
        let scale = forecast.seasonality_prior_scale;
        anyhow::ensure!(
            scale.is_finite() && scale > 0.0,
            "forecast.seasonality_prior_scale must be positive, got {}",
            scale
        );
        let range = forecast.changepoint_range;
        anyhow::ensure!(
            range > 0.0 && range <= 1.0,
            "forecast.changepoint_range must be in (0, 1], got {}",
            range
        );
        anyhow::ensure!(
            forecast.n_changepoints <= MAX_CHANGEPOINTS,
            "forecast.n_changepoints must be at most {}, got {}",
            MAX_CHANGEPOINTS,
            forecast.n_changepoints
        );
        anyhow::ensure!(
            self.ingest.max_upload_bytes > 0,
            "ingest.max_upload_bytes must be positive"
        );
        Ok(())
    }
}
