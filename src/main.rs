// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::application::dashboard_service::DashboardService;
use crate::application::model_registry::ModelRegistry;
use crate::infrastructure::config::{RegistryBackend, RegistrySettings, load_dashboard_config};
use crate::infrastructure::file_registry::FileRegistry;
use crate::infrastructure::mlflow_registry::MlflowRegistry;
use crate::presentation::app_state::AppState;
use crate::presentation::routes::router;

fn build_registry(settings: &RegistrySettings) -> anyhow::Result<Option<Arc<dyn ModelRegistry>>> {
    let registry: Arc<dyn ModelRegistry> = match settings.backend {
        RegistryBackend::None => return Ok(None),
        RegistryBackend::File => Arc::new(FileRegistry::new(
            settings.root.clone(),
            settings.experiment_name.clone(),
        )),
        RegistryBackend::Mlflow => Arc::new(MlflowRegistry::new(
            &settings.tracking_uri,
            &settings.experiment_name,
            settings.token.clone(),
            Duration::from_secs(settings.timeout_secs),
        )?),
    };
    Ok(Some(registry))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_dashboard_config().context("loading dashboard configuration")?;

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Registry backend (infrastructure layer)
    let registry = build_registry(&config.registry)?;
    tracing::info!(
        backend = ?config.registry.backend,
        experiment = %config.registry.experiment_name,
        "model registry configured"
    );

    // Create services (application layer)
    let dashboard_service = DashboardService::new(&config, registry);

    // Create application state
    let state = Arc::new(AppState { dashboard_service });

    // Build router (presentation layer)
    let app = router(state, config.ingest.max_upload_bytes);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind))?;
    tracing::info!("Starting price forecast dashboard on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}
