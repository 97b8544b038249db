// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod csv_codec;
pub mod file_registry;
pub mod http_response;
pub mod mlflow_registry;
