// Application layer - Session state and the dashboard use cases
pub mod dashboard_service;
pub mod forecast_service;
pub mod model_registry;
pub mod session;
