// Presentation layer - HTTP routes, handlers and the dashboard page
pub mod app_state;
pub mod error;
pub mod handlers;
pub mod routes;
