// API error mapping - Stage failures as JSON responses
use crate::application::dashboard_service::DashboardError;
use crate::application::session::SessionError;
use crate::domain::table::IngestError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Dashboard(#[from] DashboardError),

    #[error("invalid request: {message}")]
    BadRequest {
        stage: &'static str,
        message: String,
    },

    #[error("upload exceeds the request size limit: {message}")]
    PayloadTooLarge { message: String },
}

impl ApiError {
    fn stage(&self) -> &'static str {
        match self {
            ApiError::Dashboard(e) => e.stage(),
            ApiError::BadRequest { stage, .. } => *stage,
            ApiError::PayloadTooLarge { .. } => "ingestion",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Dashboard(DashboardError::Session(_)) => StatusCode::CONFLICT,
            ApiError::Dashboard(DashboardError::Train(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Dashboard(DashboardError::Export(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Dashboard(DashboardError::Ingest(IngestError::TooLarge { .. }))
            | ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Dashboard(
                DashboardError::RegistryDisabled | DashboardError::RunUnavailable { .. },
            ) => StatusCode::NOT_FOUND,
            ApiError::Dashboard(
                DashboardError::Ingest(_)
                | DashboardError::Normalize(_)
                | DashboardError::Hyperparameters(_),
            )
            | ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError::Dashboard(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "stage": self.stage(),
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
