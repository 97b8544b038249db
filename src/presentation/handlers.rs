// HTTP request handlers
use crate::application::dashboard_service::{TrainOutcome, TrainRequest};
use crate::application::session::SessionStage;
use crate::domain::forecast::PredictionRow;
use crate::domain::table::TablePreview;
use crate::infrastructure::http_response::{accepts_brotli, csv_download_response};
use crate::presentation::app_state::AppState;
use crate::presentation::error::ApiError;
use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DASHBOARD_PAGE: &str = include_str!("../../static/index.html");
const UPLOAD_FIELD: &str = "file";
const FORECAST_FILENAME: &str = "forecast.csv";

#[derive(Deserialize)]
pub struct PredictQuery {
    /// Comma-separated `YYYY-MM-DD` dates.
    pub ds: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub stage: SessionStage,
}

/// Dashboard page
pub async fn index() -> Html<&'static str> {
    Html(DASHBOARD_PAGE)
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn session_stage(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(SessionResponse {
        stage: state.dashboard_service.stage().await,
    })
}

/// Accept a CSV file from the `file` multipart field and preview it
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TablePreview>, ApiError> {
    let bad_upload = |message: String| ApiError::BadRequest {
        stage: "ingestion",
        message,
    };
    // The router's body limit surfaces here while the stream is read.
    let read_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge {
                message: e.body_text(),
            }
        } else {
            bad_upload(e.body_text())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let bytes = field.bytes().await.map_err(read_error)?;
        let preview = state.dashboard_service.upload(bytes).await?;
        return Ok(Json(preview));
    }

    Err(bad_upload(format!("missing multipart field '{}'", UPLOAD_FIELD)))
}

/// Convert the uploaded table to the `ds`/`y` series
pub async fn normalize(State(state): State<Arc<AppState>>) -> Result<Json<TablePreview>, ApiError> {
    Ok(Json(state.dashboard_service.normalize().await?))
}

pub async fn train(
    State(state): State<Arc<AppState>>,
    request: Result<Json<TrainRequest>, JsonRejection>,
) -> Result<Json<TrainOutcome>, ApiError> {
    let Json(request) = request.map_err(|e| ApiError::BadRequest {
        stage: "training",
        message: e.body_text(),
    })?;
    Ok(Json(state.dashboard_service.train(request).await?))
}

/// Download the last forecast as `forecast.csv`
pub async fn download_forecast(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let body = state.dashboard_service.download_forecast().await?;
    let compress = accepts_brotli(&headers);

    match csv_download_response(body, FORECAST_FILENAME, compress).await {
        Ok(response) => Ok(response),
        Err(status) => Ok(status.into_response()),
    }
}

/// Score dates with the model stored by a logged run
pub async fn predict_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    query: Result<Query<PredictQuery>, QueryRejection>,
) -> Result<Json<Vec<PredictionRow>>, ApiError> {
    let bad_query = |message: String| ApiError::BadRequest {
        stage: "registry",
        message,
    };
    let Query(query) = query.map_err(|e| bad_query(e.body_text()))?;

    let dates = query
        .ds
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| bad_query(format!("'{}' is not a YYYY-MM-DD date", d)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if dates.is_empty() {
        return Err(bad_query("ds must name at least one date".to_string()));
    }

    let rows = state.dashboard_service.predict_run(&run_id, &dates).await?;
    Ok(Json(rows))
}
