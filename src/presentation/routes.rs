// Router - Dashboard page and JSON API
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    download_forecast, health_check, index, normalize, predict_run, session_stage, train, upload,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

// Downloads are compressed in the handler, so no CompressionLayer here.
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(health_check))
        .route("/api/session", get(session_stage))
        .route("/api/upload", post(upload))
        .route("/api/normalize", post(normalize))
        .route("/api/train", post(train))
        .route("/api/forecast.csv", get(download_forecast))
        .route("/api/runs/:run_id/predict", get(predict_run))
        .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dashboard_service::DashboardService;
    use crate::application::model_registry::ModelRegistry;
    use crate::infrastructure::config::DashboardConfig;
    use crate::infrastructure::file_registry::FileRegistry;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "forecast-boundary";

    fn app_with(
        dir: &tempfile::TempDir,
        max_upload_bytes: usize,
        registry: Option<Arc<dyn ModelRegistry>>,
    ) -> Router {
        let mut config = DashboardConfig::default();
        config.normalize.artifact_path = dir.path().join("new_data.csv");
        config.ingest.max_upload_bytes = max_upload_bytes;
        let state = Arc::new(AppState {
            dashboard_service: DashboardService::new(&config, registry),
        });
        router(state, config.ingest.max_upload_bytes)
    }

    fn app(dir: &tempfile::TempDir) -> Router {
        app_with(dir, DashboardConfig::default().ingest.max_upload_bytes, None)
    }

    fn sample_csv() -> String {
        let mut csv = String::from("Date,Price\n");
        for day in 1..=28 {
            csv.push_str(&format!("02/{:02}/2024,\"{}\"\n", day, 2_000 + day * 3));
        }
        csv
    }

    fn upload_request(field: &str, csv: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"prices.csv\"\r\nContent-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
            b = BOUNDARY,
            field = field,
            csv = csv,
        );
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let response = app.clone().oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");

        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("/api/upload"));
    }

    #[tokio::test]
    async fn test_full_dashboard_flow() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let response = app.clone().oneshot(upload_request("file", &sample_csv())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let preview = json_body(response).await;
        assert_eq!(preview["total_rows"], 28);
        assert_eq!(preview["rows"].as_array().unwrap().len(), 5);

        let response = app.clone().oneshot(post_json("/api/normalize", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let converted = json_body(response).await;
        assert_eq!(converted["columns"], serde_json::json!(["ds", "y"]));
        assert_eq!(converted["rows"][0][0], "2024-02-01");
        assert!(dir.path().join("new_data.csv").exists());

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/train",
                r#"{"changepoint_prior_scale":0.1,"seasonality_mode":"multiplicative","forecast_periods":7}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcome = json_body(response).await;
        assert_eq!(outcome["report"]["head"]["total_rows"], 35);
        assert_eq!(
            outcome["report"]["head"]["columns"],
            serde_json::json!(["ds", "yhat", "yhat_lower", "yhat_upper"])
        );
        assert_eq!(outcome["registry"]["status"], "not_requested");
        assert_eq!(outcome["report"]["forecast_chart"]["series"][2]["id"], "yhat");

        let response = app.clone().oneshot(get("/api/session")).await.unwrap();
        assert_eq!(json_body(response).await["stage"], "forecasted");

        let response = app.oneshot(get("/api/forecast.csv")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"forecast.csv\""
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("ds,yhat,yhat_lower,yhat_upper"));
        assert_eq!(text.lines().count(), 36);
    }

    #[tokio::test]
    async fn test_stage_gating_returns_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let response = app.clone().oneshot(post_json("/api/normalize", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["stage"], "normalization");

        let response = app.clone().oneshot(post_json("/api/train", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app.oneshot(get("/api/forecast.csv")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["stage"], "download");
    }

    #[tokio::test]
    async fn test_bad_inputs_return_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let response = app.clone().oneshot(upload_request("other", &sample_csv())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(upload_request("file", "Date,Price\n01/01/2024,abc\n01/02/2024,2\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(post_json("/api/normalize", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = json_body(response).await;
        assert_eq!(error["stage"], "normalization");
        assert!(error["error"].as_str().unwrap().contains("abc"));

        let response = app
            .oneshot(post_json("/api/train", r#"{"forecast_periods":0}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_uploads_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(&dir, 256, None);

        // Over the configured size but inside the multipart allowance.
        let response = app.clone().oneshot(upload_request("file", &sample_csv())).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["stage"], "ingestion");

        // Over the router body limit itself.
        let mut csv = String::from("Date,Price\n");
        while csv.len() <= 256 + MULTIPART_OVERHEAD {
            csv.push_str("01/01/2024,\"1,000\"\n");
        }
        let response = app.clone().oneshot(upload_request("file", &csv)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["stage"], "ingestion");

        let response = app.oneshot(get("/api/session")).await.unwrap();
        assert_eq!(json_body(response).await["stage"], "empty");
    }

    #[tokio::test]
    async fn test_predict_with_logged_run() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(FileRegistry::new(dir.path().join("mlruns"), "prices"));
        let app = app_with(&dir, 1024 * 1024, Some(registry));

        app.clone().oneshot(upload_request("file", &sample_csv())).await.unwrap();
        app.clone().oneshot(post_json("/api/normalize", "")).await.unwrap();
        let response = app
            .clone()
            .oneshot(post_json("/api/train", r#"{"log_to_registry":true}"#))
            .await
            .unwrap();
        let outcome = json_body(response).await;
        assert_eq!(outcome["registry"]["status"], "logged");
        let run_id = outcome["registry"]["run_id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(get(&format!("/api/runs/{}/predict?ds=2024-03-01,2024-03-02", run_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let rows = json_body(response).await;
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["ds"], "2024-03-01");
        assert!(rows[1]["yhat"].as_f64().unwrap().is_finite());

        let response = app
            .clone()
            .oneshot(get(&format!("/api/runs/{}/predict?ds=03/01/2024", run_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["stage"], "registry");

        let response = app
            .clone()
            .oneshot(get(&format!("/api/runs/{}/predict", run_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(get("/api/runs/missing/predict?ds=2024-03-01"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["stage"], "registry");
    }

    #[tokio::test]
    async fn test_predict_without_registry_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir)
            .oneshot(get("/api/runs/abc/predict?ds=2024-03-01"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
