// MLflow registry - Logs runs to an MLflow tracking server over its REST API
use crate::application::model_registry::{LoggedRun, MODEL_ARTIFACT_NAME, ModelRegistry, RegistryRun};
use crate::domain::forecast::ForecastPredictor;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

const API_PREFIX: &str = "api/2.0/mlflow";
const ARTIFACT_PREFIX: &str = "api/2.0/mlflow-artifacts/artifacts";
const PROXY_SCHEME: &str = "mlflow-artifacts:/";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{endpoint} returned {status}: {message}")]
    Api {
        endpoint: String,
        status: StatusCode,
        message: String,
    },

    #[error("artifact store '{0}' is not served by the tracking server")]
    UnsupportedArtifactUri(String),
}

#[derive(Debug, Deserialize)]
struct ExperimentResponse {
    experiment: Experiment,
}

#[derive(Debug, Deserialize)]
struct Experiment {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: Run,
}

#[derive(Debug, Deserialize)]
struct Run {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    run_id: String,
    artifact_uri: String,
}

pub struct MlflowRegistry {
    client: Client,
    tracking_uri: String,
    experiment: String,
    token: Option<String>,
}

impl MlflowRegistry {
    /// Every request, artifact upload included, is bounded by `timeout`.
    pub fn new(
        tracking_uri: &str,
        experiment: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building MLflow HTTP client")?;
        Ok(Self {
            client,
            tracking_uri: tracking_uri.trim_end_matches('/').to_string(),
            experiment: experiment.to_string(),
            token,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.tracking_uri, API_PREFIX, endpoint)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(endpoint: &str, response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(RegistryError::Api {
            endpoint: endpoint.to_string(),
            status,
            message,
        }
        .into())
    }

    async fn post<T: DeserializeOwned>(&self, endpoint: &str, body: &Value) -> anyhow::Result<T> {
        let response = self
            .authorize(self.client.post(self.url(endpoint)).json(body))
            .send()
            .await
            .with_context(|| format!("calling {}", endpoint))?;
        let response = Self::check(endpoint, response).await?;
        Ok(response.json().await?)
    }

    /// Id of the configured experiment, created on first use.
    async fn experiment_id(&self) -> anyhow::Result<String> {
        let endpoint = "experiments/get-by-name";
        let url = format!(
            "{}?experiment_name={}",
            self.url(endpoint),
            urlencoding::encode(&self.experiment)
        );
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .with_context(|| format!("calling {}", endpoint))?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!(experiment = %self.experiment, "creating MLflow experiment");
            let created: CreateExperimentResponse = self
                .post("experiments/create", &json!({ "name": self.experiment }))
                .await?;
            return Ok(created.experiment_id);
        }

        let found: ExperimentResponse = Self::check(endpoint, response).await?.json().await?;
        Ok(found.experiment.experiment_id)
    }

    /// Artifact proxy endpoint for `path` under a run's `mlflow-artifacts:/` root.
    fn artifact_endpoint(artifact_uri: &str, path: &str) -> anyhow::Result<String> {
        let root = artifact_uri
            .strip_prefix(PROXY_SCHEME)
            .ok_or_else(|| RegistryError::UnsupportedArtifactUri(artifact_uri.to_string()))?
            .trim_matches('/');
        Ok(format!("{}/{}/{}", ARTIFACT_PREFIX, root, path))
    }

    async fn upload_artifact(&self, artifact_uri: &str, path: &str, body: Vec<u8>) -> anyhow::Result<()> {
        let endpoint = Self::artifact_endpoint(artifact_uri, path)?;
        let response = self
            .authorize(
                self.client
                    .put(format!("{}/{}", self.tracking_uri, endpoint))
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body),
            )
            .send()
            .await
            .with_context(|| format!("uploading {}", path))?;
        Self::check(&endpoint, response).await?;
        Ok(())
    }

    async fn record(&self, info: &RunInfo, run: &RegistryRun) -> anyhow::Result<()> {
        let params: Vec<Value> = run
            .params
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();
        let _: Value = self
            .post(
                "runs/log-batch",
                &json!({
                    "run_id": info.run_id,
                    "params": params,
                    "tags": [{ "key": "model_name", "value": run.model_name }],
                }),
            )
            .await?;

        let model = serde_json::to_vec(&run.predictor)?;
        self.upload_artifact(
            &info.artifact_uri,
            &format!("{}/model.json", run.model_name),
            model,
        )
        .await
    }

    async fn download_artifact(&self, artifact_uri: &str, path: &str) -> anyhow::Result<bytes::Bytes> {
        let endpoint = Self::artifact_endpoint(artifact_uri, path)?;
        let response = self
            .authorize(self.client.get(format!("{}/{}", self.tracking_uri, endpoint)))
            .send()
            .await
            .with_context(|| format!("downloading {}", path))?;
        Ok(Self::check(&endpoint, response).await?.bytes().await?)
    }

    async fn run_info(&self, run_id: &str) -> anyhow::Result<RunInfo> {
        let endpoint = "runs/get";
        let url = format!("{}?run_id={}", self.url(endpoint), urlencoding::encode(run_id));
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .with_context(|| format!("calling {}", endpoint))?;
        let found: RunResponse = Self::check(endpoint, response).await?.json().await?;
        Ok(found.run.info)
    }

    async fn finish(&self, run_id: &str, status: &str) -> anyhow::Result<()> {
        let _: Value = self
            .post(
                "runs/update",
                &json!({
                    "run_id": run_id,
                    "status": status,
                    "end_time": chrono::Utc::now().timestamp_millis(),
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ModelRegistry for MlflowRegistry {
    fn backend(&self) -> &'static str {
        "mlflow"
    }

    async fn log_run(&self, run: &RegistryRun) -> anyhow::Result<LoggedRun> {
        let experiment_id = self.experiment_id().await?;
        let created: RunResponse = self
            .post(
                "runs/create",
                &json!({
                    "experiment_id": experiment_id,
                    "start_time": chrono::Utc::now().timestamp_millis(),
                }),
            )
            .await?;
        let info = created.run.info;

        if let Err(e) = self.record(&info, run).await {
            if let Err(update) = self.finish(&info.run_id, "FAILED").await {
                tracing::warn!(run_id = %info.run_id, "Could not mark run as failed: {:#}", update);
            }
            return Err(e);
        }
        self.finish(&info.run_id, "FINISHED").await?;

        Ok(LoggedRun {
            model_uri: format!("runs:/{}/{}", info.run_id, run.model_name),
            run_id: info.run_id,
            experiment: self.experiment.clone(),
        })
    }

    async fn load_predictor(&self, run_id: &str) -> anyhow::Result<ForecastPredictor> {
        let info = self.run_info(run_id).await?;
        let path = format!("{}/model.json", MODEL_ARTIFACT_NAME);
        let body = self.download_artifact(&info.artifact_uri, &path).await?;
        serde_json::from_slice(&body).with_context(|| format!("decoding {} of run {}", path, run_id))
    }
}
