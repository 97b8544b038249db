// File registry - Local run store laid out as <root>/<experiment>/<run_id>/
use crate::application::model_registry::{LoggedRun, ModelRegistry, RegistryRun};
use crate::domain::forecast::ForecastPredictor;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MODEL_FILE: &str = "model.json";
const META_FILE: &str = "meta.toml";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RunMeta {
    pub run_id: String,
    pub experiment: String,
    pub model_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct FileRegistry {
    root: PathBuf,
    experiment: String,
}

impl FileRegistry {
    pub fn new(root: impl Into<PathBuf>, experiment: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            experiment: experiment.into(),
        }
    }

    fn run_dir(&self, run_id: &str) -> anyhow::Result<PathBuf> {
        anyhow::ensure!(
            !run_id.is_empty() && run_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'),
            "invalid run id '{}'",
            run_id
        );
        Ok(self.root.join(&self.experiment).join(run_id))
    }

    async fn load_meta(&self, run_dir: &Path) -> anyhow::Result<RunMeta> {
        let path = run_dir.join(META_FILE);
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(toml::from_str(&text)?)
    }
}

async fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> anyhow::Result<()> {
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

#[async_trait]
impl ModelRegistry for FileRegistry {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn log_run(&self, run: &RegistryRun) -> anyhow::Result<LoggedRun> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let run_dir = self.run_dir(&run_id)?;

        let params_dir = run_dir.join("params");
        tokio::fs::create_dir_all(&params_dir)
            .await
            .with_context(|| format!("creating {}", params_dir.display()))?;
        for (key, value) in &run.params {
            write_file(&params_dir.join(key), value).await?;
        }

        let model_dir = run_dir.join(&run.model_name);
        tokio::fs::create_dir_all(&model_dir)
            .await
            .with_context(|| format!("creating {}", model_dir.display()))?;
        let model = serde_json::to_vec_pretty(&run.predictor)?;
        write_file(&model_dir.join(MODEL_FILE), model).await?;

        // Written last so a run with meta.toml is always complete.
        let meta = RunMeta {
            run_id: run_id.clone(),
            experiment: self.experiment.clone(),
            model_name: run.model_name.clone(),
            created_at: chrono::Utc::now(),
        };
        write_file(&run_dir.join(META_FILE), toml::to_string(&meta)?).await?;

        tracing::debug!(run_dir = %run_dir.display(), "run stored");
        Ok(LoggedRun {
            model_uri: format!("runs:/{}/{}", run_id, run.model_name),
            run_id,
            experiment: self.experiment.clone(),
        })
    }

    async fn load_predictor(&self, run_id: &str) -> anyhow::Result<ForecastPredictor> {
        let run_dir = self.run_dir(run_id)?;
        let meta = self.load_meta(&run_dir).await?;
        let path = run_dir.join(&meta.model_name).join(MODEL_FILE);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("decoding {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::model_registry::MODEL_ARTIFACT_NAME;
    use crate::domain::forecast::Predictor;
    use crate::domain::hyperparams::Hyperparameters;
    use crate::domain::model::{FittedModel, ModelSettings};
    use crate::domain::series::{CanonicalPoint, CanonicalSeries};
    use chrono::{Days, NaiveDate};

    fn model() -> FittedModel {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let series = CanonicalSeries::new(
            (0..30u64)
                .map(|i| CanonicalPoint {
                    ds: (start + Days::new(i)).format("%Y-%m-%d").to_string(),
                    y: 100.0 + 2.0 * i as f64,
                })
                .collect(),
        )
        .unwrap();
        FittedModel::fit(&series, &Hyperparameters::default(), &ModelSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_log_run_and_load_model() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path(), "prices");
        let fitted = model();
        let run = RegistryRun {
            params: Hyperparameters::default().as_params(),
            model_name: MODEL_ARTIFACT_NAME.to_string(),
            predictor: ForecastPredictor::new(fitted.clone()),
        };

        let logged = registry.log_run(&run).await.unwrap();
        assert_eq!(logged.experiment, "prices");
        assert_eq!(logged.model_uri, format!("runs:/{}/prophet_model", logged.run_id));

        let run_dir = dir.path().join("prices").join(&logged.run_id);
        let mode = std::fs::read_to_string(run_dir.join("params").join("seasonality_mode")).unwrap();
        assert_eq!(mode, "additive");
        assert!(run_dir.join("prophet_model").join("model.json").exists());

        let meta = registry.load_meta(&run_dir).await.unwrap();
        assert_eq!(meta.model_name, "prophet_model");
        assert_eq!(meta.run_id, logged.run_id);

        let loaded = registry.load_predictor(&logged.run_id).await.unwrap();
        let dates = [NaiveDate::from_ymd_opt(2023, 2, 15).unwrap()];
        let expected = run.predictor.predict(&dates);
        let actual = loaded.predict(&dates);
        assert_eq!(actual.len(), 1);
        assert_eq!(actual[0].ds, dates[0]);
        assert!((actual[0].yhat - expected[0].yhat).abs() < 1e-9);
        assert!(actual[0].yhat_lower <= actual[0].yhat && actual[0].yhat <= actual[0].yhat_upper);
    }

    #[tokio::test]
    async fn test_each_run_gets_its_own_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path(), "prices");
        let run = RegistryRun {
            params: vec![],
            model_name: MODEL_ARTIFACT_NAME.to_string(),
            predictor: ForecastPredictor::new(model()),
        };
        let first = registry.log_run(&run).await.unwrap();
        let second = registry.log_run(&run).await.unwrap();
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn test_load_unknown_run_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path(), "prices");
        assert!(registry.load_predictor("missing").await.is_err());
        assert!(registry.load_predictor("../prices").await.is_err());
    }
}
