//! Classifier lifecycle: load, predict, train from labeled history, persist.
//!
//! The gateway is the only reader and writer of the stored model. Any problem
//! reading it is reported as `ModelUnavailable`, which callers treat as
//! "score with momentum instead".

use crate::error::PipelineError;
use crate::ingest::provider::PriceHistoryProvider;
use crate::model::forest::{ForestConfig, RandomForest};
use crate::model::imputer::MedianImputer;
use crate::scoring::features::{feature_vector, FeatureVector, FEATURE_NAMES};
use crate::storage::{Store, StoredArtifact};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MODEL_NAME: &str = "next_day_direction";
pub const MIN_TRAINING_SAMPLES: usize = 8;
pub const DEFAULT_TRAINING_LOOKBACK_DAYS: i64 = 90;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model: RandomForest,
    pub imputer: MedianImputer,
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
    pub n_samples: usize,
}

impl ModelArtifact {
    fn check_shape(&self) -> Result<(), PipelineError> {
        let width = self.feature_names.len();
        if width == 0 || self.imputer.width() != width || self.model.n_features() != width {
            return Err(PipelineError::ModelUnavailable(format!(
                "artifact shape mismatch: {} names, imputer width {}, model width {}",
                width,
                self.imputer.width(),
                self.model.n_features()
            )));
        }
        Ok(())
    }

    /// Probability that the next session closes higher.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let row = self.imputer.transform(&features.to_row(&self.feature_names));
        self.model.predict_proba(&row)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStatus {
    pub available: bool,
    pub trained_at: Option<DateTime<Utc>>,
    pub n_samples: Option<i32>,
    pub feature_names: Vec<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainReport {
    pub n_samples: usize,
    pub skipped: usize,
    pub trained_at: DateTime<Utc>,
}

/// One labeled example: features as they stood on `date`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub date: NaiveDate,
    pub symbol: String,
    pub features: FeatureVector,
    pub label: u8,
}

pub struct ClassifierGateway {
    store: Arc<dyn Store>,
    prices: Arc<dyn PriceHistoryProvider>,
    forest: ForestConfig,
    lookback_days: i64,
}

impl ClassifierGateway {
    pub fn new(store: Arc<dyn Store>, prices: Arc<dyn PriceHistoryProvider>) -> Self {
        Self {
            store,
            prices,
            forest: ForestConfig::default(),
            lookback_days: DEFAULT_TRAINING_LOOKBACK_DAYS,
        }
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }

    pub async fn load(&self) -> Result<ModelArtifact, PipelineError> {
        let stored = self
            .store
            .load_artifact(MODEL_NAME)
            .await
            .map_err(|e| PipelineError::ModelUnavailable(format!("artifact read failed: {e:#}")))?
            .ok_or_else(|| PipelineError::ModelUnavailable("no trained model".to_string()))?;

        let artifact: ModelArtifact = serde_json::from_value(stored.artifact).map_err(|e| {
            PipelineError::ModelUnavailable(format!("artifact is not readable: {e}"))
        })?;
        artifact.check_shape()?;
        Ok(artifact)
    }

    pub async fn is_trained(&self) -> bool {
        self.load().await.is_ok()
    }

    pub async fn status(&self) -> ModelStatus {
        match self.load().await {
            Ok(artifact) => ModelStatus {
                available: true,
                trained_at: Some(artifact.trained_at),
                n_samples: i32::try_from(artifact.n_samples).ok(),
                feature_names: artifact.feature_names,
                detail: None,
            },
            Err(err) => ModelStatus {
                available: false,
                trained_at: None,
                n_samples: None,
                feature_names: Vec::new(),
                detail: Some(err.to_string()),
            },
        }
    }

    /// One probability per input vector, in input order.
    pub async fn predict_probabilities(
        &self,
        vectors: &[FeatureVector],
    ) -> Result<Vec<f64>, PipelineError> {
        let artifact = self.load().await?;
        Ok(vectors.iter().map(|v| artifact.predict(v)).collect())
    }

    /// Rebuilds features for every labeled prediction from prices available up
    /// to the prediction date. Returns the usable samples and how many were
    /// skipped.
    pub async fn training_set(&self) -> Result<(Vec<TrainingSample>, usize), PipelineError> {
        let history = self
            .store
            .accuracy_history()
            .await
            .map_err(PipelineError::persistence)?;

        let mut samples = Vec::with_capacity(history.len());
        let mut skipped: usize = 0;

        for record in history {
            if !record.actual_return.is_finite() {
                skipped += 1;
                continue;
            }

            let series = match self
                .prices
                .fetch_as_of(&record.predicted_symbol, record.date, self.lookback_days)
                .await
            {
                Ok(Some(series)) => series,
                Ok(None) => {
                    skipped += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(
                        date = %record.date,
                        symbol = %record.predicted_symbol,
                        error = %err,
                        "training price fetch failed; sample skipped"
                    );
                    skipped += 1;
                    continue;
                }
            };

            let Some(features) = feature_vector(&series) else {
                skipped += 1;
                continue;
            };

            samples.push(TrainingSample {
                date: record.date,
                symbol: record.predicted_symbol,
                features,
                label: u8::from(record.actual_return > 0.0),
            });
        }

        Ok((samples, skipped))
    }

    pub async fn train(&self) -> Result<TrainReport, PipelineError> {
        let started = std::time::Instant::now();
        let (samples, skipped) = self.training_set().await?;

        if samples.len() < MIN_TRAINING_SAMPLES {
            return Err(PipelineError::InsufficientTrainingData {
                usable: samples.len(),
                required: MIN_TRAINING_SAMPLES,
            });
        }

        let feature_names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        let rows: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| s.features.to_row(&feature_names))
            .collect();
        let labels: Vec<u8> = samples.iter().map(|s| s.label).collect();
        let n_samples = samples.len();
        let config = self.forest.clone();

        let (imputer, model) = tokio::task::spawn_blocking(move || {
            let imputer = MedianImputer::fit(&rows)?;
            let imputed: Vec<Vec<f64>> = rows.iter().map(|r| imputer.transform(r)).collect();
            let mut model = RandomForest::new(config);
            model.fit(&imputed, &labels)?;
            anyhow::Ok((imputer, model))
        })
        .await
        .map_err(|e| PipelineError::ModelUnavailable(format!("training task failed: {e}")))?
        .map_err(|e| PipelineError::ModelUnavailable(format!("training failed: {e:#}")))?;

        let trained_at = Utc::now();
        let artifact = ModelArtifact {
            model,
            imputer,
            feature_names,
            trained_at,
            n_samples,
        };

        let value = serde_json::to_value(&artifact)
            .map_err(|e| PipelineError::persistence(anyhow::anyhow!("serialize artifact: {e}")))?;
        let stored = StoredArtifact {
            artifact: value,
            trained_at,
            n_samples: i32::try_from(n_samples).unwrap_or(i32::MAX),
        };
        self.store
            .save_artifact(MODEL_NAME, &stored)
            .await
            .map_err(PipelineError::persistence)?;

        tracing::info!(
            n_samples,
            skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "classifier trained"
        );

        Ok(TrainReport {
            n_samples,
            skipped,
            trained_at,
        })
    }

    /// Best-effort training. Returns whether a new model was written.
    pub async fn try_train(&self) -> bool {
        match self.train().await {
            Ok(_) => true,
            Err(err @ PipelineError::InsufficientTrainingData { .. }) => {
                tracing::info!(reason = %err, "classifier training skipped");
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "classifier training failed");
                false
            }
        }
    }
}
