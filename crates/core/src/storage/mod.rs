use crate::domain::pick::{AccuracyRecord, Pick, PredictionRecord};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod accuracy;
pub mod artifacts;
pub mod lock;
pub mod memory;
pub mod picks;
pub mod runs;
pub mod universe_cache;

pub use memory::MemoryStore;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub artifact: Value,
    pub trained_at: DateTime<Utc>,
    pub n_samples: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTickers {
    pub tickers: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Ranking,
    Evaluation,
    Training,
    UniverseRefresh,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ranking => "ranking",
            Self::Evaluation => "evaluation",
            Self::Training => "training",
            Self::UniverseRefresh => "universe_refresh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    NoResult,
    Skipped,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NoResult => "no_result",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

/// Audit row for one trigger invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub kind: RunKind,
    pub run_date: NaiveDate,
    pub status: RunStatus,
    pub error: Option<String>,
    pub detail: Option<Value>,
}

/// Persistence boundary of the pipeline.
///
/// Picks for a date are written as one unit together with the date's
/// prediction record; every other write is an upsert keyed by date or name.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn replace_picks(&self, date: NaiveDate, picks: &[Pick]) -> anyhow::Result<()>;

    async fn picks_for_date(&self, date: NaiveDate) -> anyhow::Result<Vec<Pick>>;

    async fn latest_picks(&self) -> anyhow::Result<Option<(NaiveDate, Vec<Pick>)>>;

    async fn prediction_history(&self, limit: i64) -> anyhow::Result<Vec<PredictionRecord>>;

    /// Removes all picks and prediction records. Accuracy history is kept.
    async fn clear_predictions(&self) -> anyhow::Result<u64>;

    async fn rank_one_symbol(&self, date: NaiveDate) -> anyhow::Result<Option<String>>;

    /// Prediction dates without an accuracy record, oldest first.
    async fn unevaluated_dates(&self) -> anyhow::Result<Vec<NaiveDate>>;

    async fn upsert_accuracy(&self, record: &AccuracyRecord) -> anyhow::Result<()>;

    /// All accuracy records, ascending by date.
    async fn accuracy_history(&self) -> anyhow::Result<Vec<AccuracyRecord>>;

    async fn load_artifact(&self, name: &str) -> anyhow::Result<Option<StoredArtifact>>;

    async fn save_artifact(&self, name: &str, artifact: &StoredArtifact) -> anyhow::Result<()>;

    async fn load_universe_cache(&self, name: &str) -> anyhow::Result<Option<CachedTickers>>;

    async fn save_universe_cache(&self, name: &str, cache: &CachedTickers)
        -> anyhow::Result<()>;

    async fn record_run(&self, run: &PipelineRun) -> anyhow::Result<uuid::Uuid>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn replace_picks(&self, date: NaiveDate, picks: &[Pick]) -> anyhow::Result<()> {
        picks::replace_picks(&self.pool, date, picks).await
    }

    async fn picks_for_date(&self, date: NaiveDate) -> anyhow::Result<Vec<Pick>> {
        picks::picks_for_date(&self.pool, date).await
    }

    async fn latest_picks(&self) -> anyhow::Result<Option<(NaiveDate, Vec<Pick>)>> {
        picks::latest_picks(&self.pool).await
    }

    async fn prediction_history(&self, limit: i64) -> anyhow::Result<Vec<PredictionRecord>> {
        picks::prediction_history(&self.pool, limit).await
    }

    async fn clear_predictions(&self) -> anyhow::Result<u64> {
        picks::clear_predictions(&self.pool).await
    }

    async fn rank_one_symbol(&self, date: NaiveDate) -> anyhow::Result<Option<String>> {
        picks::rank_one_symbol(&self.pool, date).await
    }

    async fn unevaluated_dates(&self) -> anyhow::Result<Vec<NaiveDate>> {
        accuracy::unevaluated_dates(&self.pool).await
    }

    async fn upsert_accuracy(&self, record: &AccuracyRecord) -> anyhow::Result<()> {
        accuracy::upsert_accuracy(&self.pool, record).await
    }

    async fn accuracy_history(&self) -> anyhow::Result<Vec<AccuracyRecord>> {
        accuracy::accuracy_history(&self.pool).await
    }

    async fn load_artifact(&self, name: &str) -> anyhow::Result<Option<StoredArtifact>> {
        artifacts::load_artifact(&self.pool, name).await
    }

    async fn save_artifact(&self, name: &str, artifact: &StoredArtifact) -> anyhow::Result<()> {
        artifacts::save_artifact(&self.pool, name, artifact).await
    }

    async fn load_universe_cache(&self, name: &str) -> anyhow::Result<Option<CachedTickers>> {
        universe_cache::load(&self.pool, name).await
    }

    async fn save_universe_cache(
        &self,
        name: &str,
        cache: &CachedTickers,
    ) -> anyhow::Result<()> {
        universe_cache::save(&self.pool, name, cache).await
    }

    async fn record_run(&self, run: &PipelineRun) -> anyhow::Result<uuid::Uuid> {
        runs::record_run(&self.pool, run).await
    }
}
