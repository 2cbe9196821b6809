use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use daypick_core::config::Settings;
use daypick_core::domain::pick::{AccuracyRecord, AccuracyStats, Pick, PredictionRecord, RankingResult};
use daypick_core::error::PipelineError;
use daypick_core::model::{ModelStatus, TrainReport};
use daypick_core::pipeline::{spawn_ranking, AccuracyEvaluator, EvaluationSummary, PipelineContext};
use daypick_core::storage::{PgStore, PipelineRun, RunKind, RunStatus, Store};
use daypick_core::time::us_market;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ACCURACY_RECORDS_SHOWN: usize = 90;
const DEFAULT_PREDICTIONS_LIMIT: i64 = 30;
const MAX_PREDICTIONS_LIMIT: i64 = 365;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match daypick_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let ctx = match &pool {
        Some(pool) => {
            let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
            match PipelineContext::from_settings(&settings, store) {
                Ok(ctx) => Some(Arc::new(ctx)),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "pipeline setup failed; starting API in degraded mode");
                    None
                }
            }
        }
        None => None,
    };

    let state = AppState { pool, ctx };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/run-prediction", post(run_prediction))
        .route("/api/accuracy", get(get_accuracy))
        .route("/api/accuracy/update", post(update_accuracy))
        .route("/api/ml/train", post(train_model))
        .route("/api/ml/status", get(model_status))
        .route("/api/picks/latest", get(get_latest_picks))
        .route("/api/picks/:date", get(get_picks_by_date))
        .route("/api/predictions", get(get_predictions))
        .route("/api/predictions/clear", post(clear_predictions))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    ctx: Option<Arc<PipelineContext>>,
}

impl AppState {
    fn ctx(&self) -> Result<&PipelineContext, StatusCode> {
        self.ctx.as_deref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn internal(err: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %format!("{err:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn record(store: &dyn Store, kind: RunKind, run_date: NaiveDate, status: RunStatus, error: Option<String>) {
    let run = PipelineRun {
        kind,
        run_date,
        status,
        error,
        detail: None,
    };
    if let Err(err) = store.record_run(&run).await {
        tracing::warn!(error = %err, "failed to record pipeline run");
    }
}

#[derive(Debug, Deserialize)]
struct RunPredictionParams {
    date: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunPredictionResponse {
    success: bool,
    result: Option<RankingResult>,
}

async fn run_prediction(
    State(state): State<AppState>,
    Query(params): Query<RunPredictionParams>,
) -> Result<Json<RunPredictionResponse>, StatusCode> {
    let ctx = state.ctx.clone().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    let pool = state.pool.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let date = us_market::resolve_run_date(params.date.as_deref(), Utc::now())
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let lock = daypick_core::storage::lock::try_acquire_ranking_lock(pool, date)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::CONFLICT)?;

    // The job keeps running, and releases the lock, if this request goes away.
    let result = spawn_ranking(ctx, date, Some(lock))
        .await
        .map_err(|e| internal(anyhow::Error::new(e).context("ranking task failed")))?
        .map_err(|e| internal(anyhow::Error::new(e)))?;

    Ok(Json(RunPredictionResponse {
        success: result.is_some(),
        result,
    }))
}

async fn update_accuracy(
    State(state): State<AppState>,
) -> Result<Json<EvaluationSummary>, StatusCode> {
    let ctx = state.ctx()?;
    let observable_through = us_market::last_closed_session(Utc::now());

    let summary = AccuracyEvaluator::new(ctx)
        .update_latest(observable_through)
        .await
        .map_err(|e| internal(anyhow::Error::new(e)))?;

    record(
        &*ctx.store,
        RunKind::Evaluation,
        observable_through,
        RunStatus::Success,
        None,
    )
    .await;
    Ok(Json(summary))
}

#[derive(Debug, Serialize)]
struct AccuracyResponse {
    stats: AccuracyStats,
    records: Vec<AccuracyRecord>,
}

async fn get_accuracy(State(state): State<AppState>) -> Result<Json<AccuracyResponse>, StatusCode> {
    let ctx = state.ctx()?;
    let history = ctx.store.accuracy_history().await.map_err(internal)?;

    let stats = AccuracyStats::from_records(&history);
    let records: Vec<AccuracyRecord> = history
        .into_iter()
        .rev()
        .take(ACCURACY_RECORDS_SHOWN)
        .collect();

    Ok(Json(AccuracyResponse { stats, records }))
}

#[derive(Debug, Serialize)]
struct TrainResponse {
    trained: bool,
    report: Option<TrainReport>,
    message: Option<String>,
}

async fn train_model(State(state): State<AppState>) -> Result<Json<TrainResponse>, StatusCode> {
    let ctx = state.ctx()?;
    let today = us_market::resolve_run_date(None, Utc::now()).map_err(internal)?;

    match ctx.classifier.train().await {
        Ok(report) => {
            record(&*ctx.store, RunKind::Training, today, RunStatus::Success, None).await;
            Ok(Json(TrainResponse {
                trained: true,
                report: Some(report),
                message: None,
            }))
        }
        Err(err @ PipelineError::InsufficientTrainingData { .. }) => {
            record(
                &*ctx.store,
                RunKind::Training,
                today,
                RunStatus::Skipped,
                Some(err.to_string()),
            )
            .await;
            Ok(Json(TrainResponse {
                trained: false,
                report: None,
                message: Some(err.to_string()),
            }))
        }
        Err(err) => {
            let err = anyhow::Error::new(err);
            record(
                &*ctx.store,
                RunKind::Training,
                today,
                RunStatus::Error,
                Some(format!("{err:#}")),
            )
            .await;
            Err(internal(err))
        }
    }
}

async fn model_status(State(state): State<AppState>) -> Result<Json<ModelStatus>, StatusCode> {
    let ctx = state.ctx()?;
    Ok(Json(ctx.classifier.status().await))
}

#[derive(Debug, Serialize)]
struct PicksResponse {
    date: NaiveDate,
    picks: Vec<Pick>,
}

async fn get_latest_picks(State(state): State<AppState>) -> Result<Json<PicksResponse>, StatusCode> {
    let ctx = state.ctx()?;
    let (date, picks) = ctx
        .store
        .latest_picks()
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(PicksResponse { date, picks }))
}

async fn get_picks_by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<PicksResponse>, StatusCode> {
    let ctx = state.ctx()?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?;

    let picks = ctx.store.picks_for_date(date).await.map_err(internal)?;
    if picks.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(PicksResponse { date, picks }))
}

#[derive(Debug, Deserialize)]
struct PredictionsParams {
    limit: Option<i64>,
}

async fn get_predictions(
    State(state): State<AppState>,
    Query(params): Query<PredictionsParams>,
) -> Result<Json<Vec<PredictionRecord>>, StatusCode> {
    let ctx = state.ctx()?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PREDICTIONS_LIMIT)
        .clamp(1, MAX_PREDICTIONS_LIMIT);

    let records = ctx.store.prediction_history(limit).await.map_err(internal)?;
    Ok(Json(records))
}

#[derive(Debug, Serialize)]
struct ClearResponse {
    removed: u64,
}

async fn clear_predictions(State(state): State<AppState>) -> Result<Json<ClearResponse>, StatusCode> {
    let ctx = state.ctx()?;
    let removed = ctx.store.clear_predictions().await.map_err(internal)?;
    tracing::info!(removed, "picks and predictions cleared");
    Ok(Json(ClearResponse { removed }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
