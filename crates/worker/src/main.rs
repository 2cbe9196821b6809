use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use daypick_core::config::Settings;
use daypick_core::error::PipelineError;
use daypick_core::pipeline::{spawn_ranking, AccuracyEvaluator, PipelineContext, RankingEngine};
use daypick_core::storage::{MemoryStore, PgStore, PipelineRun, RunKind, RunStatus, Store};
use daypick_core::time::us_market;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "daypick_worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rank the universe and store the day's picks.
    Rank {
        /// Date to file the picks under (YYYY-MM-DD). Defaults to today in New York.
        #[arg(long)]
        as_of_date: Option<String>,

        /// Rank against an in-memory store; nothing is written to the database.
        #[arg(long)]
        dry_run: bool,

        /// Rank even when the date is not a trading day.
        #[arg(long)]
        force: bool,
    },
    /// Label past picks whose next session has closed.
    Evaluate,
    /// Retrain the classifier from labeled history.
    Train,
    /// Re-download the ticker universe.
    RefreshUniverse,
}

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

    let cli = Cli::parse();

    let res = match cli.command {
        Command::Rank {
            as_of_date,
            dry_run,
            force,
        } => rank(&settings, as_of_date.as_deref(), dry_run, force).await,
        Command::Evaluate => evaluate(&settings).await,
        Command::Train => train(&settings).await,
        Command::RefreshUniverse => refresh_universe(&settings).await,
    };

    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
    }
    res
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

async fn connect(settings: &Settings) -> anyhow::Result<PgStore> {
    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    daypick_core::storage::migrate(&pool).await?;
    Ok(PgStore::new(pool))
}

async fn record(
    store: &dyn Store,
    kind: RunKind,
    run_date: NaiveDate,
    status: RunStatus,
    error: Option<String>,
    detail: Option<serde_json::Value>,
) {
    let run = PipelineRun {
        kind,
        run_date,
        status,
        error,
        detail,
    };
    match store.record_run(&run).await {
        Ok(run_id) => tracing::info!(%run_id, kind = kind.as_str(), status = status.as_str(), "run recorded"),
        Err(err) => tracing::warn!(error = %err, "failed to record pipeline run"),
    }
}

async fn rank(
    settings: &Settings,
    as_of_date: Option<&str>,
    dry_run: bool,
    force: bool,
) -> anyhow::Result<()> {
    let date = us_market::resolve_run_date(as_of_date, Utc::now())?;

    if !force && !us_market::is_trading_day(date) {
        tracing::info!(%date, "not a trading day; ranking skipped (use --force to override)");
        return Ok(());
    }

    if dry_run {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ctx = PipelineContext::from_settings(settings, store)?;
        let result = RankingEngine::new(&ctx).run(date).await?;
        match result {
            Some(result) => {
                for pick in &result.picks {
                    tracing::info!(
                        %date,
                        dry_run = true,
                        rank = pick.rank,
                        symbol = %pick.symbol,
                        score = pick.score,
                        reason = %pick.reason,
                        "pick"
                    );
                }
            }
            None => tracing::info!(%date, dry_run = true, "no ranking result"),
        }
        return Ok(());
    }

    let pg = connect(settings).await?;
    let Some(lock) = daypick_core::storage::lock::try_acquire_ranking_lock(pg.pool(), date).await?
    else {
        tracing::warn!(%date, "ranking lock not acquired; another run in progress");
        return Ok(());
    };

    let store: Arc<dyn Store> = Arc::new(pg);
    let ctx = Arc::new(PipelineContext::from_settings(settings, store)?);

    let outcome = spawn_ranking(ctx, date, Some(lock))
        .await
        .context("ranking task failed")?;

    match outcome {
        Ok(Some(result)) => {
            tracing::info!(
                %date,
                used_classifier = result.used_classifier,
                picks = result.picks.len(),
                "ranking persisted"
            );
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => Err(anyhow::Error::new(err).context("ranking run failed")),
    }
}

async fn evaluate(settings: &Settings) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(connect(settings).await?);
    let ctx = PipelineContext::from_settings(settings, store.clone())?;
    let observable_through = us_market::last_closed_session(Utc::now());

    match AccuracyEvaluator::new(&ctx).update_latest(observable_through).await {
        Ok(summary) => {
            let detail = serde_json::to_value(&summary).ok();
            record(
                &*store,
                RunKind::Evaluation,
                observable_through,
                RunStatus::Success,
                None,
                detail,
            )
            .await;
            Ok(())
        }
        Err(err) => {
            let err = anyhow::Error::new(err);
            record(
                &*store,
                RunKind::Evaluation,
                observable_through,
                RunStatus::Error,
                Some(format!("{err:#}")),
                None,
            )
            .await;
            Err(err.context("accuracy update failed"))
        }
    }
}

async fn train(settings: &Settings) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(connect(settings).await?);
    let ctx = PipelineContext::from_settings(settings, store.clone())?;
    let today = us_market::resolve_run_date(None, Utc::now())?;

    match ctx.classifier.train().await {
        Ok(report) => {
            let detail = serde_json::to_value(&report).ok();
            record(&*store, RunKind::Training, today, RunStatus::Success, None, detail).await;
            Ok(())
        }
        Err(err @ PipelineError::InsufficientTrainingData { .. }) => {
            tracing::info!(reason = %err, "classifier not trained");
            record(
                &*store,
                RunKind::Training,
                today,
                RunStatus::Skipped,
                Some(err.to_string()),
                None,
            )
            .await;
            Ok(())
        }
        Err(err) => {
            let err = anyhow::Error::new(err);
            record(
                &*store,
                RunKind::Training,
                today,
                RunStatus::Error,
                Some(format!("{err:#}")),
                None,
            )
            .await;
            Err(err.context("training failed"))
        }
    }
}

async fn refresh_universe(settings: &Settings) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(connect(settings).await?);
    let ctx = PipelineContext::from_settings(settings, store.clone())?;
    let today = us_market::resolve_run_date(None, Utc::now())?;

    match ctx.universe.refresh().await {
        Ok(tickers) => {
            tracing::info!(label = ctx.universe.label(), count = tickers.len(), "universe refreshed");
            let detail = serde_json::json!({ "count": tickers.len() });
            record(
                &*store,
                RunKind::UniverseRefresh,
                today,
                RunStatus::Success,
                None,
                Some(detail),
            )
            .await;
            Ok(())
        }
        Err(err) => {
            record(
                &*store,
                RunKind::UniverseRefresh,
                today,
                RunStatus::Error,
                Some(format!("{err:#}")),
                None,
            )
            .await;
            Err(err.context("universe refresh failed"))
        }
    }
}
