//! Ranking run as a detached task.
//!
//! The task owns the context and the date's lock, so it runs to completion,
//! records its audit row and releases the lock even if whoever spawned it stops
//! waiting.

use super::context::PipelineContext;
use super::ranking::RankingEngine;
use crate::domain::pick::RankingResult;
use crate::error::PipelineError;
use crate::storage::lock::RankingLock;
use crate::storage::{PipelineRun, RunKind, RunStatus};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub type RankingOutcome = Result<Option<RankingResult>, PipelineError>;

pub fn spawn_ranking(
    ctx: Arc<PipelineContext>,
    date: NaiveDate,
    lock: Option<RankingLock>,
) -> JoinHandle<RankingOutcome> {
    tokio::spawn(async move {
        let outcome = RankingEngine::new(&ctx).run(date).await;

        let (status, error, detail) = match &outcome {
            Ok(Some(result)) => (RunStatus::Success, None, serde_json::to_value(result).ok()),
            Ok(None) => (RunStatus::NoResult, None, None),
            Err(err) => (RunStatus::Error, Some(err.to_string()), None),
        };
        let run = PipelineRun {
            kind: RunKind::Ranking,
            run_date: date,
            status,
            error,
            detail,
        };
        match ctx.store.record_run(&run).await {
            Ok(run_id) => tracing::info!(%run_id, %date, status = status.as_str(), "ranking run recorded"),
            Err(err) => tracing::warn!(%date, error = %err, "failed to record ranking run"),
        }

        if let Some(lock) = lock {
            if let Err(err) = lock.release().await {
                tracing::warn!(%date, error = %err, "failed to release ranking lock");
            }
        }

        outcome
    })
}
