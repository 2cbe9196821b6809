use super::PipelineRun;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub async fn record_run(pool: &sqlx::PgPool, run: &PipelineRun) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let generated_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO pipeline_runs (id, kind, run_date, generated_at, status, error, detail) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .persistent(false)
    .bind(id)
    .bind(run.kind.as_str())
    .bind(run.run_date)
    .bind(generated_at)
    .bind(run.status.as_str())
    .bind(run.error.as_deref())
    .bind(run.detail.as_ref())
    .execute(pool)
    .await
    .context("insert pipeline_runs failed")?;

    Ok(id)
}
