use super::StoredArtifact;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub async fn load_artifact(
    pool: &sqlx::PgPool,
    name: &str,
) -> anyhow::Result<Option<StoredArtifact>> {
    let row = sqlx::query_as::<_, (Value, DateTime<Utc>, i32)>(
        "SELECT artifact, trained_at, n_samples FROM model_artifacts WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select model_artifacts failed (name={name})"))?;

    Ok(row.map(|(artifact, trained_at, n_samples)| StoredArtifact {
        artifact,
        trained_at,
        n_samples,
    }))
}

/// Overwrites the named artifact; artifacts are not versioned.
pub async fn save_artifact(
    pool: &sqlx::PgPool,
    name: &str,
    artifact: &StoredArtifact,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO model_artifacts (name, artifact, trained_at, n_samples, updated_at) \
         VALUES ($1, $2, $3, $4, now()) \
         ON CONFLICT (name) DO UPDATE SET \
           artifact = EXCLUDED.artifact, \
           trained_at = EXCLUDED.trained_at, \
           n_samples = EXCLUDED.n_samples, \
           updated_at = now()",
    )
    .bind(name)
    .bind(&artifact.artifact)
    .bind(artifact.trained_at)
    .bind(artifact.n_samples)
    .execute(pool)
    .await
    .with_context(|| format!("upsert model_artifacts failed (name={name})"))?;

    Ok(())
}
