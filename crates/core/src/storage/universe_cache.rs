use super::CachedTickers;
use anyhow::Context;
use chrono::{DateTime, Utc};

pub async fn load(pool: &sqlx::PgPool, name: &str) -> anyhow::Result<Option<CachedTickers>> {
    let row = sqlx::query_as::<_, (Vec<String>, DateTime<Utc>)>(
        "SELECT tickers, updated_at FROM ticker_universe_cache WHERE name = $1",
    )
    .persistent(false)
    .bind(name)
    .fetch_optional(pool)
    .await
    .context("select ticker_universe_cache failed")?;

    Ok(row.map(|(tickers, updated_at)| CachedTickers {
        tickers,
        updated_at,
    }))
}

pub async fn save(pool: &sqlx::PgPool, name: &str, cache: &CachedTickers) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO ticker_universe_cache (name, tickers, updated_at) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (name) DO UPDATE SET \
           tickers = EXCLUDED.tickers, \
           updated_at = EXCLUDED.updated_at",
    )
    .persistent(false)
    .bind(name)
    .bind(&cache.tickers)
    .bind(cache.updated_at)
    .execute(pool)
    .await
    .context("upsert ticker_universe_cache failed")?;

    Ok(())
}
