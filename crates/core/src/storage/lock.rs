use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session, so the lock keeps its own
// connection checked out until it is released.
const LOCK_NAMESPACE: i64 = 0x4441_5950_4943; // "DAYPIC"

fn lock_key_for_date(date: NaiveDate) -> i64 {
    LOCK_NAMESPACE ^ (date.num_days_from_ce() as i64)
}

/// Exclusive right to rank a single date.
///
/// Dropped without `release()`, the lock detaches its connection from the pool
/// so the session ends and Postgres frees the advisory lock with it.
pub struct RankingLock {
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

impl RankingLock {
    pub fn key(&self) -> i64 {
        self.key
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let key = self.key;
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let res = sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .execute(&mut *conn)
            .await;
        match res {
            // Unlocked; the connection goes back to the pool clean.
            Ok(_) => Ok(()),
            Err(err) => {
                drop(conn.detach());
                Err(anyhow::Error::new(err)
                    .context(format!("failed to release advisory lock (key={key})")))
            }
        }
    }
}

impl Drop for RankingLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(key = self.key, "ranking lock dropped unreleased; closing its session");
            drop(conn.detach());
        }
    }
}

/// Returns `None` when another session already ranks `date`.
pub async fn try_acquire_ranking_lock(
    pool: &sqlx::PgPool,
    date: NaiveDate,
) -> anyhow::Result<Option<RankingLock>> {
    let key = lock_key_for_date(date);
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for advisory lock")?;

    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

    Ok(acquired.0.then(|| RankingLock {
        conn: Some(conn),
        key,
    }))
}
