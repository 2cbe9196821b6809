use crate::domain::pick::{validate_picks, Pick, PredictionRecord};
use anyhow::Context;
use chrono::NaiveDate;

type PickRow = (NaiveDate, i32, String, f64, String, Option<f64>);

fn pick_from_row((date, rank, symbol, score, reason, price): PickRow) -> Pick {
    Pick {
        date,
        rank,
        symbol,
        score,
        reason,
        price,
    }
}

/// Replaces every pick for `date` and the date's prediction record in a single
/// transaction, so readers never observe a partially written day.
pub async fn replace_picks(
    pool: &sqlx::PgPool,
    date: NaiveDate,
    picks: &[Pick],
) -> anyhow::Result<()> {
    validate_picks(date, picks)?;

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    sqlx::query("DELETE FROM daily_picks WHERE date = $1")
        .bind(date)
        .execute(&mut *tx)
        .await
        .context("delete daily_picks failed")?;

    for pick in picks {
        insert_pick(&mut tx, pick).await?;
    }

    match PredictionRecord::from_rank_one(picks) {
        Some(rec) => {
            sqlx::query(
                "INSERT INTO predictions (date, symbol, score, reason) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (date) DO UPDATE \
                   SET symbol = EXCLUDED.symbol, score = EXCLUDED.score, reason = EXCLUDED.reason, \
                       created_at = now()",
            )
            .bind(rec.date)
            .bind(&rec.symbol)
            .bind(rec.score)
            .bind(&rec.reason)
            .execute(&mut *tx)
            .await
            .context("upsert predictions failed")?;
        }
        None => {
            sqlx::query("DELETE FROM predictions WHERE date = $1")
                .bind(date)
                .execute(&mut *tx)
                .await
                .context("delete predictions failed")?;
        }
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(())
}

async fn insert_pick(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    pick: &Pick,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO daily_picks (date, rank, symbol, score, reason, price) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(pick.date)
    .bind(pick.rank)
    .bind(&pick.symbol)
    .bind(pick.score)
    .bind(&pick.reason)
    .bind(pick.price)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("insert daily_picks failed (rank={})", pick.rank))?;

    Ok(())
}

pub async fn picks_for_date(pool: &sqlx::PgPool, date: NaiveDate) -> anyhow::Result<Vec<Pick>> {
    let rows = sqlx::query_as::<_, PickRow>(
        "SELECT date, rank, symbol, score, reason, price \
         FROM daily_picks \
         WHERE date = $1 \
         ORDER BY rank ASC",
    )
    .bind(date)
    .fetch_all(pool)
    .await
    .context("select daily_picks failed")?;

    Ok(rows.into_iter().map(pick_from_row).collect())
}

pub async fn latest_picks(pool: &sqlx::PgPool) -> anyhow::Result<Option<(NaiveDate, Vec<Pick>)>> {
    let latest: Option<NaiveDate> = sqlx::query_scalar("SELECT max(date) FROM daily_picks")
        .fetch_one(pool)
        .await
        .context("select latest daily_picks date failed")?;

    let Some(date) = latest else {
        return Ok(None);
    };

    let picks = picks_for_date(pool, date).await?;
    Ok(Some((date, picks)))
}

pub async fn prediction_history(
    pool: &sqlx::PgPool,
    limit: i64,
) -> anyhow::Result<Vec<PredictionRecord>> {
    let rows = sqlx::query_as::<_, (String, NaiveDate, f64, String)>(
        "SELECT symbol, date, score, reason \
         FROM predictions \
         ORDER BY date DESC \
         LIMIT $1",
    )
    .bind(limit.max(0))
    .fetch_all(pool)
    .await
    .context("select predictions failed")?;

    Ok(rows
        .into_iter()
        .map(|(symbol, date, score, reason)| PredictionRecord {
            symbol,
            date,
            score,
            reason,
        })
        .collect())
}

pub async fn clear_predictions(pool: &sqlx::PgPool) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let picks = sqlx::query("DELETE FROM daily_picks")
        .execute(&mut *tx)
        .await
        .context("delete daily_picks failed")?;
    let predictions = sqlx::query("DELETE FROM predictions")
        .execute(&mut *tx)
        .await
        .context("delete predictions failed")?;

    tx.commit().await.context("commit transaction failed")?;
    Ok(picks.rows_affected() + predictions.rows_affected())
}

pub async fn rank_one_symbol(
    pool: &sqlx::PgPool,
    date: NaiveDate,
) -> anyhow::Result<Option<String>> {
    let from_picks: Option<String> = sqlx::query_scalar(
        "SELECT symbol FROM daily_picks WHERE date = $1 AND rank = 1",
    )
    .bind(date)
    .fetch_optional(pool)
    .await
    .context("select rank-1 pick failed")?;

    if from_picks.is_some() {
        return Ok(from_picks);
    }

    sqlx::query_scalar("SELECT symbol FROM predictions WHERE date = $1")
        .bind(date)
        .fetch_optional(pool)
        .await
        .context("select prediction failed")
}
