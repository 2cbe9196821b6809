use crate::domain::pick::AccuracyRecord;
use anyhow::Context;
use chrono::NaiveDate;

pub async fn unevaluated_dates(pool: &sqlx::PgPool) -> anyhow::Result<Vec<NaiveDate>> {
    let dates: Vec<NaiveDate> = sqlx::query_scalar(
        "SELECT d.date FROM daily_picks d \
         WHERE d.rank = 1 \
           AND NOT EXISTS (SELECT 1 FROM accuracy_log a WHERE a.date = d.date) \
         ORDER BY d.date ASC",
    )
    .fetch_all(pool)
    .await
    .context("select unevaluated daily_picks failed")?;

    if !dates.is_empty() {
        return Ok(dates);
    }

    // Prediction records written before ranked picks existed.
    sqlx::query_scalar(
        "SELECT p.date FROM predictions p \
         LEFT JOIN accuracy_log a ON a.date = p.date \
         WHERE a.date IS NULL \
         ORDER BY p.date ASC",
    )
    .fetch_all(pool)
    .await
    .context("select unevaluated predictions failed")
}

pub async fn upsert_accuracy(pool: &sqlx::PgPool, record: &AccuracyRecord) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO accuracy_log (date, predicted_symbol, predicted_return, actual_return, actual_close, was_correct) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (date) DO UPDATE SET \
           predicted_symbol = EXCLUDED.predicted_symbol, \
           predicted_return = EXCLUDED.predicted_return, \
           actual_return = EXCLUDED.actual_return, \
           actual_close = EXCLUDED.actual_close, \
           was_correct = EXCLUDED.was_correct",
    )
    .bind(record.date)
    .bind(&record.predicted_symbol)
    .bind(record.predicted_return)
    .bind(record.actual_return)
    .bind(record.actual_close)
    .bind(record.was_correct)
    .execute(pool)
    .await
    .with_context(|| format!("upsert accuracy_log failed (date={})", record.date))?;

    Ok(())
}

pub async fn accuracy_history(pool: &sqlx::PgPool) -> anyhow::Result<Vec<AccuracyRecord>> {
    let rows = sqlx::query_as::<_, (NaiveDate, String, Option<f64>, f64, f64, bool)>(
        "SELECT date, predicted_symbol, predicted_return, actual_return, actual_close, was_correct \
         FROM accuracy_log \
         ORDER BY date ASC",
    )
    .fetch_all(pool)
    .await
    .context("select accuracy_log failed")?;

    Ok(rows
        .into_iter()
        .map(
            |(date, predicted_symbol, predicted_return, actual_return, actual_close, was_correct)| {
                AccuracyRecord {
                    date,
                    predicted_symbol,
                    predicted_return,
                    actual_return,
                    actual_close,
                    was_correct,
                }
            },
        )
        .collect())
}
