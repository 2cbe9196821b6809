use super::context::PipelineContext;
use crate::domain::pick::AccuracyRecord;
use crate::error::PipelineError;
use chrono::{Duration, NaiveDate};
use serde::Serialize;

/// Calendar days fetched on each side of a prediction date.
pub const EVALUATION_WINDOW_DAYS: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Recorded(AccuracyRecord),
    /// The next session's close is not observable yet.
    Deferred,
    NoPrediction,
    DataUnavailable(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub candidates: usize,
    pub recorded: Vec<AccuracyRecord>,
    pub deferred: usize,
    pub skipped: usize,
    pub retrained: bool,
}

pub struct AccuracyEvaluator<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> AccuracyEvaluator<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Evaluates every prediction date that has no accuracy record yet.
    ///
    /// `observable_through` is the last session whose close has happened; bars
    /// after it are never used. Retrains the classifier when anything new was
    /// recorded.
    pub async fn update_latest(
        &self,
        observable_through: NaiveDate,
    ) -> Result<EvaluationSummary, PipelineError> {
        let dates = self
            .ctx
            .store
            .unevaluated_dates()
            .await
            .map_err(PipelineError::persistence)?;

        let mut summary = EvaluationSummary {
            candidates: dates.len(),
            ..EvaluationSummary::default()
        };

        for date in dates {
            match self.evaluate(date, observable_through).await? {
                EvaluationOutcome::Recorded(record) => summary.recorded.push(record),
                EvaluationOutcome::Deferred => summary.deferred += 1,
                EvaluationOutcome::NoPrediction | EvaluationOutcome::DataUnavailable(_) => {
                    summary.skipped += 1
                }
            }
        }

        if !summary.recorded.is_empty() {
            summary.retrained = self.ctx.classifier.try_train().await;
        }

        tracing::info!(
            candidates = summary.candidates,
            recorded = summary.recorded.len(),
            deferred = summary.deferred,
            skipped = summary.skipped,
            retrained = summary.retrained,
            %observable_through,
            "accuracy update finished"
        );

        Ok(summary)
    }

    pub async fn evaluate(
        &self,
        date: NaiveDate,
        observable_through: NaiveDate,
    ) -> Result<EvaluationOutcome, PipelineError> {
        let symbol = match self
            .ctx
            .store
            .rank_one_symbol(date)
            .await
            .map_err(PipelineError::persistence)?
        {
            Some(symbol) => symbol,
            None => return Ok(EvaluationOutcome::NoPrediction),
        };

        if date >= observable_through {
            tracing::debug!(%date, %symbol, "next session not closed yet; deferred");
            return Ok(EvaluationOutcome::Deferred);
        }

        let start = date - Duration::days(EVALUATION_WINDOW_DAYS);
        let end = date + Duration::days(EVALUATION_WINDOW_DAYS);
        let series = match self
            .ctx
            .prices
            .fetch(std::slice::from_ref(&symbol), start, end)
            .await
        {
            Ok(mut by_symbol) => by_symbol.remove(&symbol),
            Err(err) => {
                tracing::warn!(%date, %symbol, error = %err, "evaluation price fetch failed");
                return Ok(EvaluationOutcome::DataUnavailable(err.to_string()));
            }
        };
        let Some(series) = series else {
            let err = PipelineError::DataUnavailable(format!("no prices for {symbol}"));
            tracing::warn!(%date, error = %err, "evaluation skipped");
            return Ok(EvaluationOutcome::DataUnavailable(err.to_string()));
        };

        let observed = series.truncate_after(observable_through);
        let after = observed.on_or_after(date);
        let (close_0, close_1) = match after {
            [first, second, ..] => (first.close, second.close),
            _ => {
                let err = PipelineError::EvaluationNotYetPossible { date };
                tracing::info!(%symbol, reason = %err, "evaluation deferred");
                return Ok(EvaluationOutcome::Deferred);
            }
        };

        let record = AccuracyRecord::from_closes(date, &symbol, close_0, close_1);
        self.ctx
            .store
            .upsert_accuracy(&record)
            .await
            .map_err(PipelineError::persistence)?;

        tracing::info!(
            %date,
            %symbol,
            actual_return = record.actual_return,
            was_correct = record.was_correct,
            "prediction evaluated"
        );
        Ok(EvaluationOutcome::Recorded(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pick::{Pick, PredictionRecord};
    use crate::model::gateway::MODEL_NAME;
    use crate::model::ClassifierGateway;
    use crate::pipeline::context::RankingOptions;
    use crate::storage::{MemoryStore, Store};
    use crate::testing::{
        first_test_date, next_weekday, series_on, FailingWrites, StaticPrices, StaticUniverse,
    };
    use std::sync::Arc;

    fn d0() -> NaiveDate {
        // Friday; the next session is Monday.
        NaiveDate::from_ymd_opt(2026, 3, 6).unwrap()
    }

    fn context(store: Arc<MemoryStore>, prices: StaticPrices) -> PipelineContext {
        let prices = Arc::new(prices);
        PipelineContext {
            store: store.clone(),
            universe: Arc::new(StaticUniverse::new(&[])),
            prices: prices.clone(),
            sentiment: None,
            classifier: Arc::new(ClassifierGateway::new(store, prices)),
            options: RankingOptions::default(),
        }
    }

    async fn predict(store: &MemoryStore, date: NaiveDate, symbol: &str) {
        let pick = Pick {
            date,
            rank: 1,
            symbol: symbol.to_string(),
            score: 1.0,
            reason: "r".to_string(),
            price: None,
        };
        store.replace_picks(date, &[pick]).await.unwrap();
    }

    fn prices_around(symbol: &str, closes: &[f64]) -> StaticPrices {
        // Thursday, Friday (prediction day), Monday, Tuesday ...
        let start = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        StaticPrices::new().with_series(symbol, series_on(start, closes))
    }

    fn observable() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()
    }

    #[tokio::test]
    async fn up_move_is_correct() {
        let store = Arc::new(MemoryStore::new());
        predict(&store, d0(), "X").await;
        let ctx = context(store.clone(), prices_around("X", &[90.0, 100.0, 105.0, 80.0]));

        let outcome = AccuracyEvaluator::new(&ctx).evaluate(d0(), observable()).await.unwrap();
        let record = match outcome {
            EvaluationOutcome::Recorded(record) => record,
            other => panic!("expected a record, got {other:?}"),
        };
        assert_eq!(record.predicted_symbol, "X");
        assert!((record.actual_return - 5.0).abs() < 1e-9);
        assert_eq!(record.actual_close, 105.0);
        assert!(record.was_correct);
        assert_eq!(record.predicted_return, None);
    }

    #[tokio::test]
    async fn down_move_is_incorrect() {
        let store = Arc::new(MemoryStore::new());
        predict(&store, d0(), "X").await;
        let ctx = context(store.clone(), prices_around("X", &[90.0, 100.0, 95.0]));

        let summary = AccuracyEvaluator::new(&ctx).update_latest(observable()).await.unwrap();
        assert_eq!(summary.recorded.len(), 1);
        assert!((summary.recorded[0].actual_return + 5.0).abs() < 1e-9);
        assert!(!summary.recorded[0].was_correct);
        assert_eq!(store.accuracy_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rerun_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        predict(&store, d0(), "X").await;
        let ctx = context(store.clone(), prices_around("X", &[90.0, 100.0, 105.0]));
        let evaluator = AccuracyEvaluator::new(&ctx);

        assert_eq!(evaluator.update_latest(observable()).await.unwrap().recorded.len(), 1);
        let again = evaluator.update_latest(observable()).await.unwrap();
        assert_eq!(again.candidates, 0);
        assert!(again.recorded.is_empty());
        assert_eq!(store.accuracy_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_next_close_defers() {
        let store = Arc::new(MemoryStore::new());
        predict(&store, d0(), "X").await;
        let ctx = context(store.clone(), prices_around("X", &[90.0, 100.0]));

        let summary = AccuracyEvaluator::new(&ctx).update_latest(observable()).await.unwrap();
        assert_eq!(summary.deferred, 1);
        assert!(store.accuracy_history().await.unwrap().is_empty());
        assert_eq!(store.unevaluated_dates().await.unwrap(), vec![d0()]);
    }

    #[tokio::test]
    async fn unclosed_session_is_not_used() {
        let store = Arc::new(MemoryStore::new());
        predict(&store, d0(), "X").await;
        // Monday's bar exists but Monday has not closed yet.
        let ctx = context(store.clone(), prices_around("X", &[90.0, 100.0, 105.0]));
        let evaluator = AccuracyEvaluator::new(&ctx);

        assert_eq!(
            evaluator.evaluate(d0(), d0()).await.unwrap(),
            EvaluationOutcome::Deferred
        );
        let monday = next_weekday(d0());
        assert!(matches!(
            evaluator.evaluate(d0(), monday).await.unwrap(),
            EvaluationOutcome::Recorded(_)
        ));
    }

    #[tokio::test]
    async fn unknown_symbol_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        predict(&store, d0(), "GONE").await;
        let ctx = context(store.clone(), StaticPrices::new());

        let summary = AccuracyEvaluator::new(&ctx).update_latest(observable()).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(summary.recorded.is_empty());
        assert!(!summary.retrained);
    }

    #[tokio::test]
    async fn legacy_prediction_records_are_evaluated() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_prediction(PredictionRecord {
                symbol: "X".into(),
                date: d0(),
                score: 1.0,
                reason: "r".into(),
            })
            .await;
        let ctx = context(store.clone(), prices_around("X", &[90.0, 100.0, 105.0]));

        let summary = AccuracyEvaluator::new(&ctx).update_latest(observable()).await.unwrap();
        assert_eq!(summary.recorded.len(), 1);
        assert_eq!(summary.recorded[0].date, d0());
    }

    #[tokio::test]
    async fn failed_accuracy_write_is_reported() {
        let store = Arc::new(FailingWrites::default());
        predict(&store.inner, d0(), "X").await;
        let prices = Arc::new(prices_around("X", &[90.0, 100.0, 105.0]));
        let ctx = PipelineContext {
            store: store.clone(),
            universe: Arc::new(StaticUniverse::new(&[])),
            prices: prices.clone(),
            sentiment: None,
            classifier: Arc::new(ClassifierGateway::new(store.clone(), prices)),
            options: RankingOptions::default(),
        };

        let err = AccuracyEvaluator::new(&ctx)
            .update_latest(observable())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
        assert!(store.inner.accuracy_history().await.unwrap().is_empty());
        assert_eq!(store.inner.unevaluated_dates().await.unwrap(), vec![d0()]);
    }

    #[tokio::test]
    async fn new_labels_trigger_retraining() {
        let store = Arc::new(MemoryStore::new());
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + i as f64 + if i % 3 == 0 { 2.0 } else { -1.0 })
            .collect();
        let series = series_on(first_test_date(), &closes);
        let dates: Vec<NaiveDate> = series.points()[30..39].iter().map(|p| p.date).collect();
        for date in &dates {
            predict(&store, *date, "AAA").await;
        }
        let ctx = context(store.clone(), StaticPrices::new().with_series("AAA", series));

        let summary = AccuracyEvaluator::new(&ctx).update_latest(observable()).await.unwrap();
        assert_eq!(summary.recorded.len(), 9);
        assert!(summary.retrained);
        assert!(store.load_artifact(MODEL_NAME).await.unwrap().is_some());
    }
}
