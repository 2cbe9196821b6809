//! In-memory collaborators for unit tests.

use crate::domain::pick::{AccuracyRecord, Pick, PredictionRecord};
use crate::domain::series::PriceSeries;
use crate::ingest::provider::{PriceHistoryProvider, SentimentProvider, UniverseProvider};
use crate::storage::{CachedTickers, MemoryStore, PipelineRun, Store, StoredArtifact};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashMap;
use std::sync::Mutex;

/// First date used by [`series_from_closes`]; a Monday.
pub fn first_test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
}

pub fn next_weekday(date: NaiveDate) -> NaiveDate {
    let mut d = date + Duration::days(1);
    while matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
        d += Duration::days(1);
    }
    d
}

/// `n` consecutive weekdays starting at `start`.
pub fn weekdays_from(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut d = start;
    for _ in 0..n {
        out.push(d);
        d = next_weekday(d);
    }
    out
}

pub fn series_on(start: NaiveDate, closes: &[f64]) -> PriceSeries {
    PriceSeries::from_points(weekdays_from(start, closes.len()).into_iter().zip(closes.iter().copied()))
}

/// Closes on consecutive weekdays from [`first_test_date`].
pub fn series_from_closes(closes: &[f64]) -> PriceSeries {
    series_on(first_test_date(), closes)
}

#[derive(Debug, Default)]
pub struct StaticPrices {
    series: HashMap<String, PriceSeries>,
    ignore_window: bool,
    requests: Mutex<Vec<Vec<String>>>,
}

impl StaticPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, series: PriceSeries) -> Self {
        self.series.insert(symbol.to_string(), series);
        self
    }

    /// Returns whole series regardless of the requested window, like a
    /// provider that sends back more than it was asked for.
    pub fn ignoring_window(mut self) -> Self {
        self.ignore_window = true;
        self
    }

    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PriceHistoryProvider for StaticPrices {
    fn provider_name(&self) -> &'static str {
        "static"
    }

    async fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<HashMap<String, PriceSeries>> {
        self.requests.lock().unwrap().push(symbols.to_vec());

        let mut out = HashMap::new();
        for symbol in symbols {
            let Some(series) = self.series.get(symbol) else {
                continue;
            };
            let series = if self.ignore_window {
                series.clone()
            } else {
                PriceSeries::from_points(
                    series
                        .points()
                        .iter()
                        .filter(|p| p.date >= start && p.date <= end)
                        .map(|p| (p.date, p.close)),
                )
            };
            out.insert(symbol.clone(), series);
        }
        Ok(out)
    }
}

/// Sentiment per symbol; symbols without a value are "no opinion" and
/// symbols listed in `failing` error out.
#[derive(Debug, Default)]
pub struct StaticSentiment {
    values: HashMap<String, f64>,
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl StaticSentiment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: &str, value: f64) -> Self {
        self.values.insert(symbol.to_string(), value);
        self
    }

    pub fn failing_for(mut self, symbol: &str) -> Self {
        self.failing.push(symbol.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SentimentProvider for StaticSentiment {
    fn provider_name(&self) -> &'static str {
        "static"
    }

    async fn fetch(
        &self,
        symbol: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> anyhow::Result<Option<f64>> {
        self.calls.lock().unwrap().push(symbol.to_string());
        if self.failing.iter().any(|s| s == symbol) {
            anyhow::bail!("sentiment provider down");
        }
        Ok(self.values.get(symbol).copied())
    }
}

#[derive(Debug, Clone)]
pub struct StaticUniverse {
    symbols: Vec<String>,
}

impl StaticUniverse {
    pub fn new(symbols: &[&str]) -> Self {
        Self {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait::async_trait]
impl UniverseProvider for StaticUniverse {
    fn label(&self) -> &str {
        "static"
    }

    async fn list(&self) -> Vec<String> {
        self.symbols.clone()
    }
}

/// Store whose pick and accuracy writes fail; everything else is served by an
/// inner [`MemoryStore`].
#[derive(Debug, Default)]
pub struct FailingWrites {
    pub inner: MemoryStore,
}

#[async_trait::async_trait]
impl Store for FailingWrites {
    async fn replace_picks(&self, _date: NaiveDate, _picks: &[Pick]) -> anyhow::Result<()> {
        anyhow::bail!("insert daily_picks failed: connection reset")
    }

    async fn picks_for_date(&self, date: NaiveDate) -> anyhow::Result<Vec<Pick>> {
        self.inner.picks_for_date(date).await
    }

    async fn latest_picks(&self) -> anyhow::Result<Option<(NaiveDate, Vec<Pick>)>> {
        self.inner.latest_picks().await
    }

    async fn prediction_history(&self, limit: i64) -> anyhow::Result<Vec<PredictionRecord>> {
        self.inner.prediction_history(limit).await
    }

    async fn clear_predictions(&self) -> anyhow::Result<u64> {
        self.inner.clear_predictions().await
    }

    async fn rank_one_symbol(&self, date: NaiveDate) -> anyhow::Result<Option<String>> {
        self.inner.rank_one_symbol(date).await
    }

    async fn unevaluated_dates(&self) -> anyhow::Result<Vec<NaiveDate>> {
        self.inner.unevaluated_dates().await
    }

    async fn upsert_accuracy(&self, _record: &AccuracyRecord) -> anyhow::Result<()> {
        anyhow::bail!("upsert accuracy_log failed: connection reset")
    }

    async fn accuracy_history(&self) -> anyhow::Result<Vec<AccuracyRecord>> {
        self.inner.accuracy_history().await
    }

    async fn load_artifact(&self, name: &str) -> anyhow::Result<Option<StoredArtifact>> {
        self.inner.load_artifact(name).await
    }

    async fn save_artifact(&self, name: &str, artifact: &StoredArtifact) -> anyhow::Result<()> {
        self.inner.save_artifact(name, artifact).await
    }

    async fn load_universe_cache(&self, name: &str) -> anyhow::Result<Option<CachedTickers>> {
        self.inner.load_universe_cache(name).await
    }

    async fn save_universe_cache(&self, name: &str, cache: &CachedTickers) -> anyhow::Result<()> {
        self.inner.save_universe_cache(name, cache).await
    }

    async fn record_run(&self, run: &PipelineRun) -> anyhow::Result<uuid::Uuid> {
        self.inner.record_run(run).await
    }
}
