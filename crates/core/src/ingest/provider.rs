use crate::domain::series::PriceSeries;
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

/// Daily close history for many symbols.
///
/// Symbols the provider cannot resolve are omitted from the map; callers treat
/// an absent symbol exactly like one with a too-short series.
#[async_trait::async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<String, PriceSeries>>;

    /// Point-in-time window ending at `as_of`. Observations dated after `as_of`
    /// are never returned, whatever the provider sends back.
    async fn fetch_as_of(
        &self,
        symbol: &str,
        as_of: NaiveDate,
        lookback_days: i64,
    ) -> Result<Option<PriceSeries>> {
        let start = as_of - Duration::days(lookback_days);
        let mut by_symbol = self.fetch(&[symbol.to_string()], start, as_of).await?;
        Ok(by_symbol
            .remove(symbol)
            .map(|series| series.truncate_after(as_of)))
    }
}

/// News sentiment in [-1, 1] over a date range.
///
/// `Ok(None)` means the provider has no opinion; an error means the provider
/// could not be reached. Neither adjusts a score.
#[async_trait::async_trait]
pub trait SentimentProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Option<f64>>;
}

/// Raw symbol list download.
#[async_trait::async_trait]
pub trait UniverseSource: Send + Sync {
    fn label(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<String>>;
}

/// Symbols eligible for ranking. Never empty.
#[async_trait::async_trait]
pub trait UniverseProvider: Send + Sync {
    fn label(&self) -> &str;

    async fn list(&self) -> Vec<String>;

    /// Re-reads the source, bypassing any cache.
    async fn refresh(&self) -> Result<Vec<String>> {
        Ok(self.list().await)
    }
}
