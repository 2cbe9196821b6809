use crate::config::Settings;
use crate::ingest::provider::{UniverseProvider, UniverseSource};
use crate::storage::{CachedTickers, Store};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;

pub const DEFAULT_SOURCE_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/main/data/constituents.csv";
pub const UNIVERSE_NAME: &str = "sp500";
pub const CACHE_TTL_DAYS: i64 = 7;

const SYMBOL_COLUMN: &str = "Symbol";

const FALLBACK: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK-B", "JPM", "JNJ", "V", "UNH",
    "XOM", "WMT", "PG", "HD", "MA", "CVX", "LLY", "ABBV", "MRK", "PEP", "KO", "AVGO", "COST",
    "PFE", "TMO", "ABT", "MCD", "CSCO", "DIS", "WFC", "NEE", "PM", "TXN", "NKE", "BMY", "UPS",
    "HON", "INTC", "AMGN", "QCOM", "RTX", "INTU", "AMAT", "SBUX", "LMT", "MDT", "GILD", "ADI",
    "TJX", "BKNG", "ISRG", "VRTX", "BLK", "LRCX", "DE", "KLAC", "GS", "TMUS", "MU",
];

pub fn fallback_tickers() -> Vec<String> {
    FALLBACK.iter().map(|s| s.to_string()).collect()
}

/// Yahoo-style symbol: trimmed, upper-cased, class separator `.` as `-`.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let s = raw.trim().replace('.', "-").to_uppercase();
    (!s.is_empty()).then_some(s)
}

/// Reads the symbol column of a constituents CSV, keeping first occurrences.
pub fn parse_constituents(body: &str) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let headers = reader.headers().context("constituents CSV has no header")?;
    let idx = headers
        .iter()
        .position(|h| h.trim() == SYMBOL_COLUMN)
        .with_context(|| format!("constituents CSV has no {SYMBOL_COLUMN} column"))?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.context("malformed constituents CSV row")?;
        let Some(symbol) = record.get(idx).and_then(normalize_symbol) else {
            continue;
        };
        if seen.insert(symbol.clone()) {
            out.push(symbol);
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct CsvUniverseSource {
    http: reqwest::Client,
    url: String,
}

impl CsvUniverseSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let url = settings
            .universe_source_url
            .clone()
            .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string());
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("failed to build universe http client")?;
        Ok(Self { http, url })
    }
}

#[async_trait::async_trait]
impl UniverseSource for CsvUniverseSource {
    fn label(&self) -> &str {
        UNIVERSE_NAME
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        let res = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("universe request failed")?;
        let status = res.status();
        if !status.is_success() {
            anyhow::bail!("universe HTTP {status}");
        }
        let body = res.text().await.context("failed to read universe response")?;
        parse_constituents(&body)
    }
}

/// Weekly-refreshed universe backed by the store, with a fixed fallback list.
pub struct CachedUniverseProvider {
    source: Box<dyn UniverseSource>,
    store: Arc<dyn Store>,
    ttl: Duration,
    memory: tokio::sync::Mutex<Option<CachedTickers>>,
}

impl CachedUniverseProvider {
    pub fn new(source: Box<dyn UniverseSource>, store: Arc<dyn Store>) -> Self {
        Self {
            source,
            store,
            ttl: Duration::days(CACHE_TTL_DAYS),
            memory: tokio::sync::Mutex::new(None),
        }
    }

    fn is_fresh(&self, cache: &CachedTickers, now: DateTime<Utc>) -> bool {
        !cache.tickers.is_empty() && now - cache.updated_at < self.ttl
    }

    pub async fn list_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut memory = self.memory.lock().await;
        if let Some(cache) = memory.as_ref().filter(|c| self.is_fresh(c, now)) {
            return cache.tickers.clone();
        }

        match self.store.load_universe_cache(self.source.label()).await {
            Ok(Some(cache)) if self.is_fresh(&cache, now) => {
                let tickers = cache.tickers.clone();
                *memory = Some(cache);
                return tickers;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "universe cache read failed");
            }
        }

        match self.fetch_and_store(now).await {
            Ok(cache) => {
                let tickers = cache.tickers.clone();
                *memory = Some(cache);
                tickers
            }
            Err(err) => {
                tracing::warn!(error = %err, "universe fetch failed; using fallback list");
                fallback_tickers()
            }
        }
    }

    /// Re-downloads the universe regardless of cache age.
    pub async fn force_refresh(&self) -> Result<Vec<String>> {
        let now = Utc::now();
        let cache = self.fetch_and_store(now).await?;
        let tickers = cache.tickers.clone();
        *self.memory.lock().await = Some(cache);
        Ok(tickers)
    }

    async fn fetch_and_store(&self, now: DateTime<Utc>) -> Result<CachedTickers> {
        let tickers = self.source.fetch().await?;
        anyhow::ensure!(!tickers.is_empty(), "universe source returned no symbols");

        let cache = CachedTickers {
            tickers,
            updated_at: now,
        };
        if let Err(err) = self
            .store
            .save_universe_cache(self.source.label(), &cache)
            .await
        {
            tracing::warn!(error = %err, "universe cache write failed");
        }
        tracing::info!(label = self.source.label(), count = cache.tickers.len(), "universe refreshed");
        Ok(cache)
    }
}

#[async_trait::async_trait]
impl UniverseProvider for CachedUniverseProvider {
    fn label(&self) -> &str {
        self.source.label()
    }

    async fn list(&self) -> Vec<String> {
        self.list_at(Utc::now()).await
    }

    async fn refresh(&self) -> Result<Vec<String>> {
        self.force_refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        result: Option<Vec<String>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl UniverseSource for CountingSource {
        fn label(&self) -> &str {
            "test"
        }

        async fn fetch(&self) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().context("source down")
        }
    }

    fn provider(result: Option<Vec<String>>, store: Arc<MemoryStore>) -> (CachedUniverseProvider, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            result,
            calls: calls.clone(),
        };
        (CachedUniverseProvider::new(Box::new(source), store), calls)
    }

    #[test]
    fn parses_and_normalizes_symbols() {
        let csv = "Symbol,Security\nMMM,3M\nbrk.b,Berkshire\n BF.B ,Brown-Forman\nMMM,dup\n,blank\n";
        assert_eq!(parse_constituents(csv).unwrap(), vec!["MMM", "BRK-B", "BF-B"]);
    }

    #[test]
    fn missing_symbol_column_is_an_error() {
        assert!(parse_constituents("Ticker,Name\nAAPL,Apple\n").is_err());
    }

    #[tokio::test]
    async fn caches_within_ttl_and_refetches_after() {
        let store = Arc::new(MemoryStore::new());
        let (p, calls) = provider(Some(vec!["AAA".into(), "BBB".into()]), store.clone());
        let now = Utc::now();

        assert_eq!(p.list_at(now).await, vec!["AAA", "BBB"]);
        assert_eq!(p.list_at(now + Duration::days(6)).await, vec!["AAA", "BBB"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        p.list_at(now + Duration::days(8)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reads_persisted_cache_before_fetching() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .save_universe_cache(
                "test",
                &CachedTickers {
                    tickers: vec!["CCC".into()],
                    updated_at: now - Duration::days(1),
                },
            )
            .await
            .unwrap();

        let (p, calls) = provider(Some(vec!["AAA".into()]), store);
        assert_eq!(p.list_at(now).await, vec!["CCC"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_returns_fallback_never_empty() {
        let store = Arc::new(MemoryStore::new());
        let (p, _) = provider(None, store.clone());
        let list = p.list().await;
        assert!(!list.is_empty());
        assert_eq!(list, fallback_tickers());

        let (p, _) = provider(Some(vec![]), store);
        assert_eq!(p.list().await, fallback_tickers());
    }

    #[tokio::test]
    async fn refresh_forces_fetch_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let (p, calls) = provider(Some(vec!["AAA".into()]), store.clone());
        p.list().await;
        p.force_refresh().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let cached = store.load_universe_cache("test").await.unwrap().unwrap();
        assert_eq!(cached.tickers, vec!["AAA"]);
    }
}
