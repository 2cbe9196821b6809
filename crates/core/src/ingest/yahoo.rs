use crate::config::{env_or, Settings};
use crate::domain::series::PriceSeries;
use crate::ingest::provider::PriceHistoryProvider;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone};
use chrono_tz::US::Eastern;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const CHART_PATH: &str = "/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const MAX_RETRIES: u32 = 10;
// Backoff doubles per attempt up to this many seconds.
const MAX_BACKOFF_SECS: u64 = 30;
const DEFAULT_REQ_DELAY_MS: u64 = 100;

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
    #[serde(default)]
    adjclose: Vec<AdjCloseBlock>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Parses a v8 chart response into a daily series. Adjusted closes are used
/// when present; null bars are skipped and each bar is dated in exchange time.
pub fn parse_chart(body: &str) -> Result<PriceSeries> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).context("chart response is not valid JSON")?;

    if let Some(err) = envelope.chart.error.filter(|e| !e.is_null()) {
        anyhow::bail!("chart error: {err}");
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(PriceSeries::default());
    };

    let closes: Vec<Option<f64>> = match result.indicators.adjclose.into_iter().next() {
        Some(adj) if !adj.adjclose.is_empty() => adj.adjclose,
        _ => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default(),
    };

    let points = result
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let close = close?;
            let date = DateTime::from_timestamp(*ts, 0)?
                .with_timezone(&Eastern)
                .date_naive();
            Some((date, close))
        });

    Ok(PriceSeries::from_points(points))
}

fn epoch_start_of(date: NaiveDate) -> Option<i64> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Eastern
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp())
}

#[derive(Debug, Clone)]
pub struct YahooChartProvider {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    req_delay: Duration,
}

impl YahooChartProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .price_provider_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = env_or("PRICE_PROVIDER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);
        let retries = env_or("PRICE_PROVIDER_RETRIES", DEFAULT_RETRIES).clamp(1, MAX_RETRIES);
        let req_delay_ms = env_or("PRICE_PROVIDER_REQ_DELAY_MS", DEFAULT_REQ_DELAY_MS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build price provider http client")?;

        Ok(Self {
            http,
            base_url,
            retries,
            req_delay: Duration::from_millis(req_delay_ms),
        })
    }

    fn url(&self, symbol: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url.trim_end_matches('/'),
            CHART_PATH,
            symbol
        )
    }

    async fn fetch_once(&self, symbol: &str, period1: i64, period2: i64) -> Result<FetchOutcome> {
        let res = self
            .http
            .get(self.url(symbol))
            .query(&[
                ("interval", "1d".to_string()),
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("events", "div,splits".to_string()),
            ])
            .send()
            .await
            .context("chart request failed")?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            anyhow::bail!("chart HTTP {status}");
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::Unknown);
        }

        let text = res.text().await.context("failed to read chart response")?;
        if !status.is_success() {
            anyhow::bail!("chart HTTP {status}: {text}");
        }

        Ok(FetchOutcome::Series(parse_chart(&text)?))
    }

    async fn fetch_symbol(&self, symbol: &str, period1: i64, period2: i64) -> Result<FetchOutcome> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(symbol, period1, period2).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = backoff_after(attempt);
                    tracing::warn!(symbol, attempt, ?backoff, error = %err, "chart fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Wait before the retry that follows failed attempt `attempt` (1-based).
fn backoff_after(attempt: u32) -> Duration {
    let secs = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

enum FetchOutcome {
    Series(PriceSeries),
    Unknown,
}

#[async_trait::async_trait]
impl PriceHistoryProvider for YahooChartProvider {
    fn provider_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<String, PriceSeries>> {
        let period1 = epoch_start_of(start).context("invalid start date")?;
        // period2 is exclusive; the end date itself must be covered.
        let period2 = epoch_start_of(end + ChronoDuration::days(1)).context("invalid end date")?;

        let mut out = HashMap::with_capacity(symbols.len());
        let mut failures: usize = 0;

        for (idx, symbol) in symbols.iter().enumerate() {
            if idx != 0 && !self.req_delay.is_zero() {
                tokio::time::sleep(self.req_delay).await;
            }

            match self.fetch_symbol(symbol, period1, period2).await {
                Ok(FetchOutcome::Series(series)) if !series.is_empty() => {
                    out.insert(symbol.clone(), series);
                }
                Ok(_) => {
                    tracing::debug!(symbol = %symbol, "no chart data");
                }
                Err(err) => {
                    failures += 1;
                    tracing::warn!(symbol = %symbol, error = %err, "chart fetch failed; symbol omitted");
                }
            }
        }

        tracing::info!(
            requested = symbols.len(),
            returned = out.len(),
            failures,
            %start,
            %end,
            "price history fetched"
        );

        Ok(out)
    }
}
