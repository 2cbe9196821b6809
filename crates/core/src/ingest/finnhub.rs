use crate::config::{env_or, Settings};
use crate::ingest::provider::SentimentProvider;
use crate::ingest::sentiment::{score_articles, Article};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct FinnhubSentimentProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl FinnhubSentimentProvider {
    /// `Ok(None)` when no API key is configured; sentiment is then skipped.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        let Some(api_key) = settings.finnhub_api_key.clone() else {
            return Ok(None);
        };

        let timeout_secs = env_or("FINNHUB_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build finnhub http client")?;

        Ok(Some(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }))
    }

    async fn company_news(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Article>> {
        let url = format!("{}/company-news", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .get(url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("from", from.to_string()),
                ("to", to.to_string()),
                ("token", self.api_key.clone()),
            ])
            .send()
            .await
            .context("finnhub request failed")?;

        let status = res.status();
        if !status.is_success() {
            anyhow::bail!("finnhub HTTP {status}");
        }

        let articles = res
            .json::<Option<Vec<Article>>>()
            .await
            .context("failed to parse finnhub company-news response")?;
        Ok(articles.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl SentimentProvider for FinnhubSentimentProvider {
    fn provider_name(&self) -> &'static str {
        "finnhub"
    }

    async fn fetch(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Option<f64>> {
        let articles = self.company_news(symbol, from, to).await?;
        let score = score_articles(&articles);
        tracing::debug!(symbol, articles = articles.len(), score, "news sentiment");
        Ok(Some(score))
    }
}
