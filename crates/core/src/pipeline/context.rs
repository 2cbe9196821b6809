use crate::config::{env_or, Settings};
use crate::ingest::finnhub::FinnhubSentimentProvider;
use crate::ingest::provider::{PriceHistoryProvider, SentimentProvider, UniverseProvider};
use crate::ingest::universe::{CachedUniverseProvider, CsvUniverseSource};
use crate::ingest::yahoo::YahooChartProvider;
use crate::model::gateway::DEFAULT_TRAINING_LOOKBACK_DAYS;
use crate::model::ClassifierGateway;
use crate::storage::Store;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct RankingOptions {
    /// Calendar days of price history fetched per ranking run.
    pub lookback_days: i64,
    /// Symbols per price request.
    pub chunk_size: usize,
    /// Candidates that receive the sentiment pass.
    pub shortlist: usize,
    pub sentiment_lookback_days: i64,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            lookback_days: 130,
            chunk_size: 80,
            shortlist: 10,
            sentiment_lookback_days: 2,
        }
    }
}

impl RankingOptions {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            lookback_days: env_or("RANKING_LOOKBACK_DAYS", d.lookback_days).max(1),
            chunk_size: env_or("RANKING_CHUNK_SIZE", d.chunk_size).max(1),
            shortlist: env_or("RANKING_SHORTLIST", d.shortlist).max(1),
            sentiment_lookback_days: env_or("SENTIMENT_LOOKBACK_DAYS", d.sentiment_lookback_days)
                .max(0),
        }
    }
}

/// Everything a ranking or evaluation run needs, built once per process and
/// passed into each run.
pub struct PipelineContext {
    pub store: Arc<dyn Store>,
    pub universe: Arc<dyn UniverseProvider>,
    pub prices: Arc<dyn PriceHistoryProvider>,
    pub sentiment: Option<Arc<dyn SentimentProvider>>,
    pub classifier: Arc<ClassifierGateway>,
    pub options: RankingOptions,
}

impl PipelineContext {
    pub fn from_settings(settings: &Settings, store: Arc<dyn Store>) -> anyhow::Result<Self> {
        let prices: Arc<dyn PriceHistoryProvider> =
            Arc::new(YahooChartProvider::from_settings(settings)?);

        let sentiment: Option<Arc<dyn SentimentProvider>> =
            match FinnhubSentimentProvider::from_settings(settings)? {
                Some(p) => Some(Arc::new(p)),
                None => {
                    tracing::info!("FINNHUB_API_KEY not set; sentiment pass disabled");
                    None
                }
            };

        let source = CsvUniverseSource::from_settings(settings)?;
        let universe: Arc<dyn UniverseProvider> =
            Arc::new(CachedUniverseProvider::new(Box::new(source), store.clone()));

        let classifier = Arc::new(
            ClassifierGateway::new(store.clone(), prices.clone()).with_lookback_days(
                env_or("TRAINING_LOOKBACK_DAYS", DEFAULT_TRAINING_LOOKBACK_DAYS).max(30),
            ),
        );

        Ok(Self {
            store,
            universe,
            prices,
            sentiment,
            classifier,
            options: RankingOptions::from_env(),
        })
    }
}
