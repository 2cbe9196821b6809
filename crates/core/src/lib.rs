pub mod domain;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod scoring;
pub mod storage;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub finnhub_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub price_provider_base_url: Option<String>,
        pub universe_source_url: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                finnhub_api_key: non_empty_var("FINNHUB_API_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                price_provider_base_url: non_empty_var("PRICE_PROVIDER_BASE_URL"),
                universe_source_url: non_empty_var("UNIVERSE_SOURCE_URL"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Reads a numeric knob from the environment, falling back to `default` when
    /// the variable is unset or unparsable.
    pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
        std::env::var(key)
            .ok()
            .and_then(|s| s.trim().parse::<T>().ok())
            .unwrap_or(default)
    }
}
