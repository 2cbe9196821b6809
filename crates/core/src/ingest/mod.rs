pub mod finnhub;
pub mod provider;
pub mod sentiment;
pub mod universe;
pub mod yahoo;

pub use provider::{PriceHistoryProvider, SentimentProvider, UniverseProvider, UniverseSource};
