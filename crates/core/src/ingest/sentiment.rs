//! Keyword-lexicon news sentiment.

use serde::Deserialize;

pub const MAX_ARTICLES: usize = 15;

const POSITIVE: [&str; 6] = ["surge", "gain", "rise", "beat", "growth", "bull"];
const NEGATIVE: [&str; 6] = ["fall", "drop", "loss", "miss", "decline", "bear"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Polarity of one article, or `None` when no lexicon word occurs in it.
/// Words are matched as substrings, so "gains" and "rising" count.
pub fn article_polarity(article: &Article) -> Option<f64> {
    let text = format!(
        "{} {}",
        article.headline.as_deref().unwrap_or_default(),
        article.summary.as_deref().unwrap_or_default()
    )
    .to_lowercase();

    let pos = POSITIVE.iter().filter(|w| text.contains(*w)).count();
    let neg = NEGATIVE.iter().filter(|w| text.contains(*w)).count();
    if pos + neg == 0 {
        return None;
    }
    Some((pos as f64 - neg as f64) / (pos + neg) as f64)
}

/// Mean polarity of the first [`MAX_ARTICLES`] articles that carry any
/// signal, clamped to [-1, 1]. No articles, or none with a hit, is neutral.
pub fn score_articles(articles: &[Article]) -> f64 {
    let polarities: Vec<f64> = articles
        .iter()
        .take(MAX_ARTICLES)
        .filter_map(article_polarity)
        .collect();

    if polarities.is_empty() {
        return 0.0;
    }
    let mean = polarities.iter().sum::<f64>() / polarities.len() as f64;
    mean.clamp(-1.0, 1.0)
}
