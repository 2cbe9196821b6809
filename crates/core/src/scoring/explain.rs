use super::features::MomentumMetrics;

/// Sentiment beyond this magnitude is reported as positive or negative.
pub const SENTIMENT_POLARITY_THRESHOLD: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

impl Polarity {
    pub fn of(sentiment: f64) -> Self {
        if sentiment > SENTIMENT_POLARITY_THRESHOLD {
            Self::Positive
        } else if sentiment < -SENTIMENT_POLARITY_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

/// Human-readable reason for a ranking. Mentions the classifier probability,
/// the momentum windows that exist and the sentiment polarity, in that order.
pub fn explain(
    metrics: Option<&MomentumMetrics>,
    sentiment: Option<f64>,
    probability: Option<f64>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(p) = probability {
        let pct = (p * 100.0).round() as i64;
        parts.push(format!(
            "The classifier (trained on past pick outcomes) gives this stock a {pct}% probability \
             of a positive next-day return, based on recent momentum and volatility."
        ));
    }

    if let Some(m) = metrics {
        let mut momentum: Vec<String> = Vec::new();
        if let Some(r) = m.return_1d {
            momentum.push(format!("{r:+.1}% over 1 day"));
        }
        if let Some(r) = m.return_5d {
            momentum.push(format!("{r:+.1}% over 5 days"));
        }
        if let Some(r) = m.return_20d {
            momentum.push(format!("{r:+.1}% over 20 days"));
        }
        if !momentum.is_empty() {
            parts.push(format!(
                "Short-term momentum: {}. Recent returns carry the most weight.",
                momentum.join(", ")
            ));
        }
    }

    if let Some(s) = sentiment {
        parts.push(format!(
            "Recent news sentiment is {}.",
            Polarity::of(s).as_str()
        ));
    }

    if parts.is_empty() {
        return "Ranked by combined score (momentum and optional news).".to_string();
    }
    parts.join(" ")
}
