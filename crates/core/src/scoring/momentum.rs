use super::features::MomentumMetrics;

pub const WEIGHT_RETURN_1D: f64 = 2.0;
pub const WEIGHT_RETURN_5D: f64 = 1.5;
pub const WEIGHT_RETURN_20D: f64 = 0.5;
pub const WEIGHT_SENTIMENT: f64 = 10.0;

/// Weighted sum of the available returns plus an optional sentiment term.
/// `None` only when there is nothing to score.
pub fn momentum_score(metrics: Option<&MomentumMetrics>, sentiment: Option<f64>) -> Option<f64> {
    let metrics = metrics?;
    if metrics.is_empty() {
        return None;
    }

    let mut score = 0.0;
    if let Some(r) = metrics.return_1d {
        score += WEIGHT_RETURN_1D * r;
    }
    if let Some(r) = metrics.return_5d {
        score += WEIGHT_RETURN_5D * r;
    }
    if let Some(r) = metrics.return_20d {
        score += WEIGHT_RETURN_20D * r;
    }
    if let Some(s) = sentiment {
        score += WEIGHT_SENTIMENT * s;
    }
    Some(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(r1: Option<f64>, r5: Option<f64>, r20: Option<f64>) -> MomentumMetrics {
        MomentumMetrics {
            return_1d: r1,
            return_5d: r5,
            return_20d: r20,
            last_close: 100.0,
        }
    }

    #[test]
    fn weights_returns() {
        let a = metrics(Some(5.0), Some(2.0), Some(0.0));
        let b = metrics(Some(1.0), Some(1.0), Some(1.0));
        assert_eq!(momentum_score(Some(&a), None), Some(13.0));
        assert_eq!(momentum_score(Some(&b), None), Some(4.0));
    }

    #[test]
    fn skips_missing_terms() {
        let m = metrics(Some(1.0), None, None);
        assert_eq!(momentum_score(Some(&m), None), Some(2.0));
    }

    #[test]
    fn adds_sentiment_term() {
        let m = metrics(Some(1.0), None, None);
        assert_eq!(momentum_score(Some(&m), Some(-0.5)), Some(-3.0));
    }

    #[test]
    fn no_metrics_no_score() {
        assert_eq!(momentum_score(None, Some(1.0)), None);
        assert_eq!(momentum_score(Some(&metrics(None, None, None)), None), None);
    }
}
