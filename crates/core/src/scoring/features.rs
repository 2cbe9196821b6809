//! Price-series feature extraction.
//!
//! Two shapes come out of a series: [`MomentumMetrics`], where a return whose
//! window is unavailable stays `None` so the heuristic can skip it, and the
//! fixed-shape [`FeatureVector`] fed to the classifier, which only exists for
//! series with at least [`FULL_VECTOR_POINTS`] closes and never holds a gap.

use crate::domain::series::PriceSeries;
use serde::{Deserialize, Serialize};

/// Column order of the classifier input.
pub const FEATURE_NAMES: [&str; 4] = ["return_1d", "return_5d", "return_20d", "volatility_10d"];

pub const FULL_VECTOR_POINTS: usize = 21;
pub const VOLATILITY_WINDOW: usize = 10;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumMetrics {
    pub return_1d: Option<f64>,
    pub return_5d: Option<f64>,
    pub return_20d: Option<f64>,
    pub last_close: f64,
}

impl MomentumMetrics {
    pub fn is_empty(&self) -> bool {
        self.return_1d.is_none() && self.return_5d.is_none() && self.return_20d.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub return_1d: f64,
    pub return_5d: f64,
    pub return_20d: f64,
    pub volatility_10d: f64,
}

impl FeatureVector {
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "return_1d" => Some(self.return_1d),
            "return_5d" => Some(self.return_5d),
            "return_20d" => Some(self.return_20d),
            "volatility_10d" => Some(self.volatility_10d),
            _ => None,
        }
    }

    /// Row in the given column order; unknown columns come back as NaN so the
    /// imputer fills them.
    pub fn to_row<S: AsRef<str>>(&self, names: &[S]) -> Vec<f64> {
        names
            .iter()
            .map(|n| self.get(n.as_ref()).unwrap_or(f64::NAN))
            .collect()
    }
}

/// `(close[t] / close[t-k] - 1) * 100`, or `None` without `k + 1` closes.
pub fn period_return(series: &PriceSeries, k: usize) -> Option<f64> {
    if k == 0 || series.len() < k + 1 {
        return None;
    }
    let last = series.close_back(0)?;
    let base = series.close_back(k)?;
    Some((last / base - 1.0) * 100.0)
}

/// Annualised standard deviation of the last `window` daily percentage returns.
pub fn volatility_annualized(series: &PriceSeries, window: usize) -> Option<f64> {
    if window < 2 || series.len() < window + 1 {
        return None;
    }

    let closes: Vec<f64> = series.closes().collect();
    let tail = &closes[closes.len() - (window + 1)..];
    let rets: Vec<f64> = tail.windows(2).map(|w| w[1] / w[0] - 1.0).collect();

    let n = rets.len() as f64;
    let mean = rets.iter().sum::<f64>() / n;
    // Sample variance (n - 1).
    let var = rets.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt() * 100.0 * TRADING_DAYS_PER_YEAR.sqrt())
}

pub fn momentum_metrics(series: &PriceSeries) -> Option<MomentumMetrics> {
    if !series.is_usable() {
        return None;
    }
    Some(MomentumMetrics {
        return_1d: period_return(series, 1),
        return_5d: period_return(series, 5),
        return_20d: period_return(series, 20),
        last_close: series.last_close()?,
    })
}

pub fn feature_vector(series: &PriceSeries) -> Option<FeatureVector> {
    if series.len() < FULL_VECTOR_POINTS {
        return None;
    }
    Some(FeatureVector {
        return_1d: period_return(series, 1).unwrap_or(0.0),
        return_5d: period_return(series, 5).unwrap_or(0.0),
        return_20d: period_return(series, 20).unwrap_or(0.0),
        volatility_10d: volatility_annualized(series, VOLATILITY_WINDOW).unwrap_or(0.0),
    })
}
