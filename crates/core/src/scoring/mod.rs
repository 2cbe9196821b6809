pub mod explain;
pub mod features;
pub mod momentum;

pub use features::{FeatureVector, MomentumMetrics, FEATURE_NAMES};

/// Outcome of one scoring tier for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum TierScore {
    Unavailable(String),
    Scored { value: f64, explanation: String },
}

impl TierScore {
    pub fn is_scored(&self) -> bool {
        matches!(self, Self::Scored { .. })
    }
}
