use chrono::NaiveDate;

/// Failure kinds surfaced by the ranking and evaluation pipeline.
///
/// Everything except `Persistence` is a degradation: the caller skips the
/// affected symbol, step or date and carries on.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("insufficient training data: {usable} usable samples (need {required})")]
    InsufficientTrainingData { usable: usize, required: usize },

    #[error("evaluation not yet possible for {date}: next trading day close not observed")]
    EvaluationNotYetPossible { date: NaiveDate },

    #[error(transparent)]
    Persistence(anyhow::Error),
}

impl PipelineError {
    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(err)
    }

    /// True when the error must be reported to the caller as a failed run.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_persistence_fails_a_run() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(!PipelineError::DataUnavailable("x".into()).is_fatal_to_run());
        assert!(!PipelineError::ModelUnavailable("x".into()).is_fatal_to_run());
        assert!(!PipelineError::EvaluationNotYetPossible { date }.is_fatal_to_run());
        assert!(!PipelineError::InsufficientTrainingData {
            usable: 3,
            required: 8
        }
        .is_fatal_to_run());
        assert!(PipelineError::persistence(anyhow::anyhow!("db down")).is_fatal_to_run());
    }

    #[test]
    fn persistence_display_delegates_to_source() {
        let err = PipelineError::persistence(anyhow::anyhow!("insert daily_picks failed"));
        assert_eq!(err.to_string(), "insert daily_picks failed");
    }
}
