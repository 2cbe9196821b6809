pub mod accuracy;
pub mod context;
pub mod job;
pub mod ranking;

pub use accuracy::{AccuracyEvaluator, EvaluationOutcome, EvaluationSummary};
pub use context::{PipelineContext, RankingOptions};
pub use job::{spawn_ranking, RankingOutcome};
pub use ranking::RankingEngine;
