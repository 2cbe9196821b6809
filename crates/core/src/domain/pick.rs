use anyhow::ensure;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of ranked picks persisted per date.
pub const MAX_PICKS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub symbol: String,
    pub value: f64,
    pub explanation: String,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub date: NaiveDate,
    pub rank: i32,
    pub symbol: String,
    pub score: f64,
    pub reason: String,
    pub price: Option<f64>,
}

impl Pick {
    pub fn from_score(date: NaiveDate, rank: i32, score: Score) -> Self {
        Self {
            date,
            rank,
            symbol: score.symbol,
            score: score.value,
            reason: score.explanation,
            price: score.price,
        }
    }
}

/// Rank-1 pick for a date, kept for lookups that predate ranked picks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub score: f64,
    pub reason: String,
}

impl PredictionRecord {
    pub fn from_rank_one(picks: &[Pick]) -> Option<Self> {
        picks.iter().find(|p| p.rank == 1).map(|p| Self {
            symbol: p.symbol.clone(),
            date: p.date,
            score: p.score,
            reason: p.reason.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRecord {
    pub date: NaiveDate,
    pub predicted_symbol: String,
    pub predicted_return: Option<f64>,
    pub actual_return: f64,
    pub actual_close: f64,
    pub was_correct: bool,
}

impl AccuracyRecord {
    /// Labels a prediction from the close on the prediction session and the
    /// close of the following session. Correct means the pick went up.
    pub fn from_closes(date: NaiveDate, symbol: &str, close_0: f64, close_1: f64) -> Self {
        let actual_return = (close_1 / close_0 - 1.0) * 100.0;
        Self {
            date,
            predicted_symbol: symbol.to_string(),
            predicted_return: None,
            actual_return,
            actual_close: close_1,
            was_correct: actual_return > 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyStats {
    pub total: usize,
    pub correct: usize,
    pub accuracy_pct: f64,
}

impl AccuracyStats {
    pub fn from_records(records: &[AccuracyRecord]) -> Self {
        let total = records.len();
        let correct = records.iter().filter(|r| r.was_correct).count();
        let pct = if total == 0 {
            0.0
        } else {
            100.0 * correct as f64 / total as f64
        };
        Self {
            total,
            correct,
            accuracy_pct: (pct * 10.0).round() / 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingResult {
    pub date: NaiveDate,
    pub picks: Vec<Pick>,
    pub universe: String,
    pub used_classifier: bool,
}

/// Checks the per-date pick invariants before anything is written: at most
/// `MAX_PICKS`, a single date, ranks unique and contiguous from 1.
pub fn validate_picks(date: NaiveDate, picks: &[Pick]) -> anyhow::Result<()> {
    ensure!(
        picks.len() <= MAX_PICKS,
        "at most {MAX_PICKS} picks per date (got {})",
        picks.len()
    );

    let mut seen_ranks = BTreeSet::<i32>::new();
    for pick in picks {
        ensure!(
            pick.date == date,
            "pick date mismatch: expected {date}, got {}",
            pick.date
        );
        ensure!(
            (1..=MAX_PICKS as i32).contains(&pick.rank),
            "rank out of range: {}",
            pick.rank
        );
        ensure!(seen_ranks.insert(pick.rank), "duplicate rank: {}", pick.rank);
        ensure!(!pick.symbol.trim().is_empty(), "symbol must be non-empty");
    }

    for rank in 1..=picks.len() as i32 {
        ensure!(seen_ranks.contains(&rank), "missing rank {rank}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn pick(rank: i32, symbol: &str) -> Pick {
        Pick {
            date: date(),
            rank,
            symbol: symbol.to_string(),
            score: 1.0,
            reason: "r".to_string(),
            price: None,
        }
    }

    #[test]
    fn labels_up_move_as_correct() {
        let r = AccuracyRecord::from_closes(date(), "AAPL", 100.0, 105.0);
        assert!((r.actual_return - 5.0).abs() < 1e-9);
        assert_eq!(r.actual_close, 105.0);
        assert!(r.was_correct);
        assert_eq!(r.predicted_return, None);

        let r = AccuracyRecord::from_closes(date(), "AAPL", 100.0, 95.0);
        assert!((r.actual_return + 5.0).abs() < 1e-9);
        assert!(!r.was_correct);
    }

    #[test]
    fn flat_move_is_not_correct() {
        let r = AccuracyRecord::from_closes(date(), "AAPL", 100.0, 100.0);
        assert!(!r.was_correct);
    }

    #[test]
    fn validates_rank_set() {
        assert!(validate_picks(date(), &[pick(1, "A"), pick(2, "B"), pick(3, "C")]).is_ok());
        assert!(validate_picks(date(), &[pick(1, "A")]).is_ok());
        assert!(validate_picks(date(), &[]).is_ok());
        assert!(validate_picks(date(), &[pick(1, "A"), pick(1, "B")]).is_err());
        assert!(validate_picks(date(), &[pick(2, "A")]).is_err());
        assert!(validate_picks(
            date(),
            &[pick(1, "A"), pick(2, "B"), pick(3, "C"), pick(4, "D")]
        )
        .is_err());
    }

    #[test]
    fn prediction_record_comes_from_rank_one() {
        let picks = vec![pick(2, "B"), pick(1, "A")];
        let rec = PredictionRecord::from_rank_one(&picks).unwrap();
        assert_eq!(rec.symbol, "A");
        assert!(PredictionRecord::from_rank_one(&[]).is_none());
    }

    #[test]
    fn stats_round_to_one_decimal() {
        let mk = |ok| AccuracyRecord {
            date: date(),
            predicted_symbol: "A".into(),
            predicted_return: None,
            actual_return: 0.0,
            actual_close: 1.0,
            was_correct: ok,
        };
        let stats = AccuracyStats::from_records(&[mk(true), mk(false), mk(false)]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.correct, 1);
        assert_eq!(stats.accuracy_pct, 33.3);
        assert_eq!(AccuracyStats::from_records(&[]).accuracy_pct, 0.0);
    }
}
