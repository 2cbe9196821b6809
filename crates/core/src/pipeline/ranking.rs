//! Daily ranking run.
//!
//! Candidates are scored by the classifier when a model is available and at
//! least one symbol has a full feature vector, otherwise by the momentum
//! heuristic. Only the top of the list is adjusted by news sentiment, and the
//! best three become the day's picks.

use super::context::PipelineContext;
use crate::domain::pick::{Pick, RankingResult, Score, MAX_PICKS};
use crate::domain::series::PriceSeries;
use crate::error::PipelineError;
use crate::model::ModelArtifact;
use crate::scoring::explain::explain;
use crate::scoring::features::{feature_vector, momentum_metrics};
use crate::scoring::momentum::momentum_score;
use crate::scoring::{FeatureVector, MomentumMetrics, TierScore};
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

/// Sentiment weight on a [0, 1] probability score.
pub const CLASSIFIER_SENTIMENT_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Classifier,
    Momentum,
}

#[derive(Debug, Clone)]
struct Candidate {
    symbol: String,
    metrics: MomentumMetrics,
    features: Option<FeatureVector>,
}

#[derive(Debug, Clone)]
struct Ranked {
    idx: usize,
    value: f64,
    probability: Option<f64>,
    explanation: String,
}

pub struct RankingEngine<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> RankingEngine<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Ranks the universe for `date` and replaces that date's picks.
    ///
    /// `Ok(None)` means nothing could be scored; existing picks are left alone.
    pub async fn run(&self, date: NaiveDate) -> Result<Option<RankingResult>, PipelineError> {
        let started = std::time::Instant::now();

        let symbols = self.ctx.universe.list().await;
        if symbols.is_empty() {
            tracing::warn!(%date, "universe is empty; no ranking");
            return Ok(None);
        }

        let series = self.fetch_prices(&symbols, date).await;
        let candidates = build_candidates(&symbols, &series);
        tracing::info!(
            %date,
            universe = symbols.len(),
            candidates = candidates.len(),
            "candidates built"
        );
        if candidates.is_empty() {
            tracing::warn!(%date, "no symbol has usable price history; no ranking");
            return Ok(None);
        }

        let artifact = match self.ctx.classifier.load().await {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                tracing::info!(reason = %err, "classifier unavailable; momentum scoring");
                None
            }
        };
        let was_trained = artifact.is_some();

        let (strategy, tier) = select_strategy(artifact.as_ref(), &candidates);
        let mut ranked = ranked_from_tier(strategy, &tier);
        sort_desc(&mut ranked);
        if ranked.is_empty() {
            tracing::warn!(%date, "no candidate could be scored; no ranking");
            return Ok(None);
        }

        // Sentiment only reaches the shortlist, but the re-sort covers every
        // scored candidate, so a penalized shortlist can let lower ranks through.
        let shortlist = self.ctx.options.shortlist.min(ranked.len());
        self.apply_sentiment(date, strategy, &candidates, &mut ranked[..shortlist])
            .await;
        sort_desc(&mut ranked);

        let picks: Vec<Pick> = ranked
            .into_iter()
            .take(MAX_PICKS)
            .enumerate()
            .map(|(i, r)| {
                let c = &candidates[r.idx];
                Pick::from_score(
                    date,
                    i as i32 + 1,
                    Score {
                        symbol: c.symbol.clone(),
                        value: r.value,
                        explanation: r.explanation,
                        price: Some(c.metrics.last_close),
                    },
                )
            })
            .collect();

        self.ctx
            .store
            .replace_picks(date, &picks)
            .await
            .map_err(PipelineError::persistence)?;

        tracing::info!(
            %date,
            strategy = ?strategy,
            picks = ?picks.iter().map(|p| p.symbol.as_str()).collect::<Vec<_>>(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "picks saved"
        );

        if !was_trained {
            self.ctx.classifier.try_train().await;
        }

        Ok(Some(RankingResult {
            date,
            picks,
            universe: self.ctx.universe.label().to_string(),
            used_classifier: strategy == Strategy::Classifier,
        }))
    }

    async fn fetch_prices(&self, symbols: &[String], date: NaiveDate) -> HashMap<String, PriceSeries> {
        let start = date - Duration::days(self.ctx.options.lookback_days);
        let mut out = HashMap::with_capacity(symbols.len());

        for chunk in symbols.chunks(self.ctx.options.chunk_size) {
            match self.ctx.prices.fetch(chunk, start, date).await {
                Ok(batch) => {
                    out.extend(
                        batch
                            .into_iter()
                            .map(|(symbol, series)| (symbol, series.truncate_after(date))),
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        chunk = chunk.len(),
                        first = %chunk[0],
                        error = %err,
                        "price chunk failed; symbols skipped"
                    );
                }
            }
        }

        out
    }

    async fn apply_sentiment(
        &self,
        date: NaiveDate,
        strategy: Strategy,
        candidates: &[Candidate],
        shortlist: &mut [Ranked],
    ) {
        let Some(provider) = self.ctx.sentiment.as_ref() else {
            return;
        };
        let from = date - Duration::days(self.ctx.options.sentiment_lookback_days);

        for r in shortlist.iter_mut() {
            let c = &candidates[r.idx];
            let sentiment = match provider.fetch(&c.symbol, from, date).await {
                Ok(Some(s)) if s.is_finite() => s.clamp(-1.0, 1.0),
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(symbol = %c.symbol, error = %err, "sentiment unavailable");
                    continue;
                }
            };

            match strategy {
                Strategy::Classifier => {
                    r.value += CLASSIFIER_SENTIMENT_WEIGHT * sentiment;
                }
                Strategy::Momentum => {
                    if let Some(v) = momentum_score(Some(&c.metrics), Some(sentiment)) {
                        r.value = v;
                    }
                }
            }
            r.explanation = explain(Some(&c.metrics), Some(sentiment), r.probability);
        }
    }
}

fn build_candidates(symbols: &[String], series: &HashMap<String, PriceSeries>) -> Vec<Candidate> {
    let mut out = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let Some(s) = series.get(symbol) else {
            tracing::debug!(symbol = %symbol, "no price history; skipped");
            continue;
        };
        let Some(metrics) = momentum_metrics(s) else {
            tracing::debug!(symbol = %symbol, points = s.len(), "price history too short; skipped");
            continue;
        };
        out.push(Candidate {
            symbol: symbol.clone(),
            metrics,
            features: feature_vector(s),
        });
    }
    out
}

fn classifier_tier(artifact: &ModelArtifact, candidates: &[Candidate]) -> Vec<TierScore> {
    candidates
        .iter()
        .map(|c| match &c.features {
            None => TierScore::Unavailable("no full feature vector".to_string()),
            Some(f) => {
                let p = artifact.predict(f);
                if p.is_finite() {
                    TierScore::Scored {
                        value: p,
                        explanation: explain(Some(&c.metrics), None, Some(p)),
                    }
                } else {
                    TierScore::Unavailable("non-finite probability".to_string())
                }
            }
        })
        .collect()
}

fn momentum_tier(candidates: &[Candidate]) -> Vec<TierScore> {
    candidates
        .iter()
        .map(|c| match momentum_score(Some(&c.metrics), None) {
            Some(value) => TierScore::Scored {
                value,
                explanation: explain(Some(&c.metrics), None, None),
            },
            None => TierScore::Unavailable("no momentum window".to_string()),
        })
        .collect()
}

/// Classifier first, momentum when the classifier is absent or scores nothing.
fn select_strategy(
    artifact: Option<&ModelArtifact>,
    candidates: &[Candidate],
) -> (Strategy, Vec<TierScore>) {
    if let Some(artifact) = artifact {
        if candidates.iter().any(|c| c.features.is_some()) {
            let tier = classifier_tier(artifact, candidates);
            if tier.iter().any(TierScore::is_scored) {
                return (Strategy::Classifier, tier);
            }
            tracing::warn!("classifier produced no usable score; falling back to momentum");
        } else {
            tracing::info!("no symbol has a full feature vector; momentum scoring");
        }
    }
    (Strategy::Momentum, momentum_tier(candidates))
}

fn ranked_from_tier(strategy: Strategy, tier: &[TierScore]) -> Vec<Ranked> {
    tier.iter()
        .enumerate()
        .filter_map(|(idx, t)| match t {
            TierScore::Scored { value, explanation } => Some(Ranked {
                idx,
                value: *value,
                probability: (strategy == Strategy::Classifier).then_some(*value),
                explanation: explanation.clone(),
            }),
            TierScore::Unavailable(_) => None,
        })
        .collect()
}

/// Descending by score; equal scores keep universe order.
fn sort_desc(ranked: &mut [Ranked]) {
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
}
