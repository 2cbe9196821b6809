use super::{CachedTickers, PipelineRun, Store, StoredArtifact};
use crate::domain::pick::{validate_picks, AccuracyRecord, Pick, PredictionRecord};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Tables {
    picks: BTreeMap<NaiveDate, Vec<Pick>>,
    predictions: BTreeMap<NaiveDate, PredictionRecord>,
    accuracy: BTreeMap<NaiveDate, AccuracyRecord>,
    artifacts: BTreeMap<String, StoredArtifact>,
    universe: BTreeMap<String, CachedTickers>,
    runs: Vec<(uuid::Uuid, PipelineRun)>,
}

/// Process-local store used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn runs(&self) -> Vec<PipelineRun> {
        let t = self.tables.lock().await;
        t.runs.iter().map(|(_, r)| r.clone()).collect()
    }

    /// Inserts a prediction without ranked picks, as older deployments wrote.
    pub async fn insert_prediction(&self, record: PredictionRecord) {
        let mut t = self.tables.lock().await;
        t.predictions.insert(record.date, record);
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn replace_picks(&self, date: NaiveDate, picks: &[Pick]) -> anyhow::Result<()> {
        validate_picks(date, picks)?;

        let mut sorted = picks.to_vec();
        sorted.sort_by_key(|p| p.rank);

        let mut t = self.tables.lock().await;
        match PredictionRecord::from_rank_one(&sorted) {
            Some(rec) => {
                t.predictions.insert(date, rec);
            }
            None => {
                t.predictions.remove(&date);
            }
        }
        if sorted.is_empty() {
            t.picks.remove(&date);
        } else {
            t.picks.insert(date, sorted);
        }
        Ok(())
    }

    async fn picks_for_date(&self, date: NaiveDate) -> anyhow::Result<Vec<Pick>> {
        let t = self.tables.lock().await;
        Ok(t.picks.get(&date).cloned().unwrap_or_default())
    }

    async fn latest_picks(&self) -> anyhow::Result<Option<(NaiveDate, Vec<Pick>)>> {
        let t = self.tables.lock().await;
        Ok(t.picks
            .iter()
            .next_back()
            .map(|(date, picks)| (*date, picks.clone())))
    }

    async fn prediction_history(&self, limit: i64) -> anyhow::Result<Vec<PredictionRecord>> {
        let t = self.tables.lock().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(t.predictions.values().rev().take(limit).cloned().collect())
    }

    async fn clear_predictions(&self) -> anyhow::Result<u64> {
        let mut t = self.tables.lock().await;
        let removed: usize =
            t.picks.values().map(Vec::len).sum::<usize>() + t.predictions.len();
        t.picks.clear();
        t.predictions.clear();
        Ok(removed as u64)
    }

    async fn rank_one_symbol(&self, date: NaiveDate) -> anyhow::Result<Option<String>> {
        let t = self.tables.lock().await;
        let from_picks = t
            .picks
            .get(&date)
            .and_then(|picks| picks.iter().find(|p| p.rank == 1))
            .map(|p| p.symbol.clone());
        Ok(from_picks.or_else(|| t.predictions.get(&date).map(|p| p.symbol.clone())))
    }

    async fn unevaluated_dates(&self) -> anyhow::Result<Vec<NaiveDate>> {
        let t = self.tables.lock().await;
        let from_picks: Vec<NaiveDate> = t
            .picks
            .iter()
            .filter(|(date, picks)| {
                picks.iter().any(|p| p.rank == 1) && !t.accuracy.contains_key(*date)
            })
            .map(|(date, _)| *date)
            .collect();
        if !from_picks.is_empty() {
            return Ok(from_picks);
        }
        Ok(t.predictions
            .keys()
            .filter(|date| !t.accuracy.contains_key(*date))
            .copied()
            .collect())
    }

    async fn upsert_accuracy(&self, record: &AccuracyRecord) -> anyhow::Result<()> {
        let mut t = self.tables.lock().await;
        t.accuracy.insert(record.date, record.clone());
        Ok(())
    }

    async fn accuracy_history(&self) -> anyhow::Result<Vec<AccuracyRecord>> {
        let t = self.tables.lock().await;
        Ok(t.accuracy.values().cloned().collect())
    }

    async fn load_artifact(&self, name: &str) -> anyhow::Result<Option<StoredArtifact>> {
        let t = self.tables.lock().await;
        Ok(t.artifacts.get(name).cloned())
    }

    async fn save_artifact(&self, name: &str, artifact: &StoredArtifact) -> anyhow::Result<()> {
        let mut t = self.tables.lock().await;
        t.artifacts.insert(name.to_string(), artifact.clone());
        Ok(())
    }

    async fn load_universe_cache(&self, name: &str) -> anyhow::Result<Option<CachedTickers>> {
        let t = self.tables.lock().await;
        Ok(t.universe.get(name).cloned())
    }

    async fn save_universe_cache(
        &self,
        name: &str,
        cache: &CachedTickers,
    ) -> anyhow::Result<()> {
        let mut t = self.tables.lock().await;
        t.universe.insert(name.to_string(), cache.clone());
        Ok(())
    }

    async fn record_run(&self, run: &PipelineRun) -> anyhow::Result<uuid::Uuid> {
        let id = uuid::Uuid::new_v4();
        let mut t = self.tables.lock().await;
        t.runs.push((id, run.clone()));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn pick(date: NaiveDate, rank: i32, symbol: &str) -> Pick {
        Pick {
            date,
            rank,
            symbol: symbol.to_string(),
            score: 10.0 - rank as f64,
            reason: "r".to_string(),
            price: Some(100.0),
        }
    }

    fn accuracy(date: NaiveDate) -> AccuracyRecord {
        AccuracyRecord::from_closes(date, "AAA", 100.0, 101.0)
    }

    #[tokio::test]
    async fn replace_overwrites_whole_day() {
        let store = MemoryStore::new();
        store
            .replace_picks(d(2), &[pick(d(2), 1, "A"), pick(d(2), 2, "B"), pick(d(2), 3, "C")])
            .await
            .unwrap();
        store.replace_picks(d(2), &[pick(d(2), 1, "Z")]).await.unwrap();

        let picks = store.picks_for_date(d(2)).await.unwrap();
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].symbol, "Z");
        assert_eq!(store.rank_one_symbol(d(2)).await.unwrap().as_deref(), Some("Z"));
        let history = store.prediction_history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].symbol, "Z");
    }

    #[tokio::test]
    async fn invalid_pick_set_is_rejected_without_writing() {
        let store = MemoryStore::new();
        let err = store
            .replace_picks(d(2), &[pick(d(2), 1, "A"), pick(d(2), 1, "B")])
            .await;
        assert!(err.is_err());
        assert!(store.picks_for_date(d(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unevaluated_falls_back_to_predictions() {
        let store = MemoryStore::new();
        store.replace_picks(d(2), &[pick(d(2), 1, "A")]).await.unwrap();
        store.replace_picks(d(3), &[pick(d(3), 1, "B")]).await.unwrap();
        store.upsert_accuracy(&accuracy(d(2))).await.unwrap();
        assert_eq!(store.unevaluated_dates().await.unwrap(), vec![d(3)]);

        store.upsert_accuracy(&accuracy(d(3))).await.unwrap();
        store
            .insert_prediction(PredictionRecord {
                symbol: "OLD".into(),
                date: d(1),
                score: 1.0,
                reason: "r".into(),
            })
            .await;
        assert_eq!(store.unevaluated_dates().await.unwrap(), vec![d(1)]);
        assert_eq!(store.rank_one_symbol(d(1)).await.unwrap().as_deref(), Some("OLD"));
    }

    #[tokio::test]
    async fn clear_keeps_accuracy() {
        let store = MemoryStore::new();
        store
            .replace_picks(d(2), &[pick(d(2), 1, "A"), pick(d(2), 2, "B")])
            .await
            .unwrap();
        store.upsert_accuracy(&accuracy(d(2))).await.unwrap();

        assert_eq!(store.clear_predictions().await.unwrap(), 3);
        assert!(store.latest_picks().await.unwrap().is_none());
        assert_eq!(store.accuracy_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn latest_picks_is_most_recent_date() {
        let store = MemoryStore::new();
        store.replace_picks(d(2), &[pick(d(2), 1, "A")]).await.unwrap();
        store.replace_picks(d(4), &[pick(d(4), 1, "B")]).await.unwrap();
        let (date, picks) = store.latest_picks().await.unwrap().unwrap();
        assert_eq!(date, d(4));
        assert_eq!(picks[0].symbol, "B");
    }
}
