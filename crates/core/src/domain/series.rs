use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Minimum number of closes before a symbol can be scored at all.
pub const MIN_USABLE_POINTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closes for one symbol, ascending by date with unique dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Builds a series from unordered observations. Non-finite and non-positive
    /// closes are dropped; on a date collision the last observation wins.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut raw: Vec<PricePoint> = points
            .into_iter()
            .filter(|(_, close)| close.is_finite() && *close > 0.0)
            .map(|(date, close)| PricePoint { date, close })
            .collect();

        // Stable sort keeps arrival order among equal dates, so the last one wins below.
        raw.sort_by_key(|p| p.date);

        let mut out: Vec<PricePoint> = Vec::with_capacity(raw.len());
        for p in raw {
            match out.last_mut() {
                Some(last) if last.date == p.date => *last = p,
                _ => out.push(p),
            }
        }

        Self { points: out }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_usable(&self) -> bool {
        self.points.len() >= MIN_USABLE_POINTS
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.close)
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.last().map(|p| p.close)
    }

    /// Close `k` observations before the latest one.
    pub fn close_back(&self, k: usize) -> Option<f64> {
        let n = self.points.len();
        if k >= n {
            return None;
        }
        Some(self.points[n - 1 - k].close)
    }

    /// Observations dated on or before `as_of`.
    pub fn truncate_after(&self, as_of: NaiveDate) -> Self {
        Self {
            points: self
                .points
                .iter()
                .copied()
                .filter(|p| p.date <= as_of)
                .collect(),
        }
    }

    /// Observations dated on or after `date`, oldest first.
    pub fn on_or_after(&self, date: NaiveDate) -> &[PricePoint] {
        let idx = self.points.partition_point(|p| p.date < date);
        &self.points[idx..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, day).unwrap()
    }

    #[test]
    fn sorts_and_keeps_last_value_on_duplicate_dates() {
        let s = PriceSeries::from_points(vec![(d(3), 12.0), (d(2), 10.0), (d(3), 13.0)]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.points()[0].date, d(2));
        assert_eq!(s.last_close(), Some(13.0));
    }

    #[test]
    fn drops_invalid_closes() {
        let s = PriceSeries::from_points(vec![
            (d(2), f64::NAN),
            (d(3), 0.0),
            (d(4), f64::INFINITY),
            (d(5), 5.0),
        ]);
        assert_eq!(s.len(), 1);
        assert!(!s.is_usable());
    }

    #[test]
    fn on_or_after_and_truncate_after() {
        let s = PriceSeries::from_points(vec![(d(2), 1.0), (d(3), 2.0), (d(5), 3.0)]);
        let tail = s.on_or_after(d(4));
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].date, d(5));

        let head = s.truncate_after(d(3));
        assert_eq!(head.len(), 2);
        assert_eq!(head.last_close(), Some(2.0));
    }

    #[test]
    fn close_back_counts_from_latest() {
        let s = PriceSeries::from_points(vec![(d(2), 1.0), (d(3), 2.0), (d(4), 3.0)]);
        assert_eq!(s.close_back(0), Some(3.0));
        assert_eq!(s.close_back(2), Some(1.0));
        assert_eq!(s.close_back(3), None);
    }
}
