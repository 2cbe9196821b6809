use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Per-column median imputation, fit on the training matrix.
///
/// NaN cells are replaced with the column median; anything still non-finite
/// after that (infinities) becomes 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Vec<f64>,
}

impl MedianImputer {
    pub fn fit(rows: &[Vec<f64>]) -> anyhow::Result<Self> {
        ensure!(!rows.is_empty(), "cannot fit imputer on zero rows");
        let width = rows[0].len();
        ensure!(
            rows.iter().all(|r| r.len() == width),
            "all rows must have {width} columns"
        );

        let medians = (0..width)
            .map(|col| {
                let mut values: Vec<f64> = rows
                    .iter()
                    .map(|r| r[col])
                    .filter(|v| v.is_finite())
                    .collect();
                median(&mut values).unwrap_or(0.0)
            })
            .collect();

        Ok(Self { medians })
    }

    pub fn width(&self) -> usize {
        self.medians.len()
    }

    pub fn medians(&self) -> &[f64] {
        &self.medians
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        self.medians
            .iter()
            .enumerate()
            .map(|(col, med)| {
                let v = row.get(col).copied().unwrap_or(f64::NAN);
                let v = if v.is_nan() { *med } else { v };
                if v.is_finite() {
                    v
                } else {
                    0.0
                }
            })
            .collect()
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_nan_with_column_median() {
        let rows = vec![
            vec![1.0, 10.0],
            vec![3.0, f64::NAN],
            vec![2.0, 30.0],
            vec![f64::NAN, 20.0],
        ];
        let imp = MedianImputer::fit(&rows).unwrap();
        assert_eq!(imp.medians(), &[2.0, 20.0]);
        assert_eq!(imp.transform(&[f64::NAN, 5.0]), vec![2.0, 5.0]);
    }

    #[test]
    fn sanitises_infinities_to_zero() {
        let imp = MedianImputer::fit(&[vec![1.0], vec![3.0]]).unwrap();
        assert_eq!(imp.transform(&[f64::INFINITY]), vec![0.0]);
        assert_eq!(imp.transform(&[f64::NEG_INFINITY]), vec![0.0]);
    }

    #[test]
    fn all_missing_column_defaults_to_zero() {
        let imp = MedianImputer::fit(&[vec![f64::NAN], vec![f64::NAN]]).unwrap();
        assert_eq!(imp.transform(&[f64::NAN]), vec![0.0]);
    }

    #[test]
    fn short_rows_are_padded() {
        let imp = MedianImputer::fit(&[vec![1.0, 4.0]]).unwrap();
        assert_eq!(imp.transform(&[7.0]), vec![7.0, 4.0]);
    }
}
