//! Random forest for the binary "next session closes higher" label.
//!
//! Gini-split trees grown on bootstrap samples with a random feature subset at
//! each split. Every tree and every bootstrap draw is seeded from the forest
//! seed, so the same data always yields the same model.

use anyhow::ensure;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` means `floor(sqrt(n_features))`.
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        positive_rate: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Copy)]
struct TreeParams {
    max_depth: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Node,
}

impl DecisionTree {
    fn fit(
        rows: &[Vec<f64>],
        labels: &[u8],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        Self {
            root: build_node(rows, labels, indices, 0, params, rng),
        }
    }

    pub fn positive_rate(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { positive_rate, .. } => return *positive_rate,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    node = if v <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn depth(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        depth(&self.root)
    }
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

fn positive_rate(labels: &[u8], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.5;
    }
    let positives = indices.iter().filter(|&&i| labels[i] == 1).count();
    positives as f64 / indices.len() as f64
}

fn gini(p: f64) -> f64 {
    2.0 * p * (1.0 - p)
}

fn build_node(
    rows: &[Vec<f64>],
    labels: &[u8],
    indices: &[usize],
    depth: usize,
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Node {
    let rate = positive_rate(labels, indices);
    let leaf = Node::Leaf {
        positive_rate: rate,
        n_samples: indices.len(),
    };

    if depth >= params.max_depth
        || indices.len() < params.min_samples_split
        || gini(rate) < 1e-12
    {
        return leaf;
    }

    match best_split(rows, labels, indices, params, rng) {
        Some(split) => {
            let left = build_node(rows, labels, &split.left, depth + 1, params, rng);
            let right = build_node(rows, labels, &split.right, depth + 1, params, rng);
            Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        None => leaf,
    }
}

fn best_split(
    rows: &[Vec<f64>],
    labels: &[u8],
    indices: &[usize],
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Option<SplitChoice> {
    let n_features = rows.first()?.len();
    if n_features == 0 {
        return None;
    }

    let mut features: Vec<usize> = (0..n_features).collect();
    features.shuffle(rng);
    features.truncate(params.max_features.clamp(1, n_features));

    let n = indices.len() as f64;
    let parent = gini(positive_rate(labels, indices));

    let mut best_gain = 0.0;
    let mut best: Option<SplitChoice> = None;

    for &feature in &features {
        let mut values: Vec<f64> = indices.iter().map(|&i| rows[i][feature]).collect();
        values.sort_by(f64::total_cmp);
        values.dedup();

        for w in values.windows(2) {
            let threshold = (w[0] + w[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .copied()
                .partition(|&i| rows[i][feature] <= threshold);

            if left.len() < params.min_samples_leaf || right.len() < params.min_samples_leaf {
                continue;
            }

            let weighted = (left.len() as f64 * gini(positive_rate(labels, &left))
                + right.len() as f64 * gini(positive_rate(labels, &right)))
                / n;
            let gain = parent - weighted;

            if gain > best_gain + 1e-12 {
                best_gain = gain;
                best = Some(SplitChoice {
                    feature,
                    threshold,
                    left,
                    right,
                });
            }
        }
    }

    best
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn fit(&mut self, rows: &[Vec<f64>], labels: &[u8]) -> anyhow::Result<()> {
        ensure!(!rows.is_empty(), "cannot fit a forest on zero samples");
        ensure!(
            rows.len() == labels.len(),
            "rows/labels length mismatch: {} vs {}",
            rows.len(),
            labels.len()
        );
        let n_features = rows[0].len();
        ensure!(n_features > 0, "rows must have at least one feature");
        ensure!(
            rows.iter().all(|r| r.len() == n_features),
            "all rows must have {n_features} features"
        );
        ensure!(
            labels.iter().all(|&l| l <= 1),
            "labels must be 0 or 1"
        );

        let max_features = self
            .config
            .max_features
            .unwrap_or_else(|| ((n_features as f64).sqrt().floor() as usize).max(1));
        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split.max(2),
            min_samples_leaf: self.config.min_samples_leaf.max(1),
            max_features,
        };

        let n = rows.len();
        let mut trees = Vec::with_capacity(self.config.n_trees);
        for i in 0..self.config.n_trees {
            let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(i as u64));
            let indices: Vec<usize> = if self.config.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            trees.push(DecisionTree::fit(rows, labels, &indices, &params, &mut rng));
        }

        self.trees = trees;
        self.n_features = n_features;
        Ok(())
    }

    /// Mean leaf positive rate across trees.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let sum: f64 = self.trees.iter().map(|t| t.positive_rate(row)).sum();
        sum / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let x = i as f64;
            rows.push(vec![x, (i % 7) as f64]);
            labels.push(u8::from(x >= 20.0));
        }
        (rows, labels)
    }

    #[test]
    fn learns_a_threshold() {
        let (rows, labels) = separable();
        let mut forest = RandomForest::new(ForestConfig {
            max_features: Some(2),
            ..Default::default()
        });
        forest.fit(&rows, &labels).unwrap();

        assert_eq!(forest.trees().len(), 50);
        assert!(forest.predict_proba(&[35.0, 1.0]) > 0.8);
        assert!(forest.predict_proba(&[3.0, 1.0]) < 0.2);
    }

    #[test]
    fn respects_max_depth() {
        let (rows, labels) = separable();
        let mut forest = RandomForest::new(ForestConfig {
            max_depth: 2,
            n_trees: 5,
            ..Default::default()
        });
        forest.fit(&rows, &labels).unwrap();
        // Depth counts nodes on the longest path, so max_depth splits => max_depth + 1.
        assert!(forest.trees().iter().all(|t| t.depth() <= 3));
    }

    #[test]
    fn same_seed_same_model() {
        let (rows, labels) = separable();
        let mut a = RandomForest::new(ForestConfig::default());
        let mut b = RandomForest::new(ForestConfig::default());
        a.fit(&rows, &labels).unwrap();
        b.fit(&rows, &labels).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.predict_proba(&[19.5, 0.0]), b.predict_proba(&[19.5, 0.0]));
    }

    #[test]
    fn single_class_predicts_that_class() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0]];
        let labels = vec![1, 1, 1];
        let mut forest = RandomForest::new(ForestConfig::default());
        forest.fit(&rows, &labels).unwrap();
        assert_eq!(forest.predict_proba(&[10.0]), 1.0);
    }

    #[test]
    fn rejects_bad_input() {
        let mut forest = RandomForest::new(ForestConfig::default());
        assert!(forest.fit(&[], &[]).is_err());
        assert!(forest.fit(&[vec![1.0]], &[1, 0]).is_err());
        assert!(forest.fit(&[vec![1.0], vec![1.0, 2.0]], &[1, 0]).is_err());
        assert!(forest.fit(&[vec![1.0]], &[2]).is_err());
    }

    #[test]
    fn unfitted_forest_is_undecided() {
        let forest = RandomForest::new(ForestConfig::default());
        assert_eq!(forest.predict_proba(&[1.0]), 0.5);
    }

    #[test]
    fn survives_serde_roundtrip() {
        let (rows, labels) = separable();
        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 3,
            ..Default::default()
        });
        forest.fit(&rows, &labels).unwrap();
        let v = serde_json::to_value(&forest).unwrap();
        let back: RandomForest = serde_json::from_value(v).unwrap();
        assert_eq!(back.predict_proba(&[30.0, 2.0]), forest.predict_proba(&[30.0, 2.0]));
    }
}
