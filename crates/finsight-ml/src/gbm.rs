//! Deterministic gradient-boosted regression trees (squared loss).
//!
//! Trees are stored flat: internal node `i` splits on `split_features[i]` at
//! `thresholds[i]`, sending `x <= threshold` to `left_child[i]`. A negative
//! child `c` refers to leaf `-(c + 1)`. A tree with no internal nodes is a
//! single leaf.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("feature matrix has {rows} rows but {labels} labels were given")]
    ShapeMismatch { rows: usize, labels: usize },

    #[error("expected {expected} features, got {got}")]
    FeatureMismatch { expected: usize, got: usize },

    #[error("training data contains non-finite values")]
    NonFinite,

    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

/// Boosting hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmParams {
    /// Number of boosting rounds (trees).
    pub n_estimators: usize,
    /// Shrinkage applied to every tree's output.
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn, without replacement, for each tree.
    pub subsample: f64,
    pub seed: u64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 0.8,
            seed: 42,
        }
    }
}

impl GbmParams {
    fn validate(&self) -> Result<(), ModelError> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidParams("n_estimators must be positive".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ModelError::InvalidParams("learning_rate must be positive".into()));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ModelError::InvalidParams("subsample must be in (0, 1]".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(ModelError::InvalidParams("min_samples_leaf must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    split_features: Vec<usize>,
    thresholds: Vec<f64>,
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    leaf_values: Vec<f64>,
}

impl RegressionTree {
    pub fn predict(&self, features: ArrayView1<'_, f64>) -> f64 {
        if self.split_features.is_empty() {
            return self.leaf_values.first().copied().unwrap_or_default();
        }

        let mut node = 0_usize;
        loop {
            let feature = self.split_features.get(node).copied().unwrap_or_default();
            let threshold = self.thresholds.get(node).copied().unwrap_or_default();
            let value = features.get(feature).copied().unwrap_or_default();
            let child = if value <= threshold {
                self.left_child.get(node).copied().unwrap_or(-1)
            } else {
                self.right_child.get(node).copied().unwrap_or(-1)
            };

            if child < 0 {
                let leaf = (-child - 1) as usize;
                return self.leaf_values.get(leaf).copied().unwrap_or_default();
            }
            node = child as usize;
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_values.len()
    }

    fn fit(
        x: ArrayView2<'_, f64>,
        residuals: &[f64],
        rows: &[usize],
        params: &GbmParams,
    ) -> Self {
        let mut tree = Self {
            split_features: Vec::new(),
            thresholds: Vec::new(),
            left_child: Vec::new(),
            right_child: Vec::new(),
            leaf_values: Vec::new(),
        };
        let mut rows = rows.to_vec();
        tree.grow(x, residuals, &mut rows, 0, params);
        tree
    }

    /// Grow the subtree over `rows` and return its node reference.
    fn grow(
        &mut self,
        x: ArrayView2<'_, f64>,
        residuals: &[f64],
        rows: &mut [usize],
        depth: usize,
        params: &GbmParams,
    ) -> i32 {
        let split = if depth < params.max_depth && rows.len() >= 2 * params.min_samples_leaf {
            best_split(x, residuals, rows, params.min_samples_leaf)
        } else {
            None
        };

        let Some(split) = split else {
            let sum: f64 = rows.iter().map(|&row| residuals[row]).sum();
            let value = if rows.is_empty() { 0.0 } else { sum / rows.len() as f64 };
            self.leaf_values.push(value);
            return -(self.leaf_values.len() as i32);
        };

        let node = self.split_features.len();
        self.split_features.push(split.feature);
        self.thresholds.push(split.threshold);
        self.left_child.push(0);
        self.right_child.push(0);

        rows.sort_by(|&a, &b| {
            x[[a, split.feature]]
                .total_cmp(&x[[b, split.feature]])
                .then(a.cmp(&b))
        });
        let (left_rows, right_rows) = rows.split_at_mut(split.left_len);

        let left = self.grow(x, residuals, left_rows, depth + 1, params);
        let right = self.grow(x, residuals, right_rows, depth + 1, params);
        self.left_child[node] = left;
        self.right_child[node] = right;
        node as i32
    }
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    left_len: usize,
    gain: f64,
}

/// Exhaustive search over midpoints between distinct sorted values.
///
/// Only a strictly better gain replaces the current best, so lower feature
/// indices and lower thresholds win ties.
fn best_split(
    x: ArrayView2<'_, f64>,
    residuals: &[f64],
    rows: &[usize],
    min_samples_leaf: usize,
) -> Option<Split> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&row| residuals[row]).sum();
    let parent_score = total * total / n as f64;
    let mut best: Option<Split> = None;

    let mut order = rows.to_vec();
    for feature in 0..x.ncols() {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]).then(a.cmp(&b)));

        let mut left_sum = 0.0;
        for left_len in 1..n {
            left_sum += residuals[order[left_len - 1]];
            if left_len < min_samples_leaf || n - left_len < min_samples_leaf {
                continue;
            }

            let lower = x[[order[left_len - 1], feature]];
            let upper = x[[order[left_len], feature]];
            if lower == upper {
                continue;
            }

            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / left_len as f64
                + right_sum * right_sum / (n - left_len) as f64
                - parent_score;
            let improves = match best {
                Some(current) => gain > current.gain + MIN_GAIN,
                None => gain > MIN_GAIN,
            };
            if improves {
                best = Some(Split {
                    feature,
                    threshold: lower + (upper - lower) / 2.0,
                    left_len,
                    gain,
                });
            }
        }
    }

    best
}

/// Additive ensemble of regression trees fit to squared-loss residuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    base: f64,
    learning_rate: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedRegressor {
    /// Fit on a `rows x features` matrix. Identical inputs and params always
    /// produce an identical model.
    pub fn fit(x: &Array2<f64>, y: &[f64], params: &GbmParams) -> Result<Self, ModelError> {
        params.validate()?;
        let n = x.nrows();
        if n == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if n != y.len() {
            return Err(ModelError::ShapeMismatch {
                rows: n,
                labels: y.len(),
            });
        }
        if x.iter().chain(y).any(|value| !value.is_finite()) {
            return Err(ModelError::NonFinite);
        }

        let base = y.iter().sum::<f64>() / n as f64;
        let mut fitted = vec![base; n];
        let mut rng = StdRng::seed_from_u64(params.seed);
        let sample_len = ((n as f64 * params.subsample).ceil() as usize).clamp(1, n);
        let mut all_rows: Vec<usize> = (0..n).collect();
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(label, f)| label - f).collect();

            let rows: Vec<usize> = if sample_len < n {
                all_rows.shuffle(&mut rng);
                let mut sample = all_rows[..sample_len].to_vec();
                sample.sort_unstable();
                sample
            } else {
                (0..n).collect()
            };

            let tree = RegressionTree::fit(x.view(), &residuals, &rows, params);
            for (row, value) in fitted.iter_mut().enumerate() {
                *value += params.learning_rate * tree.predict(x.row(row));
            }
            trees.push(tree);
        }

        debug!(
            rows = n,
            trees = trees.len(),
            leaves = trees.iter().map(RegressionTree::leaf_count).sum::<usize>(),
            "fitted gradient boosted regressor"
        );

        Ok(Self {
            base,
            learning_rate: params.learning_rate,
            n_features: x.ncols(),
            trees,
        })
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.n_features {
            return Err(ModelError::FeatureMismatch {
                expected: self.n_features,
                got: features.len(),
            });
        }
        let view = ArrayView1::from(features);
        Ok(self.base
            + self
                .trees
                .iter()
                .map(|tree| self.learning_rate * tree.predict(view))
                .sum::<f64>())
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
