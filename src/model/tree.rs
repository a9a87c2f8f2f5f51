//! Single regression tree grown by variance reduction.

use ndarray::{Array1, Array2};
use rand::seq::index;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TreetuneError};

/// Split parameters shared by every node of one tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowParams {
    /// Features drawn (without replacement) as split candidates per node.
    pub mtry: usize,
    /// Nodes with fewer rows than this become leaves.
    pub min_node_size: usize,
    /// Subtract the best gain achievable on a permuted copy of the feature.
    pub corrected_importance: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RegressionTree {
    root: TreeNode,
}

impl RegressionTree {
    /// Grows a tree on the full matrix. `importances` must have one slot per
    /// feature column; split gains are accumulated into it.
    pub fn grow(
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &GrowParams,
        rng: &mut ChaCha8Rng,
        importances: &mut [f64],
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 {
            return Err(TreetuneError::TrainingError(
                "cannot grow a tree on an empty sample".to_string(),
            ));
        }
        if y.len() != n {
            return Err(TreetuneError::ShapeError {
                expected: format!("{} outcome values", n),
                actual: format!("{}", y.len()),
            });
        }
        if importances.len() != x.ncols() {
            return Err(TreetuneError::ShapeError {
                expected: format!("{} importance slots", x.ncols()),
                actual: format!("{}", importances.len()),
            });
        }

        let indices: Vec<usize> = (0..n).collect();
        let root = build_node(x, y, &indices, params, rng, importances);
        Ok(Self { root })
    }

    /// Mean outcome of the leaf each row falls into.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut out = Array1::zeros(x.nrows());
        let mut row = vec![0.0; x.ncols()];
        for i in 0..x.nrows() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = x[[i, j]];
            }
            out[i] = self.predict_row(&row);
        }
        out
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature_idx] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

fn build_node(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &[usize],
    params: &GrowParams,
    rng: &mut ChaCha8Rng,
    importances: &mut [f64],
) -> TreeNode {
    let n = indices.len();
    let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n as f64;

    if n < params.min_node_size.max(2) || is_pure(y, indices) {
        return TreeNode::Leaf {
            value: mean,
            n_samples: n,
        };
    }

    let parent_var = variance(y, indices, mean);
    let p = x.ncols();
    let k = params.mtry.min(p).max(1);
    let candidates = index::sample(rng, p, k).into_vec();

    let mut best: Option<(usize, f64, f64)> = None;
    for &feature in &candidates {
        let mut pairs: Vec<(f64, f64)> = indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
        if let Some((threshold, gain)) = best_split(&mut pairs, parent_var) {
            let better = match best {
                Some((_, _, best_gain)) => gain > best_gain,
                None => true,
            };
            if better {
                best = Some((feature, threshold, gain));
            }
        }
    }

    let (feature, threshold, gain) = match best {
        Some(found) => found,
        None => {
            return TreeNode::Leaf {
                value: mean,
                n_samples: n,
            }
        }
    };

    let mut decrease = n as f64 * gain;
    if params.corrected_importance {
        decrease -= n as f64 * permuted_gain(x, y, indices, feature, parent_var, rng);
    }
    importances[feature] += decrease;

    let mut left_idx = Vec::new();
    let mut right_idx = Vec::new();
    for &i in indices {
        if x[[i, feature]] <= threshold {
            left_idx.push(i);
        } else {
            right_idx.push(i);
        }
    }

    let left = build_node(x, y, &left_idx, params, rng, importances);
    let right = build_node(x, y, &right_idx, params, rng, importances);
    TreeNode::Split {
        feature_idx: feature,
        threshold,
        left: Box::new(left),
        right: Box::new(right),
        n_samples: n,
    }
}

/// Best variance-reducing threshold over one feature's (value, outcome)
/// pairs. Sorts once, then sweeps candidate cut points with running sums.
fn best_split(pairs: &mut [(f64, f64)], parent_var: f64) -> Option<(f64, f64)> {
    let n = pairs.len();
    if n < 2 {
        return None;
    }
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let total_sum: f64 = pairs.iter().map(|(_, y)| y).sum();
    let total_sq: f64 = pairs.iter().map(|(_, y)| y * y).sum();

    let mut left_sum = 0.0;
    let mut left_sq = 0.0;
    let mut best: Option<(f64, f64)> = None;

    for i in 0..n - 1 {
        let (value, outcome) = pairs[i];
        left_sum += outcome;
        left_sq += outcome * outcome;

        let next_value = pairs[i + 1].0;
        if next_value <= value {
            // Tied feature values cannot be separated.
            continue;
        }

        let left_n = (i + 1) as f64;
        let right_n = (n - i - 1) as f64;
        let left_var = (left_sq / left_n - (left_sum / left_n).powi(2)).max(0.0);
        let right_sum = total_sum - left_sum;
        let right_sq = total_sq - left_sq;
        let right_var = (right_sq / right_n - (right_sum / right_n).powi(2)).max(0.0);

        let weighted = (left_n * left_var + right_n * right_var) / n as f64;
        let gain = parent_var - weighted;
        let better = match best {
            Some((_, best_gain)) => gain > best_gain,
            None => gain > 1e-12,
        };
        if better {
            best = Some(((value + next_value) / 2.0, gain));
        }
    }
    best
}

/// Gain the same feature achieves after its values are shuffled within the
/// node. Estimates the chance-level gain that sweep-and-pick overstates.
fn permuted_gain(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &[usize],
    feature: usize,
    parent_var: f64,
    rng: &mut ChaCha8Rng,
) -> f64 {
    let mut values: Vec<f64> = indices.iter().map(|&i| x[[i, feature]]).collect();
    values.shuffle(rng);
    let mut pairs: Vec<(f64, f64)> = values
        .into_iter()
        .zip(indices.iter().map(|&i| y[i]))
        .collect();
    match best_split(&mut pairs, parent_var) {
        Some((_, gain)) => gain,
        None => 0.0,
    }
}

fn is_pure(y: &Array1<f64>, indices: &[usize]) -> bool {
    let first = y[indices[0]];
    indices.iter().all(|&i| (y[i] - first).abs() < 1e-10)
}

fn variance(y: &Array1<f64>, indices: &[usize], mean: f64) -> f64 {
    indices
        .iter()
        .map(|&i| (y[i] - mean).powi(2))
        .sum::<f64>()
        / indices.len() as f64
}
