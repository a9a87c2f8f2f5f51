//! Random forest regressor with seeded, parallel tree growth.

use std::fmt;

use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{GrowParams, RegressionTree};
use crate::error::{Result, TreetuneError};

/// How split gains are credited to features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceMode {
    /// Raw mean decrease in node variance.
    Impurity,
    /// Mean decrease minus the gain a within-node permutation of the same
    /// feature would have achieved. Uninformative features land near zero
    /// instead of accumulating optimistic sweep-and-pick gains.
    ImpurityCorrected,
}

/// Treatment of label-coded nominal features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorHandling {
    /// Split on the raw label codes.
    Ignore,
    /// Re-encode each level as the rank of its mean outcome before growing,
    /// so a single ordered split can separate any low/high group of levels.
    OrderByOutcome,
}

/// One point of the tuning space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HyperParams {
    pub mtry: usize,
    pub trees: usize,
    pub min_n: usize,
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mtry={}, trees={}, min_n={}",
            self.mtry, self.trees, self.min_n
        )
    }
}

/// Forest configuration. Tunable fields (`trees`, `mtry`, `min_node_size`)
/// can be overwritten from a [`HyperParams`] via [`ForestSpec::resolve`];
/// the rest is fixed per experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestSpec {
    pub trees: usize,
    /// Candidate features per split; defaults to floor(sqrt(p)).
    pub mtry: Option<usize>,
    pub min_node_size: usize,
    pub importance: ImportanceMode,
    pub factor_handling: FactorHandling,
    pub seed: u64,
}

impl Default for ForestSpec {
    fn default() -> Self {
        Self {
            trees: 500,
            mtry: None,
            min_node_size: 5,
            importance: ImportanceMode::ImpurityCorrected,
            factor_handling: FactorHandling::OrderByOutcome,
            seed: 42,
        }
    }
}

impl ForestSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trees(mut self, trees: usize) -> Self {
        self.trees = trees;
        self
    }

    pub fn with_mtry(mut self, mtry: usize) -> Self {
        self.mtry = Some(mtry);
        self
    }

    pub fn with_min_node_size(mut self, min_node_size: usize) -> Self {
        self.min_node_size = min_node_size;
        self
    }

    pub fn with_importance(mut self, importance: ImportanceMode) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_factor_handling(mut self, factor_handling: FactorHandling) -> Self {
        self.factor_handling = factor_handling;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Copy of this spec with the tunable fields replaced.
    pub fn resolve(&self, params: &HyperParams) -> ForestSpec {
        let mut spec = self.clone();
        spec.trees = params.trees;
        spec.mtry = Some(params.mtry);
        spec.min_node_size = params.min_n;
        spec
    }

    /// Fits the forest. `nominal_columns` names the matrix columns that hold
    /// label codes rather than measurements; they are re-encoded first when
    /// factor handling is [`FactorHandling::OrderByOutcome`].
    pub fn fit(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        nominal_columns: &[usize],
    ) -> Result<RandomForestRegressor> {
        let n = x.nrows();
        let p = x.ncols();
        if n == 0 || p == 0 {
            return Err(TreetuneError::TrainingError(
                "training matrix has no rows or no columns".to_string(),
            ));
        }
        if y.len() != n {
            return Err(TreetuneError::ShapeError {
                expected: format!("{} outcome values", n),
                actual: format!("{}", y.len()),
            });
        }
        if self.trees == 0 {
            return Err(TreetuneError::InvalidParameter {
                name: "trees".to_string(),
                value: "0".to_string(),
                reason: "a forest needs at least one tree".to_string(),
            });
        }
        if self.min_node_size == 0 {
            return Err(TreetuneError::InvalidParameter {
                name: "min_n".to_string(),
                value: "0".to_string(),
                reason: "minimum node size must be at least 1".to_string(),
            });
        }
        if let Some(0) = self.mtry {
            return Err(TreetuneError::InvalidParameter {
                name: "mtry".to_string(),
                value: "0".to_string(),
                reason: "at least one candidate feature per split is required".to_string(),
            });
        }

        let orderings = match self.factor_handling {
            FactorHandling::OrderByOutcome => build_orderings(x, y, nominal_columns)?,
            FactorHandling::Ignore => Vec::new(),
        };
        let x_train = if orderings.is_empty() {
            x.clone()
        } else {
            apply_orderings(x, &orderings)?
        };

        let mtry = self.mtry.unwrap_or_else(|| default_mtry(p)).min(p);
        let grow = GrowParams {
            mtry,
            min_node_size: self.min_node_size,
            corrected_importance: self.importance == ImportanceMode::ImpurityCorrected,
        };
        debug!(
            trees = self.trees,
            mtry,
            min_node_size = self.min_node_size,
            "growing forest"
        );

        let grown: Result<Vec<(RegressionTree, Vec<f64>)>> = (0..self.trees)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(tree_idx as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let x_boot = x_train.select(Axis(0), &sample);
                let y_boot = Array1::from_iter(sample.iter().map(|&i| y[i]));
                let mut importances = vec![0.0; p];
                let tree = RegressionTree::grow(&x_boot, &y_boot, &grow, &mut rng, &mut importances)?;
                Ok((tree, importances))
            })
            .collect();
        let grown = grown?;

        let mut feature_importances = Array1::zeros(p);
        for (_, importances) in &grown {
            for (slot, value) in feature_importances.iter_mut().zip(importances) {
                *slot += value;
            }
        }
        feature_importances /= grown.len() as f64;

        Ok(RandomForestRegressor {
            trees: grown.into_iter().map(|(tree, _)| tree).collect(),
            n_features: p,
            feature_importances,
            orderings,
        })
    }
}

/// Fitted ensemble. Prediction averages the member trees; nominal columns
/// are passed through the same outcome-mean re-encoding the forest was
/// trained on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
    n_features: usize,
    feature_importances: Array1<f64>,
    orderings: Vec<CodeOrdering>,
}

impl RandomForestRegressor {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(TreetuneError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(TreetuneError::ShapeError {
                expected: format!("{} feature columns", self.n_features),
                actual: format!("{}", x.ncols()),
            });
        }
        if x.nrows() == 0 {
            return Ok(Array1::zeros(0));
        }

        let x_mapped = if self.orderings.is_empty() {
            x.clone()
        } else {
            apply_orderings(x, &self.orderings)?
        };
        let per_tree: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(&x_mapped))
            .collect();

        let mut out = Array1::zeros(x.nrows());
        for preds in &per_tree {
            out += preds;
        }
        out /= self.trees.len() as f64;
        Ok(out)
    }

    /// Per-feature mean decrease in node variance, corrected or raw
    /// depending on the [`ImportanceMode`] the forest was fitted with.
    pub fn feature_importances(&self) -> &Array1<f64> {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

fn default_mtry(p: usize) -> usize {
    ((p as f64).sqrt().floor() as usize).max(1)
}

/// Outcome-mean rank for each label code of one column. Codes absent from
/// the training sample have no rank and are rejected at prediction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CodeOrdering {
    column: usize,
    ranks: Vec<Option<f64>>,
}

fn code_of(value: f64, column: usize) -> Result<usize> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(TreetuneError::TrainingError(format!(
            "column {} is not label-coded: found value {}",
            column, value
        )));
    }
    Ok(value as usize)
}

fn build_orderings(
    x: &Array2<f64>,
    y: &Array1<f64>,
    nominal_columns: &[usize],
) -> Result<Vec<CodeOrdering>> {
    let p = x.ncols();
    let mut orderings = Vec::with_capacity(nominal_columns.len());
    for &column in nominal_columns {
        if column >= p {
            return Err(TreetuneError::InvalidParameter {
                name: "nominal_columns".to_string(),
                value: column.to_string(),
                reason: format!("matrix has only {} columns", p),
            });
        }

        let mut sums: Vec<f64> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        for row in 0..x.nrows() {
            let code = code_of(x[[row, column]], column)?;
            if code >= sums.len() {
                sums.resize(code + 1, 0.0);
                counts.resize(code + 1, 0);
            }
            sums[code] += y[row];
            counts[code] += 1;
        }

        let mut seen: Vec<(usize, f64)> = counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(code, &count)| (code, sums[code] / count as f64))
            .collect();
        seen.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        let mut ranks = vec![None; counts.len()];
        for (rank, (code, _)) in seen.iter().enumerate() {
            ranks[*code] = Some(rank as f64);
        }
        orderings.push(CodeOrdering { column, ranks });
    }
    Ok(orderings)
}

fn apply_orderings(x: &Array2<f64>, orderings: &[CodeOrdering]) -> Result<Array2<f64>> {
    let mut mapped = x.clone();
    for ordering in orderings {
        for row in 0..mapped.nrows() {
            let code = code_of(mapped[[row, ordering.column]], ordering.column)?;
            let rank = ordering
                .ranks
                .get(code)
                .copied()
                .flatten()
                .ok_or_else(|| {
                    TreetuneError::DataError(format!(
                        "unseen label code {} in column {}",
                        code, ordering.column
                    ))
                })?;
            mapped[[row, ordering.column]] = rank;
        }
    }
    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn linear_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                ((i * 7919) % 83) as f64
            }
        });
        let y = Array1::from_shape_fn(n, |i| 3.0 * i as f64);
        (x, y)
    }

    #[test]
    fn test_same_seed_reproduces_predictions() {
        let (x, y) = linear_data(60);
        let spec = ForestSpec::new().with_trees(15).with_seed(123);

        let a = spec.fit(&x, &y, &[]).unwrap().predict(&x).unwrap();
        let b = spec.fit(&x, &y, &[]).unwrap().predict(&x).unwrap();
        assert_eq!(a, b);

        let c = spec
            .with_seed(124)
            .fit(&x, &y, &[])
            .unwrap()
            .predict(&x)
            .unwrap();
        assert!(a.iter().zip(c.iter()).any(|(u, v)| u != v));
    }

    #[test]
    fn test_forest_learns_linear_signal() {
        let (x, y) = linear_data(80);
        let model = ForestSpec::new()
            .with_trees(40)
            .with_min_node_size(2)
            .with_seed(7)
            .fit(&x, &y, &[])
            .unwrap();

        let preds = model.predict(&x).unwrap();
        let rmse = (preds
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            / y.len() as f64)
            .sqrt();
        assert!(rmse < 10.0, "rmse too high: {}", rmse);
    }

    #[test]
    fn test_default_mtry_is_sqrt_p() {
        let x = Array2::from_shape_fn((50, 9), |(i, j)| ((i * (j + 3) * 31) % 101) as f64);
        let y = Array1::from_shape_fn(50, |i| x[[i, 0]] + 2.0 * x[[i, 4]]);

        let implicit = ForestSpec::new().with_trees(5).fit(&x, &y, &[]).unwrap();
        let explicit = ForestSpec::new()
            .with_trees(5)
            .with_mtry(3)
            .fit(&x, &y, &[])
            .unwrap();
        assert_eq!(
            implicit.predict(&x).unwrap(),
            explicit.predict(&x).unwrap()
        );
    }

    #[test]
    fn test_order_by_outcome_ranks_levels_by_mean() {
        let mut x = Array2::zeros((30, 1));
        let mut y = Array1::zeros(30);
        for i in 0..30 {
            let code = (i % 3) as f64;
            x[[i, 0]] = code;
            y[i] = match i % 3 {
                0 => 50.0,
                1 => 10.0,
                _ => 30.0,
            };
        }

        let orderings = build_orderings(&x, &y, &[0]).unwrap();
        assert_eq!(orderings.len(), 1);
        assert_eq!(
            orderings[0].ranks,
            vec![Some(2.0), Some(0.0), Some(1.0)]
        );
    }

    #[test]
    fn test_unseen_code_rejected_at_predict() {
        let mut x = Array2::zeros((20, 1));
        let mut y = Array1::zeros(20);
        for i in 0..20 {
            x[[i, 0]] = (i % 2) as f64;
            y[i] = (i % 2) as f64 * 10.0;
        }
        let model = ForestSpec::new().with_trees(5).fit(&x, &y, &[0]).unwrap();

        let probe = ndarray::array![[5.0]];
        let result = model.predict(&probe);
        assert!(matches!(result, Err(TreetuneError::DataError(_))));
    }

    #[test]
    fn test_non_integer_label_code_rejected() {
        let x = ndarray::array![[0.0], [1.5], [1.0]];
        let y = ndarray::array![1.0, 2.0, 3.0];
        let result = ForestSpec::new().with_trees(3).fit(&x, &y, &[0]);
        assert!(matches!(result, Err(TreetuneError::TrainingError(_))));
    }

    #[test]
    fn test_corrected_importance_discounts_noise() {
        let n = 150;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                ((i * 2654435761) % 97) as f64
            }
        });
        let y = Array1::from_shape_fn(n, |i| if i < n / 2 { 0.0 } else { 10.0 });

        let base = ForestSpec::new().with_trees(50).with_mtry(1).with_seed(9);
        let raw = base
            .clone()
            .with_importance(ImportanceMode::Impurity)
            .fit(&x, &y, &[])
            .unwrap();
        let corrected = base
            .with_importance(ImportanceMode::ImpurityCorrected)
            .fit(&x, &y, &[])
            .unwrap();

        assert!(corrected.feature_importances()[0] > 0.0);
        assert!(corrected.feature_importances()[1] < raw.feature_importances()[1]);
    }

    #[test]
    fn test_invalid_spec_rejected() {
        let x = ndarray::array![[1.0], [2.0]];
        let y = ndarray::array![1.0, 2.0];

        let no_trees = ForestSpec::new().with_trees(0).fit(&x, &y, &[]);
        assert!(matches!(
            no_trees,
            Err(TreetuneError::InvalidParameter { .. })
        ));

        let no_min = ForestSpec::new().with_min_node_size(0).fit(&x, &y, &[]);
        assert!(matches!(no_min, Err(TreetuneError::InvalidParameter { .. })));
    }

    #[test]
    fn test_resolve_overwrites_tunables() {
        let spec = ForestSpec::new().with_seed(99);
        let resolved = spec.resolve(&HyperParams {
            mtry: 7,
            trees: 250,
            min_n: 4,
        });
        assert_eq!(resolved.trees, 250);
        assert_eq!(resolved.mtry, Some(7));
        assert_eq!(resolved.min_node_size, 4);
        assert_eq!(resolved.seed, 99);
    }
}
