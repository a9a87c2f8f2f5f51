//! Workflow: a preprocessing recipe bundled with a model spec.
//!
//! [`Workflow::fit`] preps the recipe on the training frame, assembles the
//! model matrix, and fits the forest in one call. The returned
//! [`FittedWorkflow`] replays the fitted recipe on prediction frames, so
//! test data is never used to compute preprocessing statistics.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{column_f64, column_str};
use crate::error::{Result, TreetuneError};
use crate::model::{ForestSpec, HyperParams, RandomForestRegressor};
use crate::recipe::{PreparedRecipe, Recipe};

#[derive(Debug, Clone)]
pub struct Workflow {
    recipe: Recipe,
    spec: ForestSpec,
}

impl Workflow {
    pub fn new(recipe: Recipe, spec: ForestSpec) -> Self {
        Self { recipe, spec }
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn spec(&self) -> &ForestSpec {
        &self.spec
    }

    /// New workflow with the tunable model fields replaced; `self` is left
    /// untouched so one template can be finalized once per grid point.
    pub fn finalize(&self, params: &HyperParams) -> Workflow {
        Workflow {
            recipe: self.recipe.clone(),
            spec: self.spec.resolve(params),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.spec = self.spec.with_seed(seed);
        self
    }

    /// Prep the recipe on `train`, bake it, and fit the forest on the
    /// resulting matrix. All preprocessing statistics come from `train`.
    pub fn fit(&self, train: &DataFrame) -> Result<FittedWorkflow> {
        let outcome = self.recipe.schema().outcome()?.to_string();
        let prepared = self.recipe.prep(train)?;
        let baked = prepared.bake(train)?;

        let label_maps = build_label_maps(&baked, &prepared)?;
        let feature_names = prepared.predictor_columns();
        let (x, nominal_columns) = assemble_matrix(&baked, &feature_names, &label_maps)?;
        let y = column_f64(&baked, &outcome)?;

        debug!(
            rows = x.nrows(),
            features = x.ncols(),
            "fitting workflow"
        );
        let model = self.spec.fit(&x, &y, &nominal_columns)?;

        Ok(FittedWorkflow {
            prepared,
            model,
            outcome,
            feature_names,
            label_maps,
        })
    }
}

/// A fitted workflow: frozen recipe state plus the trained forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedWorkflow {
    prepared: PreparedRecipe,
    model: RandomForestRegressor,
    outcome: String,
    feature_names: Vec<String>,
    label_maps: Vec<(String, Vec<String>)>,
}

impl FittedWorkflow {
    /// Bake `df` through the fitted recipe and predict. The frame may omit
    /// the outcome and id columns.
    pub fn predict(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let baked = self.prepared.bake(df)?;
        let (x, _) = assemble_matrix(&baked, &self.feature_names, &self.label_maps)?;
        self.model.predict(&x)
    }

    pub fn outcome_name(&self) -> &str {
        &self.outcome
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn model(&self) -> &RandomForestRegressor {
        &self.model
    }

    pub fn prepared_recipe(&self) -> &PreparedRecipe {
        &self.prepared
    }

    /// Feature importances paired with their column names, best first.
    pub fn importance_report(&self) -> Vec<(String, f64)> {
        let mut rows: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.model.feature_importances().iter().copied())
            .collect();
        rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        rows
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// First-seen level list per passthrough nominal, built from the baked
/// training frame. The position of a level is its label code.
fn build_label_maps(
    baked: &DataFrame,
    prepared: &PreparedRecipe,
) -> Result<Vec<(String, Vec<String>)>> {
    let mut maps = Vec::new();
    for name in prepared.passthrough_nominals() {
        let values = column_str(baked, &name)?;
        let mut levels: Vec<String> = Vec::new();
        for value in values {
            if !levels.contains(&value) {
                levels.push(value);
            }
        }
        maps.push((name, levels));
    }
    Ok(maps)
}

/// Stack the named predictor columns of a baked frame into an `n x p`
/// matrix. Passthrough nominals are label-coded through `label_maps`; a
/// level missing from its map is a hard error.
fn assemble_matrix(
    baked: &DataFrame,
    feature_names: &[String],
    label_maps: &[(String, Vec<String>)],
) -> Result<(Array2<f64>, Vec<usize>)> {
    let n = baked.height();
    let mut x = Array2::zeros((n, feature_names.len()));
    let mut nominal_columns = Vec::new();

    for (j, name) in feature_names.iter().enumerate() {
        if let Some((_, levels)) = label_maps.iter().find(|(column, _)| column == name) {
            nominal_columns.push(j);
            let values = column_str(baked, name)?;
            for (i, value) in values.iter().enumerate() {
                let code = levels.iter().position(|level| level == value).ok_or_else(|| {
                    TreetuneError::DataError(format!(
                        "unknown level '{}' in column '{}'",
                        value, name
                    ))
                })?;
                x[[i, j]] = code as f64;
            }
        } else {
            let values = column_f64(baked, name)?;
            for (i, value) in values.iter().enumerate() {
                x[[i, j]] = *value;
            }
        }
    }
    Ok((x, nominal_columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Schema;
    use polars::prelude::*;

    fn train_df() -> DataFrame {
        let n = 24;
        let price: Vec<f64> = (0..n).map(|i| 10.0 + i as f64 * 0.5).collect();
        let area: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 40.0).collect();
        let rooms: Vec<i64> = (0..n).map(|i| 1 + (i % 6) as i64).collect();
        let hood: Vec<&str> = (0..n)
            .map(|i| if i % 2 == 0 { "north" } else { "south" })
            .collect();
        let pid: Vec<String> = (0..n).map(|i| format!("p{}", i)).collect();
        df!(
            "price" => price,
            "area" => area,
            "rooms" => rooms,
            "hood" => hood,
            "pid" => pid,
        )
        .unwrap()
    }

    fn workflow(train: &DataFrame) -> Workflow {
        let schema = Schema::infer(train, "price", &["pid"]).unwrap();
        let recipe = Recipe::new(schema).step_normalize().step_onehot();
        Workflow::new(recipe, ForestSpec::new().with_trees(10).with_seed(3))
    }

    #[test]
    fn test_fit_then_predict() {
        let train = train_df();
        let fitted = workflow(&train).fit(&train).unwrap();
        let preds = fitted.predict(&train).unwrap();

        assert_eq!(preds.len(), train.height());
        assert!(preds.iter().all(|p| p.is_finite()));
        assert_eq!(fitted.outcome_name(), "price");
    }

    #[test]
    fn test_finalize_leaves_original_untouched() {
        let train = train_df();
        let wf = workflow(&train);
        let finalized = wf.finalize(&HyperParams {
            mtry: 2,
            trees: 25,
            min_n: 3,
        });

        assert_eq!(finalized.spec().trees, 25);
        assert_eq!(finalized.spec().mtry, Some(2));
        assert_eq!(wf.spec().trees, 10);
        assert_eq!(wf.spec().mtry, None);
    }

    #[test]
    fn test_prediction_has_no_per_frame_state() {
        let train = train_df();
        let fitted = workflow(&train).fit(&train).unwrap();

        // a row predicted alone must score the same as inside a batch
        let full = fitted.predict(&train).unwrap();
        let single = fitted.predict(&train.slice(5, 1)).unwrap();
        assert_eq!(full[5], single[0]);
    }

    #[test]
    fn test_predict_frame_may_omit_outcome_and_id() {
        let train = train_df();
        let fitted = workflow(&train).fit(&train).unwrap();

        let unlabeled = train.drop("price").unwrap().drop("pid").unwrap();
        let preds = fitted.predict(&unlabeled).unwrap();
        assert_eq!(preds.len(), train.height());
    }

    #[test]
    fn test_unknown_passthrough_level_rejected() {
        let train = train_df();
        let schema = Schema::infer(&train, "price", &["pid"]).unwrap();
        // no one-hot step: hood reaches the model as label codes
        let recipe = Recipe::new(schema).step_normalize();
        let wf = Workflow::new(recipe, ForestSpec::new().with_trees(5).with_seed(1));
        let fitted = wf.fit(&train).unwrap();

        let probe = df!(
            "price" => &[12.0],
            "area" => &[300.0],
            "rooms" => &[2i64],
            "hood" => &["zed"],
            "pid" => &["q"],
        )
        .unwrap();
        let err = fitted.predict(&probe).unwrap_err();
        assert!(err.to_string().contains("unknown level"));
    }

    #[test]
    fn test_importance_report_sorted_descending() {
        let train = train_df();
        let fitted = workflow(&train).fit(&train).unwrap();
        let report = fitted.importance_report();

        assert_eq!(report.len(), fitted.feature_names().len());
        for pair in report.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }
}
