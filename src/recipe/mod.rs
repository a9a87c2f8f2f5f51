//! Declarative preprocessing recipes
//!
//! A [`Recipe`] records an ordered list of steps against a role-tagged
//! [`Schema`]. [`Recipe::prep`] fits every step on training data in
//! declaration order, each against the running (already transformed) frame,
//! and returns a [`PreparedRecipe`]. [`PreparedRecipe::bake`] replays the
//! fitted transforms on any compatible frame without recomputing statistics,
//! so train and test are always transformed identically.

mod boxcox;
mod collapse;
mod normalize;
mod onehot;

pub use boxcox::BoxCoxParams;
pub use collapse::CollapseParams;
pub use normalize::NormalizeParams;
pub use onehot::OneHotParams;

use crate::data::{ColumnKind, Role, Schema};
use crate::error::{Result, TreetuneError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single declared preprocessing step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Step {
    /// Collapse infrequent levels of the named nominal columns into "other".
    CollapseRare { columns: Vec<String>, threshold: f64 },
    /// Box-Cox power transform of one numeric predictor, lambda fit by
    /// maximum likelihood on training data.
    BoxCox { column: String },
    /// Standardize every numeric predictor to zero mean, unit variance.
    Normalize,
    /// One-hot encode every nominal predictor.
    OneHot,
}

impl Step {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Step::CollapseRare { .. } => "step_collapse",
            Step::BoxCox { .. } => "step_boxcox",
            Step::Normalize => "step_normalize",
            Step::OneHot => "step_onehot",
        }
    }
}

/// Fitted per-step state.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum FittedStep {
    CollapseRare(CollapseParams),
    BoxCox(BoxCoxParams),
    Normalize(NormalizeParams),
    OneHot(OneHotParams),
}

/// An unfitted, declared preprocessing plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    schema: Schema,
    steps: Vec<Step>,
}

impl Recipe {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            steps: Vec::new(),
        }
    }

    /// Collapse levels of `columns` whose training frequency is below
    /// `threshold` (a proportion) into a shared `"other"` level.
    pub fn step_collapse(mut self, columns: &[&str], threshold: f64) -> Self {
        self.steps.push(Step::CollapseRare {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            threshold,
        });
        self
    }

    /// Box-Cox transform one strictly positive numeric predictor.
    pub fn step_boxcox(mut self, column: &str) -> Self {
        self.steps.push(Step::BoxCox {
            column: column.to_string(),
        });
        self
    }

    /// Standardize all numeric predictors.
    pub fn step_normalize(mut self) -> Self {
        self.steps.push(Step::Normalize);
        self
    }

    /// One-hot encode all nominal predictors.
    pub fn step_onehot(mut self) -> Self {
        self.steps.push(Step::OneHot);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Fit every step against `train`, in declaration order, each on the
    /// frame produced by the steps before it. Statistics are computed here
    /// and never again.
    pub fn prep(&self, train: &DataFrame) -> Result<PreparedRecipe> {
        if train.height() == 0 {
            return Err(TreetuneError::DataError(
                "cannot prep a recipe on an empty frame".to_string(),
            ));
        }

        let mut frame = cast_model_columns(train, &self.schema)?;
        let mut fitted = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let state = match step {
                Step::CollapseRare { columns, threshold } => {
                    let params = collapse::fit(&frame, columns, *threshold, &self.schema)?;
                    frame = collapse::apply(&frame, &params)?;
                    FittedStep::CollapseRare(params)
                }
                Step::BoxCox { column } => {
                    let params = boxcox::fit(&frame, column, &self.schema)?;
                    frame = boxcox::apply(&frame, &params)?;
                    FittedStep::BoxCox(params)
                }
                Step::Normalize => {
                    let params = normalize::fit(&frame, &self.schema)?;
                    frame = normalize::apply(&frame, &params)?;
                    FittedStep::Normalize(params)
                }
                Step::OneHot => {
                    let params = onehot::fit(&frame, &self.schema)?;
                    frame = onehot::apply(&frame, &params)?;
                    FittedStep::OneHot(params)
                }
            };
            debug!(step = step.name(), "prepared step");
            fitted.push(state);
        }

        Ok(PreparedRecipe {
            schema: self.schema.clone(),
            fitted,
        })
    }
}

/// A fitted recipe: fixed per-step state, ready to replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedRecipe {
    schema: Schema,
    fitted: Vec<FittedStep>,
}

impl PreparedRecipe {
    /// Apply the fitted steps, in order, to `df`. No statistics are
    /// recomputed; identical input rows yield identical output.
    pub fn bake(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut frame = cast_model_columns(df, &self.schema)?;
        for step in &self.fitted {
            frame = match step {
                FittedStep::CollapseRare(p) => collapse::apply(&frame, p)?,
                FittedStep::BoxCox(p) => boxcox::apply(&frame, p)?,
                FittedStep::Normalize(p) => normalize::apply(&frame, p)?,
                FittedStep::OneHot(p) => onehot::apply(&frame, p)?,
            };
        }
        Ok(frame)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn onehot_params(&self) -> Option<&OneHotParams> {
        self.fitted.iter().find_map(|f| match f {
            FittedStep::OneHot(p) => Some(p),
            _ => None,
        })
    }

    /// Model-matrix column names after baking, in deterministic schema order.
    /// One-hot encoded nominals expand to their level columns; nominals that
    /// no step encoded keep their name and reach the model as label codes.
    pub fn predictor_columns(&self) -> Vec<String> {
        let onehot = self.onehot_params();
        let mut out = Vec::new();
        for info in self.schema.predictors() {
            match info.kind {
                ColumnKind::Numeric => out.push(info.name.clone()),
                ColumnKind::Nominal => {
                    if let Some(levels) = onehot.and_then(|p| p.levels_for(&info.name)) {
                        for level in levels {
                            out.push(onehot::encoded_name(&info.name, level));
                        }
                    } else {
                        out.push(info.name.clone());
                    }
                }
            }
        }
        out
    }

    /// Nominal predictors left unencoded by the recipe. These survive baking
    /// as string columns and need label coding before the model sees them.
    pub fn passthrough_nominals(&self) -> Vec<String> {
        let onehot = self.onehot_params();
        self.schema
            .predictors()
            .filter(|c| c.kind == ColumnKind::Nominal)
            .filter(|c| onehot.and_then(|p| p.levels_for(&c.name)).is_none())
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Cast numeric predictor and outcome columns to f64 so every downstream
/// step can read them uniformly. Id columns are left untouched. A missing
/// predictor column is a hard error; a missing outcome or id is allowed
/// (prediction frames may omit them).
fn cast_model_columns(df: &DataFrame, schema: &Schema) -> Result<DataFrame> {
    let mut result = df.clone();
    for info in schema.iter() {
        if info.role == Role::Id {
            continue;
        }
        let col = match df.column(&info.name) {
            Ok(c) => c,
            Err(_) if info.role == Role::Outcome => continue,
            Err(_) => return Err(TreetuneError::ColumnNotFound(info.name.clone())),
        };
        if info.kind == ColumnKind::Numeric {
            let casted = col
                .as_materialized_series()
                .cast(&DataType::Float64)
                .map_err(|e| TreetuneError::DataError(e.to_string()))?;
            result
                .with_column(casted)
                .map_err(|e| TreetuneError::DataError(e.to_string()))?;
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::column_f64;

    fn train_df() -> DataFrame {
        df!(
            "price" => &[11.0, 12.0, 13.0, 14.0, 15.0, 16.0],
            "area" => &[100.0, 200.0, 300.0, 400.0, 500.0, 600.0],
            "rooms" => &[1i64, 2, 3, 4, 5, 6],
            "hood" => &["north", "north", "north", "south", "south", "east"],
            "pid" => &["a", "b", "c", "d", "e", "f"],
        )
        .unwrap()
    }

    fn schema() -> Schema {
        Schema::infer(&train_df(), "price", &["pid"]).unwrap()
    }

    #[test]
    fn test_prep_then_bake_full_stack() {
        let train = train_df();
        let recipe = Recipe::new(schema())
            .step_collapse(&["hood"], 0.3)
            .step_boxcox("area")
            .step_normalize()
            .step_onehot();

        let prepared = recipe.prep(&train).unwrap();
        let baked = prepared.bake(&train).unwrap();

        // numeric predictors standardized on training data
        let area = column_f64(&baked, "area").unwrap();
        assert!(area.mean().unwrap().abs() < 1e-9);

        // hood collapsed (east is rare at 1/6 < 0.3) then one-hot encoded
        assert!(baked.column("hood").is_err());
        assert!(baked.column("hood_north").is_ok());
        assert!(baked.column("hood_other").is_ok());

        // id column untouched
        assert!(baked.column("pid").is_ok());
        assert_eq!(
            baked.column("pid").unwrap().dtype(),
            &DataType::String
        );
    }

    #[test]
    fn test_bake_is_deterministic() {
        let train = train_df();
        let recipe = Recipe::new(schema()).step_normalize().step_onehot();
        let prepared = recipe.prep(&train).unwrap();

        let a = prepared.bake(&train).unwrap();
        let b = prepared.bake(&train).unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn test_bake_uses_training_statistics_only() {
        let train = train_df();
        let recipe = Recipe::new(schema()).step_normalize();
        let prepared = recipe.prep(&train).unwrap();

        // a frame whose own mean differs from training; training stats must win
        let other = df!(
            "price" => &[11.0],
            "area" => &[350.0],
            "rooms" => &[3i64],
            "hood" => &["north"],
            "pid" => &["x"],
        )
        .unwrap();
        let baked = prepared.bake(&other).unwrap();
        let area = column_f64(&baked, "area").unwrap();

        // (350 - 350) / sd(train area) = 0: training mean is exactly 350
        assert!(area[0].abs() < 1e-9);
    }

    #[test]
    fn test_missing_step_column_is_hard_error() {
        let train = train_df();
        let recipe = Recipe::new(schema()).step_boxcox("no_such_column");
        let err = recipe.prep(&train).unwrap_err();
        assert!(matches!(err, TreetuneError::RecipeError { .. }));
    }

    #[test]
    fn test_predictor_columns_expand_onehot() {
        let train = train_df();
        let recipe = Recipe::new(schema()).step_onehot();
        let prepared = recipe.prep(&train).unwrap();
        let cols = prepared.predictor_columns();

        assert!(cols.contains(&"area".to_string()));
        assert!(cols.contains(&"hood_north".to_string()));
        assert!(!cols.contains(&"hood".to_string()));
        assert!(!cols.contains(&"pid".to_string()));
        assert!(!cols.contains(&"price".to_string()));
        assert!(prepared.passthrough_nominals().is_empty());
    }

    #[test]
    fn test_passthrough_nominal_without_onehot() {
        let train = train_df();
        let recipe = Recipe::new(schema()).step_normalize();
        let prepared = recipe.prep(&train).unwrap();

        assert_eq!(prepared.passthrough_nominals(), vec!["hood".to_string()]);
        assert!(prepared
            .predictor_columns()
            .contains(&"hood".to_string()));
    }
}
