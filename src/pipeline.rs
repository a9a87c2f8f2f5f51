//! End-to-end run: load, split, tune over a grid, select, final fit, report.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::{column_f64, drop_columns, log_transform, read_csv, train_test_split, Schema};
use crate::error::Result;
use crate::metrics::{Metric, RegressionMetrics};
use crate::model::{ForestSpec, HyperParams};
use crate::recipe::Recipe;
use crate::report;
use crate::tune::{
    select, tune_grid, validate, GridSpec, OnCellError, ParamAxis, SelectionRule, Simplicity,
    TuneConfig, TuneResult, WorkerPool,
};
use crate::workflow::Workflow;

/// Everything one tuning run needs. Fields are public so callers can adjust
/// single knobs from the house defaults in [`RunConfig::new`], with builders
/// for the ones adjusted most.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub data: PathBuf,
    /// Raw outcome column name.
    pub outcome: String,
    pub id_columns: Vec<String>,
    /// Metadata columns stripped right after load.
    pub drop_columns: Vec<String>,
    /// Replace the outcome with its natural log before splitting.
    pub log_outcome: bool,
    pub train_fraction: f64,
    pub seed: u64,
    pub folds: usize,
    pub metric: Metric,
    pub grid: GridSpec,
    /// Levels per axis for the regular grid (mtry, trees, min_n).
    pub levels: (usize, usize, usize),
    /// Collapse-rare threshold; `None` skips the step entirely.
    pub collapse_threshold: Option<f64>,
    /// Columns to collapse; empty means every nominal predictor.
    pub collapse_columns: Vec<String>,
    pub boxcox_column: Option<String>,
    /// Worker threads for the sweep; zero means one per core.
    pub workers: usize,
    pub rule: SelectionRule,
    pub on_error: OnCellError,
    /// Pre-flight cardinality cap for nominal predictors.
    pub max_nominal_levels: usize,
    pub out_dir: PathBuf,
}

impl RunConfig {
    pub fn new(data: impl Into<PathBuf>, outcome: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            outcome: outcome.into(),
            id_columns: Vec::new(),
            drop_columns: Vec::new(),
            log_outcome: true,
            train_fraction: 0.7,
            seed: 42,
            folds: 3,
            metric: Metric::Rmse,
            grid: GridSpec::default(),
            levels: (8, 10, 5),
            collapse_threshold: Some(0.05),
            collapse_columns: Vec::new(),
            boxcox_column: None,
            workers: 0,
            rule: SelectionRule::Best,
            on_error: OnCellError::Exclude,
            max_nominal_levels: 53,
            out_dir: PathBuf::from("treetune-out"),
        }
    }

    pub fn with_id_columns(mut self, ids: &[&str]) -> Self {
        self.id_columns = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    pub fn with_grid(mut self, grid: GridSpec) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_levels(mut self, mtry: usize, trees: usize, min_n: usize) -> Self {
        self.levels = (mtry, trees, min_n);
        self
    }

    pub fn with_rule(mut self, rule: SelectionRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }
}

/// What one selection rule would have picked from the sweep.
#[derive(Debug, Clone, Serialize)]
pub struct RuleChoice {
    pub rule: String,
    pub params: HyperParams,
    pub cv_mean: f64,
}

/// One leading grid point, condensed for the report.
#[derive(Debug, Clone, Serialize)]
pub struct GridPointSummary {
    pub params: HyperParams,
    pub mean: f64,
    pub std_err: f64,
    pub n_completed: usize,
}

/// Summary of a finished run; the heavier artifacts live under `out_dir`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub chosen: HyperParams,
    pub metric: Metric,
    pub cv_mean: f64,
    pub cv_std_err: f64,
    pub test: RegressionMetrics,
    pub n_train: usize,
    pub n_test: usize,
    pub n_failures: usize,
    /// Best few grid points by mean metric.
    pub top: Vec<GridPointSummary>,
    /// What each selection rule picks, for comparison against `chosen`.
    pub selections: Vec<RuleChoice>,
    /// Leading features by importance.
    pub importance: Vec<(String, f64)>,
    pub out_dir: PathBuf,
}

pub fn run(cfg: &RunConfig) -> Result<RunReport> {
    let raw = read_csv(&cfg.data)?;
    info!(rows = raw.height(), cols = raw.width(), "loaded data");

    let raw = if cfg.drop_columns.is_empty() {
        raw
    } else {
        let names: Vec<&str> = cfg.drop_columns.iter().map(String::as_str).collect();
        drop_columns(&raw, &names)?
    };

    let ids: Vec<&str> = cfg.id_columns.iter().map(String::as_str).collect();
    let schema = Schema::infer(&raw, &cfg.outcome, &ids)?;

    let data = if cfg.log_outcome {
        log_transform(&raw, &cfg.outcome)?
    } else {
        raw
    };
    let split = train_test_split(&data, cfg.train_fraction, cfg.seed)?;
    info!(
        train = split.train.height(),
        test = split.test.height(),
        "split data"
    );

    let recipe = build_recipe(cfg, schema);
    let workflow = Workflow::new(recipe, ForestSpec::new().with_seed(cfg.seed));

    let grid = cfg.grid.regular(cfg.levels.0, cfg.levels.1, cfg.levels.2)?;
    let tune_cfg = TuneConfig::new()
        .with_folds(cfg.folds)
        .with_seed(cfg.seed)
        .with_metric(cfg.metric)
        .with_on_error(cfg.on_error)
        .with_max_nominal_levels(cfg.max_nominal_levels);
    validate(&workflow, &split.train, &grid, &tune_cfg)?;

    let pool = WorkerPool::new(cfg.workers)?;
    let result = tune_grid(&workflow, &split.train, &grid, &tune_cfg, &pool)?;

    let chosen = select(&result, &cfg.rule)?;
    let chosen_params = chosen.params;
    let cv_mean = chosen.mean(result.metric).unwrap_or(f64::NAN);
    let cv_std_err = chosen.std_err(result.metric).unwrap_or(0.0);
    info!(params = %chosen_params, cv_mean, "selected grid point");

    let fitted = workflow.finalize(&chosen_params).fit(&split.train)?;
    let predicted = fitted.predict(&split.test)?;
    let actual = column_f64(&split.test, &cfg.outcome)?;
    let test = RegressionMetrics::compute(&actual, &predicted)?;
    info!(%test, "scored held-out test set");

    std::fs::create_dir_all(&cfg.out_dir)?;
    report::save_csv(
        &report::tune_table(&result)?,
        &cfg.out_dir.join("tune_results.csv"),
    )?;
    result.save(&cfg.out_dir.join("tune_results.json"))?;
    report::save_csv(
        &report::comparison_frame(&actual, &predicted)?,
        &cfg.out_dir.join("predictions.csv"),
    )?;
    report::scatter_svg(
        &actual,
        &predicted,
        "predicted vs actual",
        &cfg.out_dir.join("predicted_vs_actual.svg"),
    )?;
    report::save_csv(
        &report::importance_table(&fitted.importance_report())?,
        &cfg.out_dir.join("importance.csv"),
    )?;
    fitted.save(&cfg.out_dir.join("model.json"))?;

    let run_report = RunReport {
        chosen: chosen_params,
        metric: result.metric,
        cv_mean,
        cv_std_err,
        test,
        n_train: split.train.height(),
        n_test: split.test.height(),
        n_failures: result.failures.len(),
        top: top_points(&result, 5),
        selections: rule_choices(&result),
        importance: fitted.importance_report().into_iter().take(10).collect(),
        out_dir: cfg.out_dir.clone(),
    };
    let file = File::create(cfg.out_dir.join("report.json"))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &run_report)?;
    Ok(run_report)
}

/// The best few grid points, condensed.
fn top_points(result: &TuneResult, n: usize) -> Vec<GridPointSummary> {
    result
        .ranked()
        .into_iter()
        .take(n)
        .map(|row| GridPointSummary {
            params: row.params,
            mean: row.mean(result.metric).unwrap_or(f64::NAN),
            std_err: row.std_err(result.metric).unwrap_or(0.0),
            n_completed: row.n_completed(),
        })
        .collect()
}

/// What each rule picks from this sweep, trading trees for performance. A
/// rule that cannot qualify any grid point is absent rather than an error.
fn rule_choices(result: &TuneResult) -> Vec<RuleChoice> {
    let simplicity = Simplicity::new(ParamAxis::Trees, ParamAxis::Trees.default_simplicity());
    let rules = [
        ("best", SelectionRule::Best),
        ("one_std_err", SelectionRule::OneStdErr(simplicity)),
        (
            "pct_loss_2",
            SelectionRule::PctLoss {
                limit: 2.0,
                simplicity,
            },
        ),
    ];
    rules
        .into_iter()
        .filter_map(|(name, rule)| {
            select(result, &rule).ok().map(|row| RuleChoice {
                rule: name.to_string(),
                params: row.params,
                cv_mean: row.mean(result.metric).unwrap_or(f64::NAN),
            })
        })
        .collect()
}

fn build_recipe(cfg: &RunConfig, schema: Schema) -> Recipe {
    let nominals = schema.nominal_predictors();
    let mut recipe = Recipe::new(schema);

    if let Some(threshold) = cfg.collapse_threshold {
        let columns: Vec<&str> = if cfg.collapse_columns.is_empty() {
            nominals.iter().map(String::as_str).collect()
        } else {
            cfg.collapse_columns.iter().map(String::as_str).collect()
        };
        if !columns.is_empty() {
            recipe = recipe.step_collapse(&columns, threshold);
        }
    }
    if let Some(column) = &cfg.boxcox_column {
        recipe = recipe.step_boxcox(column);
    }
    recipe.step_normalize().step_onehot()
}
