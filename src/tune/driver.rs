//! Grid-search driver: every grid point scored on every fold.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::Array1;
use polars::prelude::DataFrame;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::cv::vfold;
use super::grid::ParamGrid;
use super::pool::WorkerPool;
use crate::data::{column_f64, take_rows};
use crate::error::{Result, TreetuneError};
use crate::metrics::{Direction, Metric, RegressionMetrics};
use crate::model::HyperParams;
use crate::workflow::Workflow;

/// What to do when a single (grid point, fold) cell fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnCellError {
    /// Record the failure; the grid point aggregates over its completed folds.
    #[default]
    Exclude,
    /// Abort the sweep with the first failure in grid-then-fold order.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneConfig {
    pub folds: usize,
    pub seed: u64,
    pub metric: Metric,
    pub on_error: OnCellError,
    /// Most distinct levels a nominal predictor may show in training before
    /// [`validate`] treats it as an identifier left in the feature set.
    pub max_nominal_levels: usize,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            folds: 3,
            seed: 42,
            metric: Metric::Rmse,
            on_error: OnCellError::Exclude,
            max_nominal_levels: 53,
        }
    }
}

impl TuneConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_on_error(mut self, on_error: OnCellError) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn with_max_nominal_levels(mut self, levels: usize) -> Self {
        self.max_nominal_levels = levels;
        self
    }
}

/// One failed cell, kept alongside the results it is missing from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellError {
    pub grid_index: usize,
    pub params: HyperParams,
    pub fold: usize,
    pub message: String,
}

/// Per-fold scores for one grid point. Failed folds are absent, so
/// `fold_metrics.len()` can be smaller than the fold count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneRow {
    pub grid_index: usize,
    pub params: HyperParams,
    pub fold_metrics: Vec<RegressionMetrics>,
}

impl TuneRow {
    pub fn n_completed(&self) -> usize {
        self.fold_metrics.len()
    }

    /// Mean over completed folds; `None` when every fold failed.
    pub fn mean(&self, metric: Metric) -> Option<f64> {
        if self.fold_metrics.is_empty() {
            return None;
        }
        let sum: f64 = self.fold_metrics.iter().map(|m| m.get(metric)).sum();
        Some(sum / self.fold_metrics.len() as f64)
    }

    /// Standard error of the fold means. A single completed fold has no
    /// spread estimate and reports zero.
    pub fn std_err(&self, metric: Metric) -> Option<f64> {
        let k = self.fold_metrics.len();
        if k == 0 {
            return None;
        }
        if k == 1 {
            return Some(0.0);
        }
        let mean = self.mean(metric)?;
        let var = self
            .fold_metrics
            .iter()
            .map(|m| (m.get(metric) - mean).powi(2))
            .sum::<f64>()
            / (k - 1) as f64;
        Some((var / k as f64).sqrt())
    }
}

/// Outcome of a full sweep: one row per grid point, in grid order, plus
/// every recorded failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneResult {
    pub rows: Vec<TuneRow>,
    pub failures: Vec<CellError>,
    pub metric: Metric,
    pub folds: usize,
}

impl TuneResult {
    /// Grid points with at least one completed fold, best mean first. The
    /// sort is stable, so ties keep grid order.
    pub fn ranked(&self) -> Vec<&TuneRow> {
        let mut rows: Vec<&TuneRow> = self
            .rows
            .iter()
            .filter(|row| row.n_completed() > 0)
            .collect();
        rows.sort_by(|a, b| {
            let ma = a.mean(self.metric).unwrap_or(f64::NAN);
            let mb = b.mean(self.metric).unwrap_or(f64::NAN);
            let ordering = ma.partial_cmp(&mb).unwrap_or(std::cmp::Ordering::Equal);
            match self.metric.direction() {
                Direction::Minimize => ordering,
                Direction::Maximize => ordering.reverse(),
            }
        });
        rows
    }

    pub fn best(&self) -> Result<&TuneRow> {
        self.ranked().into_iter().next().ok_or_else(|| {
            TreetuneError::SelectionError(
                "every grid point failed on every fold".to_string(),
            )
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// What the pre-flight saw: the training frame as the recipe and grid will
/// meet it.
#[derive(Debug, Clone)]
pub struct GridCheck {
    /// Model-matrix width after baking the training frame.
    pub baked_predictors: usize,
    /// Observed training cardinality per nominal predictor.
    pub nominal_levels: Vec<(String, usize)>,
}

/// Check a sweep before any cell runs. Catches the configurations that
/// would otherwise fail `points * folds` times or, worse, quietly fit
/// nonsense: an identifier-like column left as a nominal predictor, a
/// recipe that cannot prep on this frame, and an `mtry` axis wider than
/// the baked model matrix.
pub fn validate(
    workflow: &Workflow,
    train: &DataFrame,
    grid: &ParamGrid,
    cfg: &TuneConfig,
) -> Result<GridCheck> {
    let schema = workflow.recipe().schema();

    let mut nominal_levels = Vec::new();
    for name in schema.nominal_predictors() {
        let col = train
            .column(&name)
            .map_err(|_| TreetuneError::ColumnNotFound(name.clone()))?;
        let levels = col
            .as_materialized_series()
            .n_unique()
            .map_err(|e| TreetuneError::DataError(e.to_string()))?;
        if levels > cfg.max_nominal_levels {
            return Err(TreetuneError::RoleError {
                column: name.clone(),
                reason: format!(
                    "{levels} distinct levels exceed the {} allowed for a nominal \
                     predictor; give identifier-like columns Role::Id",
                    cfg.max_nominal_levels
                ),
            });
        }
        nominal_levels.push((name, levels));
    }

    // One probe prep surfaces recipe/schema errors before the sweep starts.
    let prepared = workflow.recipe().prep(train)?;
    let baked_predictors = prepared.predictor_columns().len();

    let widest_mtry = grid.iter().map(|p| p.mtry).max().unwrap_or(0);
    if widest_mtry > baked_predictors {
        return Err(TreetuneError::GridError(format!(
            "mtry axis reaches {widest_mtry} but the baked frame has only \
             {baked_predictors} predictors"
        )));
    }

    info!(
        baked_predictors,
        nominal = nominal_levels.len(),
        "pre-flight checks passed"
    );
    Ok(GridCheck {
        baked_predictors,
        nominal_levels,
    })
}

/// Score every grid point on every fold inside `pool`.
///
/// Each cell gets its own seed derived from the run seed and its (grid
/// point, fold) coordinates, so results do not depend on scheduling order
/// or worker count. Fold frames are materialized once and shared.
pub fn tune_grid(
    workflow: &Workflow,
    train: &DataFrame,
    grid: &ParamGrid,
    cfg: &TuneConfig,
    pool: &WorkerPool,
) -> Result<TuneResult> {
    let outcome = workflow.recipe().schema().outcome()?.to_string();
    let folds = vfold(train.height(), cfg.folds, cfg.seed)?;

    let fold_frames: Result<Vec<(DataFrame, DataFrame, Array1<f64>)>> = folds
        .iter()
        .map(|fold| {
            let analysis = take_rows(train, &fold.analysis)?;
            let assessment = take_rows(train, &fold.assessment)?;
            let actual = column_f64(&assessment, &outcome)?;
            Ok((analysis, assessment, actual))
        })
        .collect();
    let fold_frames = fold_frames?;
    let n_folds = fold_frames.len();

    info!(
        points = grid.len(),
        folds = n_folds,
        workers = pool.workers(),
        metric = %cfg.metric,
        "starting grid search"
    );

    let cells: Vec<(usize, usize)> = (0..grid.len())
        .flat_map(|gi| (0..n_folds).map(move |fi| (gi, fi)))
        .collect();

    let scored: Vec<(usize, usize, std::result::Result<RegressionMetrics, String>)> =
        pool.install(|| {
            cells
                .par_iter()
                .map(|&(gi, fi)| {
                    let params = grid.points()[gi];
                    let (analysis, assessment, actual) = &fold_frames[fi];
                    let cell_seed = cfg.seed.wrapping_add((gi * n_folds + fi) as u64);
                    let cell =
                        score_cell(workflow, &params, analysis, assessment, actual, cell_seed);
                    (gi, fi, cell.map_err(|e| e.to_string()))
                })
                .collect()
        });

    let mut rows: Vec<TuneRow> = grid
        .iter()
        .enumerate()
        .map(|(grid_index, params)| TuneRow {
            grid_index,
            params: *params,
            fold_metrics: Vec::new(),
        })
        .collect();
    let mut failures = Vec::new();

    for (gi, fi, cell) in scored {
        match cell {
            Ok(metrics) => rows[gi].fold_metrics.push(metrics),
            Err(message) => {
                if cfg.on_error == OnCellError::Fail {
                    return Err(TreetuneError::TuningError(format!(
                        "grid point {} ({}), fold {}: {}",
                        gi,
                        grid.points()[gi],
                        fi,
                        message
                    )));
                }
                warn!(grid_index = gi, fold = fi, error = %message, "cell failed");
                failures.push(CellError {
                    grid_index: gi,
                    params: grid.points()[gi],
                    fold: fi,
                    message,
                });
            }
        }
    }

    info!(failures = failures.len(), "grid search finished");
    Ok(TuneResult {
        rows,
        failures,
        metric: cfg.metric,
        folds: n_folds,
    })
}

fn score_cell(
    workflow: &Workflow,
    params: &HyperParams,
    analysis: &DataFrame,
    assessment: &DataFrame,
    actual: &Array1<f64>,
    seed: u64,
) -> Result<RegressionMetrics> {
    let fitted = workflow.finalize(params).with_seed(seed).fit(analysis)?;
    let predicted = fitted.predict(assessment)?;
    RegressionMetrics::compute(actual, &predicted)
}
