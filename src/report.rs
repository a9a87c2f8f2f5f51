//! Result tables and artifacts: CSV exports and the predicted-vs-actual plot.

use std::fs::File;
use std::path::Path;

use ndarray::Array1;
use plotters::prelude::*;
use polars::prelude::*;
use tracing::info;

use crate::error::{Result, TreetuneError};
use crate::tune::TuneResult;

/// Predicted-vs-actual table with residuals, one row per test observation.
pub fn comparison_frame(actual: &Array1<f64>, predicted: &Array1<f64>) -> Result<DataFrame> {
    if actual.len() != predicted.len() {
        return Err(TreetuneError::ShapeError {
            expected: format!("{} predictions", actual.len()),
            actual: format!("{}", predicted.len()),
        });
    }
    let residual: Vec<f64> = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| a - p)
        .collect();
    let frame = df!(
        "actual" => actual.to_vec(),
        "predicted" => predicted.to_vec(),
        "residual" => residual,
    )?;
    Ok(frame)
}

/// Flat per-grid-point table of the sweep: parameters, completed fold count,
/// and mean/standard error of the primary metric. Grid points that failed
/// every fold have no mean and are left out.
pub fn tune_table(result: &TuneResult) -> Result<DataFrame> {
    let mut mtry: Vec<u32> = Vec::new();
    let mut trees: Vec<u32> = Vec::new();
    let mut min_n: Vec<u32> = Vec::new();
    let mut n_completed: Vec<u32> = Vec::new();
    let mut mean: Vec<f64> = Vec::new();
    let mut std_err: Vec<f64> = Vec::new();

    for row in &result.rows {
        let row_mean = match row.mean(result.metric) {
            Some(value) => value,
            None => continue,
        };
        mtry.push(row.params.mtry as u32);
        trees.push(row.params.trees as u32);
        min_n.push(row.params.min_n as u32);
        n_completed.push(row.n_completed() as u32);
        mean.push(row_mean);
        std_err.push(row.std_err(result.metric).unwrap_or(0.0));
    }

    let metric: Vec<String> = vec![result.metric.to_string(); mtry.len()];
    let frame = df!(
        "mtry" => mtry,
        "trees" => trees,
        "min_n" => min_n,
        "metric" => metric,
        "mean" => mean,
        "std_err" => std_err,
        "n_completed" => n_completed,
    )?;
    Ok(frame)
}

/// Feature importance table in the order given (callers pass it sorted).
pub fn importance_table(report: &[(String, f64)]) -> Result<DataFrame> {
    let features: Vec<String> = report.iter().map(|(name, _)| name.clone()).collect();
    let importance: Vec<f64> = report.iter().map(|(_, value)| *value).collect();
    let frame = df!(
        "feature" => features,
        "importance" => importance,
    )?;
    Ok(frame)
}

pub fn save_csv(frame: &DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).finish(&mut frame.clone())?;
    info!(path = %path.display(), rows = frame.height(), "wrote csv");
    Ok(())
}

/// Predicted-vs-actual scatter with the y = x reference line, written as SVG.
pub fn scatter_svg(
    actual: &Array1<f64>,
    predicted: &Array1<f64>,
    title: &str,
    path: &Path,
) -> Result<()> {
    if actual.len() != predicted.len() {
        return Err(TreetuneError::ShapeError {
            expected: format!("{} predictions", actual.len()),
            actual: format!("{}", predicted.len()),
        });
    }
    if actual.is_empty() {
        return Err(TreetuneError::ReportError("nothing to plot".to_string()));
    }

    let lo = actual
        .iter()
        .chain(predicted.iter())
        .fold(f64::INFINITY, |acc, &v| acc.min(v));
    let hi = actual
        .iter()
        .chain(predicted.iter())
        .fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    if !lo.is_finite() || !hi.is_finite() {
        return Err(TreetuneError::ReportError(
            "cannot plot non-finite values".to_string(),
        ));
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
    let (lo, hi) = (lo - pad, hi + pad);

    let root = SVGBackend::new(path, (800, 800)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| TreetuneError::ReportError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(16)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 44)
        .build_cartesian_2d(lo..hi, lo..hi)
        .map_err(|e| TreetuneError::ReportError(e.to_string()))?;

    chart
        .configure_mesh()
        .x_desc("actual")
        .y_desc("predicted")
        .draw()
        .map_err(|e| TreetuneError::ReportError(e.to_string()))?;

    chart
        .draw_series(LineSeries::new(vec![(lo, lo), (hi, hi)], &BLACK))
        .map_err(|e| TreetuneError::ReportError(e.to_string()))?;
    chart
        .draw_series(
            actual
                .iter()
                .zip(predicted.iter())
                .map(|(&a, &p)| Circle::new((a, p), 3, BLUE.filled())),
        )
        .map_err(|e| TreetuneError::ReportError(e.to_string()))?;

    root.present()
        .map_err(|e| TreetuneError::ReportError(e.to_string()))?;
    info!(path = %path.display(), points = actual.len(), "wrote scatter plot");
    Ok(())
}
