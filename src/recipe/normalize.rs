//! Standardize numeric predictors to zero mean, unit variance

use crate::data::{column_f64, Schema};
use crate::error::{Result, TreetuneError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Center and scale for one column.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CenterScale {
    center: f64,
    scale: f64,
}

/// Fitted state: per numeric predictor, the training mean and std.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeParams {
    /// column -> (mean, std), frame order
    stats: Vec<(String, CenterScale)>,
}

impl NormalizeParams {
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.stats.iter().map(|(name, _)| name.as_str())
    }
}

pub(crate) fn fit(df: &DataFrame, schema: &Schema) -> Result<NormalizeParams> {
    let mut stats = Vec::new();
    for column in schema.numeric_predictors() {
        let values = column_f64(df, &column)?;
        let n = values.len();
        let mean = values.mean().unwrap_or(0.0);
        let std = if n < 2 {
            1.0
        } else {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
            var.sqrt()
        };
        stats.push((
            column,
            CenterScale {
                center: mean,
                // constant columns would otherwise divide by zero
                scale: if std == 0.0 { 1.0 } else { std },
            },
        ));
    }
    Ok(NormalizeParams { stats })
}

pub(crate) fn apply(df: &DataFrame, params: &NormalizeParams) -> Result<DataFrame> {
    // build all scaled columns first, then swap them in
    let replacements: Vec<Series> = params
        .stats
        .iter()
        .map(|(column, cs)| {
            let col = df
                .column(column)
                .map_err(|_| TreetuneError::ColumnNotFound(column.clone()))?;
            let ca = col
                .as_materialized_series()
                .f64()
                .map_err(|e| TreetuneError::DataError(e.to_string()))?;
            let scaled: Float64Chunked = ca
                .into_iter()
                .map(|opt| opt.map(|v| (v - cs.center) / cs.scale))
                .collect();
            Ok(scaled.with_name(column.as_str().into()).into_series())
        })
        .collect::<Result<Vec<_>>>()?;

    let mut result = df.clone();
    for scaled in replacements {
        result
            .with_column(scaled)
            .map_err(|e| TreetuneError::DataError(e.to_string()))?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DataFrame, Schema) {
        let df = df!(
            "y" => &[1.0, 2.0, 3.0, 4.0, 5.0],
            "a" => &[10.0, 20.0, 30.0, 40.0, 50.0],
            "flat" => &[7.0, 7.0, 7.0, 7.0, 7.0],
            "hood" => &["x", "x", "y", "y", "y"],
        )
        .unwrap();
        let schema = Schema::infer(&df, "y", &[]).unwrap();
        (df, schema)
    }

    #[test]
    fn test_standardizes_numeric_predictors() {
        let (df, schema) = sample();
        let params = fit(&df, &schema).unwrap();
        let out = apply(&df, &params).unwrap();

        let a = column_f64(&out, "a").unwrap();
        assert!(a.mean().unwrap().abs() < 1e-10);
        let var: f64 = a.iter().map(|v| v * v).sum::<f64>() / (a.len() as f64 - 1.0);
        assert!((var - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_outcome_and_nominals_untouched() {
        let (df, schema) = sample();
        let params = fit(&df, &schema).unwrap();
        let out = apply(&df, &params).unwrap();

        let y = column_f64(&out, "y").unwrap();
        assert_eq!(y[4], 5.0);
        assert!(out.column("hood").is_ok());
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let (df, schema) = sample();
        let params = fit(&df, &schema).unwrap();
        let out = apply(&df, &params).unwrap();

        let flat = column_f64(&out, "flat").unwrap();
        assert!(flat.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_missing_fitted_column_at_apply_is_error() {
        let (df, schema) = sample();
        let params = fit(&df, &schema).unwrap();

        let partial = df!("y" => &[1.0], "a" => &[10.0], "hood" => &["x"]).unwrap();
        assert!(apply(&partial, &params).is_err());
    }
}
