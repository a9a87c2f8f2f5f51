//! Box-Cox power transform with maximum-likelihood lambda estimation

use crate::data::{column_f64, ColumnKind, Role, Schema};
use crate::error::{Result, TreetuneError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

const STEP: &str = "step_boxcox";

/// Fitted state: the column and its estimated lambda.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxCoxParams {
    pub column: String,
    pub lambda: f64,
}

pub(crate) fn fit(df: &DataFrame, column: &str, schema: &Schema) -> Result<BoxCoxParams> {
    let info = schema
        .get(column)
        .ok_or_else(|| TreetuneError::RecipeError {
            step: STEP.to_string(),
            column: column.to_string(),
            reason: "column is missing from the input schema".to_string(),
        })?;
    if info.kind != ColumnKind::Numeric {
        return Err(TreetuneError::RecipeError {
            step: STEP.to_string(),
            column: column.to_string(),
            reason: "column is not numeric".to_string(),
        });
    }
    if info.role != Role::Predictor {
        return Err(TreetuneError::RoleError {
            column: column.to_string(),
            reason: "box-cox applies to predictor columns only".to_string(),
        });
    }

    let values = column_f64(df, column)?.to_vec();
    check_positive(&values, column)?;

    let lambda = estimate_lambda(&values);
    debug!(column, lambda, "estimated box-cox lambda");
    Ok(BoxCoxParams {
        column: column.to_string(),
        lambda,
    })
}

pub(crate) fn apply(df: &DataFrame, params: &BoxCoxParams) -> Result<DataFrame> {
    let values = column_f64(df, &params.column)?.to_vec();
    check_positive(&values, &params.column)?;

    let transformed: Float64Chunked = values
        .iter()
        .map(|&v| Some(transform_value(v, params.lambda)))
        .collect();

    let mut result = df.clone();
    result
        .with_column(
            transformed
                .with_name(params.column.as_str().into())
                .into_series(),
        )
        .map_err(|e| TreetuneError::DataError(e.to_string()))?;
    Ok(result)
}

/// Non-positive data has no Box-Cox image; erroring beats silently shifting.
fn check_positive(values: &[f64], column: &str) -> Result<()> {
    if let Some(bad) = values.iter().find(|&&v| v <= 0.0) {
        return Err(TreetuneError::RecipeError {
            step: STEP.to_string(),
            column: column.to_string(),
            reason: format!("non-positive value {bad}; the transform needs strictly positive data"),
        });
    }
    Ok(())
}

fn transform_value(x: f64, lambda: f64) -> f64 {
    if lambda.abs() < 1e-10 {
        x.ln()
    } else {
        (x.powf(lambda) - 1.0) / lambda
    }
}

/// Grid search for the maximum-likelihood lambda over [-2, 2] in 0.1 steps.
fn estimate_lambda(values: &[f64]) -> f64 {
    let mut best_lambda = 1.0;
    let mut best_ll = f64::NEG_INFINITY;

    for lambda_int in -20..=20 {
        let lambda = lambda_int as f64 * 0.1;
        let ll = log_likelihood(values, lambda);
        if ll > best_ll {
            best_ll = ll;
            best_lambda = lambda;
        }
    }

    best_lambda
}

fn log_likelihood(values: &[f64], lambda: f64) -> f64 {
    let n = values.len() as f64;

    let transformed: Vec<f64> = values.iter().map(|&x| transform_value(x, lambda)).collect();
    let mean = transformed.iter().sum::<f64>() / n;
    let variance = transformed.iter().map(|&t| (t - mean).powi(2)).sum::<f64>() / n;

    if variance <= 0.0 {
        return f64::NEG_INFINITY;
    }

    let log_jacobian: f64 = values.iter().map(|&x| x.ln()).sum();

    -n / 2.0 * variance.ln() + (lambda - 1.0) * log_jacobian
}
