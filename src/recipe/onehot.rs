//! One-hot encoding of nominal predictors

use crate::data::{column_str, ColumnKind, Schema};
use crate::error::{Result, TreetuneError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

const STEP: &str = "step_onehot";

/// Fitted state: per nominal predictor, the training levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotParams {
    /// column -> levels, training first-seen order
    mappings: Vec<(String, Vec<String>)>,
}

impl OneHotParams {
    pub fn levels_for(&self, column: &str) -> Option<&[String]> {
        self.mappings
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, levels)| levels.as_slice())
    }
}

pub(crate) fn encoded_name(column: &str, level: &str) -> String {
    format!("{}_{}", column, level)
}

pub(crate) fn fit(df: &DataFrame, schema: &Schema) -> Result<OneHotParams> {
    let mut mappings = Vec::new();
    for info in schema.predictors() {
        if info.kind != ColumnKind::Nominal {
            continue;
        }
        let values = column_str(df, &info.name)?;

        let mut levels: Vec<String> = Vec::new();
        for v in values {
            if !levels.contains(&v) {
                levels.push(v);
            }
        }

        for level in &levels {
            let out = encoded_name(&info.name, level);
            if df.column(&out).is_ok() {
                return Err(TreetuneError::RecipeError {
                    step: STEP.to_string(),
                    column: info.name.clone(),
                    reason: format!("encoded column '{out}' collides with an existing column"),
                });
            }
        }
        mappings.push((info.name.clone(), levels));
    }
    Ok(OneHotParams { mappings })
}

/// Expand each fitted column into one 0/1 column per training level, then
/// drop the original. Levels unseen in training contribute an all-zero row.
pub(crate) fn apply(df: &DataFrame, params: &OneHotParams) -> Result<DataFrame> {
    let mut result = df.clone();
    for (column, levels) in &params.mappings {
        let values = column_str(&result, column)?;

        for level in levels {
            let flags: Vec<f64> = values
                .iter()
                .map(|v| if v == level { 1.0 } else { 0.0 })
                .collect();
            let series = Series::new(encoded_name(column, level).into(), flags);
            result
                .with_column(series)
                .map_err(|e| TreetuneError::DataError(e.to_string()))?;
        }

        result = result
            .drop(column)
            .map_err(|e| TreetuneError::DataError(e.to_string()))?;
    }
    Ok(result)
}
