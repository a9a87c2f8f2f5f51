//! Collapse infrequent nominal levels into a shared "other" level

use crate::data::{column_str, ColumnKind, Role, Schema};
use crate::error::{Result, TreetuneError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

pub(crate) const OTHER_LEVEL: &str = "other";

const STEP: &str = "step_collapse";

/// Fitted state: per column, the levels retained from training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollapseParams {
    /// column -> retained levels, training first-seen order
    kept: Vec<(String, Vec<String>)>,
}

impl CollapseParams {
    pub fn kept_levels(&self, column: &str) -> Option<&[String]> {
        self.kept
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, levels)| levels.as_slice())
    }
}

pub(crate) fn fit(
    df: &DataFrame,
    columns: &[String],
    threshold: f64,
    schema: &Schema,
) -> Result<CollapseParams> {
    if !(0.0..1.0).contains(&threshold) {
        return Err(TreetuneError::InvalidParameter {
            name: "threshold".to_string(),
            value: threshold.to_string(),
            reason: "must be a proportion in [0, 1)".to_string(),
        });
    }

    let mut kept = Vec::with_capacity(columns.len());
    for column in columns {
        let info = schema
            .get(column)
            .ok_or_else(|| TreetuneError::RecipeError {
                step: STEP.to_string(),
                column: column.clone(),
                reason: "column is missing from the input schema".to_string(),
            })?;
        if info.kind != ColumnKind::Nominal {
            return Err(TreetuneError::RecipeError {
                step: STEP.to_string(),
                column: column.clone(),
                reason: "column is not nominal".to_string(),
            });
        }
        if info.role == Role::Id {
            return Err(TreetuneError::RoleError {
                column: column.clone(),
                reason: "id columns pass through untouched; reassign the role to transform one"
                    .to_string(),
            });
        }

        let values = column_str(df, column)?;
        let n = values.len() as f64;

        // count in first-seen order so retained levels are deterministic
        let mut order: Vec<String> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        for v in &values {
            match order.iter().position(|o| o == v) {
                Some(i) => counts[i] += 1,
                None => {
                    order.push(v.clone());
                    counts.push(1);
                }
            }
        }

        let retained: Vec<String> = order
            .into_iter()
            .zip(counts)
            .filter(|(_, c)| (*c as f64) / n >= threshold)
            .map(|(level, _)| level)
            .collect();

        if retained.is_empty() {
            warn!(column, "every level falls below the collapse threshold");
        }
        kept.push((column.clone(), retained));
    }

    Ok(CollapseParams { kept })
}

pub(crate) fn apply(df: &DataFrame, params: &CollapseParams) -> Result<DataFrame> {
    let mut result = df.clone();
    for (column, levels) in &params.kept {
        let retained: HashSet<&str> = levels.iter().map(|s| s.as_str()).collect();
        let values = column_str(&result, column)?;
        let mapped: Vec<&str> = values
            .iter()
            .map(|v| {
                if retained.contains(v.as_str()) {
                    v.as_str()
                } else {
                    OTHER_LEVEL
                }
            })
            .collect();
        let series = Series::new(column.as_str().into(), mapped);
        result
            .with_column(series)
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
            "hood" => &["a", "a", "a", "b", "c"],
        )
        .unwrap();
        let schema = Schema::infer(&df, "y", &[]).unwrap();
        (df, schema)
    }

    #[test]
    fn test_rare_levels_become_other() {
        let (df, schema) = sample();
        let params = fit(&df, &["hood".to_string()], 0.25, &schema).unwrap();
        assert_eq!(params.kept_levels("hood").unwrap(), &["a".to_string()]);

        let out = apply(&df, &params).unwrap();
        let values = column_str(&out, "hood").unwrap();
        assert_eq!(values, vec!["a", "a", "a", "other", "other"]);
    }

    #[test]
    fn test_all_levels_kept_with_zero_threshold() {
        let (df, schema) = sample();
        let params = fit(&df, &["hood".to_string()], 0.0, &schema).unwrap();
        let out = apply(&df, &params).unwrap();
        let values = column_str(&out, "hood").unwrap();
        assert_eq!(values, vec!["a", "a", "a", "b", "c"]);
    }

    #[test]
    fn test_unseen_level_maps_to_other_at_bake() {
        let (df, schema) = sample();
        let params = fit(&df, &["hood".to_string()], 0.25, &schema).unwrap();

        let new = df!("y" => &[9.0], "hood" => &["zed"]).unwrap();
        let out = apply(&new, &params).unwrap();
        assert_eq!(column_str(&out, "hood").unwrap(), vec!["other"]);
    }

    #[test]
    fn test_missing_column_is_recipe_error() {
        let (df, schema) = sample();
        let err = fit(&df, &["nope".to_string()], 0.1, &schema).unwrap_err();
        assert!(matches!(err, TreetuneError::RecipeError { .. }));
    }

    #[test]
    fn test_numeric_column_rejected() {
        let (df, schema) = sample();
        let err = fit(&df, &["y".to_string()], 0.1, &schema).unwrap_err();
        assert!(matches!(err, TreetuneError::RecipeError { .. }));
    }

    #[test]
    fn test_threshold_validated() {
        let (df, schema) = sample();
        assert!(fit(&df, &["hood".to_string()], 1.0, &schema).is_err());
        assert!(fit(&df, &["hood".to_string()], -0.1, &schema).is_err());
    }
}
