//! Column roles and dataset schema

use crate::error::{Result, TreetuneError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Role a column plays in modeling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Feeds the model matrix
    Predictor,
    /// The column being predicted
    Outcome,
    /// Carried through untouched, never modeled
    Id,
}

/// Coarse column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Nominal,
}

/// One schema entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub role: Role,
}

/// Dataset schema: every column's kind and role, in frame order.
///
/// Kinds are inferred from the frame's dtypes; roles are explicit. Iteration
/// order is the dataset column order, so everything derived from the schema
/// (feature order, baked output) is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnInfo>,
}

impl Schema {
    /// Infer a schema from a frame. `outcome` gets [`Role::Outcome`], columns
    /// named in `ids` get [`Role::Id`], everything else is a predictor.
    pub fn infer(df: &DataFrame, outcome: &str, ids: &[&str]) -> Result<Self> {
        if df.width() == 0 {
            return Err(TreetuneError::DataError("frame has no columns".to_string()));
        }

        let mut columns = Vec::with_capacity(df.width());
        for col in df.get_columns() {
            let name = col.name().to_string();
            let kind = match col.dtype() {
                DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
                | DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
                | DataType::Float32 | DataType::Float64 => ColumnKind::Numeric,
                DataType::String => ColumnKind::Nominal,
                dt => {
                    return Err(TreetuneError::DataError(format!(
                        "unsupported dtype {dt} for column '{name}'"
                    )))
                }
            };
            let role = if name == outcome {
                Role::Outcome
            } else if ids.contains(&name.as_str()) {
                Role::Id
            } else {
                Role::Predictor
            };
            columns.push(ColumnInfo { name, kind, role });
        }

        let schema = Self { columns };
        let info = schema
            .get(outcome)
            .ok_or_else(|| TreetuneError::ColumnNotFound(outcome.to_string()))?;
        if info.kind != ColumnKind::Numeric {
            return Err(TreetuneError::RoleError {
                column: outcome.to_string(),
                reason: "outcome must be numeric".to_string(),
            });
        }
        for id in ids {
            if schema.get(id).is_none() {
                return Err(TreetuneError::ColumnNotFound(id.to_string()));
            }
        }

        Ok(schema)
    }

    /// Look up a column by name.
    pub fn get(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Reassign a column's role.
    pub fn set_role(&mut self, name: &str, role: Role) -> Result<()> {
        let col = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| TreetuneError::ColumnNotFound(name.to_string()))?;
        col.role = role;
        Ok(())
    }

    /// Name of the single outcome column.
    pub fn outcome(&self) -> Result<&str> {
        let mut outcomes = self.columns.iter().filter(|c| c.role == Role::Outcome);
        let first = outcomes.next().ok_or_else(|| TreetuneError::RoleError {
            column: "<none>".to_string(),
            reason: "schema has no outcome column".to_string(),
        })?;
        if outcomes.next().is_some() {
            return Err(TreetuneError::RoleError {
                column: first.name.clone(),
                reason: "schema has more than one outcome column".to_string(),
            });
        }
        Ok(&first.name)
    }

    /// All columns in frame order.
    pub fn iter(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter()
    }

    /// Predictor columns in frame order.
    pub fn predictors(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.role == Role::Predictor)
    }

    /// Names of numeric predictor columns, frame order.
    pub fn numeric_predictors(&self) -> Vec<String> {
        self.predictors()
            .filter(|c| c.kind == ColumnKind::Numeric)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Names of nominal predictor columns, frame order.
    pub fn nominal_predictors(&self) -> Vec<String> {
        self.predictors()
            .filter(|c| c.kind == ColumnKind::Nominal)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Per-column descriptive statistics, used by dataset reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    pub role: Role,
    pub nulls: usize,
    /// Numeric columns only
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Nominal columns only
    pub levels: Option<usize>,
}

/// Summarize every schema column of a frame.
pub fn summarize(df: &DataFrame, schema: &Schema) -> Result<Vec<ColumnSummary>> {
    let mut out = Vec::with_capacity(schema.len());
    for info in schema.iter() {
        let col = df
            .column(&info.name)
            .map_err(|_| TreetuneError::ColumnNotFound(info.name.clone()))?;
        let series = col.as_materialized_series();
        let nulls = series.null_count();

        let summary = match info.kind {
            ColumnKind::Numeric => {
                let casted = series
                    .cast(&DataType::Float64)
                    .map_err(|e| TreetuneError::DataError(e.to_string()))?;
                let ca = casted
                    .f64()
                    .map_err(|e| TreetuneError::DataError(e.to_string()))?;
                ColumnSummary {
                    name: info.name.clone(),
                    kind: info.kind,
                    role: info.role,
                    nulls,
                    mean: ca.mean(),
                    std: ca.std(1),
                    min: ca.min(),
                    max: ca.max(),
                    levels: None,
                }
            }
            ColumnKind::Nominal => {
                let levels = series
                    .n_unique()
                    .map_err(|e| TreetuneError::DataError(e.to_string()))?;
                ColumnSummary {
                    name: info.name.clone(),
                    kind: info.kind,
                    role: info.role,
                    nulls,
                    mean: None,
                    std: None,
                    min: None,
                    max: None,
                    levels: Some(levels),
                }
            }
        };
        out.push(summary);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        df!(
            "price" => &[100.0, 200.0, 300.0],
            "area" => &[10i64, 20, 30],
            "hood" => &["a", "b", "a"],
            "pid" => &["p1", "p2", "p3"],
        )
        .unwrap()
    }

    #[test]
    fn test_infer_kinds_and_roles() {
        let df = sample_df();
        let schema = Schema::infer(&df, "price", &["pid"]).unwrap();

        assert_eq!(schema.get("price").unwrap().role, Role::Outcome);
        assert_eq!(schema.get("area").unwrap().kind, ColumnKind::Numeric);
        assert_eq!(schema.get("hood").unwrap().kind, ColumnKind::Nominal);
        assert_eq!(schema.get("pid").unwrap().role, Role::Id);
        assert_eq!(schema.outcome().unwrap(), "price");
    }

    #[test]
    fn test_infer_rejects_missing_outcome() {
        let df = sample_df();
        assert!(Schema::infer(&df, "nope", &[]).is_err());
    }

    #[test]
    fn test_infer_rejects_nominal_outcome() {
        let df = sample_df();
        let err = Schema::infer(&df, "hood", &[]).unwrap_err();
        assert!(matches!(err, TreetuneError::RoleError { .. }));
    }

    #[test]
    fn test_predictor_partition() {
        let df = sample_df();
        let schema = Schema::infer(&df, "price", &["pid"]).unwrap();
        assert_eq!(schema.numeric_predictors(), vec!["area".to_string()]);
        assert_eq!(schema.nominal_predictors(), vec!["hood".to_string()]);
    }

    #[test]
    fn test_set_role() {
        let df = sample_df();
        let mut schema = Schema::infer(&df, "price", &[]).unwrap();
        schema.set_role("hood", Role::Id).unwrap();
        assert!(schema.nominal_predictors().is_empty());
    }

    #[test]
    fn test_summarize() {
        let df = sample_df();
        let schema = Schema::infer(&df, "price", &["pid"]).unwrap();
        let summaries = summarize(&df, &schema).unwrap();

        assert_eq!(summaries.len(), 4);
        let area = summaries.iter().find(|s| s.name == "area").unwrap();
        assert_eq!(area.mean, Some(20.0));
        let hood = summaries.iter().find(|s| s.name == "hood").unwrap();
        assert_eq!(hood.levels, Some(2));
    }
}
