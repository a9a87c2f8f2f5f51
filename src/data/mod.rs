//! Dataset schema, loading, and splitting

mod loader;
mod schema;
mod split;

pub use loader::{drop_columns, log_transform, read_csv};
pub use schema::{summarize, ColumnInfo, ColumnKind, ColumnSummary, Role, Schema};
pub use split::{train_test_split, TrainTest};

use crate::error::{Result, TreetuneError};
use ndarray::Array1;
use polars::prelude::*;

/// Extract a column as a dense f64 array, casting integer columns on the way.
/// Nulls are a hard error: downstream math never sees a missing value.
pub(crate) fn column_f64(df: &DataFrame, name: &str) -> Result<Array1<f64>> {
    let col = df
        .column(name)
        .map_err(|_| TreetuneError::ColumnNotFound(name.to_string()))?;
    let series = col.as_materialized_series();
    let casted = series
        .cast(&DataType::Float64)
        .map_err(|_| TreetuneError::DataError(format!("column '{name}' is not numeric")))?;
    let ca = casted
        .f64()
        .map_err(|e| TreetuneError::DataError(e.to_string()))?;
    if ca.null_count() > 0 {
        return Err(TreetuneError::DataError(format!(
            "column '{name}' contains {} missing values",
            ca.null_count()
        )));
    }
    Ok(Array1::from_iter(ca.into_no_null_iter()))
}

/// Extract a column as owned strings. Same null policy as [`column_f64`].
pub(crate) fn column_str(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let col = df
        .column(name)
        .map_err(|_| TreetuneError::ColumnNotFound(name.to_string()))?;
    let series = col.as_materialized_series();
    let ca = series
        .str()
        .map_err(|_| TreetuneError::DataError(format!("column '{name}' is not a string column")))?;
    if ca.null_count() > 0 {
        return Err(TreetuneError::DataError(format!(
            "column '{name}' contains {} missing values",
            ca.null_count()
        )));
    }
    Ok(ca.into_no_null_iter().map(|s| s.to_string()).collect())
}

/// Take rows of a frame by position, preserving the given order.
pub(crate) fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx: IdxCa = IdxCa::from_vec(
        "idx".into(),
        indices.iter().map(|&i| i as IdxSize).collect(),
    );
    df.take(&idx).map_err(|e| TreetuneError::DataError(e.to_string()))
}
