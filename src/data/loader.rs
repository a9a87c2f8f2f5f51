//! Dataset loading and fixed load-time transforms

use crate::error::{Result, TreetuneError};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Load a header CSV file into a frame.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path).map_err(|e| {
        TreetuneError::DataError(format!("cannot open {}: {e}", path.display()))
    })?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .into_reader_with_file_handle(file)
        .finish()
        .map_err(|e| TreetuneError::DataError(e.to_string()))?;

    info!(
        rows = df.height(),
        cols = df.width(),
        path = %path.display(),
        "loaded dataset"
    );
    Ok(df)
}

/// Replace `column` with its natural log.
///
/// Missing values and non-positive values are hard errors: a silently NaN'd
/// outcome would poison every downstream metric.
pub fn log_transform(df: &DataFrame, column: &str) -> Result<DataFrame> {
    let col = df
        .column(column)
        .map_err(|_| TreetuneError::ColumnNotFound(column.to_string()))?;
    let series = col.as_materialized_series();
    let casted = series
        .cast(&DataType::Float64)
        .map_err(|_| TreetuneError::DataError(format!("column '{column}' is not numeric")))?;
    let ca = casted
        .f64()
        .map_err(|e| TreetuneError::DataError(e.to_string()))?;

    if ca.null_count() > 0 {
        return Err(TreetuneError::DataError(format!(
            "column '{column}' contains missing values, cannot log-transform"
        )));
    }

    let logged: Float64Chunked = ca
        .into_no_null_iter()
        .map(|v| {
            if v > 0.0 {
                Ok(v.ln())
            } else {
                Err(TreetuneError::DataError(format!(
                    "column '{column}' contains non-positive value {v}, cannot log-transform"
                )))
            }
        })
        .collect::<Result<Vec<f64>>>()?
        .into_iter()
        .map(Some)
        .collect();

    let mut result = df.clone();
    result
        .with_column(logged.with_name(column.into()).into_series())
        .map_err(|e| TreetuneError::DataError(e.to_string()))?;
    Ok(result)
}

/// Drop metadata columns from a frame. Every name must exist; nothing is
/// silently skipped.
pub fn drop_columns(df: &DataFrame, names: &[&str]) -> Result<DataFrame> {
    for name in names {
        if df.column(name).is_err() {
            return Err(TreetuneError::ColumnNotFound(name.to_string()));
        }
    }
    let mut result = df.clone();
    for name in names {
        result = result
            .drop(name)
            .map_err(|e| TreetuneError::DataError(e.to_string()))?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "price,area,hood").unwrap();
        writeln!(file, "100.0,10,a").unwrap();
        writeln!(file, "200.0,20,b").unwrap();

        let df = read_csv(file.path()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn test_log_transform() {
        let df = df!("price" => &[1.0, std::f64::consts::E]).unwrap();
        let out = log_transform(&df, "price").unwrap();
        let ca = out.column("price").unwrap().f64().unwrap();
        assert!(ca.get(0).unwrap().abs() < 1e-12);
        assert!((ca.get(1).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_log_transform_rejects_non_positive() {
        let df = df!("price" => &[1.0, 0.0]).unwrap();
        assert!(log_transform(&df, "price").is_err());

        let df = df!("price" => &[1.0, -5.0]).unwrap();
        assert!(log_transform(&df, "price").is_err());
    }

    #[test]
    fn test_log_transform_missing_column() {
        let df = df!("price" => &[1.0]).unwrap();
        let err = log_transform(&df, "cost").unwrap_err();
        assert!(matches!(err, TreetuneError::ColumnNotFound(_)));
    }

    #[test]
    fn test_drop_columns() {
        let df = df!("a" => &[1.0], "b" => &[2.0], "c" => &[3.0]).unwrap();
        let out = drop_columns(&df, &["b"]).unwrap();
        assert_eq!(out.width(), 2);
        assert!(out.column("b").is_err());
    }

    #[test]
    fn test_drop_columns_missing_is_error() {
        let df = df!("a" => &[1.0]).unwrap();
        assert!(drop_columns(&df, &["a", "zz"]).is_err());
    }
}
