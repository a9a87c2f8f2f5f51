//! Error types for treetune pipelines

use thiserror::Error;

/// Result type alias for treetune operations
pub type Result<T> = std::result::Result<T, TreetuneError>;

/// Main error type for the treetune crate
#[derive(Error, Debug)]
pub enum TreetuneError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Recipe error in {step}, column '{column}': {reason}")]
    RecipeError {
        step: String,
        column: String,
        reason: String,
    },

    #[error("Role error for column '{column}': {reason}")]
    RoleError { column: String, reason: String },

    #[error("Grid error: {0}")]
    GridError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Tuning error: {0}")]
    TuningError(String),

    #[error("Selection error: {0}")]
    SelectionError(String),

    #[error("Report error: {0}")]
    ReportError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),
}

impl From<polars::error::PolarsError> for TreetuneError {
    fn from(err: polars::error::PolarsError) -> Self {
        TreetuneError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for TreetuneError {
    fn from(err: serde_json::Error) -> Self {
        TreetuneError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TreetuneError {
    fn from(err: ndarray::ShapeError) -> Self {
        TreetuneError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
