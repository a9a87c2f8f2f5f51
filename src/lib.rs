//! treetune - Grid-tuned random forest regression for tabular data
//!
//! One seeded run takes a CSV from raw rows to a tuned, evaluated model:
//! split once, sweep a hyperparameter grid with cross-validation on the
//! training half, pick a configuration by an explicit rule, refit on the
//! full training split, and score the held-out rows.
//!
//! # Modules
//!
//! ## Data and preprocessing
//! - [`data`] - CSV loading, column roles, seeded train/test splitting
//! - [`recipe`] - Ordered preprocessing steps fit on training data only
//!
//! ## Modeling
//! - [`model`] - Random forest regressor with seeded parallel growth
//! - [`workflow`] - A recipe and a model spec fit and predicted as one unit
//!
//! ## Tuning
//! - [`tune`] - Grids, folds, the parallel sweep, and selection rules
//! - [`metrics`] - Regression metrics and their optimization direction
//!
//! ## Reporting and orchestration
//! - [`report`] - Result tables, CSV artifacts, predicted-vs-actual plot
//! - [`pipeline`] - The end-to-end run
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data and preprocessing
pub mod data;
pub mod recipe;

// Modeling
pub mod model;
pub mod workflow;

// Tuning
pub mod metrics;
pub mod tune;

// Reporting and orchestration
pub mod pipeline;
pub mod report;

// Services
pub mod cli;

pub use error::{Result, TreetuneError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, TreetuneError};

    // Data
    pub use crate::data::{read_csv, train_test_split, ColumnKind, Role, Schema};

    // Preprocessing
    pub use crate::recipe::{PreparedRecipe, Recipe, Step};

    // Modeling
    pub use crate::model::{
        FactorHandling, ForestSpec, HyperParams, ImportanceMode, RandomForestRegressor,
    };
    pub use crate::workflow::{FittedWorkflow, Workflow};

    // Tuning
    pub use crate::metrics::{Metric, RegressionMetrics};
    pub use crate::tune::{
        select, tune_grid, validate, GridCheck, GridSpec, IntRange, OnCellError, ParamAxis,
        ParamGrid, SelectionRule, Simplicity, SimplicityOrder, TuneConfig, TuneResult,
        WorkerPool,
    };

    // Orchestration
    pub use crate::pipeline::{run, RunConfig, RunReport};
}
