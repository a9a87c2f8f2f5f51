//! Grid-search tuning over seeded cross-validation.

mod cv;
mod driver;
mod grid;
mod pool;
mod select;

pub use cv::{vfold, Fold};
pub use driver::{
    tune_grid, validate, CellError, GridCheck, OnCellError, TuneConfig, TuneResult, TuneRow,
};
pub use grid::{GridSpec, IntRange, ParamGrid};
pub use pool::WorkerPool;
pub use select::{select, ParamAxis, SelectionRule, Simplicity, SimplicityOrder};
