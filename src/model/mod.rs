//! Random forest regression

mod forest;
mod tree;

pub use forest::{
    FactorHandling, ForestSpec, HyperParams, ImportanceMode, RandomForestRegressor,
};
