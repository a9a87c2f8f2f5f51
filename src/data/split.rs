//! Seeded train/test splitting

use crate::data::take_rows;
use crate::error::{Result, TreetuneError};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

/// A train/test partition of a frame.
#[derive(Debug, Clone)]
pub struct TrainTest {
    pub train: DataFrame,
    pub test: DataFrame,
}

/// Split a frame into disjoint train and test sets by a seeded shuffle.
///
/// The same `seed` always yields the same row assignment, across runs and
/// processes. `train_fraction` must lie strictly inside (0, 1) and both sides
/// of the split must end up non-empty.
pub fn train_test_split(df: &DataFrame, train_fraction: f64, seed: u64) -> Result<TrainTest> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(TreetuneError::InvalidParameter {
            name: "train_fraction".to_string(),
            value: train_fraction.to_string(),
            reason: "must be strictly between 0 and 1".to_string(),
        });
    }
    let n = df.height();
    if n < 2 {
        return Err(TreetuneError::DataError(format!(
            "need at least 2 rows to split, got {n}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_train = ((n as f64) * train_fraction).floor() as usize;
    if n_train == 0 || n_train == n {
        return Err(TreetuneError::InvalidParameter {
            name: "train_fraction".to_string(),
            value: train_fraction.to_string(),
            reason: format!("leaves an empty side for {n} rows"),
        });
    }

    let train = take_rows(df, &indices[..n_train])?;
    let test = take_rows(df, &indices[n_train..])?;

    info!(
        train = train.height(),
        test = test.height(),
        seed,
        "split dataset"
    );
    Ok(TrainTest { train, test })
}
