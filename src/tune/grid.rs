//! Tuning ranges and regular grids.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TreetuneError};
use crate::model::HyperParams;

/// Inclusive integer range for one tunable parameter.
///
/// [`IntRange::new`] rejects `min >= max`: a collapsed range silently turns
/// a sweep into a constant, so holding a parameter fixed has to be said
/// out loud via [`IntRange::single`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    min: usize,
    max: usize,
}

impl IntRange {
    pub fn new(min: usize, max: usize) -> Result<Self> {
        if min >= max {
            return Err(TreetuneError::GridError(format!(
                "range [{}, {}] needs min < max; use IntRange::single to fix one value",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// A degenerate range holding one fixed value.
    pub fn single(value: usize) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// `levels` values evenly spaced over the range, endpoints included.
    /// Asking for more levels than the range has distinct integers is an
    /// error rather than a silently smaller grid.
    pub fn levels(&self, levels: usize) -> Result<Vec<usize>> {
        if levels == 0 {
            return Err(TreetuneError::GridError(
                "a parameter needs at least one level".to_string(),
            ));
        }
        let span = self.max - self.min;
        if levels > span + 1 {
            return Err(TreetuneError::GridError(format!(
                "{} levels do not fit in [{}, {}]: only {} distinct integers",
                levels,
                self.min,
                self.max,
                span + 1
            )));
        }
        if levels == 1 {
            return Ok(vec![self.min]);
        }

        let step = span as f64 / (levels - 1) as f64;
        Ok((0..levels)
            .map(|i| self.min + (i as f64 * step).round() as usize)
            .collect())
    }
}

/// Ranges for the three tunable forest parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridSpec {
    pub mtry: IntRange,
    pub trees: IntRange,
    pub min_n: IntRange,
}

impl Default for GridSpec {
    /// The house-price reference sweep: mtry 5..40, trees 500..2500,
    /// min_n 1..10.
    fn default() -> Self {
        Self {
            mtry: IntRange { min: 5, max: 40 },
            trees: IntRange { min: 500, max: 2500 },
            min_n: IntRange { min: 1, max: 10 },
        }
    }
}

impl GridSpec {
    pub fn new(mtry: IntRange, trees: IntRange, min_n: IntRange) -> Self {
        Self { mtry, trees, min_n }
    }

    /// Full Cartesian product of evenly spaced levels, mtry-major: the
    /// grid index orders by mtry, then trees, then min_n.
    pub fn regular(
        &self,
        mtry_levels: usize,
        trees_levels: usize,
        min_n_levels: usize,
    ) -> Result<ParamGrid> {
        let mtry = self.mtry.levels(mtry_levels)?;
        let trees = self.trees.levels(trees_levels)?;
        let min_n = self.min_n.levels(min_n_levels)?;

        let mut points = Vec::with_capacity(mtry.len() * trees.len() * min_n.len());
        for &m in &mtry {
            for &t in &trees {
                for &n in &min_n {
                    points.push(HyperParams {
                        mtry: m,
                        trees: t,
                        min_n: n,
                    });
                }
            }
        }
        ParamGrid::from_points(points)
    }
}

/// An ordered, duplicate-free list of grid points. The position of a point
/// is its identity throughout tuning and breaks ties during selection.
#[derive(Debug, Clone)]
pub struct ParamGrid {
    points: Vec<HyperParams>,
}

impl ParamGrid {
    pub fn from_points(points: Vec<HyperParams>) -> Result<Self> {
        if points.is_empty() {
            return Err(TreetuneError::GridError(
                "a tuning grid needs at least one point".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for point in &points {
            if !seen.insert(*point) {
                return Err(TreetuneError::GridError(format!(
                    "duplicate grid point: {}",
                    point
                )));
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[HyperParams] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HyperParams> {
        self.points.iter()
    }
}
