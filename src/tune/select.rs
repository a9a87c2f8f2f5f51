//! Selection rules over a finished sweep.
//!
//! `Best` takes the top-ranked grid point. The other two rules trade a
//! bounded amount of performance for a simpler model, where "simpler" is an
//! explicit axis and direction supplied by the caller rather than a built-in
//! guess. Ties always fall back to grid order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::driver::{TuneResult, TuneRow};
use crate::error::{Result, TreetuneError};
use crate::metrics::Direction;
use crate::model::HyperParams;

/// One tunable parameter, named so rules can point at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamAxis {
    Mtry,
    Trees,
    MinN,
}

impl ParamAxis {
    fn value(&self, params: &HyperParams) -> usize {
        match self {
            ParamAxis::Mtry => params.mtry,
            ParamAxis::Trees => params.trees,
            ParamAxis::MinN => params.min_n,
        }
    }

    /// The conventional simplicity direction for this axis: fewer trees and
    /// fewer split candidates are simpler, a larger `min_n` is simpler
    /// because it stops splitting earlier.
    pub fn default_simplicity(&self) -> SimplicityOrder {
        match self {
            ParamAxis::Mtry | ParamAxis::Trees => SimplicityOrder::SmallerIsSimpler,
            ParamAxis::MinN => SimplicityOrder::LargerIsSimpler,
        }
    }
}

impl fmt::Display for ParamAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamAxis::Mtry => "mtry",
            ParamAxis::Trees => "trees",
            ParamAxis::MinN => "min_n",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ParamAxis {
    type Err = TreetuneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mtry" => Ok(ParamAxis::Mtry),
            "trees" => Ok(ParamAxis::Trees),
            "min_n" => Ok(ParamAxis::MinN),
            other => Err(TreetuneError::InvalidParameter {
                name: "axis".to_string(),
                value: other.to_string(),
                reason: "expected one of mtry, trees, min_n".to_string(),
            }),
        }
    }
}

/// Which end of an axis counts as simpler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimplicityOrder {
    /// Smaller values are simpler (fewer trees, fewer split candidates).
    SmallerIsSimpler,
    /// Larger values are simpler (a larger min_n grows shallower trees).
    LargerIsSimpler,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Simplicity {
    pub axis: ParamAxis,
    pub order: SimplicityOrder,
}

impl Simplicity {
    pub fn new(axis: ParamAxis, order: SimplicityOrder) -> Self {
        Self { axis, order }
    }

    /// Sort key where smaller means simpler.
    fn key(&self, params: &HyperParams) -> i64 {
        let value = self.axis.value(params) as i64;
        match self.order {
            SimplicityOrder::SmallerIsSimpler => value,
            SimplicityOrder::LargerIsSimpler => -value,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// The grid point with the best mean metric.
    Best,
    /// The simplest grid point whose mean lies within one standard error of
    /// the best mean.
    OneStdErr(Simplicity),
    /// The simplest grid point whose mean is at most `limit` percent worse
    /// than the best mean.
    PctLoss { limit: f64, simplicity: Simplicity },
}

/// Apply `rule` to a finished sweep. Only grid points with at least one
/// completed fold are considered.
pub fn select<'a>(result: &'a TuneResult, rule: &SelectionRule) -> Result<&'a TuneRow> {
    match rule {
        SelectionRule::Best => result.best(),
        SelectionRule::OneStdErr(simplicity) => {
            let best = result.best()?;
            let mean = best
                .mean(result.metric)
                .ok_or_else(|| TreetuneError::SelectionError("best row has no mean".to_string()))?;
            let std_err = best.std_err(result.metric).unwrap_or(0.0);
            let bound = match result.metric.direction() {
                Direction::Minimize => mean + std_err,
                Direction::Maximize => mean - std_err,
            };
            simplest_within(result, bound, *simplicity)
        }
        SelectionRule::PctLoss { limit, simplicity } => {
            if !limit.is_finite() || *limit <= 0.0 {
                return Err(TreetuneError::InvalidParameter {
                    name: "limit".to_string(),
                    value: limit.to_string(),
                    reason: "percent loss must be a positive number".to_string(),
                });
            }
            let best = result.best()?;
            let mean = best
                .mean(result.metric)
                .ok_or_else(|| TreetuneError::SelectionError("best row has no mean".to_string()))?;
            let bound = match result.metric.direction() {
                Direction::Minimize => mean * (1.0 + limit / 100.0),
                Direction::Maximize => mean * (1.0 - limit / 100.0),
            };
            simplest_within(result, bound, *simplicity)
        }
    }
}

/// Simplest qualifying grid point; a tie on simplicity keeps the earlier
/// grid index because candidates are scanned in grid order.
fn simplest_within(
    result: &TuneResult,
    bound: f64,
    simplicity: Simplicity,
) -> Result<&TuneRow> {
    let qualifies = |mean: f64| match result.metric.direction() {
        Direction::Minimize => mean <= bound,
        Direction::Maximize => mean >= bound,
    };

    let mut chosen: Option<(&TuneRow, i64)> = None;
    for row in &result.rows {
        let mean = match row.mean(result.metric) {
            Some(mean) => mean,
            None => continue,
        };
        if !qualifies(mean) {
            continue;
        }
        let key = simplicity.key(&row.params);
        let replace = match chosen {
            Some((_, best_key)) => key < best_key,
            None => true,
        };
        if replace {
            chosen = Some((row, key));
        }
    }
    chosen.map(|(row, _)| row).ok_or_else(|| {
        TreetuneError::SelectionError("no grid point qualifies for selection".to_string())
    })
}
