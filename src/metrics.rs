//! Regression metrics.

use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TreetuneError};

/// Whether larger or smaller metric values win.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Rmse,
    Mae,
    Rsq,
}

impl Metric {
    pub fn direction(&self) -> Direction {
        match self {
            Metric::Rmse | Metric::Mae => Direction::Minimize,
            Metric::Rsq => Direction::Maximize,
        }
    }

    /// True when `candidate` is strictly better than `incumbent` for this
    /// metric's direction.
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        match self.direction() {
            Direction::Minimize => candidate < incumbent,
            Direction::Maximize => candidate > incumbent,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Rmse => "rmse",
            Metric::Mae => "mae",
            Metric::Rsq => "rsq",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Metric {
    type Err = TreetuneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "rmse" => Ok(Metric::Rmse),
            "mae" => Ok(Metric::Mae),
            "rsq" | "r2" => Ok(Metric::Rsq),
            other => Err(TreetuneError::InvalidParameter {
                name: "metric".to_string(),
                value: other.to_string(),
                reason: "expected one of rmse, mae, rsq".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub rsq: f64,
}

impl RegressionMetrics {
    pub fn compute(actual: &Array1<f64>, predicted: &Array1<f64>) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(TreetuneError::ShapeError {
                expected: format!("{} predictions", actual.len()),
                actual: format!("{}", predicted.len()),
            });
        }
        if actual.is_empty() {
            return Err(TreetuneError::DataError(
                "cannot score an empty sample".to_string(),
            ));
        }

        let n = actual.len() as f64;
        let mut ss_res = 0.0;
        let mut abs_sum = 0.0;
        for (a, p) in actual.iter().zip(predicted.iter()) {
            let err = a - p;
            ss_res += err * err;
            abs_sum += err.abs();
        }

        let mean = actual.sum() / n;
        let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
        let rsq = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else {
            f64::NAN
        };

        Ok(Self {
            rmse: (ss_res / n).sqrt(),
            mae: abs_sum / n,
            rsq,
        })
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Rmse => self.rmse,
            Metric::Mae => self.mae,
            Metric::Rsq => self.rsq,
        }
    }
}

impl fmt::Display for RegressionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rmse={:.4}, mae={:.4}, rsq={:.4}",
            self.rmse, self.mae, self.rsq
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_known_values() {
        let actual = array![1.0, 2.0, 3.0, 4.0];
        let predicted = array![1.0, 2.0, 3.0, 8.0];
        let m = RegressionMetrics::compute(&actual, &predicted).unwrap();

        assert!((m.rmse - 2.0).abs() < 1e-12);
        assert!((m.mae - 1.0).abs() < 1e-12);
        // ss_res = 16, ss_tot = 5
        assert!((m.rsq - (1.0 - 16.0 / 5.0)).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_fit() {
        let actual = array![2.0, 4.0, 6.0];
        let m = RegressionMetrics::compute(&actual, &actual).unwrap();
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert!((m.rsq - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_actuals_have_undefined_rsq() {
        let actual = array![5.0, 5.0, 5.0];
        let predicted = array![4.0, 5.0, 6.0];
        let m = RegressionMetrics::compute(&actual, &predicted).unwrap();
        assert!(m.rsq.is_nan());
        assert!(m.rmse > 0.0);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let actual = array![1.0, 2.0];
        let predicted = array![1.0];
        assert!(matches!(
            RegressionMetrics::compute(&actual, &predicted),
            Err(TreetuneError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_direction_and_comparison() {
        assert_eq!(Metric::Rmse.direction(), Direction::Minimize);
        assert_eq!(Metric::Rsq.direction(), Direction::Maximize);
        assert!(Metric::Rmse.is_better(1.0, 2.0));
        assert!(!Metric::Rmse.is_better(2.0, 1.0));
        assert!(Metric::Rsq.is_better(0.9, 0.5));
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("rmse".parse::<Metric>().unwrap(), Metric::Rmse);
        assert_eq!("R2".parse::<Metric>().unwrap(), Metric::Rsq);
        assert!("accuracy".parse::<Metric>().is_err());
    }
}
