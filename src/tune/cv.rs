//! Seeded v-fold cross-validation splits.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, TreetuneError};

/// One fold: row indices for fitting and for scoring.
#[derive(Debug, Clone)]
pub struct Fold {
    pub analysis: Vec<usize>,
    pub assessment: Vec<usize>,
}

/// Partition `0..n_rows` into `v` folds from one seeded shuffle. Assessment
/// sets are disjoint and cover every row; the first `n_rows % v` folds take
/// one extra row.
pub fn vfold(n_rows: usize, v: usize, seed: u64) -> Result<Vec<Fold>> {
    if v < 2 {
        return Err(TreetuneError::InvalidParameter {
            name: "folds".to_string(),
            value: v.to_string(),
            reason: "cross-validation needs at least 2 folds".to_string(),
        });
    }
    if n_rows < v {
        return Err(TreetuneError::DataError(format!(
            "{} rows cannot be split into {} folds",
            n_rows, v
        )));
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let base = n_rows / v;
    let remainder = n_rows % v;

    let mut folds = Vec::with_capacity(v);
    let mut start = 0;
    for fold_idx in 0..v {
        let size = base + usize::from(fold_idx < remainder);
        let end = start + size;
        let assessment = indices[start..end].to_vec();
        let mut analysis = Vec::with_capacity(n_rows - size);
        analysis.extend_from_slice(&indices[..start]);
        analysis.extend_from_slice(&indices[end..]);
        folds.push(Fold {
            analysis,
            assessment,
        });
        start = end;
    }
    Ok(folds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fold_sizes_split_remainder() {
        let folds = vfold(11, 3, 0).unwrap();
        let sizes: Vec<usize> = folds.iter().map(|f| f.assessment.len()).collect();
        assert_eq!(sizes, vec![4, 4, 3]);
        for fold in &folds {
            assert_eq!(fold.analysis.len() + fold.assessment.len(), 11);
        }
    }

    #[test]
    fn test_assessment_sets_partition_rows() {
        let folds = vfold(25, 4, 7).unwrap();
        let mut seen = HashSet::new();
        for fold in &folds {
            for &idx in &fold.assessment {
                assert!(seen.insert(idx), "row {} assessed twice", idx);
                assert!(!fold.analysis.contains(&idx));
            }
        }
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn test_same_seed_same_folds() {
        let a = vfold(30, 3, 42).unwrap();
        let b = vfold(30, 3, 42).unwrap();
        for (fa, fb) in a.iter().zip(b.iter()) {
            assert_eq!(fa.assessment, fb.assessment);
            assert_eq!(fa.analysis, fb.analysis);
        }

        let c = vfold(30, 3, 43).unwrap();
        assert!(a
            .iter()
            .zip(c.iter())
            .any(|(fa, fc)| fa.assessment != fc.assessment));
    }

    #[test]
    fn test_invalid_requests_rejected() {
        assert!(vfold(10, 1, 0).is_err());
        assert!(vfold(2, 3, 0).is_err());
    }
}
