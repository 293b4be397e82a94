//! Cross-validation splitters and scoring

use crate::error::{Result, WranglerError};
use crate::training::metrics;
use crate::training::models::Classifier;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Stratified k-fold splitter over rows in their original order
#[derive(Debug, Clone, Copy)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    /// Generate train/test splits that keep each class's share in every fold
    pub fn split(&self, y: &Array1<usize>) -> Result<Vec<CVSplit>> {
        let n_splits = self.n_splits;
        if n_splits < 2 {
            return Err(WranglerError::InvalidInput(format!(
                "k-fold cross-validation requires at least one train/test split by setting n_splits=2 or more, got n_splits={}",
                n_splits
            )));
        }
        if y.len() < n_splits {
            return Err(WranglerError::InvalidInput(format!(
                "Cannot have number of splits n_splits={} greater than the number of samples: n_samples={}",
                n_splits,
                y.len()
            )));
        }

        let mut class_indices: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, &label) in y.iter().enumerate() {
            class_indices.entry(label).or_default().push(idx);
        }

        if class_indices.values().all(|members| members.len() < n_splits) {
            return Err(WranglerError::InvalidInput(format!(
                "n_splits={} cannot be greater than the number of members in each class",
                n_splits
            )));
        }

        // Deal each class round-robin, continuing where the previous class stopped
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut next_fold = 0;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[next_fold].push(idx);
                next_fold = (next_fold + 1) % n_splits;
            }
        }

        let splits = (0..n_splits)
            .map(|fold_idx| {
                let mut test_indices = folds[fold_idx].clone();
                test_indices.sort_unstable();
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();
                CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect();

        Ok(splits)
    }
}

/// Results of cross-validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Population standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

/// Weighted-F1 cross-validation with a fresh estimator per fold.
///
/// Uses non-shuffled stratified folds. Any failing fold fails the whole run.
pub fn cross_val_f1<F>(make_estimator: F, x: &Array2<f64>, y: &Array1<usize>, n_folds: usize) -> Result<CVResults>
where
    F: Fn() -> Box<dyn Classifier>,
{
    let splits = StratifiedKFold::new(n_folds).split(y)?;

    let mut scores = Vec::with_capacity(splits.len());
    for split in &splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let mut estimator = make_estimator();
        estimator.fit(&x_train, &y_train)?;
        let predictions = estimator.predict(&x_test)?;
        scores.push(metrics::f1_weighted(&y_test, &predictions));
    }

    Ok(CVResults::from_scores(scores))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratified_preserves_balance() {
        let y = Array1::from_iter((0..20).map(|i| i % 2));
        let splits = StratifiedKFold::new(5).split(&y).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 4);
            assert_eq!(split.train_indices.len(), 16);
            let positives = split.test_indices.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(positives, 2);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_folds_follow_row_order() {
        let y = Array1::from_vec(vec![0usize, 0, 0, 1, 1, 1]);
        let splits = StratifiedKFold::new(3).split(&y).unwrap();

        assert_eq!(splits[0].test_indices, vec![0, 3]);
        assert_eq!(splits[1].test_indices, vec![1, 4]);
        assert_eq!(splits[2].test_indices, vec![2, 5]);
    }

    #[test]
    fn test_too_few_splits_or_samples() {
        let y = Array1::from_iter((0..6).map(|i| i % 2));
        assert!(StratifiedKFold::new(1).split(&y).is_err());
        assert!(StratifiedKFold::new(4).split(&y).is_err());
        assert!(StratifiedKFold::new(7).split(&y).is_err());
    }

    #[test]
    fn test_cv_results() {
        let results = CVResults::from_scores(vec![0.8, 0.85, 0.9, 0.82, 0.88]);
        assert_eq!(results.n_folds, 5);
        assert!((results.mean_score - 0.85).abs() < 1e-10);
        assert!(results.std_score > 0.0);
    }
}
