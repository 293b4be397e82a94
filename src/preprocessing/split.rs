//! Train/test partitioning with a stratified-first strategy

use crate::error::{Result, WranglerError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    /// Whether per-class proportions were preserved
    pub stratified: bool,
}

/// Number of test rows for `n` samples: `ceil(n * test_ratio)`.
pub fn test_size_for(n_samples: usize, test_ratio: f64) -> usize {
    ((n_samples as f64) * test_ratio).ceil() as usize
}

/// Split `labels` into train and test indices.
///
/// Tries a stratified split first. When a class is too small to appear on
/// both sides (or either side cannot hold one row per class) it falls back
/// to a plain shuffled split with the same seed and ratio.
pub fn train_test_split(
    labels: &[usize],
    n_classes: usize,
    test_ratio: f64,
    seed: u64,
) -> Result<SplitIndices> {
    let n = labels.len();
    let n_test = test_size_for(n, test_ratio);
    if n_test == 0 || n_test >= n {
        return Err(WranglerError::InvalidInput(format!(
            "test_ratio {} leaves no rows on one side of a {}-row split",
            test_ratio, n
        )));
    }

    match stratified_split(labels, n_classes, n_test, seed) {
        Some(split) => Ok(split),
        None => {
            warn!(
                samples = n,
                classes = n_classes,
                "Stratified split not possible, falling back to random split"
            );
            Ok(random_split(n, n_test, seed))
        }
    }
}

fn stratified_split(labels: &[usize], n_classes: usize, n_test: usize, seed: u64) -> Option<SplitIndices> {
    let n = labels.len();
    let n_train = n - n_test;

    let mut class_indices: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        class_indices.get_mut(label)?.push(i);
    }
    let counts: Vec<usize> = class_indices.iter().map(|c| c.len()).collect();
    let present = counts.iter().filter(|&&c| c > 0).count();

    if counts.iter().any(|&c| c == 1) || n_test < present || n_train < present {
        return None;
    }

    let test_counts = allocate(&counts, n_test);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);

    for (indices, &take) in class_indices.iter_mut().zip(&test_counts) {
        indices.shuffle(&mut rng);
        test.extend_from_slice(&indices[..take]);
        train.extend_from_slice(&indices[take..]);
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Some(SplitIndices {
        train,
        test,
        stratified: true,
    })
}

/// Distribute `total` slots across classes proportionally to `counts`,
/// handing leftovers to the largest fractional remainders.
fn allocate(counts: &[usize], total: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| total as f64 * c as f64 / n as f64)
        .collect();
    let mut alloc: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.partial_cmp(&ra)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(counts[b].cmp(&counts[a]))
            .then(a.cmp(&b))
    });

    let mut remaining = total.saturating_sub(alloc.iter().sum());
    for &class in order.iter().cycle().take(counts.len() * 2) {
        if remaining == 0 {
            break;
        }
        // keep at least one row of every class in train
        if alloc[class] + 1 < counts[class] {
            alloc[class] += 1;
            remaining -= 1;
        }
    }

    alloc
}

fn random_split(n: usize, n_test: usize, seed: u64) -> SplitIndices {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    let train = indices.split_off(n_test);
    SplitIndices {
        train,
        test: indices,
        stratified: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratified_balanced() {
        let labels: Vec<usize> = (0..20).map(|i| i % 2).collect();
        let split = train_test_split(&labels, 2, 0.2, 42).unwrap();

        assert!(split.stratified);
        assert_eq!(split.train.len(), 16);
        assert_eq!(split.test.len(), 4);
        let test_pos = split.test.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!(test_pos, 2);
    }

    #[test]
    fn test_partition_is_complete() {
        let labels: Vec<usize> = (0..23).map(|i| i % 3).collect();
        let split = train_test_split(&labels, 3, 0.2, 7).unwrap();
        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort();
        assert_eq!(all, (0..23).collect::<Vec<_>>());
        assert_eq!(split.test.len(), 5);
    }

    #[test]
    fn test_singleton_class_falls_back() {
        let mut labels = vec![0usize; 11];
        labels.push(1);
        let split = train_test_split(&labels, 2, 0.2, 42).unwrap();
        assert!(!split.stratified);
        assert_eq!(split.test.len(), 3);
        assert_eq!(split.train.len(), 9);
    }

    #[test]
    fn test_too_many_classes_for_test_set() {
        // 10 rows, 5 classes of 2: test holds 2 rows < 5 classes
        let labels: Vec<usize> = (0..10).map(|i| i % 5).collect();
        let split = train_test_split(&labels, 5, 0.2, 42).unwrap();
        assert!(!split.stratified);
    }

    #[test]
    fn test_deterministic() {
        let labels: Vec<usize> = (0..30).map(|i| i % 2).collect();
        let a = train_test_split(&labels, 2, 0.2, 42).unwrap();
        let b = train_test_split(&labels, 2, 0.2, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_allocate_largest_remainder() {
        assert_eq!(allocate(&[10, 10], 4), vec![2, 2]);
        assert_eq!(allocate(&[7, 3], 2), vec![1, 1]);
    }
}
