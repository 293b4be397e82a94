//! CART classification tree
//!
//! Supports the exhaustive "best" splitter and the extremely randomized
//! "random" splitter, per-node feature subsampling and weighted samples, so
//! the same tree backs the forests, bagging and AdaBoost stumps.

use crate::error::{Result, WranglerError};
use crate::training::models::{
    check_fit_input, check_n_features, display_option, hyperparameters, ClassIndex, Classifier, Hyperparameters,
};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Values closer than this are treated as equal when placing thresholds
const FEATURE_THRESHOLD: f64 = 1e-7;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf with the class distribution of its samples
    Leaf { distribution: Vec<f64>, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    Gini,
    Entropy,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Gini => write!(f, "gini"),
            Criterion::Entropy => write!(f, "entropy"),
        }
    }
}

/// How split thresholds are chosen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Splitter {
    /// Scan every threshold between distinct values
    Best,
    /// One uniform random threshold per candidate feature
    Random,
}

impl fmt::Display for Splitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Splitter::Best => write!(f, "best"),
            Splitter::Random => write!(f, "random"),
        }
    }
}

/// Strategy for features considered per split
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fixed(n) => (*n).min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::Log2 => write!(f, "log2"),
            MaxFeatures::Fixed(n) => write!(f, "{}", n),
            MaxFeatures::All => write!(f, "None"),
        }
    }
}

/// Decision tree classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub criterion: Criterion,
    pub splitter: Splitter,
    pub random_state: u64,
    root: Option<TreeNode>,
    class_index: ClassIndex,
    n_classes: usize,
    n_features: usize,
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Candidate split found for one feature
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

impl DecisionTreeClassifier {
    pub fn new() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            criterion: Criterion::Gini,
            splitter: Splitter::Best,
            random_state: 42,
            root: None,
            class_index: ClassIndex::default(),
            n_classes: 0,
            n_features: 0,
        }
    }

    /// Single extremely randomized tree
    pub fn extra_tree() -> Self {
        Self::new()
            .with_splitter(Splitter::Random)
            .with_max_features(MaxFeatures::Sqrt)
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_splitter(mut self, splitter: Splitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit on labels already encoded as positions `0..n_classes`.
    ///
    /// Rows with zero weight are ignored; leaf distributions always have
    /// `n_classes` entries so ensembles can average them directly.
    pub fn fit_encoded(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize, weights: &[f64]) -> Result<()> {
        if y.len() != x.nrows() || weights.len() != x.nrows() {
            return Err(WranglerError::ShapeError {
                expected: format!("{} labels and weights", x.nrows()),
                actual: format!("{} labels, {} weights", y.len(), weights.len()),
            });
        }
        self.n_classes = n_classes;
        self.n_features = x.ncols();

        let indices: Vec<usize> = (0..x.nrows()).filter(|&i| weights[i] > 0.0).collect();
        if indices.is_empty() {
            return Err(WranglerError::TrainingError("No samples with positive weight".to_string()));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let data = TreeData { x, y, weights, n_classes };
        self.root = Some(self.build(&data, indices, 0, &mut rng));
        Ok(())
    }

    fn build(&self, data: &TreeData<'_>, indices: Vec<usize>, depth: usize, rng: &mut ChaCha8Rng) -> TreeNode {
        let distribution = data.class_weights(&indices);
        let n_samples = indices.len();
        let impurity = impurity(self.criterion, &distribution);

        let stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;

        if stop {
            return leaf(distribution, n_samples);
        }

        let candidates = self.candidate_features(data.x.ncols(), rng);
        let best = match self.splitter {
            Splitter::Best => self.best_split(data, &indices, &candidates, impurity),
            Splitter::Random => {
                let thresholds: Vec<(usize, f64)> = candidates
                    .iter()
                    .filter_map(|&f| {
                        let (min, max) = feature_range(data.x.column(f), &indices);
                        (max - min > FEATURE_THRESHOLD).then(|| (f, rng.gen_range(min..max)))
                    })
                    .collect();
                self.random_split(data, &indices, &thresholds, impurity)
            }
        };

        let Some(split) = best else {
            return leaf(distribution, n_samples);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| data.x[[i, split.feature_idx]] <= split.threshold);

        let left = Box::new(self.build(data, left, depth + 1, rng));
        let right = Box::new(self.build(data, right, depth + 1, rng));
        TreeNode::Split {
            feature_idx: split.feature_idx,
            threshold: split.threshold,
            left,
            right,
            n_samples,
        }
    }

    fn candidate_features(&self, n_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let k = self.max_features.resolve(n_features);
        let mut features: Vec<usize> = (0..n_features).collect();
        if k < n_features {
            features.partial_shuffle(rng, k);
            features.truncate(k);
        }
        features
    }

    fn best_split(
        &self,
        data: &TreeData<'_>,
        indices: &[usize],
        features: &[usize],
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        // Each feature scans its thresholds independently
        let per_feature: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut sorted = indices.to_vec();
                sorted.sort_by(|&a, &b| {
                    data.x[[a, feature_idx]]
                        .partial_cmp(&data.x[[b, feature_idx]])
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

                let total = data.class_weights(&sorted);
                let total_w: f64 = total.iter().sum();
                let mut left = vec![0.0; data.n_classes];
                let mut best: Option<SplitCandidate> = None;

                for pos in 0..sorted.len() - 1 {
                    let i = sorted[pos];
                    left[data.y[i]] += data.weights[i];
                    let n_left = pos + 1;
                    let n_right = sorted.len() - n_left;

                    let value = data.x[[i, feature_idx]];
                    let next = data.x[[sorted[pos + 1], feature_idx]];
                    if next <= value + FEATURE_THRESHOLD {
                        continue;
                    }
                    if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                        continue;
                    }

                    let gain = self.gain(&left, &total, total_w, parent_impurity);
                    if best.map_or(true, |b| gain > b.gain) {
                        best = Some(SplitCandidate {
                            feature_idx,
                            threshold: value + (next - value) / 2.0,
                            gain,
                        });
                    }
                }
                best
            })
            .collect();

        first_best(per_feature)
    }

    fn random_split(
        &self,
        data: &TreeData<'_>,
        indices: &[usize],
        thresholds: &[(usize, f64)],
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let total = data.class_weights(indices);
        let total_w: f64 = total.iter().sum();

        let per_feature = thresholds
            .iter()
            .map(|&(feature_idx, threshold)| {
                let mut left = vec![0.0; data.n_classes];
                let mut n_left = 0;
                for &i in indices {
                    if data.x[[i, feature_idx]] <= threshold {
                        left[data.y[i]] += data.weights[i];
                        n_left += 1;
                    }
                }
                let n_right = indices.len() - n_left;
                if n_left < self.min_samples_leaf.max(1) || n_right < self.min_samples_leaf.max(1) {
                    return None;
                }
                Some(SplitCandidate {
                    feature_idx,
                    threshold,
                    gain: self.gain(&left, &total, total_w, parent_impurity),
                })
            })
            .collect();

        first_best(per_feature)
    }

    fn gain(&self, left: &[f64], total: &[f64], total_w: f64, parent_impurity: f64) -> f64 {
        let right: Vec<f64> = total.iter().zip(left).map(|(t, l)| t - l).collect();
        let left_w: f64 = left.iter().sum();
        let right_w = total_w - left_w;
        parent_impurity
            - (left_w / total_w) * impurity(self.criterion, left)
            - (right_w / total_w) * impurity(self.criterion, &right)
    }

    /// Class distribution (normalized) of the leaf each row falls into.
    pub fn predict_proba_encoded(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(WranglerError::ModelNotFitted)?;
        check_n_features(x, self.n_features)?;

        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            let distribution = descend(root, row);
            let total: f64 = distribution.iter().sum();
            for (k, &w) in distribution.iter().enumerate() {
                out[[i, k]] = if total > 0.0 { w / total } else { 0.0 };
            }
        }
        Ok(out)
    }

    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }
}

impl Classifier for DecisionTreeClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        self.class_index = ClassIndex::fit(y)?;
        let encoded = self.class_index.encode(y)?;
        let weights = vec![1.0; y.len()];
        self.fit_encoded(x, &encoded, self.class_index.len(), &weights)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let proba = self.predict_proba_encoded(x)?;
        Ok(self.class_index.decode_argmax(&proba))
    }

    fn has_predict_proba(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.predict_proba_encoded(x)
    }

    fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        hyperparameters([
            ("criterion", &self.criterion),
            ("max_depth", &display_option(self.max_depth)),
            ("max_features", &self.max_features),
            ("min_samples_leaf", &self.min_samples_leaf),
            ("min_samples_split", &self.min_samples_split),
            ("random_state", &self.random_state),
            ("splitter", &self.splitter),
        ])
    }
}

struct TreeData<'a> {
    x: &'a Array2<f64>,
    y: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
}

impl TreeData<'_> {
    fn class_weights(&self, indices: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &i in indices {
            counts[self.y[i]] += self.weights[i];
        }
        counts
    }
}

fn leaf(distribution: Vec<f64>, n_samples: usize) -> TreeNode {
    TreeNode::Leaf {
        distribution,
        n_samples,
    }
}

fn descend<'a>(mut node: &'a TreeNode, row: ArrayView1<'_, f64>) -> &'a [f64] {
    loop {
        match node {
            TreeNode::Leaf { distribution, .. } => return distribution,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                node = if row[*feature_idx] <= *threshold { left } else { right };
            }
        }
    }
}

fn feature_range(column: ArrayView1<'_, f64>, indices: &[usize]) -> (f64, f64) {
    indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
        (lo.min(column[i]), hi.max(column[i]))
    })
}

/// Highest gain wins; earlier candidates win ties.
fn first_best(candidates: Vec<Option<SplitCandidate>>) -> Option<SplitCandidate> {
    candidates.into_iter().flatten().fold(None, |best: Option<SplitCandidate>, c| match best {
        Some(b) if b.gain >= c.gain => Some(b),
        _ => Some(c),
    })
}

fn impurity(criterion: Criterion, counts: &[f64]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    match criterion {
        Criterion::Gini => 1.0 - counts.iter().map(|&c| (c / total).powi(2)).sum::<f64>(),
        Criterion::Entropy => -counts
            .iter()
            .filter(|&&c| c > 0.0)
            .map(|&c| {
                let p = c / total;
                p * p.log2()
            })
            .sum::<f64>(),
    }
}
