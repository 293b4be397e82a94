//! Gradient boosted trees
//!
//! One boosting engine with pluggable tree growth backs every boosted model in
//! the catalog:
//! - depth-wise exact trees (classic gradient boosting, XGBoost)
//! - leaf-wise trees over binned features (histogram boosting, LightGBM)
//! - oblivious (symmetric) trees over binned features (CatBoost)
//!
//! Binary targets use one logistic output, multi-class targets one softmax
//! output per class. Leaves take the regularized Newton step `-G / (H + lambda)`
//! scaled by the learning rate.

use crate::error::{Result, WranglerError};
use crate::training::models::{
    check_fit_input, check_n_features, hyperparameters, sigmoid, softmax_rows, ClassIndex, Hyperparameters,
};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How each boosting round grows its regression tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TreeGrowth {
    /// Split every node until `max_depth`
    DepthWise { max_depth: usize },
    /// Split the best leaf first until `max_leaves`
    LeafWise { max_leaves: usize, max_depth: Option<usize> },
    /// Same split for every node of a level
    Oblivious { depth: usize },
}

impl fmt::Display for TreeGrowth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeGrowth::DepthWise { .. } => write!(f, "depthwise"),
            TreeGrowth::LeafWise { .. } => write!(f, "lossguide"),
            TreeGrowth::Oblivious { .. } => write!(f, "SymmetricTree"),
        }
    }
}

/// Engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub growth: TreeGrowth,
    /// L2 regularization on leaf values
    pub reg_lambda: f64,
    /// Minimum hessian sum per child
    pub min_child_weight: f64,
    /// Minimum samples per child
    pub min_samples_leaf: usize,
    /// Bin features into at most this many bins before training
    pub max_bins: Option<usize>,
}

/// Regression tree fitted to one round's gradients
#[derive(Debug, Clone, Serialize, Deserialize)]
enum BoostNode {
    Leaf { value: f64 },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<BoostNode>,
        right: Box<BoostNode>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum BoostTree {
    Binary(BoostNode),
    Oblivious { splits: Vec<(usize, f64)>, leaf_values: Vec<f64> },
}

impl BoostTree {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        match self {
            BoostTree::Binary(root) => {
                let mut node = root;
                loop {
                    match node {
                        BoostNode::Leaf { value } => return *value,
                        BoostNode::Split {
                            feature,
                            threshold,
                            left,
                            right,
                        } => node = if row[*feature] <= *threshold { left } else { right },
                    }
                }
            }
            BoostTree::Oblivious { splits, leaf_values } => {
                let leaf = splits
                    .iter()
                    .fold(0usize, |idx, &(f, t)| idx * 2 + usize::from(row[f] > t));
                leaf_values[leaf]
            }
        }
    }
}

#[derive(Debug, Clone)]
struct CandidateSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Gradients of one output plus the data needed to search splits
struct SplitSearch<'a> {
    x: &'a Array2<f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoostingParams,
    /// Sorted bin edges per feature when binning is on
    edges: Option<&'a [Vec<f64>]>,
}

impl SplitSearch<'_> {
    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.reg_lambda;
        if denom <= 1e-150 {
            0.0
        } else {
            g * g / denom
        }
    }

    fn leaf_value(&self, indices: &[usize]) -> f64 {
        let g: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hess[i]).sum();
        let denom = h + self.params.reg_lambda;
        if denom <= 1e-150 {
            0.0
        } else {
            -self.params.learning_rate * g / denom
        }
    }

    fn can_split(&self, n: usize) -> bool {
        n >= 2 * self.params.min_samples_leaf.max(1)
    }

    fn best_split(&self, indices: &[usize]) -> Option<CandidateSplit> {
        if !self.can_split(indices.len()) {
            return None;
        }
        let per_feature: Vec<Option<(usize, f64, f64)>> = (0..self.x.ncols())
            .into_par_iter()
            .map(|f| self.feature_split(indices, f).map(|(t, gain)| (f, t, gain)))
            .collect();

        let (feature, threshold, gain) = per_feature
            .into_iter()
            .flatten()
            .fold(None, |best: Option<(usize, f64, f64)>, c| match best {
                Some(b) if b.2 >= c.2 => Some(b),
                _ => Some(c),
            })?;

        if gain <= 1e-12 {
            return None;
        }
        let (left, right) = indices.iter().partition(|&&i| self.x[[i, feature]] <= threshold);
        Some(CandidateSplit {
            feature,
            threshold,
            gain,
            left,
            right,
        })
    }

    fn feature_split(&self, indices: &[usize], f: usize) -> Option<(f64, f64)> {
        let mut sorted = indices.to_vec();
        sorted.sort_by(|&a, &b| {
            self.x[[a, f]]
                .partial_cmp(&self.x[[b, f]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let g_total: f64 = sorted.iter().map(|&i| self.grad[i]).sum();
        let h_total: f64 = sorted.iter().map(|&i| self.hess[i]).sum();
        let parent = self.score(g_total, h_total);

        let mut g_left = 0.0;
        let mut h_left = 0.0;
        let mut best: Option<(f64, f64)> = None;

        for pos in 0..sorted.len() - 1 {
            let i = sorted[pos];
            g_left += self.grad[i];
            h_left += self.hess[i];

            let value = self.x[[i, f]];
            let next = self.x[[sorted[pos + 1], f]];
            if next <= value {
                continue;
            }
            let n_left = pos + 1;
            let n_right = sorted.len() - n_left;
            if n_left < self.params.min_samples_leaf || n_right < self.params.min_samples_leaf {
                continue;
            }
            let h_right = h_total - h_left;
            if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                continue;
            }

            let threshold = match self.edges {
                None => value + (next - value) / 2.0,
                Some(edges) => {
                    let feature_edges = &edges[f];
                    let at = feature_edges.partition_point(|&e| e < value);
                    match feature_edges.get(at) {
                        Some(&edge) if edge < next => edge,
                        _ => continue,
                    }
                }
            };

            let gain = self.score(g_left, h_left) + self.score(g_total - g_left, h_right) - parent;
            if best.map_or(true, |(_, b)| gain > b) {
                best = Some((threshold, gain));
            }
        }
        best
    }

    fn grow(&self, indices: Vec<usize>, bins: Option<&Array2<usize>>) -> BoostTree {
        match self.params.growth {
            TreeGrowth::DepthWise { max_depth } => BoostTree::Binary(self.grow_depthwise(indices, 0, max_depth)),
            TreeGrowth::LeafWise { max_leaves, max_depth } => {
                BoostTree::Binary(self.grow_leafwise(indices, max_leaves, max_depth))
            }
            TreeGrowth::Oblivious { depth } => match (bins, self.edges) {
                (Some(bins), Some(edges)) => self.grow_oblivious(&indices, depth, bins, edges),
                _ => BoostTree::Binary(self.grow_depthwise(indices, 0, depth)),
            },
        }
    }

    fn grow_depthwise(&self, indices: Vec<usize>, depth: usize, max_depth: usize) -> BoostNode {
        if depth >= max_depth {
            return BoostNode::Leaf {
                value: self.leaf_value(&indices),
            };
        }
        match self.best_split(&indices) {
            Some(split) => BoostNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(self.grow_depthwise(split.left, depth + 1, max_depth)),
                right: Box::new(self.grow_depthwise(split.right, depth + 1, max_depth)),
            },
            None => BoostNode::Leaf {
                value: self.leaf_value(&indices),
            },
        }
    }

    fn grow_leafwise(&self, indices: Vec<usize>, max_leaves: usize, max_depth: Option<usize>) -> BoostNode {
        enum Slot {
            Leaf(Vec<usize>),
            Split {
                feature: usize,
                threshold: f64,
                left: usize,
                right: usize,
            },
        }

        let depth_limit = max_depth.unwrap_or(usize::MAX);
        let mut pending: Vec<(usize, usize, CandidateSplit)> = Vec::new();
        if let Some(split) = self.best_split(&indices) {
            pending.push((0, 0, split));
        }
        let mut slots = vec![Slot::Leaf(indices)];
        let mut n_leaves = 1;

        while n_leaves < max_leaves && !pending.is_empty() {
            // highest gain first, earliest candidate on ties
            let mut pick = 0;
            for (i, candidate) in pending.iter().enumerate() {
                if candidate.2.gain > pending[pick].2.gain {
                    pick = i;
                }
            }
            let (node_id, depth, split) = pending.remove(pick);

            let left_id = slots.len();
            let right_id = left_id + 1;
            for (child_id, child) in [(left_id, &split.left), (right_id, &split.right)] {
                if depth + 1 < depth_limit {
                    if let Some(child_split) = self.best_split(child) {
                        pending.push((child_id, depth + 1, child_split));
                    }
                }
            }
            slots.push(Slot::Leaf(split.left));
            slots.push(Slot::Leaf(split.right));
            slots[node_id] = Slot::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: left_id,
                right: right_id,
            };
            n_leaves += 1;
        }

        fn build(slots: &[Slot], id: usize, search: &SplitSearch<'_>) -> BoostNode {
            match &slots[id] {
                Slot::Leaf(indices) => BoostNode::Leaf {
                    value: search.leaf_value(indices),
                },
                Slot::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => BoostNode::Split {
                    feature: *feature,
                    threshold: *threshold,
                    left: Box::new(build(slots, *left, search)),
                    right: Box::new(build(slots, *right, search)),
                },
            }
        }
        build(&slots, 0, self)
    }

    /// One (feature, edge) per level, chosen by the summed gain of all buckets.
    fn grow_oblivious(&self, indices: &[usize], depth: usize, bins: &Array2<usize>, edges: &[Vec<f64>]) -> BoostTree {
        let mut bucket_of: Vec<usize> = vec![0; self.x.nrows()];
        let mut n_buckets = 1;
        let mut splits = Vec::with_capacity(depth);

        for _ in 0..depth {
            let per_feature: Vec<Option<(usize, usize, f64)>> = (0..self.x.ncols())
                .into_par_iter()
                .map(|f| {
                    let n_edges = edges[f].len();
                    if n_edges == 0 {
                        return None;
                    }
                    // per bucket histograms over bins 0..=n_edges
                    let width = n_edges + 1;
                    let mut g_hist = vec![0.0; n_buckets * width];
                    let mut h_hist = vec![0.0; n_buckets * width];
                    let mut c_hist = vec![0usize; n_buckets * width];
                    for &i in indices {
                        let slot = bucket_of[i] * width + bins[[i, f]];
                        g_hist[slot] += self.grad[i];
                        h_hist[slot] += self.hess[i];
                        c_hist[slot] += 1;
                    }

                    let mut gains = vec![0.0; n_edges];
                    let mut valid = vec![false; n_edges];
                    for b in 0..n_buckets {
                        let row = b * width..(b + 1) * width;
                        let g_total: f64 = g_hist[row.clone()].iter().sum();
                        let h_total: f64 = h_hist[row.clone()].iter().sum();
                        let c_total: usize = c_hist[row.clone()].iter().sum();
                        let parent = self.score(g_total, h_total);
                        let (mut gl, mut hl, mut cl) = (0.0, 0.0, 0usize);
                        for t in 0..n_edges {
                            gl += g_hist[row.start + t];
                            hl += h_hist[row.start + t];
                            cl += c_hist[row.start + t];
                            if cl > 0 && cl < c_total {
                                valid[t] = true;
                            }
                            gains[t] += self.score(gl, hl) + self.score(g_total - gl, h_total - hl) - parent;
                        }
                    }

                    (0..n_edges)
                        .filter(|&t| valid[t])
                        .fold(None, |best: Option<(usize, usize, f64)>, t| match best {
                            Some(b) if b.2 >= gains[t] => Some(b),
                            _ => Some((f, t, gains[t])),
                        })
                })
                .collect();

            let best = per_feature
                .into_iter()
                .flatten()
                .fold(None, |best: Option<(usize, usize, f64)>, c| match best {
                    Some(b) if b.2 >= c.2 => Some(b),
                    _ => Some(c),
                });

            match best {
                Some((f, t, gain)) if gain > 1e-12 => {
                    for &i in indices {
                        bucket_of[i] = bucket_of[i] * 2 + usize::from(bins[[i, f]] > t);
                    }
                    n_buckets *= 2;
                    splits.push((f, edges[f][t]));
                }
                _ => break,
            }
        }

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_buckets];
        for &i in indices {
            members[bucket_of[i]].push(i);
        }
        let leaf_values = members
            .iter()
            .map(|m| if m.is_empty() { 0.0 } else { self.leaf_value(m) })
            .collect();

        BoostTree::Oblivious { splits, leaf_values }
    }
}

/// Quantile bin edges per feature; `x <= edges[t]` puts a value in bin `<= t`.
fn compute_bin_edges(x: &Array2<f64>, max_bins: usize) -> Vec<Vec<f64>> {
    x.columns()
        .into_iter()
        .map(|column| {
            let mut values = column.to_vec();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let mut distinct = values.clone();
            distinct.dedup();

            if distinct.len() <= max_bins {
                return distinct.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0).collect();
            }

            let n = values.len();
            let mut edges: Vec<f64> = (1..max_bins)
                .filter_map(|b| {
                    let at = b * n / max_bins;
                    let (lo, hi) = (values[at - 1], values[at]);
                    (hi > lo).then(|| lo + (hi - lo) / 2.0)
                })
                .collect();
            edges.dedup();
            edges
        })
        .collect()
}

fn bin_matrix(x: &Array2<f64>, edges: &[Vec<f64>]) -> Array2<usize> {
    Array2::from_shape_fn(x.dim(), |(i, f)| edges[f].partition_point(|&e| e < x[[i, f]]))
}

/// Boosting engine shared by every boosted classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBooster {
    pub params: BoostingParams,
    /// rounds x outputs
    trees: Vec<Vec<BoostTree>>,
    base_scores: Vec<f64>,
    class_index: ClassIndex,
    n_features: usize,
}

impl GradientBooster {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            base_scores: Vec::new(),
            class_index: ClassIndex::default(),
            n_features: 0,
        }
    }

    fn n_outputs(&self) -> usize {
        if self.class_index.len() == 2 {
            1
        } else {
            self.class_index.len()
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.params.n_estimators == 0 {
            return Err(WranglerError::InvalidInput("n_estimators must be greater than zero".to_string()));
        }
        self.class_index = ClassIndex::fit_at_least_two(y)?;
        self.n_features = x.ncols();
        let encoded = self.class_index.encode(y)?;
        let n = x.nrows();
        let k = self.class_index.len();
        let n_outputs = self.n_outputs();

        let mut priors = vec![0.0; k];
        for &c in &encoded {
            priors[c] += 1.0 / n as f64;
        }
        self.base_scores = if n_outputs == 1 {
            vec![(priors[1] / priors[0]).ln()]
        } else {
            priors.iter().map(|p| p.ln()).collect()
        };

        let max_bins = match (self.params.max_bins, self.params.growth) {
            (Some(b), _) => Some(b),
            (None, TreeGrowth::Oblivious { .. }) => Some(254),
            (None, _) => None,
        };
        let edges = max_bins.map(|b| compute_bin_edges(x, b.max(2)));
        let bins = edges.as_ref().map(|e| bin_matrix(x, e));

        let mut raw = Array2::from_shape_fn((n, n_outputs), |(_, j)| self.base_scores[j]);
        let indices: Vec<usize> = (0..n).collect();
        self.trees.clear();

        for _ in 0..self.params.n_estimators {
            let proba = raw_to_proba(&raw);
            let mut round = Vec::with_capacity(n_outputs);

            for out in 0..n_outputs {
                let class = if n_outputs == 1 { 1 } else { out };
                let grad: Vec<f64> = (0..n)
                    .map(|i| proba[[i, class]] - if encoded[i] == class { 1.0 } else { 0.0 })
                    .collect();
                let hess: Vec<f64> = (0..n)
                    .map(|i| (proba[[i, class]] * (1.0 - proba[[i, class]])).max(1e-16))
                    .collect();

                let search = SplitSearch {
                    x,
                    grad: &grad,
                    hess: &hess,
                    params: &self.params,
                    edges: edges.as_deref(),
                };
                let tree = search.grow(indices.clone(), bins.as_ref());
                for (i, row) in x.rows().into_iter().enumerate() {
                    raw[[i, out]] += tree.predict(row);
                }
                round.push(tree);
            }
            self.trees.push(round);
        }

        Ok(())
    }

    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(WranglerError::ModelNotFitted);
        }
        check_n_features(x, self.n_features)?;
        let n_outputs = self.n_outputs();
        let mut raw = Array2::from_shape_fn((x.nrows(), n_outputs), |(_, j)| self.base_scores[j]);
        for (i, row) in x.rows().into_iter().enumerate() {
            for round in &self.trees {
                for (out, tree) in round.iter().enumerate() {
                    raw[[i, out]] += tree.predict(row);
                }
            }
        }
        Ok(raw)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(raw_to_proba(&self.decision_function(x)?))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(self.class_index.decode_argmax(&proba))
    }

    pub fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }
}

/// Logistic for one output, softmax for several.
fn raw_to_proba(raw: &Array2<f64>) -> Array2<f64> {
    if raw.ncols() == 1 {
        let mut proba = Array2::zeros((raw.nrows(), 2));
        for (i, &r) in raw.column(0).iter().enumerate() {
            let p = sigmoid(r);
            proba[[i, 0]] = 1.0 - p;
            proba[[i, 1]] = p;
        }
        proba
    } else {
        let mut proba = raw.clone();
        softmax_rows(&mut proba);
        proba
    }
}

/// Implements [`Classifier`](crate::training::models::Classifier) for a wrapper holding a `booster` field.
macro_rules! boosted_classifier {
    ($ty:ty) => {
        impl $crate::training::models::Classifier for $ty {
            fn fit(
                &mut self,
                x: &ndarray::Array2<f64>,
                y: &ndarray::Array1<usize>,
            ) -> $crate::error::Result<()> {
                self.booster.fit(x, y)
            }

            fn predict(&self, x: &ndarray::Array2<f64>) -> $crate::error::Result<ndarray::Array1<usize>> {
                self.booster.predict(x)
            }

            fn has_predict_proba(&self) -> bool {
                true
            }

            fn predict_proba(&self, x: &ndarray::Array2<f64>) -> $crate::error::Result<ndarray::Array2<f64>> {
                self.booster.predict_proba(x)
            }

            fn classes(&self) -> &[usize] {
                self.booster.classes()
            }

            fn hyperparameters(&self) -> $crate::training::models::Hyperparameters {
                self.params()
            }
        }
    };
}
pub(crate) use boosted_classifier;

/// Classic gradient boosting: depth-3 trees, learning rate 0.1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    booster: GradientBooster,
    pub random_state: u64,
}

impl Default for GradientBoostingClassifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl GradientBoostingClassifier {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            booster: GradientBooster::new(BoostingParams {
                n_estimators,
                learning_rate: 0.1,
                growth: TreeGrowth::DepthWise { max_depth: 3 },
                reg_lambda: 0.0,
                min_child_weight: 0.0,
                min_samples_leaf: 1,
                max_bins: None,
            }),
            random_state: 42,
        }
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.booster.params.learning_rate = learning_rate;
        self
    }

    fn params(&self) -> Hyperparameters {
        let p = &self.booster.params;
        let max_depth = match p.growth {
            TreeGrowth::DepthWise { max_depth } => max_depth,
            _ => 3,
        };
        hyperparameters([
            ("learning_rate", &p.learning_rate),
            ("loss", &"log_loss"),
            ("max_depth", &max_depth),
            ("min_samples_leaf", &p.min_samples_leaf),
            ("n_estimators", &p.n_estimators),
            ("random_state", &self.random_state),
        ])
    }
}

boosted_classifier!(GradientBoostingClassifier);

/// Histogram gradient boosting: binned features, leaf-wise trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistGradientBoostingClassifier {
    booster: GradientBooster,
    pub random_state: u64,
}

impl Default for HistGradientBoostingClassifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl HistGradientBoostingClassifier {
    pub fn new(max_iter: usize) -> Self {
        Self {
            booster: GradientBooster::new(BoostingParams {
                n_estimators: max_iter,
                learning_rate: 0.1,
                growth: TreeGrowth::LeafWise {
                    max_leaves: 31,
                    max_depth: None,
                },
                reg_lambda: 0.0,
                min_child_weight: 1e-3,
                min_samples_leaf: 20,
                max_bins: Some(255),
            }),
            random_state: 42,
        }
    }

    fn params(&self) -> Hyperparameters {
        let p = &self.booster.params;
        let max_leaf_nodes = match p.growth {
            TreeGrowth::LeafWise { max_leaves, .. } => max_leaves,
            _ => 31,
        };
        hyperparameters([
            ("l2_regularization", &p.reg_lambda),
            ("learning_rate", &p.learning_rate),
            ("max_bins", &p.max_bins.unwrap_or(255)),
            ("max_iter", &p.n_estimators),
            ("max_leaf_nodes", &max_leaf_nodes),
            ("min_samples_leaf", &p.min_samples_leaf),
            ("random_state", &self.random_state),
        ])
    }
}

boosted_classifier!(HistGradientBoostingClassifier);
