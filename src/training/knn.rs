//! K-Nearest Neighbors classifier

use crate::error::{Result, WranglerError};
use crate::training::models::{
    check_fit_input, check_n_features, hyperparameters, ClassIndex, Classifier, Hyperparameters,
};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum DistanceMetric {
    /// L2
    #[default]
    Euclidean,
    /// L1
    Manhattan,
}

impl DistanceMetric {
    fn distance(self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let pairs = a.iter().zip(b.iter());
        match self {
            DistanceMetric::Euclidean => pairs.map(|(u, v)| (u - v) * (u - v)).sum::<f64>().sqrt(),
            DistanceMetric::Manhattan => pairs.map(|(u, v)| (u - v).abs()).sum(),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Manhattan => write!(f, "manhattan"),
        }
    }
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Inverse distance; an exact match takes all the weight
    Distance,
}

impl fmt::Display for WeightScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightScheme::Uniform => write!(f, "uniform"),
            WeightScheme::Distance => write!(f, "distance"),
        }
    }
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// Max-heap entry keeping the k smallest (distance, index) pairs
#[derive(PartialEq)]
struct Neighbor(f64, usize);

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then(self.1.cmp(&other.1))
    }
}

/// K-Nearest Neighbors classifier; fit stores the training set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    pub config: KNNConfig,
    x_train: Option<Array2<f64>>,
    /// Encoded class positions of the training rows
    y_train: Vec<usize>,
    class_index: ClassIndex,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: Vec::new(),
            class_index: ClassIndex::default(),
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    fn nearest(&self, point: ArrayView1<'_, f64>, x_train: &Array2<f64>) -> Vec<Neighbor> {
        let k = self.config.n_neighbors;
        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (i, row) in x_train.rows().into_iter().enumerate() {
            let candidate = Neighbor(self.config.metric.distance(point, row), i);
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().map_or(false, |top| candidate < *top) {
                heap.pop();
                heap.push(candidate);
            }
        }
        heap.into_vec()
    }

    fn vote(&self, neighbors: &[Neighbor]) -> Vec<f64> {
        let mut votes = vec![0.0; self.class_index.len()];
        let exact: Vec<&Neighbor> = neighbors.iter().filter(|n| n.0 == 0.0).collect();

        match self.config.weights {
            WeightScheme::Distance if !exact.is_empty() => {
                for n in exact {
                    votes[self.y_train[n.1]] += 1.0;
                }
            }
            WeightScheme::Distance => {
                for n in neighbors {
                    votes[self.y_train[n.1]] += 1.0 / n.0;
                }
            }
            WeightScheme::Uniform => {
                for n in neighbors {
                    votes[self.y_train[n.1]] += 1.0;
                }
            }
        }

        let total: f64 = votes.iter().sum();
        if total > 0.0 {
            votes.iter_mut().for_each(|v| *v /= total);
        }
        votes
    }
}

impl Default for KNNClassifier {
    fn default() -> Self {
        Self::new(KNNConfig::default())
    }
}

impl Classifier for KNNClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.config.n_neighbors == 0 {
            return Err(WranglerError::InvalidInput("n_neighbors must be greater than zero".to_string()));
        }
        if self.config.n_neighbors > x.nrows() {
            return Err(WranglerError::InvalidInput(format!(
                "Expected n_neighbors <= n_samples, but n_samples = {}, n_neighbors = {}",
                x.nrows(),
                self.config.n_neighbors
            )));
        }
        self.class_index = ClassIndex::fit(y)?;
        self.y_train = self.class_index.encode(y)?;
        self.x_train = Some(x.clone());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(self.class_index.decode_argmax(&proba))
    }

    fn has_predict_proba(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let x_train = self.x_train.as_ref().ok_or(WranglerError::ModelNotFitted)?;
        check_n_features(x, x_train.ncols())?;

        let rows: Vec<Vec<f64>> = x
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|point| self.vote(&self.nearest(point, x_train)))
            .collect();

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), self.class_index.len()), flat)?)
    }

    fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        hyperparameters([
            ("metric", &self.config.metric),
            ("n_jobs", &-1),
            ("n_neighbors", &self.config.n_neighbors),
            ("weights", &self.config.weights),
        ])
    }
}
