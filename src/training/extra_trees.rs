//! Extra Trees (Extremely Randomized Trees) ensemble

use crate::error::Result;
use crate::training::decision_tree::{Criterion, MaxFeatures, Splitter};
use crate::training::models::{Classifier, Hyperparameters};
use crate::training::random_forest::{forest_hyperparameters, TreeEnsemble, TreeEnsembleConfig};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Extra Trees classifier: random thresholds, whole training set per tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraTreesClassifier {
    ensemble: TreeEnsemble,
}

impl Default for ExtraTreesClassifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ExtraTreesClassifier {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            ensemble: TreeEnsemble::new(TreeEnsembleConfig {
                n_estimators,
                max_depth: None,
                min_samples_split: 2,
                min_samples_leaf: 1,
                max_features: MaxFeatures::Sqrt,
                criterion: Criterion::Gini,
                splitter: Splitter::Random,
                bootstrap: false,
                random_state: 42,
            }),
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.ensemble.config.random_state = seed;
        self
    }
}

impl Classifier for ExtraTreesClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        self.ensemble.fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        self.ensemble.predict(x)
    }

    fn has_predict_proba(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.ensemble.predict_proba(x)
    }

    fn classes(&self) -> &[usize] {
        self.ensemble.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        forest_hyperparameters(&self.ensemble.config)
    }
}
