//! Bagging: bootstrap replicas of an unrestricted decision tree

use crate::error::Result;
use crate::training::decision_tree::{Criterion, MaxFeatures, Splitter};
use crate::training::models::{hyperparameters, Classifier, Hyperparameters};
use crate::training::random_forest::{TreeEnsemble, TreeEnsembleConfig};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Averages the probabilities of trees fitted on bootstrap samples. Unlike a
/// random forest, every split considers all features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaggingClassifier {
    ensemble: TreeEnsemble,
}

impl Default for BaggingClassifier {
    fn default() -> Self {
        Self::new(10)
    }
}

impl BaggingClassifier {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            ensemble: TreeEnsemble::new(TreeEnsembleConfig {
                n_estimators,
                max_depth: None,
                min_samples_split: 2,
                min_samples_leaf: 1,
                max_features: MaxFeatures::All,
                criterion: Criterion::Gini,
                splitter: Splitter::Best,
                bootstrap: true,
                random_state: 42,
            }),
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.ensemble.config.random_state = seed;
        self
    }

    pub fn n_estimators(&self) -> usize {
        self.ensemble.n_trees()
    }
}

impl Classifier for BaggingClassifier {
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
        let config = &self.ensemble.config;
        hyperparameters([
            ("bootstrap", &"True"),
            ("estimator", &"DecisionTreeClassifier"),
            ("n_estimators", &config.n_estimators),
            ("n_jobs", &-1),
            ("random_state", &config.random_state),
        ])
    }
}
