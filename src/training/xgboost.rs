//! XGBoost-style boosting: depth-wise exact trees with regularized leaf weights
//!
//! Leaf weight: w* = -G / (H + lambda). A child needs a hessian sum of at
//! least `min_child_weight`.

use crate::training::gradient_boosting::{boosted_classifier, BoostingParams, GradientBooster, TreeGrowth};
use crate::training::models::{hyperparameters, Hyperparameters};
use serde::{Deserialize, Serialize};

/// XGBoost configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    pub random_state: u64,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            random_state: 42,
        }
    }
}

impl From<&XGBoostConfig> for BoostingParams {
    fn from(config: &XGBoostConfig) -> Self {
        BoostingParams {
            n_estimators: config.n_estimators,
            learning_rate: config.learning_rate,
            growth: TreeGrowth::DepthWise {
                max_depth: config.max_depth,
            },
            reg_lambda: config.reg_lambda,
            min_child_weight: config.min_child_weight,
            min_samples_leaf: 1,
            max_bins: None,
        }
    }
}

/// XGBoost classifier (logistic for two classes, softmax otherwise)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostClassifier {
    pub config: XGBoostConfig,
    booster: GradientBooster,
}

impl XGBoostClassifier {
    pub fn new(config: XGBoostConfig) -> Self {
        let booster = GradientBooster::new(BoostingParams::from(&config));
        Self { config, booster }
    }

    fn params(&self) -> Hyperparameters {
        let c = &self.config;
        hyperparameters([
            ("eval_metric", &"logloss"),
            ("learning_rate", &c.learning_rate),
            ("max_depth", &c.max_depth),
            ("min_child_weight", &c.min_child_weight),
            ("n_estimators", &c.n_estimators),
            ("random_state", &c.random_state),
            ("reg_lambda", &c.reg_lambda),
        ])
    }
}

impl Default for XGBoostClassifier {
    fn default() -> Self {
        Self::new(XGBoostConfig::default())
    }
}

boosted_classifier!(XGBoostClassifier);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::models::Classifier;
    use ndarray::{Array1, Array2};

    #[test]
    fn test_xgboost_classifier() {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| (i % 2) as f64 * 3.0 + (i * j % 5) as f64 * 0.1);
        let y = Array1::from_iter((0..40).map(|i| (i % 2) * 4));

        let mut clf = XGBoostClassifier::new(XGBoostConfig {
            n_estimators: 10,
            ..Default::default()
        });
        clf.fit(&x, &y).unwrap();

        assert_eq!(clf.classes(), &[0, 4]);
        assert!(clf.score(&x, &y).unwrap() > 0.95);
        assert_eq!(clf.hyperparameters()["max_depth"], "6");
    }
}
