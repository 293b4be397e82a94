//! LightGBM-style boosting
//!
//! Features are binned into at most `max_bin` quantile bins once, then each
//! round grows a leaf-wise tree: the leaf with the highest gain splits next
//! until `num_leaves` is reached.

use crate::training::gradient_boosting::{boosted_classifier, BoostingParams, GradientBooster, TreeGrowth};
use crate::training::models::{display_option, hyperparameters, Hyperparameters};
use serde::{Deserialize, Serialize};

/// LightGBM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGBMConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub num_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub max_bin: usize,
    pub random_state: u64,
}

impl Default for LightGBMConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            num_leaves: 31,
            max_depth: None,
            min_child_samples: 20,
            min_child_weight: 1e-3,
            reg_lambda: 0.0,
            max_bin: 255,
            random_state: 42,
        }
    }
}

impl From<&LightGBMConfig> for BoostingParams {
    fn from(config: &LightGBMConfig) -> Self {
        BoostingParams {
            n_estimators: config.n_estimators,
            learning_rate: config.learning_rate,
            growth: TreeGrowth::LeafWise {
                max_leaves: config.num_leaves,
                max_depth: config.max_depth,
            },
            reg_lambda: config.reg_lambda,
            min_child_weight: config.min_child_weight,
            min_samples_leaf: config.min_child_samples,
            max_bins: Some(config.max_bin),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGBMClassifier {
    pub config: LightGBMConfig,
    booster: GradientBooster,
}

impl LightGBMClassifier {
    pub fn new(config: LightGBMConfig) -> Self {
        let booster = GradientBooster::new(BoostingParams::from(&config));
        Self { config, booster }
    }

    fn params(&self) -> Hyperparameters {
        let c = &self.config;
        hyperparameters([
            ("learning_rate", &c.learning_rate),
            ("max_bin", &c.max_bin),
            ("max_depth", &display_option(c.max_depth)),
            ("min_child_samples", &c.min_child_samples),
            ("n_estimators", &c.n_estimators),
            ("num_leaves", &c.num_leaves),
            ("random_state", &c.random_state),
            ("reg_lambda", &c.reg_lambda),
            ("verbose", &-1),
        ])
    }
}

impl Default for LightGBMClassifier {
    fn default() -> Self {
        Self::new(LightGBMConfig::default())
    }
}

boosted_classifier!(LightGBMClassifier);
