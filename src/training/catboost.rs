//! CatBoost-style boosting with oblivious (symmetric) trees
//!
//! Every level of a tree shares one (feature, border) split, so a tree of
//! depth d is a lookup table of 2^d leaves.

use crate::training::gradient_boosting::{boosted_classifier, BoostingParams, GradientBooster, TreeGrowth};
use crate::training::models::{hyperparameters, Hyperparameters};
use serde::{Deserialize, Serialize};

/// CatBoost configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatBoostConfig {
    pub iterations: usize,
    pub learning_rate: f64,
    pub depth: usize,
    pub l2_leaf_reg: f64,
    pub border_count: usize,
    pub random_seed: u64,
}

impl Default for CatBoostConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            learning_rate: 0.1,
            depth: 6,
            l2_leaf_reg: 3.0,
            border_count: 254,
            random_seed: 42,
        }
    }
}

impl From<&CatBoostConfig> for BoostingParams {
    fn from(config: &CatBoostConfig) -> Self {
        BoostingParams {
            n_estimators: config.iterations,
            learning_rate: config.learning_rate,
            growth: TreeGrowth::Oblivious { depth: config.depth },
            reg_lambda: config.l2_leaf_reg,
            min_child_weight: 0.0,
            min_samples_leaf: 1,
            max_bins: Some(config.border_count),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatBoostClassifier {
    pub config: CatBoostConfig,
    booster: GradientBooster,
}

impl CatBoostClassifier {
    pub fn new(config: CatBoostConfig) -> Self {
        let booster = GradientBooster::new(BoostingParams::from(&config));
        Self { config, booster }
    }

    fn params(&self) -> Hyperparameters {
        let c = &self.config;
        hyperparameters([
            ("border_count", &c.border_count),
            ("depth", &c.depth),
            ("iterations", &c.iterations),
            ("l2_leaf_reg", &c.l2_leaf_reg),
            ("learning_rate", &c.learning_rate),
            ("random_seed", &c.random_seed),
            ("verbose", &false),
        ])
    }
}

impl Default for CatBoostClassifier {
    fn default() -> Self {
        Self::new(CatBoostConfig::default())
    }
}

boosted_classifier!(CatBoostClassifier);
