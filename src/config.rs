//! Session configuration
//!
//! Constants that shape one training session (split ratio, seed, CV fold cap,
//! validation thresholds) and the deployment profile that selects which part
//! of the algorithm catalog is served.

use crate::error::{Result, WranglerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Algorithms that the browser client trains locally in "Quick ML" mode.
pub const CLIENT_SIDE_ALGORITHMS: [&str; 7] = [
    "Random Forest",
    "Decision Tree",
    "K-Nearest Neighbors",
    "Gaussian Naive Bayes",
    "Logistic Regression",
    "SVC (RBF)",
    "Multi-Layer Perceptron",
];

/// Which slice of the algorithm catalog a deployment serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryProfile {
    /// Every algorithm in the catalog
    #[default]
    Full,
    /// Catalog minus the algorithms the client already runs in the browser
    AdvancedOnly,
}

impl RegistryProfile {
    /// Algorithm names excluded from the catalog under this profile.
    pub fn excluded(&self) -> &'static [&'static str] {
        match self {
            RegistryProfile::Full => &[],
            RegistryProfile::AdvancedOnly => &CLIENT_SIDE_ALGORITHMS,
        }
    }
}

impl FromStr for RegistryProfile {
    type Err = WranglerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" | "all" => Ok(RegistryProfile::Full),
            "advanced" | "advanced_only" | "advanced-only" => Ok(RegistryProfile::AdvancedOnly),
            other => Err(WranglerError::ConfigError(format!(
                "Unknown algorithm profile '{}'. Expected 'full' or 'advanced'",
                other
            ))),
        }
    }
}

impl fmt::Display for RegistryProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryProfile::Full => write!(f, "full"),
            RegistryProfile::AdvancedOnly => write!(f, "advanced"),
        }
    }
}

/// Configuration for one training session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Catalog slice to train
    pub profile: RegistryProfile,
    /// Seed for the split, CV and every estimator
    pub random_seed: u64,
    /// Fraction of rows held out for testing
    pub test_ratio: f64,
    /// Upper bound on cross-validation folds
    pub cv_fold_cap: usize,
    /// Minimum number of labelled rows
    pub min_samples: usize,
    /// Minimum number of distinct target values
    pub min_classes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile: RegistryProfile::Full,
            random_seed: 42,
            test_ratio: 0.2,
            cv_fold_cap: 5,
            min_samples: 10,
            min_classes: 2,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `ALGORITHM_PROFILE` and `RANDOM_SEED`, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(profile) = std::env::var("ALGORITHM_PROFILE") {
            config.profile = profile.parse()?;
        }
        if let Ok(seed) = std::env::var("RANDOM_SEED") {
            config.random_seed = seed.trim().parse().map_err(|_| {
                WranglerError::ConfigError(format!("RANDOM_SEED must be an integer, got '{}'", seed))
            })?;
        }
        Ok(config)
    }

    pub fn with_profile(mut self, profile: RegistryProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_test_ratio(mut self, ratio: f64) -> Self {
        self.test_ratio = ratio;
        self
    }

    pub fn with_cv_fold_cap(mut self, folds: usize) -> Self {
        self.cv_fold_cap = folds;
        self
    }

    /// Check the values are usable before a session starts.
    pub fn validate(&self) -> Result<()> {
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(WranglerError::ConfigError(format!(
                "test_ratio must be in (0, 1), got {}",
                self.test_ratio
            )));
        }
        if self.min_classes < 2 {
            return Err(WranglerError::ConfigError(
                "min_classes must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}
