//! Algorithm catalog
//!
//! One ordered list of named factories. Every call to a factory yields a
//! fresh, unfitted estimator, so sessions and CV folds never share state.
//! Deployment profiles filter this list; they never define a second one.

use crate::config::{RegistryProfile, SessionConfig};
use crate::ensemble::{
    default_base_estimators, BaggingClassifier, StackingClassifier, StackingConfig, VotingClassifier,
};
use crate::training::adaboost::AdaBoostClassifier;
use crate::training::catboost::{CatBoostClassifier, CatBoostConfig};
use crate::training::decision_tree::DecisionTreeClassifier;
use crate::training::extra_trees::ExtraTreesClassifier;
use crate::training::gradient_boosting::{GradientBoostingClassifier, HistGradientBoostingClassifier};
use crate::training::knn::KNNClassifier;
use crate::training::lightgbm::{LightGBMClassifier, LightGBMConfig};
use crate::training::linear_models::{LogisticRegression, RidgeClassifier};
use crate::training::models::Classifier;
use crate::training::naive_bayes::GaussianNaiveBayes;
use crate::training::neural_network::{MLPClassifier, MLPConfig};
use crate::training::random_forest::RandomForestClassifier;
use crate::training::sgd::{Perceptron, SGDClassifier, SGDConfig};
use crate::training::svm::{LinearSVC, SVMConfig, SVC};
use crate::training::xgboost::{XGBoostClassifier, XGBoostConfig};
use std::fmt;

/// Builds a fresh estimator from the session seed
pub type EstimatorFn = fn(u64) -> Box<dyn Classifier>;

/// A named, pre-configured classification procedure
#[derive(Clone, Copy)]
pub struct AlgorithmSpec {
    pub name: &'static str,
    pub factory: EstimatorFn,
}

impl AlgorithmSpec {
    pub const fn new(name: &'static str, factory: EstimatorFn) -> Self {
        Self { name, factory }
    }

    /// Construct an unfitted estimator
    pub fn build(&self, seed: u64) -> Box<dyn Classifier> {
        (self.factory)(seed)
    }
}

impl fmt::Debug for AlgorithmSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmSpec").field("name", &self.name).finish()
    }
}

fn logistic_regression(seed: u64) -> Box<dyn Classifier> {
    Box::new(LogisticRegression::new().with_max_iter(1000).with_random_state(seed))
}

fn ridge_classifier(seed: u64) -> Box<dyn Classifier> {
    Box::new(RidgeClassifier::default().with_random_state(seed))
}

fn sgd_classifier(seed: u64) -> Box<dyn Classifier> {
    Box::new(SGDClassifier::new(SGDConfig {
        random_state: seed,
        ..SGDConfig::default()
    }))
}

fn perceptron(seed: u64) -> Box<dyn Classifier> {
    Box::new(Perceptron::new(1000, seed))
}

fn decision_tree(seed: u64) -> Box<dyn Classifier> {
    Box::new(DecisionTreeClassifier::new().with_random_state(seed))
}

fn extra_tree(seed: u64) -> Box<dyn Classifier> {
    Box::new(DecisionTreeClassifier::extra_tree().with_random_state(seed))
}

fn random_forest(seed: u64) -> Box<dyn Classifier> {
    Box::new(RandomForestClassifier::new(100).with_random_state(seed))
}

fn extra_trees(seed: u64) -> Box<dyn Classifier> {
    Box::new(ExtraTreesClassifier::new(100).with_random_state(seed))
}

fn adaboost(seed: u64) -> Box<dyn Classifier> {
    Box::new(AdaBoostClassifier::new(50, 1.0).with_random_state(seed))
}

fn gradient_boosting(seed: u64) -> Box<dyn Classifier> {
    let mut model = GradientBoostingClassifier::new(100);
    model.random_state = seed;
    Box::new(model)
}

fn hist_gradient_boosting(seed: u64) -> Box<dyn Classifier> {
    let mut model = HistGradientBoostingClassifier::new(100);
    model.random_state = seed;
    Box::new(model)
}

fn xgboost(seed: u64) -> Box<dyn Classifier> {
    Box::new(XGBoostClassifier::new(XGBoostConfig {
        random_state: seed,
        ..XGBoostConfig::default()
    }))
}

fn lightgbm(seed: u64) -> Box<dyn Classifier> {
    Box::new(LightGBMClassifier::new(LightGBMConfig {
        random_state: seed,
        ..LightGBMConfig::default()
    }))
}

fn catboost(seed: u64) -> Box<dyn Classifier> {
    Box::new(CatBoostClassifier::new(CatBoostConfig {
        random_seed: seed,
        ..CatBoostConfig::default()
    }))
}

fn bagging(seed: u64) -> Box<dyn Classifier> {
    Box::new(BaggingClassifier::new(50).with_random_state(seed))
}

fn voting(seed: u64) -> Box<dyn Classifier> {
    Box::new(VotingClassifier::new(default_base_estimators(seed)))
}

fn stacking(seed: u64) -> Box<dyn Classifier> {
    Box::new(StackingClassifier::new(
        default_base_estimators(seed),
        StackingConfig::default(),
    ))
}

fn svc_rbf(seed: u64) -> Box<dyn Classifier> {
    Box::new(SVC::new(SVMConfig {
        random_state: seed,
        ..SVMConfig::default()
    }))
}

fn linear_svc(_seed: u64) -> Box<dyn Classifier> {
    Box::new(LinearSVC::new(1.0, 2000))
}

fn k_nearest_neighbors(_seed: u64) -> Box<dyn Classifier> {
    Box::new(KNNClassifier::with_k(5))
}

fn gaussian_naive_bayes(_seed: u64) -> Box<dyn Classifier> {
    Box::new(GaussianNaiveBayes::new())
}

fn multi_layer_perceptron(seed: u64) -> Box<dyn Classifier> {
    Box::new(MLPClassifier::new(MLPConfig {
        max_iter: 1000,
        random_state: seed,
        ..MLPConfig::default()
    }))
}

/// The full catalog in evaluation order
pub const CATALOG: [AlgorithmSpec; 22] = [
    AlgorithmSpec::new("Logistic Regression", logistic_regression),
    AlgorithmSpec::new("Ridge Classifier", ridge_classifier),
    AlgorithmSpec::new("SGD Classifier", sgd_classifier),
    AlgorithmSpec::new("Perceptron", perceptron),
    AlgorithmSpec::new("Decision Tree", decision_tree),
    AlgorithmSpec::new("Extra Tree", extra_tree),
    AlgorithmSpec::new("Random Forest", random_forest),
    AlgorithmSpec::new("Extra Trees Ensemble", extra_trees),
    AlgorithmSpec::new("AdaBoost", adaboost),
    AlgorithmSpec::new("Gradient Boosting", gradient_boosting),
    AlgorithmSpec::new("Histogram Gradient Boosting", hist_gradient_boosting),
    AlgorithmSpec::new("XGBoost", xgboost),
    AlgorithmSpec::new("LightGBM", lightgbm),
    AlgorithmSpec::new("CatBoost", catboost),
    AlgorithmSpec::new("Bagging Classifier", bagging),
    AlgorithmSpec::new("Voting Classifier", voting),
    AlgorithmSpec::new("Stacking Classifier", stacking),
    AlgorithmSpec::new("SVC (RBF)", svc_rbf),
    AlgorithmSpec::new("Linear SVC", linear_svc),
    AlgorithmSpec::new("K-Nearest Neighbors", k_nearest_neighbors),
    AlgorithmSpec::new("Gaussian Naive Bayes", gaussian_naive_bayes),
    AlgorithmSpec::new("Multi-Layer Perceptron", multi_layer_perceptron),
];

/// Ordered set of algorithms evaluated by a session
#[derive(Debug, Clone)]
pub struct AlgorithmRegistry {
    specs: Vec<AlgorithmSpec>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::for_profile(RegistryProfile::default())
    }
}

impl AlgorithmRegistry {
    /// Catalog filtered by a deployment profile, order preserved.
    pub fn for_profile(profile: RegistryProfile) -> Self {
        let excluded = profile.excluded();
        Self {
            specs: CATALOG
                .iter()
                .filter(|spec| !excluded.contains(&spec.name))
                .copied()
                .collect(),
        }
    }

    pub fn for_config(config: &SessionConfig) -> Self {
        Self::for_profile(config.profile)
    }

    /// Arbitrary spec list, used to inject estimators in tests.
    pub fn with_specs(specs: Vec<AlgorithmSpec>) -> Self {
        Self { specs }
    }

    pub fn list_specs(&self) -> &[AlgorithmSpec] {
        &self.specs
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.specs.iter().map(|s| s.name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&AlgorithmSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CLIENT_SIDE_ALGORITHMS;
    use std::collections::HashSet;

    #[test]
    fn test_full_catalog_order() {
        let registry = AlgorithmRegistry::for_profile(RegistryProfile::Full);
        let names = registry.names();
        assert_eq!(names.len(), 22);
        assert_eq!(names[0], "Logistic Regression");
        assert_eq!(names[6], "Random Forest");
        assert_eq!(names[21], "Multi-Layer Perceptron");

        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_advanced_profile_excludes_client_side() {
        let registry = AlgorithmRegistry::for_profile(RegistryProfile::AdvancedOnly);
        assert_eq!(registry.len(), 15);
        for name in CLIENT_SIDE_ALGORITHMS {
            assert!(registry.get(name).is_none(), "{} should be excluded", name);
        }
        assert_eq!(registry.names()[0], "Ridge Classifier");
    }

    #[test]
    fn test_every_client_side_name_is_in_catalog() {
        for name in CLIENT_SIDE_ALGORITHMS {
            assert!(CATALOG.iter().any(|s| s.name == name), "{} missing", name);
        }
    }

    #[test]
    fn test_factories_build_unfitted_estimators() {
        for spec in CATALOG.iter() {
            let model = spec.build(42);
            assert!(model.classes().is_empty(), "{} came back fitted", spec.name);
            assert!(!model.hyperparameters().is_empty(), "{} has no hyperparameters", spec.name);
        }
    }

    #[test]
    fn test_seed_reaches_estimator() {
        let spec = AlgorithmRegistry::default().get("Random Forest").copied().unwrap();
        let params = spec.build(7).hyperparameters();
        assert_eq!(params.get("random_state").map(String::as_str), Some("7"));
    }
}
