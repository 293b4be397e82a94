//! Ensemble methods
//!
//! - Bagging over full-feature decision trees
//! - Soft voting (averaged probabilities)
//! - Stacking (out-of-fold probabilities fed to a logistic meta-learner)

mod bagging;
mod stacking;
mod voting;

pub use bagging::BaggingClassifier;
pub use stacking::{StackingClassifier, StackingConfig};
pub use voting::VotingClassifier;

use crate::error::Result;
use crate::training::linear_models::LogisticRegression;
use crate::training::models::Classifier;
use crate::training::naive_bayes::GaussianNaiveBayes;
use crate::training::random_forest::RandomForestClassifier;
use ndarray::Array2;
use std::fmt;
use std::sync::Arc;

/// Builds a fresh, unfitted estimator
pub type EstimatorFactory = Arc<dyn Fn() -> Box<dyn Classifier> + Send + Sync>;

/// A base estimator of a composite model
#[derive(Clone)]
pub struct NamedEstimator {
    pub name: String,
    pub factory: EstimatorFactory,
}

impl NamedEstimator {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Classifier> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn build(&self) -> Box<dyn Classifier> {
        (self.factory)()
    }
}

impl fmt::Debug for NamedEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedEstimator").field("name", &self.name).finish()
    }
}

/// Logistic regression, a 50-tree random forest and Gaussian naive Bayes
pub fn default_base_estimators(seed: u64) -> Vec<NamedEstimator> {
    vec![
        NamedEstimator::new("lr", move || {
            Box::new(LogisticRegression::new().with_max_iter(1000).with_random_state(seed))
        }),
        NamedEstimator::new("rf", move || Box::new(RandomForestClassifier::new(50).with_random_state(seed))),
        NamedEstimator::new("nb", || Box::new(GaussianNaiveBayes::new())),
    ]
}

/// Probabilities of `model` laid out in `target_classes` column order.
/// Classes the model never saw get a zero column.
pub(crate) fn aligned_proba(model: &dyn Classifier, x: &Array2<f64>, target_classes: &[usize]) -> Result<Array2<f64>> {
    let proba = model.predict_proba(x)?;
    let mut aligned = Array2::zeros((x.nrows(), target_classes.len()));
    for (column, class) in model.classes().iter().enumerate() {
        if let Ok(position) = target_classes.binary_search(class) {
            aligned.column_mut(position).assign(&proba.column(column));
        }
    }
    Ok(aligned)
}

/// Estimator names joined the way composite hyperparameters report them
pub(crate) fn estimator_names(estimators: &[NamedEstimator]) -> String {
    let names: Vec<&str> = estimators.iter().map(|e| e.name.as_str()).collect();
    format!("[{}]", names.join(", "))
}
