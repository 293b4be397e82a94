//! Soft voting ensemble

use crate::ensemble::{aligned_proba, estimator_names, NamedEstimator};
use crate::error::{Result, WranglerError};
use crate::training::models::{check_fit_input, hyperparameters, ClassIndex, Classifier, Hyperparameters};
use ndarray::{Array1, Array2};

/// Fits every base estimator on the full data and predicts the class with
/// the highest (optionally weighted) mean probability.
pub struct VotingClassifier {
    estimators: Vec<NamedEstimator>,
    weights: Option<Vec<f64>>,
    fitted: Vec<Box<dyn Classifier>>,
    class_index: ClassIndex,
}

impl VotingClassifier {
    pub fn new(estimators: Vec<NamedEstimator>) -> Self {
        Self {
            estimators,
            weights: None,
            fitted: Vec::new(),
            class_index: ClassIndex::default(),
        }
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    fn normalized_weights(&self) -> Result<Vec<f64>> {
        let n = self.estimators.len();
        let weights = self.weights.clone().unwrap_or_else(|| vec![1.0; n]);
        if weights.len() != n {
            return Err(WranglerError::InvalidInput(format!(
                "Number of weights ({}) does not match number of estimators ({})",
                weights.len(),
                n
            )));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(WranglerError::InvalidInput("Voting weights must sum to a positive value".to_string()));
        }
        Ok(weights.into_iter().map(|w| w / total).collect())
    }
}

impl Classifier for VotingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.estimators.is_empty() {
            return Err(WranglerError::InvalidInput("No base estimators provided".to_string()));
        }
        self.normalized_weights()?;
        self.class_index = ClassIndex::fit(y)?;

        let mut fitted = Vec::with_capacity(self.estimators.len());
        for estimator in &self.estimators {
            let mut model = estimator.build();
            if !model.has_predict_proba() {
                return Err(WranglerError::InvalidInput(format!(
                    "Soft voting requires predict_proba, '{}' does not provide it",
                    estimator.name
                )));
            }
            model.fit(x, y)?;
            fitted.push(model);
        }
        self.fitted = fitted;
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
        if self.fitted.is_empty() {
            return Err(WranglerError::ModelNotFitted);
        }
        let weights = self.normalized_weights()?;
        let classes = self.class_index.classes();

        let mut averaged = Array2::zeros((x.nrows(), classes.len()));
        for (model, weight) in self.fitted.iter().zip(weights) {
            averaged.scaled_add(weight, &aligned_proba(model.as_ref(), x, classes)?);
        }
        Ok(averaged)
    }

    fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        hyperparameters([
            ("estimators", &estimator_names(&self.estimators)),
            ("n_jobs", &-1),
            ("voting", &"soft"),
        ])
    }
}
