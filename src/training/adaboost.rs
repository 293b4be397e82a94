//! AdaBoost (Adaptive Boosting) implementation
//!
//! SAMME boosting over depth-1 trees: each round reweights the samples the
//! previous stumps got wrong.

use crate::error::{Result, WranglerError};
use crate::training::decision_tree::DecisionTreeClassifier;
use crate::training::models::{
    argmax, check_fit_input, hyperparameters, softmax_rows, ClassIndex, Classifier, Hyperparameters,
};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// AdaBoost Classifier (SAMME variant, supports multi-class)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostClassifier {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub random_state: u64,
    stumps: Vec<DecisionTreeClassifier>,
    alphas: Vec<f64>,
    class_index: ClassIndex,
}

impl Default for AdaBoostClassifier {
    fn default() -> Self {
        Self::new(50, 1.0)
    }
}

impl AdaBoostClassifier {
    pub fn new(n_estimators: usize, learning_rate: f64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            random_state: 42,
            stumps: Vec::new(),
            alphas: Vec::new(),
            class_index: ClassIndex::default(),
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Sum of stump weights voting for each class, normalized by total weight.
    fn decision_votes(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stumps.is_empty() {
            return Err(WranglerError::ModelNotFitted);
        }
        let k = self.class_index.len();
        let mut votes = Array2::zeros((x.nrows(), k));
        for (stump, &alpha) in self.stumps.iter().zip(&self.alphas) {
            let proba = stump.predict_proba_encoded(x)?;
            for (i, row) in proba.axis_iter(Axis(0)).enumerate() {
                votes[[i, argmax(row.iter().copied())]] += alpha;
            }
        }
        let total: f64 = self.alphas.iter().sum();
        if total > 0.0 {
            votes /= total;
        }
        Ok(votes)
    }

    pub fn n_fitted_estimators(&self) -> usize {
        self.stumps.len()
    }
}

impl Classifier for AdaBoostClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        self.class_index = ClassIndex::fit(y)?;
        let encoded = self.class_index.encode(y)?;
        let k = self.class_index.len();
        let n = x.nrows();

        self.stumps.clear();
        self.alphas.clear();
        let mut weights = vec![1.0 / n as f64; n];

        for round in 0..self.n_estimators {
            let mut stump = DecisionTreeClassifier::new()
                .with_max_depth(1)
                .with_random_state(self.random_state.wrapping_add(round as u64));
            stump.fit_encoded(x, &encoded, k, &weights)?;

            let proba = stump.predict_proba_encoded(x)?;
            let incorrect: Vec<bool> = proba
                .axis_iter(Axis(0))
                .zip(&encoded)
                .map(|(row, &label)| argmax(row.iter().copied()) != label)
                .collect();

            let total_w: f64 = weights.iter().sum();
            let error = weights
                .iter()
                .zip(&incorrect)
                .filter(|(_, wrong)| **wrong)
                .map(|(w, _)| w)
                .sum::<f64>()
                / total_w;

            if error <= 0.0 {
                // perfect stump: keep it and stop
                self.stumps.push(stump);
                self.alphas.push(1.0);
                break;
            }

            if error >= 1.0 - 1.0 / k as f64 {
                if self.stumps.is_empty() {
                    return Err(WranglerError::TrainingError(
                        "BaseClassifier in AdaBoostClassifier ensemble is worse than random, ensemble can not be fit."
                            .to_string(),
                    ));
                }
                break;
            }

            let alpha = self.learning_rate * (((1.0 - error) / error).ln() + ((k - 1) as f64).ln());
            for (w, &wrong) in weights.iter_mut().zip(&incorrect) {
                if wrong {
                    *w *= alpha.exp();
                }
            }
            let sum: f64 = weights.iter().sum();
            weights.iter_mut().for_each(|w| *w /= sum);

            self.stumps.push(stump);
            self.alphas.push(alpha);
        }

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let votes = self.decision_votes(x)?;
        Ok(self.class_index.decode_argmax(&votes))
    }

    fn has_predict_proba(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let votes = self.decision_votes(x)?;
        let k = self.class_index.len();
        let mut logits = if k == 2 {
            let mut binary = Array2::zeros((x.nrows(), 2));
            for (i, row) in votes.axis_iter(Axis(0)).enumerate() {
                let d = row[1] - row[0];
                binary[[i, 0]] = -d / 2.0;
                binary[[i, 1]] = d / 2.0;
            }
            binary
        } else {
            votes / (k.max(2) - 1) as f64
        };
        softmax_rows(&mut logits);
        Ok(logits)
    }

    fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        hyperparameters([
            ("algorithm", &"SAMME"),
            ("estimator", &"DecisionTreeClassifier(max_depth=1)"),
            ("learning_rate", &self.learning_rate),
            ("n_estimators", &self.n_estimators),
            ("random_state", &self.random_state),
        ])
    }
}
