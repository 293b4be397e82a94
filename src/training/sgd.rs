//! Stochastic gradient descent linear classifiers
//!
//! Binary problems train one weight vector on {-1, 1} targets; multi-class
//! problems train one per class (one-vs-rest). Samples are visited in a fresh
//! shuffled order every epoch, and training stops once the epoch loss fails to
//! improve by `tol * n_samples` for `n_iter_no_change` consecutive epochs.

use crate::error::{Result, WranglerError};
use crate::training::linear_models::{signed_targets, LinearScores};
use crate::training::models::{check_fit_input, hyperparameters, ClassIndex, Classifier, Hyperparameters};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum SGDLoss {
    /// Linear SVM
    Hinge,
    /// Update only on misclassified samples
    Perceptron,
}

impl SGDLoss {
    /// Loss value and derivative with respect to the margin score `p`
    fn evaluate(self, p: f64, y: f64) -> (f64, f64) {
        let z = p * y;
        let threshold = match self {
            SGDLoss::Hinge => 1.0,
            SGDLoss::Perceptron => 0.0,
        };
        if z <= threshold {
            (threshold - z, -y)
        } else {
            (0.0, 0.0)
        }
    }
}

impl fmt::Display for SGDLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SGDLoss::Hinge => write!(f, "hinge"),
            SGDLoss::Perceptron => write!(f, "perceptron"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum LearningRateSchedule {
    Constant,
    /// 1 / (alpha * (t + t0))
    Optimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SGDConfig {
    pub loss: SGDLoss,
    pub learning_rate: LearningRateSchedule,
    pub eta0: f64,
    /// L2 regularization
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub n_iter_no_change: usize,
    pub random_state: u64,
}

impl Default for SGDConfig {
    fn default() -> Self {
        Self {
            loss: SGDLoss::Hinge,
            learning_rate: LearningRateSchedule::Optimal,
            eta0: 0.0,
            alpha: 1e-4,
            max_iter: 1000,
            tol: 1e-3,
            n_iter_no_change: 5,
            random_state: 42,
        }
    }
}

impl SGDConfig {
    /// Perceptron: constant unit step, no penalty
    pub fn perceptron() -> Self {
        Self {
            loss: SGDLoss::Perceptron,
            learning_rate: LearningRateSchedule::Constant,
            eta0: 1.0,
            alpha: 0.0,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.learning_rate == LearningRateSchedule::Optimal && self.alpha <= 0.0 {
            return Err(WranglerError::InvalidInput(
                "alpha must be positive with the optimal learning rate".to_string(),
            ));
        }
        if self.learning_rate == LearningRateSchedule::Constant && self.eta0 <= 0.0 {
            return Err(WranglerError::InvalidInput("eta0 must be positive".to_string()));
        }
        Ok(())
    }
}

/// Train one binary problem; returns weights, intercept and epochs run.
fn plain_sgd(x: &Array2<f64>, y: ArrayView1<'_, f64>, config: &SGDConfig, seed: u64) -> (Array1<f64>, f64, usize) {
    let n = x.nrows();
    let mut w = Array1::<f64>::zeros(x.ncols());
    let mut b = 0.0;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..n).collect();

    // heuristic initial step for the optimal schedule
    let optimal_init = match config.learning_rate {
        LearningRateSchedule::Optimal => {
            let typw = (1.0 / config.alpha.sqrt()).sqrt();
            let (_, dloss) = config.loss.evaluate(-typw, 1.0);
            let eta0 = typw / dloss.abs().max(1.0);
            1.0 / (eta0 * config.alpha)
        }
        LearningRateSchedule::Constant => 0.0,
    };

    let mut best_loss = f64::INFINITY;
    let mut no_improvement = 0;
    let mut t = 1.0;
    let mut epochs = 0;

    for _ in 0..config.max_iter {
        epochs += 1;
        order.shuffle(&mut rng);
        let mut sum_loss = 0.0;

        for &i in &order {
            let row = x.row(i);
            let p = row.dot(&w) + b;
            let (loss, dloss) = config.loss.evaluate(p, y[i]);
            sum_loss += loss;

            let eta = match config.learning_rate {
                LearningRateSchedule::Optimal => 1.0 / (config.alpha * (optimal_init + t - 1.0)),
                LearningRateSchedule::Constant => config.eta0,
            };
            if config.alpha > 0.0 {
                w *= (1.0 - eta * config.alpha).max(0.0);
            }
            if dloss != 0.0 {
                w.scaled_add(-eta * dloss, &row);
                b -= eta * dloss;
            }
            t += 1.0;
        }

        if sum_loss > best_loss - config.tol * n as f64 {
            no_improvement += 1;
        } else {
            no_improvement = 0;
        }
        if sum_loss < best_loss {
            best_loss = sum_loss;
        }
        if no_improvement >= config.n_iter_no_change {
            break;
        }
    }

    (w, b, epochs)
}

fn fit_linear_sgd(
    x: &Array2<f64>,
    y: &Array1<usize>,
    config: &SGDConfig,
) -> Result<(ClassIndex, LinearScores, usize)> {
    check_fit_input(x, y)?;
    config.validate()?;
    let class_index = ClassIndex::fit_at_least_two(y)?;
    let encoded = class_index.encode(y)?;
    let targets = signed_targets(&encoded, class_index.len());

    let mut coef = Array2::zeros((x.ncols(), targets.ncols()));
    let mut intercept = Array1::zeros(targets.ncols());
    let mut max_epochs = 0;
    for out in 0..targets.ncols() {
        let (w, b, epochs) = plain_sgd(x, targets.column(out), config, config.random_state.wrapping_add(out as u64));
        coef.column_mut(out).assign(&w);
        intercept[out] = b;
        max_epochs = max_epochs.max(epochs);
    }

    Ok((class_index, LinearScores { coef, intercept }, max_epochs))
}

/// Linear classifier trained by SGD, hinge loss by default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SGDClassifier {
    pub config: SGDConfig,
    scores: Option<LinearScores>,
    class_index: ClassIndex,
    n_iter: usize,
}

impl SGDClassifier {
    pub fn new(config: SGDConfig) -> Self {
        Self {
            config,
            scores: None,
            class_index: ClassIndex::default(),
            n_iter: 0,
        }
    }

    /// Epochs used by the last fit (maximum over one-vs-rest problems)
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.scores.as_ref().ok_or(WranglerError::ModelNotFitted)?.decision_function(x)
    }
}

impl Default for SGDClassifier {
    fn default() -> Self {
        Self::new(SGDConfig::default())
    }
}

impl Classifier for SGDClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        let (class_index, scores, n_iter) = fit_linear_sgd(x, y, &self.config)?;
        self.class_index = class_index;
        self.scores = Some(scores);
        self.n_iter = n_iter;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        self.scores
            .as_ref()
            .ok_or(WranglerError::ModelNotFitted)?
            .predict(x, &self.class_index)
    }

    fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        let c = &self.config;
        hyperparameters([
            ("alpha", &c.alpha),
            ("loss", &c.loss),
            ("max_iter", &c.max_iter),
            ("penalty", &"l2"),
            ("random_state", &c.random_state),
            ("tol", &c.tol),
        ])
    }
}

/// Rosenblatt perceptron
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Perceptron {
    pub config: SGDConfig,
    scores: Option<LinearScores>,
    class_index: ClassIndex,
}

impl Perceptron {
    pub fn new(max_iter: usize, random_state: u64) -> Self {
        Self {
            config: SGDConfig {
                max_iter,
                random_state,
                ..SGDConfig::perceptron()
            },
            scores: None,
            class_index: ClassIndex::default(),
        }
    }
}

impl Default for Perceptron {
    fn default() -> Self {
        Self::new(1000, 42)
    }
}

impl Classifier for Perceptron {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        let (class_index, scores, _) = fit_linear_sgd(x, y, &self.config)?;
        self.class_index = class_index;
        self.scores = Some(scores);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        self.scores
            .as_ref()
            .ok_or(WranglerError::ModelNotFitted)?
            .predict(x, &self.class_index)
    }

    fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        let c = &self.config;
        hyperparameters([
            ("eta0", &c.eta0),
            ("max_iter", &c.max_iter),
            ("random_state", &c.random_state),
            ("tol", &c.tol),
        ])
    }
}
