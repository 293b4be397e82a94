//! Multi-layer perceptron classifier
//!
//! Feedforward network with ReLU hidden layers trained by mini-batch Adam on
//! cross-entropy. Two classes use one logistic output unit, more classes a
//! softmax layer. Training stops once the epoch loss has not improved by
//! `tol` for more than `n_iter_no_change` epochs.

use crate::error::{Result, WranglerError};
use crate::training::models::{
    check_fit_input, check_n_features, hyperparameters, sigmoid, softmax_rows, ClassIndex, Classifier,
    Hyperparameters,
};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// MLP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPConfig {
    pub hidden_layers: Vec<usize>,
    /// Adam step size
    pub learning_rate: f64,
    pub max_iter: usize,
    /// Upper bound on the mini-batch size
    pub batch_size: usize,
    /// L2 penalty
    pub alpha: f64,
    pub tol: f64,
    pub n_iter_no_change: usize,
    pub beta_1: f64,
    pub beta_2: f64,
    pub epsilon: f64,
    pub random_state: u64,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![100],
            learning_rate: 0.001,
            max_iter: 200,
            batch_size: 200,
            alpha: 0.0001,
            tol: 1e-4,
            n_iter_no_change: 10,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
            random_state: 42,
        }
    }
}

/// First and second moment estimates for one parameter tensor
#[derive(Debug, Clone)]
struct AdamState<D: ndarray::Dimension> {
    m: ndarray::Array<f64, D>,
    v: ndarray::Array<f64, D>,
}

impl<D: ndarray::Dimension> AdamState<D> {
    fn new(shape: D) -> Self {
        Self {
            m: ndarray::Array::zeros(shape.clone()),
            v: ndarray::Array::zeros(shape),
        }
    }

    fn step(&mut self, param: &mut ndarray::Array<f64, D>, grad: &ndarray::Array<f64, D>, lr_t: f64, config: &MLPConfig) {
        self.m.zip_mut_with(grad, |m, &g| *m = config.beta_1 * *m + (1.0 - config.beta_1) * g);
        self.v.zip_mut_with(grad, |v, &g| *v = config.beta_2 * *v + (1.0 - config.beta_2) * g * g);
        ndarray::Zip::from(param)
            .and(&self.m)
            .and(&self.v)
            .for_each(|p, &m, &v| *p -= lr_t * m / (v.sqrt() + config.epsilon));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPClassifier {
    pub config: MLPConfig,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    class_index: ClassIndex,
    n_iter: usize,
    loss: f64,
}

impl Default for MLPClassifier {
    fn default() -> Self {
        Self::new(MLPConfig::default())
    }
}

impl MLPClassifier {
    pub fn new(config: MLPConfig) -> Self {
        Self {
            config,
            weights: Vec::new(),
            biases: Vec::new(),
            class_index: ClassIndex::default(),
            n_iter: 0,
            loss: f64::NAN,
        }
    }

    /// Epochs run by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Final training loss
    pub fn loss(&self) -> f64 {
        self.loss
    }

    fn n_outputs(&self) -> usize {
        if self.class_index.len() == 2 {
            1
        } else {
            self.class_index.len()
        }
    }

    /// Glorot uniform initialization
    fn initialize_weights(&mut self, n_features: usize, rng: &mut Xoshiro256PlusPlus) {
        let mut sizes = vec![n_features];
        sizes.extend(&self.config.hidden_layers);
        sizes.push(self.n_outputs());

        self.weights.clear();
        self.biases.clear();
        for pair in sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
            self.weights
                .push(Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-bound..bound)));
            self.biases
                .push(Array1::from_shape_fn(fan_out, |_| rng.gen_range(-bound..bound)));
        }
    }

    /// Activations of every layer, input included
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = vec![x.to_owned()];
        let last = self.weights.len() - 1;
        for (layer, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let mut z = activations[layer].dot(w) + b;
            if layer < last {
                z.mapv_inplace(|v| v.max(0.0));
            } else if z.ncols() == 1 {
                z.mapv_inplace(sigmoid);
            } else {
                softmax_rows(&mut z);
            }
            activations.push(z);
        }
        activations
    }

    fn cross_entropy(output: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let eps = 1e-10;
        let total: f64 = if output.ncols() == 1 {
            output
                .iter()
                .zip(targets.iter())
                .map(|(&p, &t)| {
                    let p = p.clamp(eps, 1.0 - eps);
                    -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                })
                .sum()
        } else {
            output
                .iter()
                .zip(targets.iter())
                .filter(|(_, t)| **t > 0.0)
                .map(|(&p, &t)| -t * p.clamp(eps, 1.0).ln())
                .sum()
        };
        total / output.nrows() as f64
    }

    /// Gradients per layer for one batch; returns the regularized batch loss.
    fn backward(
        &self,
        activations: &[Array2<f64>],
        targets: &Array2<f64>,
    ) -> (f64, Vec<Array2<f64>>, Vec<Array1<f64>>) {
        let n = targets.nrows() as f64;
        let n_layers = self.weights.len();
        let output = &activations[n_layers];

        let penalty: f64 = self.weights.iter().map(|w| w.iter().map(|v| v * v).sum::<f64>()).sum();
        let loss = Self::cross_entropy(output, targets) + 0.5 * self.config.alpha * penalty / n;

        let mut grad_w = vec![Array2::zeros((0, 0)); n_layers];
        let mut grad_b = vec![Array1::zeros(0); n_layers];
        let mut delta = output - targets;

        for layer in (0..n_layers).rev() {
            grad_w[layer] = activations[layer].t().dot(&delta) / n + &self.weights[layer] * (self.config.alpha / n);
            grad_b[layer] = delta.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(delta.ncols()));
            if layer > 0 {
                let mut upstream = delta.dot(&self.weights[layer].t());
                // ReLU derivative
                upstream.zip_mut_with(&activations[layer], |d, &a| {
                    if a <= 0.0 {
                        *d = 0.0
                    }
                });
                delta = upstream;
            }
        }

        (loss, grad_w, grad_b)
    }

    fn targets(&self, encoded: &[usize]) -> Array2<f64> {
        if self.n_outputs() == 1 {
            Array2::from_shape_fn((encoded.len(), 1), |(i, _)| encoded[i] as f64)
        } else {
            Array2::from_shape_fn((encoded.len(), self.class_index.len()), |(i, c)| {
                if encoded[i] == c {
                    1.0
                } else {
                    0.0
                }
            })
        }
    }
}

impl Classifier for MLPClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.config.hidden_layers.iter().any(|&h| h == 0) {
            return Err(WranglerError::InvalidInput("hidden layer sizes must be positive".to_string()));
        }
        self.class_index = ClassIndex::fit_at_least_two(y)?;
        let encoded = self.class_index.encode(y)?;
        let targets = self.targets(&encoded);
        let n = x.nrows();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        self.initialize_weights(x.ncols(), &mut rng);

        let mut adam_w: Vec<AdamState<_>> = self.weights.iter().map(|w| AdamState::new(w.raw_dim())).collect();
        let mut adam_b: Vec<AdamState<_>> = self.biases.iter().map(|b| AdamState::new(b.raw_dim())).collect();

        let batch_size = self.config.batch_size.clamp(1, n);
        let mut indices: Vec<usize> = (0..n).collect();
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;
        let mut t = 0i32;
        self.n_iter = 0;

        for _ in 0..self.config.max_iter {
            indices.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in indices.chunks(batch_size) {
                let x_batch = x.select(Axis(0), batch);
                let y_batch = targets.select(Axis(0), batch);

                let activations = self.forward(&x_batch);
                let (loss, grad_w, grad_b) = self.backward(&activations, &y_batch);
                epoch_loss += loss * batch.len() as f64;

                t += 1;
                let lr_t = self.config.learning_rate * (1.0 - self.config.beta_2.powi(t)).sqrt()
                    / (1.0 - self.config.beta_1.powi(t));
                for layer in 0..self.weights.len() {
                    adam_w[layer].step(&mut self.weights[layer], &grad_w[layer], lr_t, &self.config);
                    adam_b[layer].step(&mut self.biases[layer], &grad_b[layer], lr_t, &self.config);
                }
            }

            self.n_iter += 1;
            epoch_loss /= n as f64;
            self.loss = epoch_loss;
            if !epoch_loss.is_finite() {
                return Err(WranglerError::TrainingError("MLP loss diverged".to_string()));
            }

            if epoch_loss > best_loss - self.config.tol {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            if epoch_loss < best_loss {
                best_loss = epoch_loss;
            }
            if no_improvement > self.config.n_iter_no_change {
                break;
            }
        }

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
        let first = self.weights.first().ok_or(WranglerError::ModelNotFitted)?;
        check_n_features(x, first.nrows())?;
        let mut activations = self.forward(x);
        let output = activations.pop().ok_or(WranglerError::ModelNotFitted)?;

        if output.ncols() == 1 {
            let mut proba = Array2::zeros((x.nrows(), 2));
            proba.column_mut(1).assign(&output.column(0));
            proba.column_mut(0).assign(&output.column(0).mapv(|p| 1.0 - p));
            Ok(proba)
        } else {
            Ok(output)
        }
    }

    fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        let c = &self.config;
        let layers = format!(
            "({},)",
            c.hidden_layers.iter().map(|h| h.to_string()).collect::<Vec<_>>().join(", ")
        );
        hyperparameters([
            ("activation", &"relu"),
            ("alpha", &c.alpha),
            ("hidden_layer_sizes", &layers),
            ("learning_rate_init", &c.learning_rate),
            ("max_iter", &c.max_iter),
            ("random_state", &c.random_state),
            ("solver", &"adam"),
        ])
    }
}
