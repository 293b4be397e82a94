//! Support vector classifiers
//!
//! `SVC` solves the kernelized dual with SMO (Sequential Minimal Optimization)
//! and calibrates probabilities with Platt scaling. `LinearSVC` minimizes the
//! primal squared-hinge objective directly. Both train one binary problem for
//! two classes and one-vs-rest problems otherwise.

use crate::calibration::PlattScaling;
use crate::error::{Result, WranglerError};
use crate::training::linear_models::{minimize, signed_targets, LinearScores};
use crate::training::models::{
    check_fit_input, check_n_features, hyperparameters, ClassIndex, Classifier, Hyperparameters,
};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training returns an error instead of allocating n^2 floats.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// RBF kernel width
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gamma {
    /// 1 / (n_features * X.var())
    Scale,
    Value(f64),
}

impl fmt::Display for Gamma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gamma::Scale => write!(f, "scale"),
            Gamma::Value(v) => write!(f, "{}", v),
        }
    }
}

/// Kernel function type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KernelType {
    /// K(x, y) = x · y
    Linear,
    /// K(x, y) = exp(-γ * ||x - y||²)
    Rbf { gamma: Gamma },
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelType::Linear => write!(f, "linear"),
            KernelType::Rbf { .. } => write!(f, "rbf"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Kernel {
    Linear,
    Rbf(f64),
}

impl Kernel {
    fn resolve(kernel: KernelType, x: &Array2<f64>) -> Self {
        match kernel {
            KernelType::Linear => Kernel::Linear,
            KernelType::Rbf { gamma: Gamma::Value(g) } => Kernel::Rbf(g),
            KernelType::Rbf { gamma: Gamma::Scale } => {
                let n = x.len() as f64;
                let mean = x.sum() / n;
                let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                if var > 0.0 {
                    Kernel::Rbf(1.0 / (x.ncols() as f64 * var))
                } else {
                    Kernel::Rbf(1.0)
                }
            }
        }
    }

    fn apply(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self {
            Kernel::Linear => a.dot(&b),
            Kernel::Rbf(gamma) => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v) * (u - v)).sum();
                (-gamma * sq).exp()
            }
        }
    }

    /// Full n x n matrix, upper triangle rows computed in parallel
    fn matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (i..n).map(|j| self.apply(x.row(i), x.row(j))).collect())
            .collect();

        let mut k = Array2::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (offset, value) in row.into_iter().enumerate() {
                k[[i, i + offset]] = value;
                k[[i + offset, i]] = value;
            }
        }
        k
    }
}

/// SVC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub kernel: KernelType,
    /// KKT violation tolerance
    pub tol: f64,
    /// Maximum passes over the data
    pub max_iter: usize,
    /// Fit Platt scaling for `predict_proba`
    pub probability: bool,
    pub random_state: u64,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::Rbf { gamma: Gamma::Scale },
            tol: 1e-3,
            max_iter: 1000,
            probability: true,
            random_state: 42,
        }
    }
}

/// One binary problem: support vectors with signed dual coefficients
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySvm {
    support_vectors: Array2<f64>,
    /// alpha_i * y_i
    dual_coef: Array1<f64>,
    bias: f64,
    platt: Option<PlattScaling>,
}

impl BinarySvm {
    fn decision(&self, kernel: Kernel, row: ArrayView1<'_, f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.dual_coef.iter())
            .map(|(sv, &coef)| coef * kernel.apply(sv, row))
            .sum::<f64>()
            + self.bias
    }
}

/// Kernel support vector classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVC {
    pub config: SVMConfig,
    problems: Vec<BinarySvm>,
    /// Resolved RBF width (or None for the linear kernel)
    gamma: Option<f64>,
    class_index: ClassIndex,
    n_features: usize,
}

impl SVC {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            problems: Vec::new(),
            gamma: None,
            class_index: ClassIndex::default(),
            n_features: 0,
        }
    }

    fn kernel(&self) -> Kernel {
        match self.gamma {
            Some(g) => Kernel::Rbf(g),
            None => Kernel::Linear,
        }
    }

    /// Number of support vectors over all binary problems
    pub fn n_support_vectors(&self) -> usize {
        self.problems.iter().map(|p| p.support_vectors.nrows()).sum()
    }

    /// SMO with a cached error vector; returns alphas and bias.
    fn smo_train(&self, k: &Array2<f64>, y: ArrayView1<'_, f64>, seed: u64) -> (Array1<f64>, f64) {
        let n = y.len();
        let c = self.config.c;
        let tol = self.config.tol;
        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;
        // errors[i] = f(x_i) - y_i
        let mut errors: Array1<f64> = y.mapv(|v| -v);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let max_passes = 5;
        let mut passes = 0;
        let mut total_iter = 0;

        while passes < max_passes && total_iter < self.config.max_iter && n > 1 {
            let mut num_changed = 0;

            for i in 0..n {
                let e_i = errors[i];
                let violates = (y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0);
                if !violates {
                    continue;
                }

                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = errors[j];
                let (alpha_i_old, alpha_j_old) = (alphas[i], alphas[j]);

                let (l, h) = if y[i] != y[j] {
                    ((alphas[j] - alphas[i]).max(0.0), (c + alphas[j] - alphas[i]).min(c))
                } else {
                    ((alphas[i] + alphas[j] - c).max(0.0), (alphas[i] + alphas[j]).min(c))
                };
                if (l - h).abs() < 1e-10 {
                    continue;
                }

                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                alphas[j] = (alphas[j] - y[j] * (e_i - e_j) / eta).clamp(l, h);
                if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                    alphas[j] = alpha_j_old;
                    continue;
                }
                alphas[i] += y[i] * y[j] * (alpha_j_old - alphas[j]);

                let delta_i = y[i] * (alphas[i] - alpha_i_old);
                let delta_j = y[j] * (alphas[j] - alpha_j_old);
                let b1 = bias - e_i - delta_i * k[[i, i]] - delta_j * k[[i, j]];
                let b2 = bias - e_j - delta_i * k[[i, j]] - delta_j * k[[j, j]];
                let new_bias = if alphas[i] > 0.0 && alphas[i] < c {
                    b1
                } else if alphas[j] > 0.0 && alphas[j] < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                let delta_b = new_bias - bias;
                for m in 0..n {
                    errors[m] += delta_i * k[[i, m]] + delta_j * k[[j, m]] + delta_b;
                }
                bias = new_bias;
                num_changed += 1;
            }

            total_iter += 1;
            if num_changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        (alphas, bias)
    }

    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.problems.is_empty() {
            return Err(WranglerError::ModelNotFitted);
        }
        check_n_features(x, self.n_features)?;
        let kernel = self.kernel();
        let mut scores = Array2::zeros((x.nrows(), self.problems.len()));
        scores
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(x.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut out, row)| {
                for (p, problem) in self.problems.iter().enumerate() {
                    out[p] = problem.decision(kernel, row);
                }
            });
        Ok(scores)
    }
}

impl Default for SVC {
    fn default() -> Self {
        Self::new(SVMConfig::default())
    }
}

impl Classifier for SVC {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        if x.nrows() > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(WranglerError::InvalidInput(format!(
                "Dataset has {} samples, exceeding the maximum {} for the SVM kernel matrix",
                x.nrows(),
                MAX_KERNEL_MATRIX_SAMPLES
            )));
        }
        self.class_index = ClassIndex::fit_at_least_two(y)?;
        let encoded = self.class_index.encode(y)?;
        let targets = signed_targets(&encoded, self.class_index.len());
        self.n_features = x.ncols();

        let kernel = Kernel::resolve(self.config.kernel, x);
        self.gamma = match kernel {
            Kernel::Rbf(g) => Some(g),
            Kernel::Linear => None,
        };
        let k = kernel.matrix(x);

        self.problems.clear();
        for out in 0..targets.ncols() {
            let y_signed = targets.column(out);
            let (alphas, bias) = self.smo_train(&k, y_signed, self.config.random_state.wrapping_add(out as u64));

            let support: Vec<usize> = (0..alphas.len()).filter(|&i| alphas[i] > 1e-8).collect();
            let support_vectors = x.select(Axis(0), &support);
            let dual_coef = Array1::from_iter(support.iter().map(|&i| alphas[i] * y_signed[i]));

            // in-sample decision values for calibration
            let platt = if self.config.probability {
                let scores = Array1::from_iter((0..x.nrows()).map(|m| {
                    support.iter().map(|&i| alphas[i] * y_signed[i] * k[[i, m]]).sum::<f64>() + bias
                }));
                let positive: Vec<bool> = y_signed.iter().map(|&v| v > 0.0).collect();
                let mut platt = PlattScaling::new();
                platt.fit(scores.view(), &positive)?;
                Some(platt)
            } else {
                None
            };

            self.problems.push(BinarySvm {
                support_vectors,
                dual_coef,
                bias,
                platt,
            });
        }

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let scores = self.decision_function(x)?;
        if scores.ncols() == 1 {
            Ok(scores.column(0).mapv(|s| self.class_index.decode(usize::from(s > 0.0))))
        } else {
            Ok(self.class_index.decode_argmax(&scores))
        }
    }

    fn has_predict_proba(&self) -> bool {
        self.config.probability
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.config.probability {
            return Err(WranglerError::InvalidInput(
                "predict_proba requires probability=true".to_string(),
            ));
        }
        let scores = self.decision_function(x)?;
        let mut positive = Array2::zeros(scores.raw_dim());
        for (p, problem) in self.problems.iter().enumerate() {
            let platt = problem.platt.as_ref().ok_or(WranglerError::ModelNotFitted)?;
            positive.column_mut(p).assign(&platt.calibrate(scores.column(p))?);
        }

        if positive.ncols() == 1 {
            let mut proba = Array2::zeros((x.nrows(), 2));
            proba.column_mut(1).assign(&positive.column(0));
            proba.column_mut(0).assign(&positive.column(0).mapv(|p| 1.0 - p));
            return Ok(proba);
        }

        let k = positive.ncols() as f64;
        for mut row in positive.rows_mut() {
            let total = row.sum();
            if total > 0.0 {
                row /= total;
            } else {
                row.fill(1.0 / k);
            }
        }
        Ok(positive)
    }

    fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        let c = &self.config;
        let gamma = match c.kernel {
            KernelType::Rbf { gamma } => gamma.to_string(),
            KernelType::Linear => "scale".to_string(),
        };
        hyperparameters([
            ("C", &c.c),
            ("gamma", &gamma),
            ("kernel", &c.kernel),
            ("probability", &c.probability),
            ("random_state", &c.random_state),
            ("tol", &c.tol),
        ])
    }
}

/// Linear SVM on the primal squared-hinge objective
///
/// Minimizes `0.5 ||w||^2 + C * sum(max(0, 1 - y (w·x + b))^2)` with the
/// intercept treated as one more penalized weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSVC {
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub random_state: u64,
    scores: Option<LinearScores>,
    class_index: ClassIndex,
}

impl LinearSVC {
    pub fn new(c: f64, max_iter: usize) -> Self {
        Self {
            c,
            max_iter,
            tol: 1e-4,
            random_state: 42,
            scores: None,
            class_index: ClassIndex::default(),
        }
    }

    /// Objective scaled by 1/n so `tol` does not depend on the sample count
    fn objective(&self, x: &Array2<f64>, y: ArrayView1<'_, f64>, params: &Array2<f64>) -> (f64, Array2<f64>) {
        let n = x.nrows() as f64;
        let d = x.ncols();
        let w: ArrayView1<'_, f64> = params.slice(s![..d, 0]);
        let b = params[[d, 0]];

        let mut value = 0.5 * (w.dot(&w) + b * b);
        let mut grad = params.clone();
        for (row, &yi) in x.rows().into_iter().zip(y.iter()) {
            let margin = 1.0 - yi * (row.dot(&w) + b);
            if margin > 0.0 {
                value += self.c * margin * margin;
                let coef = -2.0 * self.c * margin * yi;
                grad.slice_mut(s![..d, 0]).scaled_add(coef, &row);
                grad[[d, 0]] += coef;
            }
        }
        (value / n, grad / n)
    }

    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.scores.as_ref().ok_or(WranglerError::ModelNotFitted)?.decision_function(x)
    }
}

impl Default for LinearSVC {
    fn default() -> Self {
        Self::new(1.0, 1000)
    }
}

impl Classifier for LinearSVC {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        self.class_index = ClassIndex::fit_at_least_two(y)?;
        let encoded = self.class_index.encode(y)?;
        let targets = signed_targets(&encoded, self.class_index.len());
        let d = x.ncols();

        let mut coef = Array2::zeros((d, targets.ncols()));
        let mut intercept = Array1::zeros(targets.ncols());
        for out in 0..targets.ncols() {
            let y_signed = targets.column(out);
            let (params, _) = minimize(
                |p| self.objective(x, y_signed, p),
                Array2::zeros((d + 1, 1)),
                self.max_iter,
                self.tol,
            );
            coef.column_mut(out).assign(&params.slice(s![..d, 0]));
            intercept[out] = params[[d, 0]];
        }

        self.scores = Some(LinearScores { coef, intercept });
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
        hyperparameters([
            ("C", &self.c),
            ("dual", &false),
            ("loss", &"squared_hinge"),
            ("max_iter", &self.max_iter),
            ("random_state", &self.random_state),
            ("tol", &self.tol),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> (Array2<f64>, Array1<usize>) {
        let x = array![
            [1.0, 1.0],
            [1.5, 1.2],
            [2.0, 2.0],
            [1.2, 1.8],
            [0.8, 1.5],
            [5.0, 5.0],
            [5.5, 5.2],
            [6.0, 6.0],
            [5.2, 5.8],
            [4.8, 5.5]
        ];
        let y = array![0usize, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        (x, y)
    }

    fn three_blobs() -> (Array2<f64>, Array1<usize>) {
        let x = array![
            [1.0, 1.0],
            [1.5, 1.2],
            [2.0, 2.0],
            [1.2, 1.8],
            [0.8, 1.5],
            [5.0, 5.0],
            [5.5, 5.2],
            [6.0, 6.0],
            [5.2, 5.8],
            [4.8, 5.5],
            [1.0, 5.0],
            [1.5, 5.2],
            [2.0, 6.0],
            [1.2, 5.8],
            [0.8, 5.5]
        ];
        let y = array![0usize, 0, 0, 0, 0, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2];
        (x, y)
    }

    #[test]
    fn test_svc_rbf_binary() {
        let (x, y) = two_blobs();
        let mut svc = SVC::default();
        svc.fit(&x, &y).unwrap();

        assert_eq!(svc.predict(&x).unwrap(), y);
        assert!(svc.n_support_vectors() > 0);

        let proba = svc.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (10, 2));
        assert!(proba[[0, 0]] > proba[[0, 1]]);
        assert!(proba[[9, 1]] > proba[[9, 0]]);
    }

    #[test]
    fn test_svc_multiclass_probabilities_normalized() {
        let (x, y) = three_blobs();
        let mut svc = SVC::default();
        svc.fit(&x, &y).unwrap();

        assert!(svc.score(&x, &y).unwrap() > 0.9);
        let proba = svc.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_svc_linear_kernel() {
        let (x, y) = two_blobs();
        let mut svc = SVC::new(SVMConfig {
            kernel: KernelType::Linear,
            probability: false,
            ..Default::default()
        });
        svc.fit(&x, &y).unwrap();

        assert_eq!(svc.predict(&x).unwrap(), y);
        assert!(!svc.has_predict_proba());
        assert_eq!(svc.hyperparameters()["kernel"], "linear");
    }

    #[test]
    fn test_gamma_scale() {
        let x = array![[0.0, 2.0], [2.0, 0.0]];
        // X.var() = 1, two features
        match Kernel::resolve(KernelType::Rbf { gamma: Gamma::Scale }, &x) {
            Kernel::Rbf(g) => assert!((g - 0.5).abs() < 1e-12),
            Kernel::Linear => panic!("expected rbf"),
        }
    }

    #[test]
    fn test_linear_svc() {
        let (x, y) = three_blobs();
        let mut svc = LinearSVC::new(1.0, 2000);
        svc.fit(&x, &y).unwrap();

        assert!(svc.score(&x, &y).unwrap() > 0.9);
        assert!(!svc.has_predict_proba());
        assert_eq!(svc.decision_function(&x).unwrap().ncols(), 3);
    }

    #[test]
    fn test_linear_svc_objective_at_origin() {
        let x = array![[1.0, 2.0], [-1.0, 0.5], [0.0, -3.0]];
        let y = array![1.0, -1.0, 1.0];
        let svc = LinearSVC::new(2.0, 100);
        let params = Array2::zeros((3, 1));

        // Every margin is 1 at the origin, so the loss is C per row.
        let (value, grad) = svc.objective(&x, y.view(), &params);
        assert!((value - 2.0).abs() < 1e-12);
        // d/dw = -2C * sum(y_i x_i) / n
        assert!((grad[[0, 0]] - (-2.0 * 2.0 * 2.0 / 3.0)).abs() < 1e-12);
        assert!((grad[[1, 0]] - (-2.0 * 2.0 * -1.5 / 3.0)).abs() < 1e-12);
        assert!((grad[[2, 0]] - (-2.0 * 2.0 * 1.0 / 3.0)).abs() < 1e-12);
    }
}
