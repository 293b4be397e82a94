//! Linear classifiers: logistic regression and ridge classification
//!
//! Also hosts the pieces other linear models share: the Cholesky solver, the
//! line-search gradient descent used by the smooth objectives, and the
//! one-vs-rest decision rule.

use crate::error::{Result, WranglerError};
use crate::training::models::{
    check_fit_input, check_n_features, display_option, hyperparameters, sigmoid, softmax_rows, ClassIndex, Classifier,
    Hyperparameters,
};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system `a x = b` by Cholesky
/// decomposition. A near-singular matrix gets a small ridge and one retry.
pub(crate) fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    cholesky_solve_inner(a, b).or_else(|| {
        let n = a.nrows();
        let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
        let mut regularized = a.clone();
        for k in 0..n {
            regularized[[k, k]] += ridge.max(1e-12);
        }
        cholesky_solve_inner(&regularized, b)
    })
}

fn cholesky_solve_inner(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L * L^T
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Minimize a smooth objective by gradient descent with Armijo backtracking.
///
/// `objective` returns the value and gradient at a point. Stops once the
/// largest gradient component falls below `tol`. Returns the solution and the
/// number of iterations run.
pub(crate) fn minimize<F>(mut objective: F, init: Array2<f64>, max_iter: usize, tol: f64) -> (Array2<f64>, usize)
where
    F: FnMut(&Array2<f64>) -> (f64, Array2<f64>),
{
    let mut w = init;
    let (mut value, mut grad) = objective(&w);
    let mut step = 1.0;

    for iter in 0..max_iter {
        let grad_max = grad.iter().fold(0.0f64, |m, g| m.max(g.abs()));
        if grad_max < tol {
            return (w, iter);
        }
        let grad_sq: f64 = grad.iter().map(|g| g * g).sum();

        step *= 2.0;
        loop {
            let candidate = &w - &(&grad * step);
            let (candidate_value, candidate_grad) = objective(&candidate);
            if candidate_value <= value - 1e-4 * step * grad_sq || step < 1e-20 {
                w = candidate;
                value = candidate_value;
                grad = candidate_grad;
                break;
            }
            step *= 0.5;
        }
    }

    (w, max_iter)
}

/// Fitted linear scores: one column per one-vs-rest problem, or a single
/// column for binary targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LinearScores {
    pub coef: Array2<f64>,
    pub intercept: Array1<f64>,
}

impl LinearScores {
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_n_features(x, self.coef.nrows())?;
        Ok(x.dot(&self.coef) + &self.intercept)
    }

    /// Positive score picks the second class of a binary problem; otherwise
    /// the highest score wins.
    pub fn predict(&self, x: &Array2<f64>, class_index: &ClassIndex) -> Result<Array1<usize>> {
        let scores = self.decision_function(x)?;
        if scores.ncols() == 1 {
            Ok(scores
                .column(0)
                .mapv(|s| class_index.decode(usize::from(s > 0.0))))
        } else {
            Ok(class_index.decode_argmax(&scores))
        }
    }
}

/// Binary targets become one signed column, multi-class targets one signed
/// column per class.
pub(crate) fn signed_targets(encoded: &[usize], n_classes: usize) -> Array2<f64> {
    if n_classes == 2 {
        Array2::from_shape_fn((encoded.len(), 1), |(i, _)| if encoded[i] == 1 { 1.0 } else { -1.0 })
    } else {
        Array2::from_shape_fn((encoded.len(), n_classes), |(i, c)| if encoded[i] == c { 1.0 } else { -1.0 })
    }
}

fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// L2-regularized logistic regression
///
/// Binary targets fit one logistic output; more classes fit a multinomial
/// (softmax) model. The intercept is not penalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub random_state: Option<u64>,
    /// (n_features + 1) x outputs, intercept in the last row
    params: Option<Array2<f64>>,
    class_index: ClassIndex,
    n_iter: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            tol: 1e-4,
            random_state: None,
            params: None,
            class_index: ClassIndex::default(),
            n_iter: 0,
        }
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Iterations used by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn linear(x: &Array2<f64>, params: &Array2<f64>) -> Array2<f64> {
        let d = x.ncols();
        x.dot(&params.slice(s![..d, ..])) + &params.row(d)
    }

    fn objective(&self, x: &Array2<f64>, targets: &Array2<f64>, params: &Array2<f64>) -> (f64, Array2<f64>) {
        let n = x.nrows() as f64;
        let d = x.ncols();
        let z = Self::linear(x, params);

        let (loss, residual) = if z.ncols() == 1 {
            let loss: f64 = z
                .column(0)
                .iter()
                .zip(targets.column(0))
                .map(|(&zi, &yi)| softplus(zi) - yi * zi)
                .sum();
            (loss, z.mapv(sigmoid) - targets)
        } else {
            let mut proba = z.clone();
            softmax_rows(&mut proba);
            let loss: f64 = z
                .rows()
                .into_iter()
                .zip(targets.rows())
                .map(|(zi, yi)| {
                    let max = zi.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                    let lse = max + zi.mapv(|v| (v - max).exp()).sum().ln();
                    lse - zi.dot(&yi)
                })
                .sum();
            (loss, proba - targets)
        };

        let penalty_scale = 1.0 / (self.c * n);
        let weights = params.slice(s![..d, ..]);
        let penalty = 0.5 * penalty_scale * weights.iter().map(|w| w * w).sum::<f64>();

        let mut grad = Array2::zeros(params.raw_dim());
        grad.slice_mut(s![..d, ..])
            .assign(&(x.t().dot(&residual) / n + &weights * penalty_scale));
        grad.row_mut(d).assign(&residual.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(residual.ncols())));

        (loss / n + penalty, grad)
    }

    fn fitted(&self) -> Result<&Array2<f64>> {
        self.params.as_ref().ok_or(WranglerError::ModelNotFitted)
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.c <= 0.0 {
            return Err(WranglerError::InvalidInput(format!("C must be positive, got {}", self.c)));
        }
        self.class_index = ClassIndex::fit_at_least_two(y)?;
        let encoded = self.class_index.encode(y)?;
        let k = self.class_index.len();
        let n_outputs = if k == 2 { 1 } else { k };

        let targets = if k == 2 {
            Array2::from_shape_fn((encoded.len(), 1), |(i, _)| encoded[i] as f64)
        } else {
            Array2::from_shape_fn((encoded.len(), k), |(i, c)| if encoded[i] == c { 1.0 } else { 0.0 })
        };

        let init = Array2::zeros((x.ncols() + 1, n_outputs));
        let (params, n_iter) = minimize(|p| self.objective(x, &targets, p), init, self.max_iter, self.tol);
        self.params = Some(params);
        self.n_iter = n_iter;
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
        let params = self.fitted()?;
        check_n_features(x, params.nrows() - 1)?;
        let z = Self::linear(x, params);
        if z.ncols() == 1 {
            let mut proba = Array2::zeros((x.nrows(), 2));
            for (i, &zi) in z.column(0).iter().enumerate() {
                let p = sigmoid(zi);
                proba[[i, 0]] = 1.0 - p;
                proba[[i, 1]] = p;
            }
            Ok(proba)
        } else {
            let mut proba = z;
            softmax_rows(&mut proba);
            Ok(proba)
        }
    }

    fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        let random_state = display_option(self.random_state);
        hyperparameters([
            ("C", &self.c),
            ("max_iter", &self.max_iter),
            ("penalty", &"l2"),
            ("random_state", &random_state),
            ("tol", &self.tol),
        ])
    }
}

/// Ridge classifier: least squares on {-1, 1} targets with an L2 penalty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeClassifier {
    pub alpha: f64,
    pub random_state: Option<u64>,
    scores: Option<LinearScores>,
    class_index: ClassIndex,
}

impl Default for RidgeClassifier {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeClassifier {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            random_state: None,
            scores: None,
            class_index: ClassIndex::default(),
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.scores.as_ref().ok_or(WranglerError::ModelNotFitted)?.decision_function(x)
    }
}

impl Classifier for RidgeClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        self.class_index = ClassIndex::fit_at_least_two(y)?;
        let encoded = self.class_index.encode(y)?;
        let targets = signed_targets(&encoded, self.class_index.len());

        let x_mean = x.mean_axis(Axis(0)).ok_or(WranglerError::ModelNotFitted)?;
        let y_mean = targets.mean_axis(Axis(0)).ok_or(WranglerError::ModelNotFitted)?;
        let xc = x - &x_mean;
        let yc = &targets - &y_mean;

        let mut gram = xc.t().dot(&xc);
        for j in 0..gram.nrows() {
            gram[[j, j]] += self.alpha;
        }
        let rhs = xc.t().dot(&yc);

        let mut coef = Array2::zeros((x.ncols(), targets.ncols()));
        for out in 0..targets.ncols() {
            let w = cholesky_solve(&gram, &rhs.column(out).to_owned()).ok_or_else(|| {
                WranglerError::ComputationError("Ridge system is not positive definite".to_string())
            })?;
            coef.column_mut(out).assign(&w);
        }
        let intercept = &y_mean - &x_mean.dot(&coef);

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
        let random_state = display_option(self.random_state);
        hyperparameters([
            ("alpha", &self.alpha),
            ("fit_intercept", &true),
            ("random_state", &random_state),
        ])
    }
}
