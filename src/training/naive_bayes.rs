//! Gaussian Naive Bayes
//!
//! Per-class feature means and variances; every variance is padded by
//! `var_smoothing` times the largest feature variance of the whole training set.

use crate::error::{Result, WranglerError};
use crate::training::models::{
    check_fit_input, check_n_features, hyperparameters, ClassIndex, Classifier, Hyperparameters,
};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// classes x features
    means: Array2<f64>,
    /// classes x features
    variances: Array2<f64>,
    priors: Array1<f64>,
    class_index: ClassIndex,
    pub var_smoothing: f64,
    fitted: bool,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            means: Array2::zeros((0, 0)),
            variances: Array2::zeros((0, 0)),
            priors: Array1::zeros(0),
            class_index: ClassIndex::default(),
            var_smoothing: 1e-9,
            fitted: false,
        }
    }

    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    /// Class priors in `classes()` order
    pub fn class_priors(&self) -> &Array1<f64> {
        &self.priors
    }

    /// Normalized log posteriors, one column per class
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(WranglerError::ModelNotFitted);
        }
        check_n_features(x, self.means.ncols())?;

        let mut log_probs = Array2::zeros((x.nrows(), self.class_index.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for c in 0..self.class_index.len() {
                log_probs[[i, c]] = self.priors[c].ln() + self.log_likelihood(row, c);
            }
        }

        // log-sum-exp normalization
        for mut row in log_probs.rows_mut() {
            let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let log_sum = row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
            row.mapv_inplace(|v| v - max_val - log_sum);
        }
        Ok(log_probs)
    }

    fn log_likelihood(&self, row: ArrayView1<'_, f64>, class: usize) -> f64 {
        row.iter()
            .zip(self.means.row(class))
            .zip(self.variances.row(class))
            .map(|((&xi, &mean), &var)| -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln()))
            .sum()
    }
}

impl Classifier for GaussianNaiveBayes {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        self.class_index = ClassIndex::fit(y)?;
        let encoded = self.class_index.encode(y)?;
        let n_classes = self.class_index.len();
        let n_features = x.ncols();

        let max_variance = x.var_axis(Axis(0), 0.0).iter().cloned().fold(0.0, f64::max);
        let epsilon = self.var_smoothing * max_variance;

        let mut means = Array2::zeros((n_classes, n_features));
        let mut variances = Array2::zeros((n_classes, n_features));
        let mut priors = Array1::zeros(n_classes);

        for c in 0..n_classes {
            let members: Vec<usize> = (0..encoded.len()).filter(|&i| encoded[i] == c).collect();
            let rows = x.select(Axis(0), &members);
            let mean = rows.mean_axis(Axis(0)).ok_or(WranglerError::ModelNotFitted)?;
            let var = rows.var_axis(Axis(0), 0.0) + epsilon;
            means.row_mut(c).assign(&mean);
            variances.row_mut(c).assign(&var);
            priors[c] = members.len() as f64 / x.nrows() as f64;
        }

        // constant training data leaves zero variance; keep the density finite
        variances.mapv_inplace(|v: f64| if v > 0.0 { v } else { f64::MIN_POSITIVE.sqrt() });

        self.means = means;
        self.variances = variances;
        self.priors = priors;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let log_probs = self.predict_log_proba(x)?;
        Ok(self.class_index.decode_argmax(&log_probs))
    }

    fn has_predict_proba(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(self.predict_log_proba(x)?.mapv(f64::exp))
    }

    fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        hyperparameters([("var_smoothing", &self.var_smoothing)])
    }
}
