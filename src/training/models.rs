//! Estimator contract shared by every algorithm in the catalog

use crate::error::{Result, WranglerError};
use crate::training::metrics;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Effective hyperparameters, name to stringified value
pub type Hyperparameters = BTreeMap<String, String>;

/// A fittable classification procedure.
///
/// Labels are class indices. A fitted model reports the labels it saw in
/// [`Classifier::classes`]; probability columns follow that order.
pub trait Classifier: Send {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()>;

    /// Predict a label per row
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>>;

    /// Whether [`Classifier::predict_proba`] is available
    fn has_predict_proba(&self) -> bool {
        false
    }

    /// Per-class probabilities, one column per entry of `classes()`
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Array2<f64>> {
        Err(WranglerError::InvalidInput(
            "predict_proba is not available for this estimator".to_string(),
        ))
    }

    /// Mean accuracy on the given data
    fn score(&self, x: &Array2<f64>, y: &Array1<usize>) -> Result<f64> {
        let predictions = self.predict(x)?;
        Ok(metrics::accuracy(y, &predictions))
    }

    /// Labels seen during fit, ascending
    fn classes(&self) -> &[usize];

    /// Configured hyperparameters
    fn hyperparameters(&self) -> Hyperparameters;
}

/// Labels seen during fit, mapped to contiguous positions `0..k`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassIndex {
    classes: Vec<usize>,
}

impl ClassIndex {
    pub fn fit(y: &Array1<usize>) -> Result<Self> {
        if y.is_empty() {
            return Err(WranglerError::InvalidInput("Cannot fit on zero samples".to_string()));
        }
        let mut classes: Vec<usize> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        Ok(Self { classes })
    }

    /// Like `fit`, but rejects single-class targets.
    pub fn fit_at_least_two(y: &Array1<usize>) -> Result<Self> {
        let index = Self::fit(y)?;
        if index.len() < 2 {
            return Err(WranglerError::TrainingError(format!(
                "This solver needs samples of at least 2 classes in the data, but the data contains only one class: {}",
                index.classes[0]
            )));
        }
        Ok(index)
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Position of each label; labels unseen during fit are an error.
    pub fn encode(&self, y: &Array1<usize>) -> Result<Vec<usize>> {
        y.iter()
            .map(|label| {
                self.classes.binary_search(label).map_err(|_| {
                    WranglerError::InvalidInput(format!("Label {} was not seen during fit", label))
                })
            })
            .collect()
    }

    pub fn decode(&self, position: usize) -> usize {
        self.classes[position]
    }

    /// Label with the highest score in each row.
    pub fn decode_argmax(&self, scores: &Array2<f64>) -> Array1<usize> {
        scores
            .axis_iter(Axis(0))
            .map(|row| self.decode(argmax(row.iter().copied())))
            .collect()
    }
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}

/// Check `x` and `y` describe the same, non-empty set of samples.
pub fn check_fit_input(x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(WranglerError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(WranglerError::InvalidInput(format!(
            "Found array with {} sample(s) and {} feature(s)",
            x.nrows(),
            x.ncols()
        )));
    }
    Ok(())
}

/// Check a prediction matrix has the width seen during fit.
pub fn check_n_features(x: &Array2<f64>, expected: usize) -> Result<()> {
    if x.ncols() != expected {
        return Err(WranglerError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Row-wise softmax, stable against large logits.
pub fn softmax_rows(logits: &mut Array2<f64>) {
    for mut row in logits.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Build a [`Hyperparameters`] map from display values.
pub fn hyperparameters<const N: usize>(pairs: [(&str, &dyn Display); N]) -> Hyperparameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Render an optional value, `"None"` when absent.
pub fn display_option<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "None".to_string())
}
