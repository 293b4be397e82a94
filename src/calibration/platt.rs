//! Platt scaling (sigmoid calibration)

use crate::error::{Result, WranglerError};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Maps a decision score `f` to `P(y = 1 | f) = 1 / (1 + exp(A f + B))`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlattScaling {
    a: Option<f64>,
    b: Option<f64>,
    max_iter: usize,
    tol: f64,
}

impl PlattScaling {
    pub fn new() -> Self {
        Self {
            a: None,
            b: None,
            max_iter: 100,
            tol: 1e-10,
        }
    }

    /// Fitted (A, B)
    pub fn parameters(&self) -> Option<(f64, f64)> {
        self.a.zip(self.b)
    }

    fn sigmoid(a: f64, b: f64, f: f64) -> f64 {
        let z = a * f + b;
        if z >= 0.0 {
            let e = (-z).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + z.exp())
        }
    }

    /// Fit on decision scores and positive/negative labels.
    ///
    /// Targets use Platt's prior correction, `(N+ + 1) / (N+ + 2)` and
    /// `1 / (N- + 2)`, and the 2x2 Newton step is damped until the
    /// log loss decreases.
    pub fn fit(&mut self, scores: ArrayView1<'_, f64>, positive: &[bool]) -> Result<()> {
        let n = scores.len();
        if n != positive.len() {
            return Err(WranglerError::ShapeError {
                expected: format!("{} labels", n),
                actual: format!("{} labels", positive.len()),
            });
        }
        if n == 0 {
            return Err(WranglerError::InvalidInput("Cannot calibrate on zero samples".to_string()));
        }

        let n_pos = positive.iter().filter(|&&p| p).count() as f64;
        let n_neg = n as f64 - n_pos;
        let hi = (n_pos + 1.0) / (n_pos + 2.0);
        let lo = 1.0 / (n_neg + 2.0);
        let targets: Vec<f64> = positive.iter().map(|&p| if p { hi } else { lo }).collect();

        let loss = |a: f64, b: f64| -> f64 {
            scores
                .iter()
                .zip(&targets)
                .map(|(&f, &t)| {
                    let p = Self::sigmoid(a, b, f).clamp(1e-15, 1.0 - 1e-15);
                    -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                })
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((n_neg + 1.0) / (n_pos + 1.0)).ln();
        let mut current = loss(a, b);

        for _ in 0..self.max_iter {
            let (mut g_a, mut g_b, mut h_aa, mut h_ab, mut h_bb) = (0.0, 0.0, 1e-12, 0.0, 1e-12);
            for (&f, &t) in scores.iter().zip(&targets) {
                let p = Self::sigmoid(a, b, f);
                // derivative of the loss with respect to z = A f + B
                let d1 = t - p;
                let d2 = p * (1.0 - p);
                g_a += f * d1;
                g_b += d1;
                h_aa += f * f * d2;
                h_ab += f * d2;
                h_bb += d2;
            }

            let det = h_aa * h_bb - h_ab * h_ab;
            if det.abs() < 1e-300 {
                break;
            }
            let delta_a = -(h_bb * g_a - h_ab * g_b) / det;
            let delta_b = -(h_aa * g_b - h_ab * g_a) / det;

            let mut step = 1.0;
            let mut improved = false;
            while step >= 1e-10 {
                let (na, nb) = (a + step * delta_a, b + step * delta_b);
                let candidate = loss(na, nb);
                if candidate < current + 1e-4 * step * (g_a * delta_a + g_b * delta_b) {
                    a = na;
                    b = nb;
                    current = candidate;
                    improved = true;
                    break;
                }
                step *= 0.5;
            }

            if !improved || (step * delta_a).abs().max((step * delta_b).abs()) < self.tol {
                break;
            }
        }

        self.a = Some(a);
        self.b = Some(b);
        Ok(())
    }

    /// Probability of the positive label for each score
    pub fn calibrate(&self, scores: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        let (a, b) = self
            .parameters()
            .ok_or_else(|| WranglerError::InvalidInput("Calibrator not fitted".to_string()))?;
        Ok(scores.mapv(|f| Self::sigmoid(a, b, f)))
    }
}

impl Default for PlattScaling {
    fn default() -> Self {
        Self::new()
    }
}
