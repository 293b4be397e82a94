//! Classification metrics
//!
//! Weighted precision/recall/F1 follow the "weighted" averaging convention:
//! per-label scores over the union of true and predicted labels, averaged by
//! each label's support in the truth. Zero denominators score 0.

use crate::error::{Result, WranglerError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Weighted precision, recall and F1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Fraction of exact matches.
pub fn accuracy(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred.iter()).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Sorted union of the labels in both arrays.
pub fn observed_labels(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> Vec<usize> {
    y_true
        .iter()
        .chain(y_pred.iter())
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn weighted_scores(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> WeightedScores {
    let labels = observed_labels(y_true, y_pred);
    let total = y_true.len() as f64;
    let mut scores = WeightedScores {
        precision: 0.0,
        recall: 0.0,
        f1: 0.0,
    };
    if total == 0.0 {
        return scores;
    }

    for &label in &labels {
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == label, p == label) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        let support = (tp + fn_) as f64;
        if support == 0.0 {
            continue;
        }

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = ratio(2 * tp, 2 * tp + fp + fn_);

        let weight = support / total;
        scores.precision += weight * precision;
        scores.recall += weight * recall;
        scores.f1 += weight * f1;
    }

    scores
}

/// Weighted F1 alone.
pub fn f1_weighted(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> f64 {
    weighted_scores(y_true, y_pred).f1
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Confusion matrix over the sorted union of observed labels.
///
/// Rows are true labels, columns predicted labels.
pub fn confusion_matrix(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> Vec<Vec<u64>> {
    let labels = observed_labels(y_true, y_pred);
    let k = labels.len();
    let mut matrix = vec![vec![0u64; k]; k];
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        if let (Ok(i), Ok(j)) = (labels.binary_search(t), labels.binary_search(p)) {
            matrix[i][j] += 1;
        }
    }
    matrix
}

/// ROC-AUC from class probabilities.
///
/// `classes` names the label of each probability column. Two columns are
/// scored as a binary problem on the second column; more columns use
/// one-vs-rest AUC weighted by class prevalence. Errors when the truth does
/// not contain the classes needed to rank.
pub fn roc_auc(y_true: &Array1<usize>, proba: &Array2<f64>, classes: &[usize]) -> Result<f64> {
    if proba.nrows() != y_true.len() || proba.ncols() != classes.len() {
        return Err(WranglerError::ShapeError {
            expected: format!("{} x {}", y_true.len(), classes.len()),
            actual: format!("{} x {}", proba.nrows(), proba.ncols()),
        });
    }
    let present: Vec<usize> = y_true.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();

    if proba.ncols() == 2 {
        if present.len() != 2 {
            return Err(WranglerError::ComputationError(format!(
                "Only one class present in y_true. ROC AUC score is not defined in that case. Found {} classes",
                present.len()
            )));
        }
        let positive = present[1];
        let is_positive: Vec<bool> = y_true.iter().map(|&y| y == positive).collect();
        let scores: Vec<f64> = proba.column(1).to_vec();
        return binary_auc(&is_positive, &scores);
    }

    if present != classes {
        return Err(WranglerError::ComputationError(format!(
            "Number of classes in y_true ({}) not equal to the number of columns in y_score ({})",
            present.len(),
            classes.len()
        )));
    }

    let n = y_true.len() as f64;
    let mut total = 0.0;
    for (col, &label) in classes.iter().enumerate() {
        let is_positive: Vec<bool> = y_true.iter().map(|&y| y == label).collect();
        let support = is_positive.iter().filter(|&&p| p).count() as f64;
        let scores: Vec<f64> = proba.column(col).to_vec();
        total += support / n * binary_auc(&is_positive, &scores)?;
    }
    Ok(total)
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
pub fn binary_auc(is_positive: &[bool], scores: &[f64]) -> Result<f64> {
    let n_pos = is_positive.iter().filter(|&&p| p).count();
    let n_neg = is_positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(WranglerError::ComputationError(
            "ROC AUC needs both positive and negative samples".to_string(),
        ));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(WranglerError::ComputationError("Scores contain non-finite values".to_string()));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let rank_sum: f64 = ranks
        .iter()
        .zip(is_positive)
        .filter(|(_, p)| **p)
        .map(|(r, _)| r)
        .sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}
