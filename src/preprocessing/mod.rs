//! Dataset preparation
//!
//! Turns raw JSON-style rows into the numeric, scaled train/test split that
//! every algorithm in a session trains against:
//! - row ingestion and column typing ([`RawDataset`])
//! - drop-first one-hot encoding of categorical columns ([`OneHotEncoder`])
//! - z-score scaling ([`StandardScaler`])
//! - stratified 80/20 splitting with a random fallback ([`train_test_split`])

mod dataset;
mod encoder;
mod scaler;
mod split;

pub use dataset::{value_number, value_text, ColumnKind, RawDataset, Row};
pub use encoder::OneHotEncoder;
pub use scaler::StandardScaler;
pub use split::{test_size_for, train_test_split, SplitIndices};

use crate::config::SessionConfig;
use crate::error::{Result, WranglerError};
use ndarray::{concatenate, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Dataset metadata reported with every session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetInfo {
    pub samples: usize,
    pub features: usize,
    pub features_after_encoding: usize,
    pub classes: usize,
    pub train_size: usize,
    pub test_size: usize,
}

/// Encoded, scaled and partitioned data shared read-only by every algorithm
#[derive(Debug, Clone)]
pub struct PreparedSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    /// Class indices into `class_labels`
    pub y_train: Array1<usize>,
    pub y_test: Array1<usize>,
    pub class_labels: Vec<String>,
    pub feature_names: Vec<String>,
    pub stratified: bool,
    pub info: DatasetInfo,
}

impl PreparedSplit {
    pub fn n_classes(&self) -> usize {
        self.class_labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.x_train.ncols()
    }
}

/// Validates raw rows and produces a [`PreparedSplit`]
#[derive(Debug, Clone)]
pub struct DatasetPreparer {
    config: SessionConfig,
}

impl DatasetPreparer {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Validate, encode, scale and split.
    ///
    /// Checks run in order: target present, enough labelled rows, enough
    /// distinct classes. Rows with a missing target are dropped first.
    pub fn prepare(&self, dataset: &RawDataset, target: &str) -> Result<PreparedSplit> {
        if !dataset.has_column(target) {
            return Err(WranglerError::SchemaError(format!(
                "Target column '{}' not found in data",
                target
            )));
        }

        let kept: Vec<usize> = (0..dataset.len())
            .filter(|&i| dataset.value(i, target).is_some())
            .collect();

        if kept.len() < self.config.min_samples {
            return Err(WranglerError::InsufficientDataError {
                samples: kept.len(),
                required: self.config.min_samples,
            });
        }

        let raw_labels: Vec<String> = kept
            .iter()
            .filter_map(|&i| dataset.value(i, target).map(value_text))
            .collect();
        let class_labels = sorted_classes(&raw_labels);
        if class_labels.len() < self.config.min_classes {
            return Err(WranglerError::InsufficientClassesError {
                found: class_labels.len(),
                required: self.config.min_classes,
            });
        }

        let index: HashMap<&str, usize> = class_labels
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let labels: Vec<usize> = raw_labels
            .iter()
            .map(|l| index.get(l.as_str()).copied().unwrap_or(0))
            .collect();

        let feature_columns: Vec<&String> = dataset.columns().iter().filter(|c| *c != target).collect();
        if feature_columns.is_empty() {
            return Err(WranglerError::SchemaError(format!(
                "No feature columns besides target column '{}'",
                target
            )));
        }

        let (x, feature_names) = encode_features(dataset, &feature_columns, &kept)?;
        if x.ncols() == 0 {
            return Err(WranglerError::SchemaError(
                "No usable features after encoding".to_string(),
            ));
        }

        // Scaler statistics come from all rows, test rows included.
        let x = StandardScaler::new().fit_transform(&x)?;

        let split = train_test_split(
            &labels,
            class_labels.len(),
            self.config.test_ratio,
            self.config.random_seed,
        )?;

        let info = DatasetInfo {
            samples: dataset.len(),
            features: feature_columns.len(),
            features_after_encoding: x.ncols(),
            classes: class_labels.len(),
            train_size: split.train.len(),
            test_size: split.test.len(),
        };

        info!(
            samples = info.samples,
            features = info.features,
            encoded_features = info.features_after_encoding,
            classes = info.classes,
            stratified = split.stratified,
            "Dataset prepared"
        );

        let y = Array1::from_vec(labels);
        Ok(PreparedSplit {
            x_train: x.select(Axis(0), &split.train),
            x_test: x.select(Axis(0), &split.test),
            y_train: y.select(Axis(0), &split.train),
            y_test: y.select(Axis(0), &split.test),
            class_labels,
            feature_names,
            stratified: split.stratified,
            info,
        })
    }
}

/// Unique labels, numerically ordered when every label is a number.
fn sorted_classes(labels: &[String]) -> Vec<String> {
    let mut classes: Vec<String> = labels.to_vec();
    classes.sort();
    classes.dedup();

    let numeric: Option<Vec<f64>> = classes.iter().map(|c| c.parse::<f64>().ok()).collect();
    if let Some(values) = numeric {
        let mut paired: Vec<(f64, String)> = values.into_iter().zip(classes).collect();
        paired.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        return paired.into_iter().map(|(_, c)| c).collect();
    }
    classes
}

/// Numeric and boolean columns first, then dummies of categorical columns.
fn encode_features(
    dataset: &RawDataset,
    columns: &[&String],
    rows: &[usize],
) -> Result<(Array2<f64>, Vec<String>)> {
    let mut numeric_names = Vec::new();
    let mut numeric_values: Vec<Vec<f64>> = Vec::new();
    let mut categorical: Vec<(String, Vec<Option<String>>)> = Vec::new();

    for &column in columns {
        match dataset.column_kind(column, rows) {
            ColumnKind::Numeric | ColumnKind::Boolean => {
                let raw: Vec<Option<f64>> = rows
                    .iter()
                    .map(|&i| dataset.value(i, column).and_then(value_number))
                    .collect();
                let present: Vec<f64> = raw.iter().flatten().copied().collect();
                let fill = if present.is_empty() {
                    0.0
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                };
                let missing = raw.len() - present.len();
                if missing > 0 {
                    debug!(column = %column, missing, fill, "Imputed missing numeric values");
                }
                numeric_names.push(column.clone());
                numeric_values.push(raw.into_iter().map(|v| v.unwrap_or(fill)).collect());
            }
            ColumnKind::Categorical => {
                let values = rows
                    .iter()
                    .map(|&i| dataset.value(i, column).map(value_text))
                    .collect();
                categorical.push((column.clone(), values));
            }
        }
    }

    let numeric = Array2::from_shape_fn((rows.len(), numeric_values.len()), |(i, j)| numeric_values[j][i]);

    let mut encoder = OneHotEncoder::new();
    let dummies = encoder.fit_transform(&categorical)?;
    let dummies = if categorical.is_empty() {
        Array2::zeros((rows.len(), 0))
    } else {
        dummies
    };

    let x = concatenate(Axis(1), &[numeric.view(), dummies.view()])?;
    let mut names = numeric_names;
    names.extend(encoder.feature_names());
    Ok((x, names))
}
