//! One-hot encoding of categorical feature columns

use crate::error::{Result, WranglerError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Fitted categories of one column
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnCategories {
    name: String,
    /// Sorted categories that get an indicator column
    kept: Vec<String>,
}

/// One-hot encoder producing `<column>_<category>` indicator columns.
///
/// With `drop_first` (the default) the lexicographically first category of
/// every column gets no indicator, so the dummies are not linearly redundant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    drop_first: bool,
    columns: Vec<ColumnCategories>,
    is_fitted: bool,
}

impl Default for OneHotEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self {
            drop_first: true,
            columns: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn with_drop_first(mut self, drop_first: bool) -> Self {
        self.drop_first = drop_first;
        self
    }

    /// Learn the category set of each column. Missing values are ignored.
    pub fn fit(&mut self, columns: &[(String, Vec<Option<String>>)]) -> Result<&mut Self> {
        self.columns = columns
            .iter()
            .map(|(name, values)| {
                let mut categories: Vec<String> = values.iter().flatten().cloned().collect();
                categories.sort();
                categories.dedup();
                if self.drop_first && !categories.is_empty() {
                    categories.remove(0);
                }
                ColumnCategories {
                    name: name.clone(),
                    kept: categories,
                }
            })
            .collect();
        self.is_fitted = true;
        Ok(self)
    }

    /// Names of the produced indicator columns, in output order.
    pub fn feature_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(|c| c.kept.iter().map(move |cat| format!("{}_{}", c.name, cat)))
            .collect()
    }

    pub fn n_output_features(&self) -> usize {
        self.columns.iter().map(|c| c.kept.len()).sum()
    }

    /// Encode columns given in the same order as during `fit`.
    pub fn transform(&self, columns: &[(String, Vec<Option<String>>)]) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(WranglerError::ModelNotFitted);
        }
        if columns.len() != self.columns.len() {
            return Err(WranglerError::ShapeError {
                expected: format!("{} categorical columns", self.columns.len()),
                actual: format!("{} categorical columns", columns.len()),
            });
        }

        let n_rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut out = Array2::zeros((n_rows, self.n_output_features()));

        let mut offset = 0;
        for (fitted, (name, values)) in self.columns.iter().zip(columns) {
            if &fitted.name != name {
                return Err(WranglerError::DataError(format!(
                    "Column order mismatch: expected '{}', got '{}'",
                    fitted.name, name
                )));
            }
            for (row, value) in values.iter().enumerate() {
                if let Some(v) = value {
                    if let Ok(pos) = fitted.kept.binary_search(v) {
                        out[[row, offset + pos]] = 1.0;
                    }
                }
            }
            offset += fitted.kept.len();
        }

        Ok(out)
    }

    pub fn fit_transform(&mut self, columns: &[(String, Vec<Option<String>>)]) -> Result<Array2<f64>> {
        self.fit(columns)?;
        self.transform(columns)
    }
}
