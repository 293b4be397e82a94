//! Row-oriented dataset ingestion and column typing

use crate::error::{Result, WranglerError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One input row: column name to scalar value
pub type Row = Map<String, Value>;

/// Inferred kind of a feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Every present value is a number
    Numeric,
    /// Every present value is a boolean (encoded as 0/1)
    Boolean,
    /// Anything else, treated as text categories
    Categorical,
}

/// Ordered rows with a column set in first-seen order
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl RawDataset {
    /// Build from rows, checking every value is a JSON scalar.
    pub fn from_rows(rows: Vec<Row>) -> Result<Self> {
        let mut columns = Vec::new();
        let mut seen = HashSet::new();

        for (i, row) in rows.iter().enumerate() {
            for (key, value) in row {
                if value.is_array() || value.is_object() {
                    return Err(WranglerError::DataError(format!(
                        "Row {} column '{}' must be a scalar value",
                        i, key
                    )));
                }
                if seen.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }

        Ok(Self { columns, rows })
    }

    /// Build from a JSON array of objects.
    pub fn from_json(value: Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items,
            _ => return Err(WranglerError::DataError("Data must be a list of rows".to_string())),
        };

        let rows = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                _ => Err(WranglerError::DataError(format!("Row {} must be a JSON object", i))),
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_rows(rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Value at (row, column); missing keys and nulls are both `None`.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .filter(|v| !v.is_null())
    }

    /// Infer a column's kind from the present values of the given rows.
    pub fn column_kind(&self, column: &str, rows: &[usize]) -> ColumnKind {
        let mut all_numbers = true;
        let mut all_bools = true;
        let mut any_present = false;

        for &i in rows {
            if let Some(v) = self.value(i, column) {
                any_present = true;
                all_numbers &= v.is_number();
                all_bools &= v.is_boolean();
            }
        }

        if !any_present || all_numbers {
            ColumnKind::Numeric
        } else if all_bools {
            ColumnKind::Boolean
        } else {
            ColumnKind::Categorical
        }
    }
}

/// Canonical text of a scalar, used for class labels and categories.
///
/// Integral floats render without a fractional part so `1` and `1.0` agree.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numeric view of a scalar; booleans map to 0/1.
pub fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
