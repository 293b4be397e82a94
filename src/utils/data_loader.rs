//! Data loading utilities
//!
//! Reads CSV files through polars and JSON row arrays through serde_json
//! into the row-oriented [`RawDataset`] the preparer consumes.

use crate::error::{Result, WranglerError};
use crate::preprocessing::{RawDataset, Row};
use polars::prelude::*;
use serde_json::{Number, Value};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Data loader for CSV and JSON files
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows used for CSV schema inference
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: 100,
        }
    }

    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows;
        self
    }

    /// Load a file, choosing the reader by extension.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<RawDataset> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let start = Instant::now();
        let dataset = match ext.as_str() {
            "csv" => self.load_csv(path)?,
            "json" => self.load_json(path)?,
            other => {
                return Err(WranglerError::DataError(format!(
                    "Unsupported file format: '{}'. Use CSV or JSON",
                    other
                )))
            }
        };
        debug!(
            path = %path.display(),
            rows = dataset.len(),
            columns = dataset.columns().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded dataset"
        );
        Ok(dataset)
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<RawDataset> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()?;
        dataframe_to_dataset(&df)
    }

    /// Load a JSON array of row objects
    pub fn load_json(&self, path: impl AsRef<Path>) -> Result<RawDataset> {
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        RawDataset::from_json(value)
    }
}

/// Convert a DataFrame to rows, keeping the frame's column order.
pub fn dataframe_to_dataset(df: &DataFrame) -> Result<RawDataset> {
    let columns = df.get_columns();
    let mut rows: Vec<Row> = (0..df.height()).map(|_| Row::new()).collect();

    for column in columns {
        let name = column.name().to_string();
        for (i, row) in rows.iter_mut().enumerate() {
            row.insert(name.clone(), any_value_to_json(column.get(i)?));
        }
    }

    RawDataset::from_rows(rows)
}

fn any_value_to_json(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(v) => Value::from(v),
        AnyValue::Int16(v) => Value::from(v),
        AnyValue::Int32(v) => Value::from(v),
        AnyValue::Int64(v) => Value::from(v),
        AnyValue::UInt8(v) => Value::from(v),
        AnyValue::UInt16(v) => Value::from(v),
        AnyValue::UInt32(v) => Value::from(v),
        AnyValue::UInt64(v) => Value::from(v),
        AnyValue::Float32(v) => float_to_json(v as f64),
        AnyValue::Float64(v) => float_to_json(v),
        other => Value::String(other.to_string()),
    }
}

fn float_to_json(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_csv() {
        let dir = std::env::temp_dir().join("superwrangler_test_csv");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("iris_small.csv");
        fs::write(&path, "sepal,color,label\n1.5,red,a\n2.5,,b\n,blue,a\n").unwrap();

        let dataset = DataLoader::new().load(&path).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.columns(), &["sepal", "color", "label"]);
        assert_eq!(dataset.value(0, "sepal"), Some(&serde_json::json!(1.5)));
        assert_eq!(dataset.value(1, "color"), None);
        assert_eq!(dataset.value(2, "sepal"), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_json() {
        let dir = std::env::temp_dir().join("superwrangler_test_json");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rows.json");
        fs::write(&path, r#"[{"x": 1, "y": "a"}, {"x": 2, "y": "b"}]"#).unwrap();

        let dataset = DataLoader::new().load(&path).unwrap();
        assert_eq!(dataset.len(), 2);
        assert!(dataset.has_column("y"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = DataLoader::new().load("data.parquet").unwrap_err();
        assert!(matches!(err, WranglerError::DataError(_)));
    }
}
