//! Database row representation.

use crate::error::{Error, Result, StatementError, StatementErrorKind};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows in a result set.
///
/// Wrapped in `Arc` so all rows from the same query share the same column
/// information, saving memory for large result sets.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column names in order
    names: Vec<String>,
    /// Name -> index mapping for O(1) lookup
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get all column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row returned from a backend query.
///
/// Rows provide both index-based and name-based access to column values.
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values in order
    values: Vec<Value>,
    /// Shared column metadata
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    ///
    /// For multiple rows from the same result set, prefer [`Row::with_columns`]
    /// to share the column metadata.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get the shared column metadata.
    pub fn columns(&self) -> &Arc<ColumnInfo> {
        &self.columns
    }

    /// Number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Get a typed value by column name.
    ///
    /// Fails with a type-mismatch [`StatementError`] when the column is
    /// missing or cannot be converted.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T> {
        match self.value(name) {
            Some(v) => T::from_value(v).ok_or_else(|| type_mismatch::<T>(name, v)),
            None => Err(Error::Statement(StatementError::new(
                StatementErrorKind::TypeMismatch,
                format!("no column named '{name}' in result row"),
            ))),
        }
    }

    /// Get a typed value by column index.
    pub fn get_at<T: FromValue>(&self, index: usize) -> Result<T> {
        match self.value_at(index) {
            Some(v) => {
                T::from_value(v).ok_or_else(|| type_mismatch::<T>(&index.to_string(), v))
            }
            None => Err(Error::Statement(StatementError::new(
                StatementErrorKind::TypeMismatch,
                format!("no column at index {index} in result row"),
            ))),
        }
    }

    /// All values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

fn type_mismatch<T>(column: &str, actual: &Value) -> Error {
    Error::Statement(StatementError::new(
        StatementErrorKind::TypeMismatch,
        format!(
            "column '{}': expected {}, found {}",
            column,
            std::any::type_name::<T>(),
            actual.type_name()
        ),
    ))
}

/// Conversion from a dynamic [`Value`] into a typed Rust value.
pub trait FromValue: Sized {
    /// Convert, returning `None` when the value cannot be represented.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bytes().map(<[u8]>::to_vec)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
