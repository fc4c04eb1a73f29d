//! Table schema descriptors and cell values.
//!
//! A [`TableSchema`] is the ordered column list a table cache is created with.
//! Storage adapters consume it to build statements; column and table names
//! must pass [`is_valid_identifier`] before they are ever placed in SQL.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DataError, Result};

/// Storage type of a cached column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// 64-bit floating point.
    Real,
    /// 64-bit signed integer.
    Integer,
}

impl ColumnType {
    /// SQL storage type name.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Real => "REAL",
            Self::Integer => "INTEGER",
        }
    }

    /// Polars dtype a column of this type is materialized as.
    #[must_use]
    pub fn dtype(self) -> DataType {
        match self {
            Self::Text => DataType::String,
            Self::Real => DataType::Float64,
            Self::Integer => DataType::Int64,
        }
    }
}

/// Returns true if `name` may be used as a table or column name.
///
/// Accepted names are non-empty and made of ASCII letters, digits and `_`.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Ordered mapping of column name to [`ColumnType`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    columns: Vec<(String, ColumnType)>,
}

impl TableSchema {
    /// Create an empty schema.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Append a column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, kind: ColumnType) -> Self {
        self.columns.push((name.into(), kind));
        self
    }

    /// Build a schema from `(name, type)` pairs.
    #[must_use]
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, kind)| (name.into(), kind))
                .collect(),
        }
    }

    /// Iterate over `(name, type)` pairs in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Column names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Type of the column `name`, if declared.
    #[must_use]
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, kind)| *kind)
    }

    /// Returns true if `name` is a declared column.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.column_type(name).is_some()
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if no columns are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Check that the schema is usable for table creation.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] for an empty schema, invalid names or
    /// duplicate columns.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(DataError::Configuration(
                "Table schema has no columns".to_string(),
            ));
        }
        for (i, (name, _)) in self.columns.iter().enumerate() {
            if !is_valid_identifier(name) {
                return Err(DataError::Configuration(format!(
                    "Invalid column name: {name:?}"
                )));
            }
            if self.columns[..i].iter().any(|(n, _)| n == name) {
                return Err(DataError::Configuration(format!(
                    "Duplicate column name: {name}"
                )));
            }
        }
        Ok(())
    }

    /// Check that every column of `df` is declared in this schema.
    ///
    /// # Errors
    /// Returns [`DataError::Schema`] naming the first undeclared column.
    pub fn check_frame(&self, df: &DataFrame) -> Result<()> {
        for name in df.get_column_names() {
            if !self.contains(name.as_str()) {
                return Err(DataError::Schema(format!(
                    "Column {name} is not part of the table schema"
                )));
            }
        }
        Ok(())
    }

    /// Conform a wider frame to this schema.
    ///
    /// Keeps the declared columns in declaration order, casts them to their
    /// declared types, fills absent ones with nulls and drops the rest.
    ///
    /// # Errors
    /// Returns [`DataError::Schema`] if a present column cannot be cast.
    pub fn project(&self, df: &DataFrame) -> Result<DataFrame> {
        let height = df.height();
        let mut columns = Vec::with_capacity(self.columns.len());

        for (name, kind) in &self.columns {
            let column = match df.column(name) {
                Ok(existing) => existing
                    .cast(&kind.dtype())
                    .map_err(|e| DataError::Schema(format!("Cannot cast {name}: {e}")))?,
                Err(_) => Column::full_null(name.as_str().into(), height, &kind.dtype()),
            };
            columns.push(column);
        }

        DataFrame::new(columns).map_err(|e| DataError::Schema(e.to_string()))
    }
}

/// A single scalar value bound into a cache query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// SQL NULL.
    Null,
    /// Text value.
    Text(String),
    /// Floating point value.
    Real(f64),
    /// Integer value.
    Integer(i64),
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl<T: Into<Self>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
        }
    }
}
