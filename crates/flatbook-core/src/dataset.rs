use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A single flattened cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Treats empty text the same as null; used for ordering-key presence checks.
    pub fn is_blank(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Int(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Single-level mapping from derived column name to value, in derivation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRow {
    entries: Vec<(String, Scalar)>,
    index: HashMap<String, usize>,
}

impl FlatRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Scalar>) {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&position) => self.entries[position].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.index.get(key).map(|&position| &self.entries[position].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for FlatRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = FlatRow::new();
        for (key, value) in iter {
            row.insert(key, value);
        }
        row
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("row {row} has {found} values but the header has {expected} columns")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("duplicate column '{0}' in header")]
    DuplicateColumn(String),
}

/// Append-only table. The header is the union of all row columns in order of first
/// appearance; rows are stored aligned to it with `Null` for missing values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Result<Self, DatasetError> {
        let mut seen = HashMap::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            if seen.insert(column.as_str(), position).is_some() {
                return Err(DatasetError::DuplicateColumn(column.clone()));
            }
        }
        for (row, values) in rows.iter().enumerate() {
            if values.len() != columns.len() {
                return Err(DatasetError::RowWidth {
                    row,
                    expected: columns.len(),
                    found: values.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Scalar>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Values of one column in row order; `None` if the column does not exist.
    pub fn column_values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Scalar>> {
        let position = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[position]))
    }

    /// Row `index` as a [`FlatRow`] covering every column, nulls included.
    pub fn row(&self, index: usize) -> Option<FlatRow> {
        let values = self.rows.get(index)?;
        Some(
            self.columns
                .iter()
                .zip(values)
                .map(|(column, value)| (column.clone(), value.clone()))
                .collect(),
        )
    }

    /// Appends `row`, adding unseen columns at the end of the header and back-filling
    /// them with `Null` in earlier rows.
    pub fn push_row(&mut self, row: &FlatRow) {
        for key in row.keys() {
            if self.column_index(key).is_none() {
                self.columns.push(key.to_string());
                for existing in &mut self.rows {
                    existing.push(Scalar::Null);
                }
            }
        }

        let values = self
            .columns
            .iter()
            .map(|column| row.get(column).cloned().unwrap_or(Scalar::Null))
            .collect();
        self.rows.push(values);
    }
}
