//! Nested JSON payload → single-level row.
//!
//! Keys are joined with [`SEPARATOR`] depth-first in declared order. Lists of scalars
//! collapse into one delimited text cell; lists holding any object or list are expanded
//! element by element under an index suffix (`items_0_id`, `items_1_id`, ...).

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::dataset::{FlatRow, Scalar};

pub const SEPARATOR: &str = "_";
pub const LIST_DELIMITER: &str = ", ";

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

/// Decodes a request body and flattens it.
pub fn flatten_payload(body: &[u8]) -> Result<FlatRow, FlattenError> {
    let value: Value = serde_json::from_slice(body)?;
    flatten(&value)
}

pub fn flatten(value: &Value) -> Result<FlatRow, FlattenError> {
    match value {
        Value::Object(object) => Ok(flatten_with_prefix(object, "")),
        other => Err(FlattenError::NotAnObject {
            found: kind_name(other),
        }),
    }
}

/// Flattens `object` with every derived key prefixed by `prefix` (no prefix when empty).
pub fn flatten_with_prefix(object: &Map<String, Value>, prefix: &str) -> FlatRow {
    let mut row = FlatRow::new();
    walk_object(object, prefix, &mut row);
    row
}

fn walk_object(object: &Map<String, Value>, prefix: &str, row: &mut FlatRow) {
    for (key, value) in object {
        walk_value(value, join_key(prefix, key), row);
    }
}

fn walk_value(value: &Value, path: String, row: &mut FlatRow) {
    match value {
        Value::Object(object) => walk_object(object, &path, row),
        Value::Array(items) => walk_list(items, path, row),
        Value::Null => row.insert(path, Scalar::Null),
        Value::Bool(flag) => row.insert(path, Scalar::Bool(*flag)),
        Value::Number(number) => row.insert(path, number_scalar(number)),
        Value::String(text) => row.insert(path, Scalar::Text(text.clone())),
    }
}

fn walk_list(items: &[Value], path: String, row: &mut FlatRow) {
    let nested = items
        .iter()
        .any(|item| matches!(item, Value::Object(_) | Value::Array(_)));

    if !nested {
        let joined = items
            .iter()
            .map(render_list_item)
            .collect::<Vec<_>>()
            .join(LIST_DELIMITER);
        row.insert(path, Scalar::Text(joined));
        return;
    }

    for (index, item) in items.iter().enumerate() {
        walk_value(item, join_key(&path, &index.to_string()), row);
    }
}

fn render_list_item(item: &Value) -> String {
    match item {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{key}")
    }
}

fn number_scalar(number: &Number) -> Scalar {
    if let Some(value) = number.as_i64() {
        Scalar::Int(value)
    } else if number.is_u64() {
        // Beyond i64: keep the exact digits rather than rounding through f64.
        Scalar::Text(number.to_string())
    } else {
        number
            .as_f64()
            .map(Scalar::Float)
            .unwrap_or_else(|| Scalar::Text(number.to_string()))
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
