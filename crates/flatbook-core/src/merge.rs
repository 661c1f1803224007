use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::dataset::{Dataset, FlatRow, Scalar};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("payload is missing ordering key '{key}'")]
    MissingOrderKey { key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub dataset: Dataset,
    pub appended: bool,
}

/// Decides whether `incoming` is newer than everything already stored and appends it if so.
///
/// The comparison is against the maximum stored value of `order_key`, not the last row, so
/// an out-of-order delivery can never pull the watermark backwards. A present dataset with
/// no usable key values behaves like an empty one.
pub fn merge(
    existing: Option<Dataset>,
    incoming: &FlatRow,
    order_key: &str,
) -> Result<MergeOutcome, MergeError> {
    let incoming_key = order_value(incoming, order_key)?;

    let mut dataset = existing.unwrap_or_default();

    if let Some(latest) = latest_order_value(&dataset, order_key) {
        if compare_order_values(incoming_key, latest) != Ordering::Greater {
            return Ok(MergeOutcome {
                dataset,
                appended: false,
            });
        }
    }

    dataset.push_row(incoming);
    Ok(MergeOutcome {
        dataset,
        appended: true,
    })
}

/// The row's ordering value; absent, null, and empty text all count as missing.
pub fn order_value<'a>(row: &'a FlatRow, order_key: &str) -> Result<&'a Scalar, MergeError> {
    row.get(order_key)
        .filter(|value| !value.is_blank())
        .ok_or_else(|| MergeError::MissingOrderKey {
            key: order_key.to_string(),
        })
}

/// Greatest non-blank value of `order_key` across the dataset.
pub fn latest_order_value<'a>(dataset: &'a Dataset, order_key: &str) -> Option<&'a Scalar> {
    dataset
        .column_values(order_key)?
        .filter(|value| !value.is_blank())
        .max_by(|left, right| compare_order_values(left, right))
}

/// Numbers (including numeric text) compare numerically, RFC 3339 timestamps compare as
/// instants, anything else compares by its text rendering.
pub fn compare_order_values(left: &Scalar, right: &Scalar) -> Ordering {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return match (a, b) {
            (Numeric::Int(a), Numeric::Int(b)) => a.cmp(&b),
            (Numeric::Int(a), Numeric::Float(b)) => compare_int_float(a, b),
            (Numeric::Float(a), Numeric::Int(b)) => compare_int_float(b, a).reverse(),
            (Numeric::Float(a), Numeric::Float(b)) => a.total_cmp(&b),
        };
    }

    if let (Some(a), Some(b)) = (as_timestamp(left), as_timestamp(right)) {
        return a.cmp(&b);
    }

    left.to_string().cmp(&right.to_string())
}

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i64),
    Float(f64),
}

/// 2^63, the first float past `i64::MAX`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison without widening the integer to `f64`, which loses precision past 2^53.
fn compare_int_float(int: i64, float: f64) -> Ordering {
    if float.is_nan() || float >= I64_BOUND {
        return Ordering::Less;
    }
    if float < -I64_BOUND {
        return Ordering::Greater;
    }
    let floor = float.floor();
    match int.cmp(&(floor as i64)) {
        Ordering::Equal if float > floor => Ordering::Less,
        other => other,
    }
}

fn as_number(value: &Scalar) -> Option<Numeric> {
    match value {
        Scalar::Int(value) => Some(Numeric::Int(*value)),
        Scalar::Float(value) => Some(Numeric::Float(*value)),
        Scalar::Text(text) => {
            let trimmed = text.trim();
            if let Ok(parsed) = trimmed.parse::<i64>() {
                Some(Numeric::Int(parsed))
            } else {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|parsed| parsed.is_finite())
                    .map(Numeric::Float)
            }
        }
        Scalar::Null | Scalar::Bool(_) => None,
    }
}

fn as_timestamp(value: &Scalar) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.as_text()?.trim()).ok()
}
