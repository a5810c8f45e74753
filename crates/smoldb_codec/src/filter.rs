//! Structural equality and filter matching over JSON documents.

use crate::path::get_nested;
use serde_json::{Map, Value};

/// Structural deep equality.
///
/// Arrays are order-sensitive, objects are order-insensitive over their key
/// sets, and numbers compare by numeric value (`42` equals `42.0`). Values
/// of different JSON types are never equal.
#[must_use]
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| deep_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, va)| y.get(k).is_some_and(|vb| deep_equal(va, vb)))
        }
        _ => false,
    }
}

/// Returns whether `doc` satisfies every entry of `filter`.
///
/// Each filter key is a dotted path; the document matches when the value at
/// that path deep-equals the filter value. A path that resolves to nothing
/// never matches — not even against an explicit null in the filter.
#[must_use]
pub fn matches(doc: &Value, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(path, expected)| {
        get_nested(doc, path).is_some_and(|actual| deep_equal(actual, expected))
    })
}
