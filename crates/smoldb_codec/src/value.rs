//! Canonical serialization of JSON values for secondary-index keys.
//!
//! Two values land in the same posting list iff their serializations are
//! byte-identical, so every branch here must be deterministic:
//!
//! - numbers are canonicalized through `f64` into an explicit-sign
//!   scientific form with 15 fractional digits (`42` and `42.0` collapse to
//!   the same key)
//! - objects are encoded through [`serde_json`]'s default map, whose keys
//!   are sorted, giving a stable traversal order regardless of insertion
//!   order

use serde_json::Value;

/// Type tag: null.
const TAG_NULL: u8 = 0x00;
/// Type tag: boolean.
const TAG_BOOL: u8 = 0x01;
/// Type tag: number.
const TAG_NUMBER: u8 = 0x02;
/// Type tag: string.
const TAG_STRING: u8 = 0x03;
/// Type tag: array or object (JSON-encoded).
const TAG_COMPOSITE: u8 = 0x04;

/// Serializes a JSON value into its canonical index-key byte string.
///
/// The result is a 1-byte type tag followed by type-specific bytes. Values
/// of different JSON types can never collide because their tags differ.
#[must_use]
pub fn serialize_index_key(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    match value {
        Value::Null => {
            buf.push(TAG_NULL);
            buf.extend_from_slice(b"null");
        }
        Value::Bool(b) => {
            buf.push(TAG_BOOL);
            buf.push(if *b { b'1' } else { b'0' });
        }
        Value::Number(n) => {
            buf.push(TAG_NUMBER);
            let x = n.as_f64().unwrap_or(f64::NAN);
            buf.extend_from_slice(canonical_number(x).as_bytes());
        }
        Value::String(s) => {
            buf.push(TAG_STRING);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(_) | Value::Object(_) => {
            buf.push(TAG_COMPOSITE);
            // serde_json's Map keeps keys sorted, so this encoding is
            // stable across insertion orders.
            buf.extend_from_slice(value.to_string().as_bytes());
        }
    }
    buf
}

/// Formats a number as `±d.ddddddddddddddde±X`.
///
/// Non-finite values map to the sentinels `NaN`, `Infinity`, and
/// `-Infinity`; negative zero collapses to positive zero.
fn canonical_number(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        let sentinel = if x > 0.0 { "Infinity" } else { "-Infinity" };
        return sentinel.to_string();
    }
    let x = if x == 0.0 { 0.0 } else { x };
    let mut s = format!("{x:+.15e}");
    // Rust omits the '+' on non-negative exponents.
    if let Some(e_pos) = s.find('e') {
        if s.as_bytes().get(e_pos + 1) != Some(&b'-') {
            s.insert(e_pos + 1, '+');
        }
    }
    s
}
