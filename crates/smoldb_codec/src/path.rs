//! Dotted-path lookup into JSON documents.

use serde_json::Value;

/// Walks `path` (dotted notation, e.g. `profile.country`) through `value`.
///
/// Returns `None` if any intermediate step is missing or is not an object
/// (including null). An absent value is distinct from JSON null: a field
/// explicitly set to null resolves to `Some(&Value::Null)`.
#[must_use]
pub fn get_nested<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
