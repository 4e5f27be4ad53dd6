//! Deny-list scrub applied to invocation inputs before they are logged.
//!
//! Runs regardless of any upstream redaction.

use serde_json::{Map, Value};

/// Marker written in place of a scrubbed value.
pub const SCRUB_MARKER: &str = "[REDACTED]";

/// Input keys whose values are never logged. Matched case-insensitively at any depth.
pub const SENSITIVE_KEYS: &[&str] = &["password", "token", "secret", "key", "nric", "phone"];

/// Copy `input` with every sensitive key's value replaced by [`SCRUB_MARKER`].
pub fn sanitize_input(input: &Value) -> Value {
    match input {
        Value::Object(map) => Value::Object(sanitize_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_input).collect()),
        other => other.clone(),
    }
}

fn sanitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let scrubbed = if is_sensitive(key) {
                Value::String(SCRUB_MARKER.to_owned())
            } else {
                sanitize_input(value)
            };
            (key.clone(), scrubbed)
        })
        .collect()
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS
        .iter()
        .any(|sensitive| key.eq_ignore_ascii_case(sensitive))
}
