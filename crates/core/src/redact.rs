// Masking of secret-looking fields in tool results

use serde_json::{Map, Value};

/// Replacement for redacted values
pub const MASK: &str = "***";

/// Key fragments that mark a field as secret
pub const SECRET_MARKERS: &[&str] = &["password", "token", "key", "secret"];

/// Nesting depth past which values are masked wholesale
pub const MAX_DEPTH: usize = 64;

pub fn is_secret_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SECRET_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Return a copy of `value` with secret fields masked
pub fn redact(value: &Value) -> Value {
    redact_at(value, 0)
}

fn redact_at(value: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH && (value.is_object() || value.is_array()) {
        return Value::String(MASK.to_string());
    }

    match value {
        Value::Object(map) => {
            let redacted: Map<String, Value> = map
                .iter()
                .map(|(key, value)| {
                    let value = if is_secret_key(key) {
                        Value::String(MASK.to_string())
                    } else {
                        redact_at(value, depth + 1)
                    };
                    (key.clone(), value)
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| redact_at(item, depth + 1)).collect())
        }
        scalar => scalar.clone(),
    }
}
