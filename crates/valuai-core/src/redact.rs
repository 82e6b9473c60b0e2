//! Credential scrubbing for audit payloads.
//!
//! Keys are compared after lower-casing and dropping `-`/`_`, so `apiKey`,
//! `api_key`, `API-KEY` and `Authorization` all match. Only the top level
//! and one level of nesting are scanned; anything deeper is written as-is.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Replacement written in place of a credential.
pub const REDACTED: &str = "[REDACTED]";

/// Normalised key names that always carry a secret.
const SENSITIVE_KEYS: &[&str] = &[
    "apikey",
    "authorization",
    "proxyauthorization",
    "xapikey",
    "token",
    "accesstoken",
    "refreshtoken",
    "bearertoken",
    "secret",
    "clientsecret",
    "password",
];

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether a field name denotes a credential.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = normalize_key(key);
    SENSITIVE_KEYS.contains(&normalized.as_str())
}

fn inline_secret_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+|\b(?:sk|xai)-[A-Za-z0-9_-]{8,}")
            .expect("static redaction pattern is valid")
    })
}

/// Mask bearer tokens and vendor-style keys embedded in free text.
pub fn redact_str(text: &str) -> String {
    inline_secret_pattern().replace_all(text, REDACTED).into_owned()
}

/// Return a copy of `value` with credentials replaced by [`REDACTED`].
pub fn redact(value: &Value) -> Value {
    scan(value, 0)
}

/// Depth 0 is the payload itself; depth 1 is one level in. Values below
/// that are copied verbatim. Array elements sit at their array's depth.
const MAX_SCAN_DEPTH: usize = 1;

fn scan(value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(map) => Value::Object(scan_object(map, depth)),
        Value::Array(items) => Value::Array(items.iter().map(|item| scan(item, depth)).collect()),
        Value::String(text) => Value::String(redact_str(text)),
        other => other.clone(),
    }
}

fn scan_object(map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let cleaned = if is_sensitive_key(key) {
                Value::String(REDACTED.into())
            } else if depth < MAX_SCAN_DEPTH {
                scan(value, depth + 1)
            } else if let Value::String(text) = value {
                Value::String(redact_str(text))
            } else {
                value.clone()
            };
            (key.clone(), cleaned)
        })
        .collect()
}
