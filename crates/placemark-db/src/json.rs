//! Small helpers for reading loosely-typed documents.

use std::cmp::Ordering;

use serde_json::{Map, Value as JsonValue};

pub(crate) fn str_field<'a>(raw: &'a Map<String, JsonValue>, field: &str) -> Option<&'a str> {
    raw.get(field).and_then(JsonValue::as_str)
}

pub(crate) fn owned_str(raw: &Map<String, JsonValue>, field: &str) -> Option<String> {
    str_field(raw, field).map(str::to_string)
}

/// Non-empty string or `None`.
pub(crate) fn nullable_str(raw: &Map<String, JsonValue>, field: &str) -> Option<String> {
    str_field(raw, field)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Order two JSON scalars: strings lexicographically, numbers numerically,
/// missing/null values last.
pub(crate) fn compare_values(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::String(a)), Some(JsonValue::String(b))) => a.cmp(b),
        (Some(JsonValue::Number(a)), Some(JsonValue::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(JsonValue::Null) | None, Some(JsonValue::Null) | None) => Ordering::Equal,
        (Some(JsonValue::Null) | None, _) => Ordering::Less,
        (_, Some(JsonValue::Null) | None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
