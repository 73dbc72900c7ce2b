//! Loose accessors for CLI JSON
//!
//! `bq --format=json` renders every scalar as a string, and `gcloud` output
//! omits whole subtrees when they are unset. These helpers read a field as the
//! wanted type whether it arrives as a number or a numeric string, and treat
//! `null` the same as missing.

use serde_json::Value;

use crate::Row;

/// Follow a path of object keys
#[must_use]
pub fn pointer<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Scalar rendered as text; `null`, arrays and objects yield `None`
#[must_use]
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[must_use]
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-negative integer; fractional strings such as `"12.0"` are accepted
#[must_use]
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(float_to_u64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_u64))
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn float_to_u64(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0).then(|| f as u64)
}

/// Signed integer; fractional values are truncated toward zero
#[must_use]
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_to_i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_i64))
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_i64(f: f64) -> Option<i64> {
    f.is_finite().then(|| f as i64)
}

#[must_use]
pub fn str_field(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(as_text)
}

#[must_use]
pub fn str_or(row: &Row, key: &str, default: &str) -> String {
    str_field(row, key).unwrap_or_else(|| default.to_string())
}

#[must_use]
pub fn u64_field(row: &Row, key: &str) -> Option<u64> {
    row.get(key).and_then(as_u64)
}

#[must_use]
pub fn i64_field(row: &Row, key: &str) -> Option<i64> {
    row.get(key).and_then(as_i64)
}

#[must_use]
pub fn u64_or_zero(row: &Row, key: &str) -> u64 {
    u64_field(row, key).unwrap_or(0)
}

#[must_use]
pub fn f64_or_zero(row: &Row, key: &str) -> f64 {
    row.get(key).and_then(as_f64).unwrap_or(0.0)
}

/// Truncate to at most `max` characters without splitting a code point
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
