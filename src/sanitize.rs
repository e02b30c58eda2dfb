//! Field sanitization for upstream JSON values.
//!
//! The upstream API is loose about types: the same field may arrive as a JSON
//! string, a JSON number, `null`, or not at all, and measurements use `"-"`
//! for "no data". Every function here maps absent/null (and, for
//! measurements, the sentinel) to a typed default. A value that is present
//! but cannot be parsed is reported as a [`SanitizationError`] instead of
//! being defaulted.

use std::borrow::Cow;
use std::str::FromStr;

use serde_json::Value;

use crate::error::SanitizationError;

/// Placeholder the upstream source uses for "no measurement available".
pub const NO_DATA: &str = "-";

/// Default for textual fields that are missing.
pub const UNKNOWN: &str = "Unknown";

// ---

/// Numeric column types a JSON value can be coerced into.
pub trait Numeric: FromStr + Default + Copy {
    // ---
    /// Name used in error messages.
    const TYPE_NAME: &'static str;

    /// Convert a JSON number, if it fits this type exactly enough.
    fn from_number(n: &serde_json::Number) -> Option<Self>;
}

impl Numeric for i32 {
    const TYPE_NAME: &'static str = "integer";

    fn from_number(n: &serde_json::Number) -> Option<Self> {
        n.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl Numeric for f64 {
    const TYPE_NAME: &'static str = "float";

    fn from_number(n: &serde_json::Number) -> Option<Self> {
        n.as_f64()
    }
}

/// `value` as text if present and non-null, else `"Unknown"`.
pub fn sanitize_string(value: Option<&Value>) -> String {
    // ---
    match value {
        None | Some(Value::Null) => UNKNOWN.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Parsed integer if present and non-null, else `0`.
pub fn sanitize_int(field: &'static str, value: Option<&Value>) -> Result<i32, SanitizationError> {
    parse_present(field, value)
}

/// Parsed float if present and non-null, else `0.0`.
pub fn sanitize_float(field: &'static str, value: Option<&Value>) -> Result<f64, SanitizationError> {
    parse_present(field, value)
}

/// Measurement value: `0` for absent, null, or the `"-"` sentinel.
///
/// The destination column decides whether the value is parsed as a float or
/// an integer.
pub fn sanitize_measurement<T: Numeric>(
    field: &'static str,
    value: Option<&Value>,
) -> Result<T, SanitizationError> {
    // ---
    match value {
        Some(Value::String(s)) if s.trim() == NO_DATA => Ok(T::default()),
        _ => parse_present(field, value),
    }
}

/// Grade/category: `0` if absent or null, else the parsed integer.
pub fn sanitize_grade(field: &'static str, value: Option<&Value>) -> Result<i32, SanitizationError> {
    parse_present(field, value)
}

/// Observation timestamp as a sort key; missing sorts lowest.
///
/// A non-string value is keyed by its JSON text, which is also what gets
/// stored for it.
pub fn timestamp_key(value: Option<&Value>) -> Cow<'_, str> {
    // ---
    match value {
        None | Some(Value::Null) => Cow::Borrowed(""),
        Some(Value::String(s)) => Cow::Borrowed(s.as_str()),
        Some(other) => Cow::Owned(other.to_string()),
    }
}

fn parse_present<T: Numeric>(
    field: &'static str,
    value: Option<&Value>,
) -> Result<T, SanitizationError> {
    // ---
    let invalid = |raw: &Value| SanitizationError {
        field,
        value: raw.to_string(),
        expected: T::TYPE_NAME,
    };

    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(raw @ Value::Number(n)) => T::from_number(n).ok_or_else(|| invalid(raw)),
        Some(raw @ Value::String(s)) => s.trim().parse::<T>().map_err(|_| invalid(raw)),
        Some(raw) => Err(invalid(raw)),
    }
}
