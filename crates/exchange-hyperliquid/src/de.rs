//! Deserialization helpers for the venue's mixed numeric encodings.
//!
//! The info endpoint serializes most numbers as JSON strings, some as
//! native numbers, and `liquidationPx` as a string, the literal `"null"`,
//! JSON null, or an absent key. Parsing happens here, at decode time, so
//! malformed rows fail typed decoding instead of turning into zeros.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Strict string-or-number field. Errors on anything else.
pub fn f64_from_string_or_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_f64(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected numeric value, got {value}")))
}

/// Lenient optional field: absent, null, or malformed all decode to None.
pub fn opt_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64))
}

/// The three observed "no liquidation price" encodings (absent key, JSON
/// null, the string `"null"`) all decode to None. A price is never
/// synthesized for an unparseable value.
pub fn liquidation_px<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s == "null" || s.is_empty() => None,
        Some(v) => value_to_f64(&v),
    })
}
