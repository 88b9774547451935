//! Canonical producer payloads.
//!
//! Producers frequently receive free text where structured JSON was asked
//! for. Their output is handled in two stages, both pure and total:
//!
//! 1. [`parse_structured`] attempts to recover a JSON object from the text.
//! 2. A per-kind fallback constructor builds a canonical payload when the
//!    first stage fails.
//!
//! Each submodule owns one kind's canonical schema, its fallback, and the
//! deterministic score it derives.

pub mod design;
pub mod permitting;
pub mod research;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

pub use design::YieldInputs;
pub use permitting::PermitRules;

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?i)```(?:json)?").expect("fence pattern is valid");
}

/// Errors from structured-output parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Output was empty")]
    Empty,

    #[error("Output is not valid JSON: {0}")]
    Malformed(String),

    #[error("Output is JSON but not an object")]
    NotAnObject,
}

/// Remove markdown code fences and surrounding backticks/whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    let without_fences = CODE_FENCE.replace_all(raw, "");
    without_fences
        .trim_matches(|c: char| c == '`' || c.is_whitespace())
        .to_string()
}

/// Parse producer text into a JSON object.
pub fn parse_structured(raw: &str) -> Result<Map<String, JsonValue>, PayloadError> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(PayloadError::Empty);
    }

    match serde_json::from_str::<JsonValue>(&cleaned) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err(PayloadError::NotAnObject),
        Err(e) => Err(PayloadError::Malformed(e.to_string())),
    }
}

/// Insert `value` under `key` only when the key is absent.
pub(crate) fn set_default(map: &mut Map<String, JsonValue>, key: &str, value: JsonValue) {
    map.entry(key.to_string()).or_insert(value);
}

/// Read a finite number, accepting numeric strings; otherwise `default`.
pub(crate) fn number_or(value: Option<&JsonValue>, default: f64) -> f64 {
    let parsed = match value {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(default)
}

/// Clamp a raw score into [0, 100], truncating toward zero.
pub(crate) fn clamp_score(score: f64) -> i64 {
    if !score.is_finite() {
        return 0;
    }
    // Truncation is intended: scores are whole points.
    (score.trunc() as i64).clamp(0, 100)
}
