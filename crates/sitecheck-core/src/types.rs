//! Core types for site feasibility evaluation.
//!
//! These types are the data structures shared by the core and the runtime:
//! producer results, normalized scores, the resolved site context, and the
//! final evaluation bundle handed to callers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

/// The kinds of assessment producers.
///
/// Ordered for deterministic iteration in BTreeMap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ProducerKind {
    /// Policy and regulatory favorability
    Research,
    /// Permitting readiness of the jurisdiction
    Permitting,
    /// Technical design yield and cost
    Design,
}

impl ProducerKind {
    /// Every known kind, in default invocation order.
    pub const ALL: [ProducerKind; 3] = [
        ProducerKind::Research,
        ProducerKind::Permitting,
        ProducerKind::Design,
    ];

    /// Path to the confidence score inside this kind's canonical payload.
    pub fn score_path(&self) -> &'static [&'static str] {
        match self {
            ProducerKind::Research => &["analysis", "score"],
            ProducerKind::Permitting => &["permit_form", "score"],
            ProducerKind::Design => &["design", "score"],
        }
    }

    /// Human-readable name used in justification text.
    pub fn label(&self) -> &'static str {
        match self {
            ProducerKind::Research => "Research",
            ProducerKind::Permitting => "Permitting",
            ProducerKind::Design => "Design",
        }
    }

    /// What a score of this kind measures.
    pub fn descriptor(&self) -> &'static str {
        match self {
            ProducerKind::Research => "local policy sentiment and renewable support",
            ProducerKind::Permitting => "jurisdiction requirements and review timelines",
            ProducerKind::Design => "technical yield, cost efficiency, and system robustness",
        }
    }
}

impl fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome status of a single producer run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProducerStatus {
    /// Structured output was produced and parsed
    Ok,

    /// The producer ran but a fallback payload was substituted
    Degraded,

    /// The producer hit an unrecoverable error
    Failed,
}

/// Output of one assessment producer.
///
/// Results are immutable once returned. A `Failed` result always carries a
/// mapping payload with `score = 0` and an `error` description; use
/// [`ProducerResult::failed`] to build one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProducerResult {
    /// Which producer produced this result
    pub kind: ProducerKind,

    /// Domain-specific findings (normally a JSON object)
    pub payload: JsonValue,

    /// Original unparsed text, kept when structured parsing failed upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,

    /// Outcome status
    pub status: ProducerStatus,
}

impl ProducerResult {
    /// A successful result with a structured payload.
    pub fn ok(kind: ProducerKind, payload: JsonValue) -> Self {
        Self {
            kind,
            payload,
            raw_text: None,
            status: ProducerStatus::Ok,
        }
    }

    /// A result built from a fallback payload after the producer's output
    /// could not be parsed.
    pub fn degraded(kind: ProducerKind, payload: JsonValue, raw_text: Option<String>) -> Self {
        Self {
            kind,
            payload,
            raw_text,
            status: ProducerStatus::Degraded,
        }
    }

    /// A failed result carrying `score = 0` and the error description.
    pub fn failed(kind: ProducerKind, error: impl Into<String>) -> Self {
        Self::failed_with(kind, error, Map::new())
    }

    /// A failed result with extra diagnostic fields merged into the payload.
    ///
    /// `score` and `error` always win over same-named extra fields.
    pub fn failed_with(
        kind: ProducerKind,
        error: impl Into<String>,
        extra: Map<String, JsonValue>,
    ) -> Self {
        let mut payload = extra;
        payload.insert("score".to_string(), json!(0));
        payload.insert("error".to_string(), JsonValue::String(error.into()));
        Self {
            kind,
            payload: JsonValue::Object(payload),
            raw_text: None,
            status: ProducerStatus::Failed,
        }
    }

    /// Check if this result failed.
    pub fn is_failed(&self) -> bool {
        self.status == ProducerStatus::Failed
    }

    /// Check if this result used a fallback payload.
    pub fn is_degraded(&self) -> bool {
        self.status == ProducerStatus::Degraded
    }

    /// The recorded error description, if any.
    pub fn error(&self) -> Option<&str> {
        self.payload.get("error").and_then(JsonValue::as_str)
    }
}

/// A producer's confidence coerced into a canonical 0–100 integer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedScore {
    pub kind: ProducerKind,
    pub value: u8,
}

impl NormalizedScore {
    /// Create a score, clamping the value into [0, 100].
    pub fn new(kind: ProducerKind, value: i64) -> Self {
        let clamped = value.clamp(0, 100);
        Self {
            kind,
            value: u8::try_from(clamped).unwrap_or(0),
        }
    }
}

/// The final verdict of an evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Decision {
    /// Site is feasible
    #[serde(rename = "GO")]
    Go,

    /// Site is not feasible under the fusion policy
    #[serde(rename = "NO_GO")]
    NoGo,

    /// The address could not be resolved; no producers ran
    #[serde(rename = "INVALID")]
    Invalid,
}

impl Decision {
    /// Wire name of the decision.
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Go => "GO",
            Decision::NoGo => "NO_GO",
            Decision::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// City and state a site belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Jurisdiction {
    pub city: String,
    pub state: String,
}

impl Jurisdiction {
    pub fn new(city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            state: state.into(),
        }
    }

    /// Lower-cased `"city, st"` key used for table lookups.
    pub fn lookup_key(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.city, self.state)
    }
}

/// Geographic coordinates in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Shared inputs resolved once per evaluation and handed to every producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteContext {
    pub jurisdiction: Jurisdiction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

impl SiteContext {
    pub fn new(jurisdiction: Jurisdiction) -> Self {
        Self {
            jurisdiction,
            coordinates: None,
        }
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }
}

/// The complete result of evaluating one address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationBundle {
    /// The address as supplied by the caller
    pub address: String,

    /// Context shared with producers (absent when resolution failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<SiteContext>,

    /// Producer results in configured invocation order
    pub producer_results: Vec<ProducerResult>,

    /// One normalized score per attempted producer kind
    pub normalized_scores: BTreeMap<ProducerKind, NormalizedScore>,

    /// Weighted total in [0, 100]
    pub final_score: u8,

    /// The verdict
    pub decision: Decision,

    /// One line per producer plus a closing line
    pub justification: Vec<String>,

    /// When the evaluation occurred
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationBundle {
    /// Score for one kind, if that kind was attempted.
    pub fn score(&self, kind: ProducerKind) -> Option<u8> {
        self.normalized_scores.get(&kind).map(|s| s.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_carries_score_and_error() {
        let result = ProducerResult::failed(ProducerKind::Design, "Could not geocode address.");

        assert!(result.is_failed());
        assert_eq!(result.payload["score"], json!(0));
        assert_eq!(result.error(), Some("Could not geocode address."));
    }

    #[test]
    fn test_failed_with_cannot_override_score() {
        let mut extra = Map::new();
        extra.insert("score".to_string(), json!(99));
        extra.insert("timeout".to_string(), json!(true));

        let result = ProducerResult::failed_with(ProducerKind::Research, "timeout", extra);

        assert_eq!(result.payload["score"], json!(0));
        assert_eq!(result.payload["timeout"], json!(true));
    }

    #[test]
    fn test_normalized_score_clamps() {
        assert_eq!(NormalizedScore::new(ProducerKind::Research, 140).value, 100);
        assert_eq!(NormalizedScore::new(ProducerKind::Research, -3).value, 0);
        assert_eq!(NormalizedScore::new(ProducerKind::Research, 64).value, 64);
    }

    #[test]
    fn test_decision_wire_names() {
        assert_eq!(serde_json::to_string(&Decision::NoGo).unwrap(), "\"NO_GO\"");
        assert_eq!(serde_json::to_string(&Decision::Invalid).unwrap(), "\"INVALID\"");
        let parsed: Decision = serde_json::from_str("\"GO\"").unwrap();
        assert_eq!(parsed, Decision::Go);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ProducerKind::Permitting).unwrap(),
            "\"permitting\""
        );
    }

    #[test]
    fn test_jurisdiction_lookup_key() {
        let j = Jurisdiction::new("Austin", "TX");
        assert_eq!(j.to_string(), "Austin, TX");
        assert_eq!(j.lookup_key(), "austin, tx");
    }
}
