//! Permitting payload: jurisdiction readiness.
//!
//! Canonical shape:
//!
//! ```json
//! {
//!   "agent": "permitting",
//!   "address": "...",
//!   "rules": { ... },
//!   "permit_form": {
//!     "permit_required": ["building", "electrical"],
//!     "fire_code_setback_inches": 18,
//!     "average_review_days": 10,
//!     "special_considerations": "...",
//!     "score": 55,
//!     "jurisdiction": "...",
//!     "friendly_notes": "..."
//!   },
//!   "friendly_notes": "..."
//! }
//! ```
//!
//! ## Score
//!
//! `100 - 2.5 * review_days - 10 * permits_required - 0.5 * max(0, setback - 20)`,
//! truncated and clamped to [0, 100].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use super::{clamp_score, number_or, set_default};

const DEFAULT_SETBACK_INCHES: f64 = 18.0;
const DEFAULT_REVIEW_DAYS: f64 = 10.0;

/// One row of a jurisdiction's permitting rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermitRules {
    /// City the rules apply to
    pub jurisdiction: String,

    /// Two-letter state code, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default = "default_true")]
    pub building_permit: bool,

    #[serde(default = "default_true")]
    pub electrical_permit: bool,

    /// Fire code setback in inches
    #[serde(default = "default_setback")]
    pub fire_setback: f64,

    /// Average plan review time in days
    #[serde(default = "default_review_days")]
    pub avg_review_days: f64,
}

fn default_true() -> bool {
    true
}

fn default_setback() -> f64 {
    DEFAULT_SETBACK_INCHES
}

fn default_review_days() -> f64 {
    DEFAULT_REVIEW_DAYS
}

impl PermitRules {
    /// Rules assumed for a city with no entry in the rules table.
    pub fn default_for(city: &str) -> Self {
        Self {
            jurisdiction: city.to_string(),
            state: None,
            building_permit: true,
            electrical_permit: true,
            fire_setback: DEFAULT_SETBACK_INCHES,
            avg_review_days: DEFAULT_REVIEW_DAYS,
        }
    }

    /// Permits these rules require.
    pub fn required_permits(&self) -> Vec<String> {
        let mut permits = Vec::new();
        if self.building_permit {
            permits.push("building".to_string());
        }
        if self.electrical_permit {
            permits.push("electrical".to_string());
        }
        permits
    }
}

/// Build the form used when summarizer output is not JSON.
pub fn form_fallback(rules: &PermitRules) -> Map<String, JsonValue> {
    let mut permits = rules.required_permits();
    if permits.is_empty() {
        permits.push("electrical".to_string());
    }

    let mut form = Map::new();
    form.insert("permit_required".to_string(), json!(permits));
    form.insert("fire_code_setback_inches".to_string(), json!(rules.fire_setback));
    form.insert("average_review_days".to_string(), json!(rules.avg_review_days));
    form.insert(
        "special_considerations".to_string(),
        json!("Fallback due to unparsable summarizer output."),
    );
    form
}

/// Normalize a permit form, compute its score, and attach jurisdiction notes.
pub fn normalize_form(mut form: Map<String, JsonValue>, rules: &PermitRules) -> Map<String, JsonValue> {
    let permits = normalize_permit_list(form.get("permit_required"));
    form.insert("permit_required".to_string(), json!(permits));
    set_default(&mut form, "fire_code_setback_inches", json!(DEFAULT_SETBACK_INCHES));
    set_default(&mut form, "average_review_days", json!(DEFAULT_REVIEW_DAYS));
    set_default(&mut form, "special_considerations", json!("None noted."));

    let score = permit_score(&form);
    form.insert("score".to_string(), json!(score));
    form.insert("jurisdiction".to_string(), json!(rules.jurisdiction));
    let notes = friendly_notes(&rules.jurisdiction, &form);
    form.insert("friendly_notes".to_string(), json!(notes));
    form
}

/// Deterministic permit friendliness score for a normalized form.
pub fn permit_score(form: &Map<String, JsonValue>) -> i64 {
    let days = number_or(form.get("average_review_days"), DEFAULT_REVIEW_DAYS);
    let setback = number_or(form.get("fire_code_setback_inches"), DEFAULT_SETBACK_INCHES);
    let required = form
        .get("permit_required")
        .and_then(JsonValue::as_array)
        .map_or(0, Vec::len);

    let score = 100.0
        - days * 2.5
        - required as f64 * 10.0
        - (setback - 20.0).max(0.0) * 0.5;
    clamp_score(score)
}

/// Assemble the canonical permitting payload.
pub fn permitting_payload(address: &str, rules: &PermitRules, form: Map<String, JsonValue>) -> JsonValue {
    let notes = form
        .get("friendly_notes")
        .cloned()
        .unwrap_or_else(|| json!(""));
    json!({
        "agent": "permitting",
        "address": address,
        "rules": rules,
        "permit_form": JsonValue::Object(form),
        "friendly_notes": notes,
    })
}

/// Coerce `permit_required` to a list of permit names.
fn normalize_permit_list(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        None | Some(JsonValue::Null) => vec!["electrical".to_string()],
        Some(JsonValue::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        Some(JsonValue::Array(items)) => items.iter().map(display_scalar).collect(),
        Some(other) => vec![display_scalar(other)],
    }
}

fn friendly_notes(jurisdiction: &str, form: &Map<String, JsonValue>) -> String {
    let permits = form
        .get("permit_required")
        .and_then(JsonValue::as_array)
        .map(|items| items.iter().map(display_scalar).collect::<Vec<_>>().join(", "))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "standard permits".to_string());
    let name = if jurisdiction.is_empty() {
        "This jurisdiction"
    } else {
        jurisdiction
    };
    let days = form
        .get("average_review_days")
        .map_or_else(|| "N/A".to_string(), display_scalar);
    let setback = form
        .get("fire_code_setback_inches")
        .map_or_else(|| "N/A".to_string(), display_scalar);

    format!(
        "{name} typically requires {permits} with an average review time of {days} days \
         and a fire code setback of {setback} inches."
    )
}

fn display_scalar(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
