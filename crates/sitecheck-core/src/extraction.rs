//! Score extraction: turns any producer result into a normalized score.
//!
//! Extraction is total. Every result shape (well-formed, partial, textual,
//! failed, empty) yields exactly one score in [0, 100]:
//!
//! 1. `Failed` results score the failure floor, whatever the payload says.
//! 2. The kind's known path (e.g. `analysis.score`) is tried, then a
//!    top-level `score`. String nodes are parsed as embedded JSON.
//! 3. Numbers are truncated toward zero and clamped.
//! 4. Anything missing or unusable scores the fallback value.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::payload::parse_structured;
use crate::types::{NormalizedScore, ProducerResult, ProducerStatus};

/// Fixed values substituted when a score cannot be read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoringPolicy {
    /// Score used when the payload carries no usable score
    #[serde(default = "default_fallback")]
    pub fallback: u8,

    /// Score forced for failed producers
    #[serde(default)]
    pub failure_floor: u8,
}

fn default_fallback() -> u8 {
    50
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            fallback: default_fallback(),
            failure_floor: 0,
        }
    }
}

/// Pulls normalized scores out of producer results.
#[derive(Debug, Clone, Default)]
pub struct ScoreExtractor {
    policy: ScoringPolicy,
}

impl ScoreExtractor {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ScoringPolicy {
        self.policy
    }

    /// Extract the normalized score for one result.
    pub fn extract(&self, result: &ProducerResult) -> NormalizedScore {
        if result.status == ProducerStatus::Failed {
            return NormalizedScore::new(result.kind, i64::from(self.policy.failure_floor));
        }

        let value = self
            .read_score(result)
            .unwrap_or_else(|| i64::from(self.policy.fallback));
        NormalizedScore::new(result.kind, value)
    }

    fn read_score(&self, result: &ProducerResult) -> Option<i64> {
        let root = match &result.payload {
            JsonValue::String(text) => embedded_json(text)?,
            JsonValue::Null => embedded_json(result.raw_text.as_deref()?)?,
            JsonValue::Object(map) if map.is_empty() => match result.raw_text.as_deref() {
                Some(text) => embedded_json(text)?,
                None => return None,
            },
            other => other.clone(),
        };

        lookup_path(&root, result.kind.score_path())
            .and_then(coerce_score)
            .or_else(|| lookup_path(&root, &["score"]).and_then(coerce_score))
    }
}

/// Follow `path` through nested objects, decoding string nodes as JSON.
fn lookup_path(root: &JsonValue, path: &[&str]) -> Option<JsonValue> {
    let mut current = root.clone();
    for key in path {
        let next = match &current {
            JsonValue::Object(map) => map.get(*key).cloned(),
            JsonValue::String(text) => embedded_json(text).and_then(|v| v.get(*key).cloned()),
            _ => None,
        };
        current = next?;
    }
    Some(current)
}

fn embedded_json(text: &str) -> Option<JsonValue> {
    parse_structured(text).ok().map(JsonValue::Object)
}

/// Coerce a JSON node to an integer score, clamped to [0, 100].
fn coerce_score(value: JsonValue) -> Option<i64> {
    let raw = match value {
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => return Some(i.clamp(0, 100)),
            None => n.as_f64()?,
        },
        JsonValue::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if !raw.is_finite() {
        return None;
    }
    // Saturating cast; the clamp below bounds the result.
    Some((raw.trunc() as i64).clamp(0, 100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProducerKind;
    use proptest::prelude::*;
    use serde_json::json;

    fn extract(kind: ProducerKind, payload: JsonValue) -> u8 {
        ScoreExtractor::default()
            .extract(&ProducerResult::ok(kind, payload))
            .value
    }

    #[test]
    fn test_reads_known_path() {
        let payload = json!({ "analysis": { "score": 82 } });
        assert_eq!(extract(ProducerKind::Research, payload), 82);
    }

    #[test]
    fn test_known_path_differs_per_kind() {
        let payload = json!({ "permit_form": { "score": 70 }, "design": { "score": 60 } });
        assert_eq!(extract(ProducerKind::Permitting, payload.clone()), 70);
        assert_eq!(extract(ProducerKind::Design, payload), 60);
    }

    #[test]
    fn test_top_level_score_used_when_path_missing() {
        assert_eq!(extract(ProducerKind::Design, json!({ "score": 33 })), 33);
    }

    #[test]
    fn test_clamps_out_of_range() {
        assert_eq!(extract(ProducerKind::Research, json!({ "analysis": { "score": 180 } })), 100);
        assert_eq!(extract(ProducerKind::Research, json!({ "analysis": { "score": -4 } })), 0);
    }

    #[test]
    fn test_float_and_string_scores_truncate() {
        assert_eq!(extract(ProducerKind::Research, json!({ "analysis": { "score": 71.9 } })), 71);
        assert_eq!(extract(ProducerKind::Research, json!({ "analysis": { "score": " 64 " } })), 64);
    }

    #[test]
    fn test_missing_score_uses_fallback() {
        assert_eq!(extract(ProducerKind::Research, json!({ "analysis": {} })), 50);
        assert_eq!(extract(ProducerKind::Design, json!({})), 50);
    }

    #[test]
    fn test_non_numeric_score_uses_fallback() {
        assert_eq!(extract(ProducerKind::Research, json!({ "analysis": { "score": "high" } })), 50);
        assert_eq!(extract(ProducerKind::Research, json!({ "analysis": { "score": true } })), 50);
        assert_eq!(extract(ProducerKind::Research, json!({ "analysis": { "score": null } })), 50);
    }

    #[test]
    fn test_embedded_json_string_is_decoded() {
        let payload = json!({ "analysis": "```json\n{\"score\": 77}\n```" });
        assert_eq!(extract(ProducerKind::Research, payload), 77);
    }

    #[test]
    fn test_textual_payload_uses_fallback() {
        let payload = json!("The outlook is broadly positive.");
        assert_eq!(extract(ProducerKind::Research, payload), 50);
    }

    #[test]
    fn test_raw_text_consulted_when_payload_empty() {
        let mut result = ProducerResult::ok(ProducerKind::Design, json!({}));
        result.raw_text = Some(r#"{"design": {"score": 88}}"#.to_string());

        assert_eq!(ScoreExtractor::default().extract(&result).value, 88);
    }

    #[test]
    fn test_failed_forces_floor_over_partial_score() {
        let mut result = ProducerResult::failed(ProducerKind::Permitting, "boom");
        result.payload["permit_form"] = json!({ "score": 95 });

        assert_eq!(ScoreExtractor::default().extract(&result).value, 0);
    }

    #[test]
    fn test_degraded_keeps_fallback_payload_score() {
        let result = ProducerResult::degraded(
            ProducerKind::Research,
            json!({ "analysis": { "score": 50 } }),
            Some("not json".to_string()),
        );
        assert_eq!(ScoreExtractor::default().extract(&result).value, 50);
    }

    #[test]
    fn test_custom_policy() {
        let extractor = ScoreExtractor::new(ScoringPolicy {
            fallback: 40,
            failure_floor: 5,
        });
        let missing = ProducerResult::ok(ProducerKind::Design, json!(null));
        let failed = ProducerResult::failed(ProducerKind::Design, "x");

        assert_eq!(extractor.extract(&missing).value, 40);
        assert_eq!(extractor.extract(&failed).value, 5);
    }

    fn arb_json() -> impl Strategy<Value = JsonValue> {
        let leaf = prop_oneof![
            Just(JsonValue::Null),
            any::<bool>().prop_map(JsonValue::Bool),
            any::<i64>().prop_map(|i| json!(i)),
            any::<f64>().prop_map(|f| json!(f)),
            ".{0,12}".prop_map(JsonValue::String),
            Just(json!("{\"score\": 12}")),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(JsonValue::Array),
                prop::collection::btree_map(
                    prop_oneof![
                        Just("score".to_string()),
                        Just("analysis".to_string()),
                        Just("permit_form".to_string()),
                        Just("design".to_string()),
                        "[a-z]{1,6}",
                    ],
                    inner,
                    0..4,
                )
                .prop_map(|m| JsonValue::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_status() -> impl Strategy<Value = ProducerStatus> {
        prop_oneof![
            Just(ProducerStatus::Ok),
            Just(ProducerStatus::Degraded),
            Just(ProducerStatus::Failed),
        ]
    }

    fn arb_kind() -> impl Strategy<Value = ProducerKind> {
        prop_oneof![
            Just(ProducerKind::Research),
            Just(ProducerKind::Permitting),
            Just(ProducerKind::Design),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Property: extraction is total and always in range.
        #[test]
        fn extraction_is_total_and_in_range(
            kind in arb_kind(),
            status in arb_status(),
            payload in arb_json(),
            raw_text in proptest::option::of(".{0,40}"),
        ) {
            let result = ProducerResult { kind, payload, raw_text, status };
            let score = ScoreExtractor::default().extract(&result);

            prop_assert_eq!(score.kind, kind);
            prop_assert!(score.value <= 100);
            if status == ProducerStatus::Failed {
                prop_assert_eq!(score.value, 0);
            }
        }
    }
}
