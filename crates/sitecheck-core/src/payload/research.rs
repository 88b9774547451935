//! Research payload: policy and regulatory favorability.
//!
//! Canonical shape:
//!
//! ```json
//! {
//!   "agent": "research",
//!   "address": "...",
//!   "news_headlines": ["..."],
//!   "analysis": { "summary": "...", "risks": [], "score": 0, "sentiment": "..." }
//! }
//! ```

use serde_json::{json, Map, Value as JsonValue};

use super::set_default;

/// Score assumed when the analysis does not carry one.
pub const DEFAULT_SCORE: i64 = 50;

/// Characters of raw text kept in a fallback summary.
const SUMMARY_PREVIEW_CHARS: usize = 300;

/// Build the fallback analysis used when summarizer output is not JSON.
pub fn analysis_fallback(raw_text: &str) -> Map<String, JsonValue> {
    let preview: String = raw_text.chars().take(SUMMARY_PREVIEW_CHARS).collect();
    let mut analysis = Map::new();
    analysis.insert("summary".to_string(), json!(format!("{preview}...")));
    analysis.insert("risks".to_string(), json!(["Malformed summarizer output"]));
    analysis.insert("score".to_string(), json!(DEFAULT_SCORE));
    analysis.insert("sentiment".to_string(), json!("unknown"));
    analysis
}

/// Fill in any analysis fields the summarizer left out.
pub fn normalize_analysis(mut analysis: Map<String, JsonValue>) -> Map<String, JsonValue> {
    set_default(&mut analysis, "summary", json!("No summary provided."));
    set_default(&mut analysis, "risks", json!([]));
    set_default(&mut analysis, "score", json!(DEFAULT_SCORE));
    set_default(&mut analysis, "sentiment", json!("neutral"));
    analysis
}

/// Assemble the canonical research payload.
pub fn research_payload(
    address: &str,
    headlines: &[String],
    analysis: Map<String, JsonValue>,
) -> JsonValue {
    json!({
        "agent": "research",
        "address": address,
        "news_headlines": headlines,
        "analysis": JsonValue::Object(analysis),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_truncates_summary() {
        let raw = "x".repeat(500);
        let analysis = analysis_fallback(&raw);
        let summary = analysis["summary"].as_str().unwrap();

        assert_eq!(summary.len(), SUMMARY_PREVIEW_CHARS + 3);
        assert!(summary.ends_with("..."));
        assert_eq!(analysis["score"], json!(50));
        assert_eq!(analysis["sentiment"], json!("unknown"));
    }

    #[test]
    fn test_normalize_keeps_existing_fields() {
        let mut analysis = Map::new();
        analysis.insert("score".to_string(), json!(82));

        let normalized = normalize_analysis(analysis);

        assert_eq!(normalized["score"], json!(82));
        assert_eq!(normalized["sentiment"], json!("neutral"));
        assert_eq!(normalized["risks"], json!([]));
    }

    #[test]
    fn test_payload_places_score_under_analysis() {
        let payload = research_payload(
            "1 Sun St, Austin, TX",
            &["Austin expands solar rebates".to_string()],
            normalize_analysis(Map::new()),
        );

        assert_eq!(payload["analysis"]["score"], json!(50));
        assert_eq!(payload["news_headlines"][0], json!("Austin expands solar rebates"));
    }
}
