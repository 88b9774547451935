//! Research producer: local policy climate from recent headlines.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use sitecheck_core::payload::parse_structured;
use sitecheck_core::payload::research::{analysis_fallback, normalize_analysis, research_payload};
use sitecheck_core::{Jurisdiction, ProducerKind, ProducerResult, SiteContext};

use super::{AssessmentProducer, ProducerError, SummaryRequest, Summarizer};
use crate::config::{read_file, ConfigError};

/// Key of the row used for jurisdictions with no entry.
pub const DEFAULT_ROW: &str = "DEFAULT";

/// `{place}` in a headline is replaced by the jurisdiction, e.g. "Austin, TX".
const PLACE: &str = "{place}";

const SYSTEM_PROMPT: &str = "You are a renewable energy policy analyst. Given recent headlines, \
determine whether the local environment is favorable for new solar projects. Consider permitting \
support, community acceptance, and environmental policies.";

/// Headlines per jurisdiction.
///
/// Loaded from a JSON object keyed by `"city, st"` (case-insensitive) with an
/// optional `"DEFAULT"` row.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlineTable {
    rows: BTreeMap<String, Vec<String>>,
    default: Vec<String>,
}

impl HeadlineTable {
    /// Table with only the built-in default row.
    pub fn builtin() -> Self {
        Self {
            rows: BTreeMap::new(),
            default: vec![
                format!("{PLACE} announces new solar incentives"),
                "No local moratoriums reported in recent months.".to_string(),
            ],
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(text)?;
        let mut table = Self::builtin();
        for (key, headlines) in raw {
            if key == DEFAULT_ROW {
                table.default = headlines;
            } else {
                table.rows.insert(key.trim().to_lowercase(), headlines);
            }
        }
        Ok(table)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&read_file(path.as_ref())?)
    }

    /// Headlines for a jurisdiction, falling back to the default row.
    pub fn headlines_for(&self, jurisdiction: &Jurisdiction) -> Vec<String> {
        let place = jurisdiction.to_string();
        self.rows
            .get(&jurisdiction.lookup_key())
            .unwrap_or(&self.default)
            .iter()
            .map(|h| h.replace(PLACE, &place))
            .collect()
    }
}

impl Default for HeadlineTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Scores the local policy climate.
pub struct ResearchProducer {
    headlines: HeadlineTable,
    summarizer: Arc<dyn Summarizer>,
}

impl ResearchProducer {
    pub fn new(headlines: HeadlineTable, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            headlines,
            summarizer,
        }
    }

    fn request(address: &str, headlines: &[String]) -> SummaryRequest {
        let listed: Vec<String> = headlines.iter().map(|h| format!("- {h}")).collect();
        SummaryRequest {
            kind: ProducerKind::Research,
            system: SYSTEM_PROMPT.to_string(),
            user: format!(
                "Address: {address}\n\nRecent Headlines:\n{}\n\n\
                 Summarize the policy and regulatory tone in 3-5 sentences, identify up to 3 \
                 risks, and assign a favorability score (0-100). Answer as JSON with keys: \
                 summary, risks, score, sentiment.",
                listed.join("\n")
            ),
        }
    }
}

#[async_trait]
impl AssessmentProducer for ResearchProducer {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Research
    }

    async fn produce(
        &self,
        address: &str,
        context: &SiteContext,
    ) -> Result<ProducerResult, ProducerError> {
        let headlines = self.headlines.headlines_for(&context.jurisdiction);
        let request = Self::request(address, &headlines);

        let result = match self.summarizer.summarize(&request).await {
            Ok(text) => match parse_structured(&text) {
                Ok(analysis) => ProducerResult::ok(
                    ProducerKind::Research,
                    research_payload(address, &headlines, normalize_analysis(analysis)),
                ),
                Err(e) => {
                    tracing::warn!(kind = ?ProducerKind::Research, error = %e, "Unparsable summary, using fallback");
                    let analysis = normalize_analysis(analysis_fallback(&text));
                    ProducerResult::degraded(
                        ProducerKind::Research,
                        research_payload(address, &headlines, analysis),
                        Some(text),
                    )
                }
            },
            Err(e) => {
                tracing::debug!(kind = ?ProducerKind::Research, error = %e, "No summary, using fallback");
                let analysis = normalize_analysis(analysis_fallback(&e.to_string()));
                ProducerResult::degraded(
                    ProducerKind::Research,
                    research_payload(address, &headlines, analysis),
                    None,
                )
            }
        };
        Ok(result)
    }
}
