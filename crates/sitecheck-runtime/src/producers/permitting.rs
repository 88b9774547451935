//! Permitting producer: how hard is it to get a system approved here.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use sitecheck_core::payload::parse_structured;
use sitecheck_core::payload::permitting::{form_fallback, normalize_form, permitting_payload};
use sitecheck_core::{Jurisdiction, PermitRules, ProducerKind, ProducerResult, SiteContext};

use super::{AssessmentProducer, ProducerError, SummaryRequest, Summarizer};
use crate::config::{is_json, read_file, ConfigError};

const SYSTEM_PROMPT: &str =
    "You are a solar permitting specialist. Given local permitting rules, fill out a simple permit form.";

/// Permitting rules per city.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PermitRulesTable {
    rows: Vec<PermitRules>,
}

impl PermitRulesTable {
    pub fn new(rows: Vec<PermitRules>) -> Self {
        Self { rows }
    }

    /// A small table of well-known jurisdictions.
    pub fn builtin() -> Self {
        let row = |city: &str, state: &str, building: bool, setback: f64, days: f64| PermitRules {
            jurisdiction: city.to_string(),
            state: Some(state.to_string()),
            building_permit: building,
            electrical_permit: true,
            fire_setback: setback,
            avg_review_days: days,
        };
        Self::new(vec![
            row("Austin", "TX", true, 36.0, 4.0),
            row("Phoenix", "AZ", false, 18.0, 3.0),
            row("San Jose", "CA", true, 36.0, 1.0),
        ])
    }

    /// Parse a list of rows from YAML (JSON is accepted too).
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(serde_yaml::from_str(text)?))
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read_file(path)?;
        if is_json(path) {
            Self::from_json(&text)
        } else {
            Self::from_yaml(&text)
        }
    }

    /// Rules for a jurisdiction; default rules when no row matches.
    ///
    /// Cities match case-insensitively; a row without a state matches any state.
    pub fn rules_for(&self, jurisdiction: &Jurisdiction) -> PermitRules {
        self.rows
            .iter()
            .find(|row| {
                row.jurisdiction.eq_ignore_ascii_case(jurisdiction.city.trim())
                    && row
                        .state
                        .as_deref()
                        .map_or(true, |s| s.eq_ignore_ascii_case(&jurisdiction.state))
            })
            .cloned()
            .unwrap_or_else(|| {
                tracing::debug!(jurisdiction = %jurisdiction, "No permitting rules, using defaults");
                PermitRules::default_for(&jurisdiction.city)
            })
    }
}

/// Scores permitting friendliness.
pub struct PermittingProducer {
    rules: PermitRulesTable,
    summarizer: Arc<dyn Summarizer>,
}

impl PermittingProducer {
    pub fn new(rules: PermitRulesTable, summarizer: Arc<dyn Summarizer>) -> Self {
        Self { rules, summarizer }
    }

    fn request(address: &str, rules: &PermitRules) -> SummaryRequest {
        let rules_json = serde_json::to_string_pretty(rules).unwrap_or_else(|_| json!({}).to_string());
        SummaryRequest {
            kind: ProducerKind::Permitting,
            system: SYSTEM_PROMPT.to_string(),
            user: format!(
                "Address: {address}\nRules:\n{rules_json}\n\nRespond strictly in JSON with: \
                 permit_required, fire_code_setback_inches, average_review_days, \
                 special_considerations"
            ),
        }
    }
}

#[async_trait]
impl AssessmentProducer for PermittingProducer {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Permitting
    }

    async fn produce(
        &self,
        address: &str,
        context: &SiteContext,
    ) -> Result<ProducerResult, ProducerError> {
        let rules = self.rules.rules_for(&context.jurisdiction);
        let request = Self::request(address, &rules);

        let (form, raw_text, degraded) = match self.summarizer.summarize(&request).await {
            Ok(text) => match parse_structured(&text) {
                Ok(form) => (form, None, false),
                Err(e) => {
                    tracing::warn!(kind = ?ProducerKind::Permitting, error = %e, "Unparsable permit form, using fallback");
                    (form_fallback(&rules), Some(text), true)
                }
            },
            Err(e) => {
                tracing::debug!(kind = ?ProducerKind::Permitting, error = %e, "No permit form, using fallback");
                (form_fallback(&rules), None, true)
            }
        };

        let payload = permitting_payload(address, &rules, normalize_form(form, &rules));
        Ok(if degraded {
            ProducerResult::degraded(ProducerKind::Permitting, payload, raw_text)
        } else {
            ProducerResult::ok(ProducerKind::Permitting, payload)
        })
    }
}
