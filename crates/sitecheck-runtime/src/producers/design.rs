//! Design producer: expected yield and cost of a reference system.

use std::sync::Arc;

use async_trait::async_trait;

use sitecheck_core::payload::design::{design_fallback, design_payload, score_design};
use sitecheck_core::payload::parse_structured;
use sitecheck_core::{Coordinates, ProducerKind, ProducerResult, SiteContext, YieldInputs};

use super::{AssessmentProducer, ProducerError, SummaryRequest, Summarizer};
use crate::cache::FingerprintInputs;

const SYSTEM_PROMPT: &str = "You are a solar design engineer. Given production estimates for a \
reference system, summarize its performance, a bill of materials, and its cost.";

/// Source of production estimates for a location.
#[async_trait]
pub trait YieldSource: Send + Sync {
    async fn estimate(&self, coordinates: Coordinates) -> Result<YieldInputs, ProducerError>;
}

/// Fixed production estimate, independent of location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticYield(pub YieldInputs);

impl Default for StaticYield {
    fn default() -> Self {
        Self(YieldInputs {
            capacity_kw: 50.0,
            ac_annual_kwh: 75_000.0,
        })
    }
}

#[async_trait]
impl YieldSource for StaticYield {
    async fn estimate(&self, _coordinates: Coordinates) -> Result<YieldInputs, ProducerError> {
        Ok(self.0)
    }
}

/// Scores technical performance. Requires coordinates.
pub struct DesignProducer {
    yields: Arc<dyn YieldSource>,
    summarizer: Arc<dyn Summarizer>,
}

impl DesignProducer {
    pub fn new(yields: Arc<dyn YieldSource>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self { yields, summarizer }
    }

    fn request(coordinates: Coordinates, inputs: &YieldInputs) -> SummaryRequest {
        SummaryRequest {
            kind: ProducerKind::Design,
            system: SYSTEM_PROMPT.to_string(),
            user: format!(
                "Location: {:.4}, {:.4}\nCapacity: {} kWdc\nAnnual AC production: {} kWh\n\n\
                 Respond in JSON with: system_capacity_kwdc, system_capacity_kwac, \
                 annual_production_kwh, specific_yield_kwh_per_kw, estimated_cost_usd, \
                 estimated_lcoe_usd_per_kwh, bill_of_materials, design_notes",
                coordinates.lat, coordinates.lon, inputs.capacity_kw, inputs.ac_annual_kwh
            ),
        }
    }
}

#[async_trait]
impl AssessmentProducer for DesignProducer {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Design
    }

    async fn produce(
        &self,
        _address: &str,
        context: &SiteContext,
    ) -> Result<ProducerResult, ProducerError> {
        let coordinates = context
            .coordinates
            .ok_or_else(|| ProducerError::MissingCoordinates(context.jurisdiction.to_string()))?;
        let inputs = self.yields.estimate(coordinates).await?;
        let request = Self::request(coordinates, &inputs);

        let result = match self.summarizer.summarize(&request).await {
            Ok(text) => match parse_structured(&text) {
                Ok(design) => ProducerResult::ok(
                    ProducerKind::Design,
                    design_payload(coordinates, &inputs, score_design(design)),
                ),
                Err(e) => {
                    tracing::warn!(kind = ?ProducerKind::Design, error = %e, "Unparsable design, using fallback");
                    ProducerResult::degraded(
                        ProducerKind::Design,
                        design_payload(coordinates, &inputs, score_design(design_fallback(&inputs))),
                        Some(text),
                    )
                }
            },
            Err(e) => {
                tracing::debug!(kind = ?ProducerKind::Design, error = %e, "No design summary, using fallback");
                ProducerResult::degraded(
                    ProducerKind::Design,
                    design_payload(coordinates, &inputs, score_design(design_fallback(&inputs))),
                    None,
                )
            }
        };
        Ok(result)
    }

    /// Designs depend only on location, so nearby addresses share entries.
    fn cache_inputs(&self, _address: &str, context: &SiteContext) -> Option<FingerprintInputs> {
        context.coordinates.map(FingerprintInputs::coordinates)
    }
}
