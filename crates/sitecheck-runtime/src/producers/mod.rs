//! Assessment producers.
//!
//! A producer investigates one facet of a site (policy climate, permitting
//! burden, technical yield) and returns a [`ProducerResult`]. Producers never
//! resolve addresses themselves; they receive the shared [`SiteContext`].
//!
//! The built-in producers work in two stages: a [`Summarizer`] turns
//! gathered facts into structured text, then a pure payload step parses it
//! or substitutes a deterministic fallback (reported as `Degraded`).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use sitecheck_core::{ProducerKind, ProducerResult, SiteContext};

use crate::cache::FingerprintInputs;

pub mod design;
pub mod permitting;
pub mod research;

pub use design::{DesignProducer, StaticYield, YieldSource};
pub use permitting::{PermitRulesTable, PermittingProducer};
pub use research::{HeadlineTable, ResearchProducer};

/// Errors a producer may report. The coordinator turns each into a
/// `Failed` result; none escapes an evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProducerError {
    #[error("{0} is unavailable")]
    Unavailable(String),

    #[error("could not geocode {0}")]
    MissingCoordinates(String),

    #[error("timeout after {}", human(.0))]
    Timeout(Duration),

    #[error("{0}")]
    Fault(String),
}

fn human(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

/// A producer of one assessment.
///
/// Implementations must be safe to call concurrently and idempotent for
/// identical `(address, context)` within their freshness window.
#[async_trait]
pub trait AssessmentProducer: Send + Sync {
    /// Which assessment this producer delivers.
    fn kind(&self) -> ProducerKind;

    /// Run the assessment.
    async fn produce(
        &self,
        address: &str,
        context: &SiteContext,
    ) -> Result<ProducerResult, ProducerError>;

    /// Inputs the result depends on, for cache keying.
    ///
    /// Defaults to the normalized address. `None` disables caching.
    fn cache_inputs(&self, address: &str, _context: &SiteContext) -> Option<FingerprintInputs> {
        Some(FingerprintInputs::address(address))
    }
}

/// A prompt for the text-generation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub kind: ProducerKind,
    pub system: String,
    pub user: String,
}

/// Turns gathered facts into (ideally) structured JSON text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, ProducerError>;
}

/// Summarizer used when no text-generation service is configured.
///
/// Always reports unavailability, so every producer takes its fallback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSummarizer;

#[async_trait]
impl Summarizer for OfflineSummarizer {
    async fn summarize(&self, _request: &SummaryRequest) -> Result<String, ProducerError> {
        Err(ProducerError::Unavailable("summarizer".to_string()))
    }
}
