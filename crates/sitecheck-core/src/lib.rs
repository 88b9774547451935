//! # sitecheck-core
//!
//! Deterministic scoring and decision fusion for solar site feasibility.
//!
//! This crate answers one question for a site address: should a solar
//! installation go ahead? It holds the pure parts of the pipeline:
//!
//! - Address parsing into a jurisdiction
//! - Canonical producer payloads and their fallbacks
//! - Score extraction from (possibly malformed) producer output
//! - Weighted fusion with a conjunctive floor into GO / NO_GO
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same inputs always produce the same bundle
//! 2. **Total**: Extraction and fusion never fail on bad producer data
//! 3. **No I/O**: Producers, caching and concurrency live in `sitecheck-runtime`
//!
//! ## Example
//!
//! ```rust
//! use sitecheck_core::{Decision, NormalizedScore, ProducerKind, Synthesizer};
//!
//! let fusion = Synthesizer::default().fuse(&[
//!     NormalizedScore::new(ProducerKind::Research, 82),
//!     NormalizedScore::new(ProducerKind::Permitting, 70),
//!     NormalizedScore::new(ProducerKind::Design, 60),
//! ]);
//!
//! assert_eq!(fusion.final_score, 72);
//! assert_eq!(fusion.decision, Decision::Go);
//! ```

pub mod address;
pub mod extraction;
pub mod payload;
pub mod synthesizer;
pub mod types;

// Re-export main types at crate root
pub use address::{parse_jurisdiction, AddressError};
pub use extraction::{ScoreExtractor, ScoringPolicy};
pub use payload::{parse_structured, PayloadError, PermitRules, YieldInputs};
pub use synthesizer::{Fusion, FusionPolicy, PolicyError, Synthesizer};
pub use types::{
    Coordinates, Decision, EvaluationBundle, Jurisdiction, NormalizedScore, ProducerKind,
    ProducerResult, ProducerStatus, SiteContext,
};
