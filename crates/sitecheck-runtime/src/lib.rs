//! # sitecheck-runtime
//!
//! Async evaluation runtime for sitecheck.
//!
//! This crate wraps the deterministic core with everything that waits:
//! context resolution, concurrent producers with per-producer timeouts, and
//! a result cache with freshness windows.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sitecheck_runtime::{
//!     Evaluator, HeadlineTable, OfflineSummarizer, PermitRulesTable, StaticYield,
//! };
//!
//! # async fn run() -> Result<(), sitecheck_runtime::RuntimeError> {
//! let evaluator = Evaluator::builder()
//!     .standard_producers(
//!         HeadlineTable::builtin(),
//!         PermitRulesTable::builtin(),
//!         Arc::new(StaticYield::default()),
//!         Arc::new(OfflineSummarizer),
//!     )
//!     .build()?;
//!
//! let bundle = evaluator.evaluate("123 Solar Way, Phoenix, AZ").await;
//! println!("{} ({})", bundle.decision, bundle.final_score);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod orchestrator;
pub mod producers;
pub mod resolver;

pub use cache::{
    CacheEntry, CachePolicy, CacheStore, Fingerprint, FingerprintInputs, JsonFileStore,
    MemoryStore, ResultCache,
};
pub use config::{ConfigError, RuntimeConfig};
pub use coordinator::Coordinator;
pub use orchestrator::{Evaluator, EvaluatorBuilder, RuntimeError};
pub use producers::{
    AssessmentProducer, DesignProducer, HeadlineTable, OfflineSummarizer, PermitRulesTable,
    PermittingProducer, ProducerError, ResearchProducer, StaticYield, SummaryRequest, Summarizer,
    YieldSource,
};
pub use resolver::{AddressResolver, ContextResolver, ResolveError};
