//! Evaluation façade.
//!
//! One call turns an address into an [`EvaluationBundle`]:
//! 1. Resolve the site context once (unresolvable addresses stop here as INVALID)
//! 2. Fan out to every producer through the [`Coordinator`]
//! 3. Extract scores and fuse them deterministically through the [`Synthesizer`]

use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;

use sitecheck_core::{EvaluationBundle, PolicyError, ProducerKind, Synthesizer};

use crate::cache::{CacheStore, JsonFileStore, MemoryStore, ResultCache};
use crate::config::{ConfigError, RuntimeConfig};
use crate::coordinator::Coordinator;
use crate::producers::{
    AssessmentProducer, DesignProducer, HeadlineTable, PermitRulesTable, PermittingProducer,
    ResearchProducer, Summarizer, YieldSource,
};
use crate::resolver::{AddressResolver, ContextResolver};

/// Errors building an evaluator.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fusion policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("More than one producer registered for {0}")]
    DuplicateProducer(ProducerKind),
}

/// Evaluates site addresses.
pub struct Evaluator {
    config: RuntimeConfig,
    resolver: Arc<dyn ContextResolver>,
    coordinator: Coordinator,
    synthesizer: Synthesizer,
}

impl Evaluator {
    pub fn builder() -> EvaluatorBuilder {
        EvaluatorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Evaluate one address. Never fails: every problem below this call
    /// ends up in the bundle.
    pub async fn evaluate(&self, address: &str) -> EvaluationBundle {
        let evaluated_at = self.config.evaluated_at();

        let context = match self.resolver.resolve(address).await {
            Ok(context) => context,
            Err(e) => {
                tracing::info!(address, error = %e, "Address unresolved, skipping producers");
                return self.synthesizer.unresolved_at(
                    address,
                    self.coordinator.order(),
                    e.reason(),
                    evaluated_at,
                );
            }
        };
        tracing::debug!(address, jurisdiction = %context.jurisdiction, "Context resolved");

        let results = self
            .coordinator
            .run(address, Arc::new(context.clone()), evaluated_at)
            .await;
        let bundle = self
            .synthesizer
            .synthesize_at(address, context, results, evaluated_at);

        tracing::info!(
            address,
            final_score = bundle.final_score,
            decision = %bundle.decision,
            "Evaluation complete"
        );
        bundle
    }

    /// Evaluate several addresses concurrently. Bundles keep input order.
    pub async fn evaluate_many<S: AsRef<str>>(&self, addresses: &[S]) -> Vec<EvaluationBundle> {
        join_all(addresses.iter().map(|a| self.evaluate(a.as_ref()))).await
    }
}

/// Builder for [`Evaluator`].
pub struct EvaluatorBuilder {
    config: RuntimeConfig,
    resolver: Option<Arc<dyn ContextResolver>>,
    producers: Vec<Arc<dyn AssessmentProducer>>,
    cache_store: Option<Arc<dyn CacheStore>>,
}

impl EvaluatorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            resolver: None,
            producers: Vec::new(),
            cache_store: None,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the context resolver. Defaults to an [`AddressResolver`] with an
    /// empty gazetteer.
    pub fn resolver(mut self, resolver: Arc<dyn ContextResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Register a producer.
    pub fn producer(mut self, producer: Arc<dyn AssessmentProducer>) -> Self {
        self.producers.push(producer);
        self
    }

    /// Register the built-in research, permitting and design producers.
    pub fn standard_producers(
        self,
        headlines: HeadlineTable,
        rules: PermitRulesTable,
        yields: Arc<dyn YieldSource>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        self.producer(Arc::new(ResearchProducer::new(headlines, summarizer.clone())))
            .producer(Arc::new(PermittingProducer::new(rules, summarizer.clone())))
            .producer(Arc::new(DesignProducer::new(yields, summarizer)))
    }

    /// Use this store for cached results instead of the configured one.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Build the evaluator.
    pub fn build(self) -> Result<Evaluator, RuntimeError> {
        self.config.validate()?;
        let synthesizer = Synthesizer::new(self.config.fusion.clone(), self.config.scoring)?;

        let cache = if self.config.cache.enabled {
            let store = match (self.cache_store, &self.config.cache.directory) {
                (Some(store), _) => store,
                (None, Some(directory)) => Arc::new(JsonFileStore::new(directory)) as Arc<dyn CacheStore>,
                (None, None) => Arc::new(MemoryStore::new()) as Arc<dyn CacheStore>,
            };
            Some(ResultCache::new(store, self.config.cache_policy()))
        } else {
            None
        };

        let mut coordinator = Coordinator::new(
            self.config.producer_order.clone(),
            self.config.timeouts.clone(),
            cache,
        );
        let mut seen = Vec::new();
        for producer in self.producers {
            let kind = producer.kind();
            if seen.contains(&kind) {
                return Err(RuntimeError::DuplicateProducer(kind));
            }
            seen.push(kind);
            coordinator.register(producer);
        }

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(AddressResolver::new()));

        Ok(Evaluator {
            config: self.config,
            resolver,
            coordinator,
            synthesizer,
        })
    }
}

impl Default for EvaluatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
