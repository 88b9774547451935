//! Concurrent producer coordination.
//!
//! Every configured producer runs as its own tokio task:
//! - Fan-out to all producers at once, fan-in after all have finished
//! - Cache lookup before each call, write-back after successful ones
//! - Per-producer timeout covering lookup, call and write-back; a slow
//!   producer or a stalled cache store is cut off alone
//! - Errors, panics and timeouts become `Failed` results
//! - Results come back in configured order, whatever the completion order
//!
//! Dropping a pending [`Coordinator::run`] future drops its task set, which
//! aborts every producer still running.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde_json::{json, Map, Value as JsonValue};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};

use sitecheck_core::{ProducerKind, ProducerResult, ProducerStatus, SiteContext};

use crate::cache::{Fingerprint, ResultCache};
use crate::config::TimeoutConfig;
use crate::producers::{AssessmentProducer, ProducerError};

/// Runs producers concurrently and collects their results.
pub struct Coordinator {
    order: Vec<ProducerKind>,
    producers: BTreeMap<ProducerKind, Arc<dyn AssessmentProducer>>,
    timeouts: TimeoutConfig,
    cache: Option<ResultCache>,
}

impl Coordinator {
    pub fn new(order: Vec<ProducerKind>, timeouts: TimeoutConfig, cache: Option<ResultCache>) -> Self {
        Self {
            order,
            producers: BTreeMap::new(),
            timeouts,
            cache,
        }
    }

    /// Register a producer, replacing any earlier one of the same kind.
    pub fn register(&mut self, producer: Arc<dyn AssessmentProducer>) {
        self.producers.insert(producer.kind(), producer);
    }

    /// Configured producer order.
    pub fn order(&self) -> &[ProducerKind] {
        &self.order
    }

    /// Run every configured producer for one address.
    ///
    /// Returns exactly one result per configured kind, in configured order.
    pub async fn run(
        &self,
        address: &str,
        context: Arc<SiteContext>,
        now: DateTime<Utc>,
    ) -> Vec<ProducerResult> {
        let mut slots: Vec<Option<ProducerResult>> = vec![None; self.order.len()];
        let mut tasks = JoinSet::new();

        for (index, kind) in self.order.iter().copied().enumerate() {
            let Some(producer) = self.producers.get(&kind).cloned() else {
                tracing::warn!(kind = ?kind, "No producer registered");
                slots[index] = Some(ProducerResult::failed(kind, "no producer registered"));
                continue;
            };

            let task = ProducerTask {
                kind,
                producer,
                address: address.to_string(),
                context: Arc::clone(&context),
                cache: self.cache.clone(),
                timeout: self.timeouts.for_kind(kind),
                now,
            };
            tasks.spawn(async move { (index, task.run().await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::warn!(error = %e, "Producer task did not complete"),
            }
        }

        self.order
            .iter()
            .zip(slots)
            .map(|(kind, slot)| {
                slot.unwrap_or_else(|| ProducerResult::failed(*kind, "producer task was aborted"))
            })
            .collect()
    }
}

/// Everything one producer task owns.
struct ProducerTask {
    kind: ProducerKind,
    producer: Arc<dyn AssessmentProducer>,
    address: String,
    context: Arc<SiteContext>,
    cache: Option<ResultCache>,
    timeout: Duration,
    now: DateTime<Utc>,
}

impl ProducerTask {
    async fn run(self) -> ProducerResult {
        let kind = self.kind;
        let deadline = Instant::now() + self.timeout;
        let key = self.cache.as_ref().and_then(|_| {
            self.producer
                .cache_inputs(&self.address, &self.context)
                .map(|inputs| Fingerprint::of(kind, &inputs))
        });

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            match timeout_at(deadline, cache.lookup(kind, key, self.now)).await {
                Ok(Some(hit)) => return hit,
                Ok(None) => {}
                Err(_) => {
                    tracing::warn!(kind = ?kind, timeout = ?self.timeout, "Cache lookup timed out");
                    return self.timed_out();
                }
            }
        }

        let call = AssertUnwindSafe(self.producer.produce(&self.address, &self.context)).catch_unwind();
        let result = match timeout_at(deadline, call).await {
            Ok(Ok(Ok(result))) => conform(kind, result),
            Ok(Ok(Err(e))) => {
                tracing::warn!(kind = ?kind, error = %e, "Producer failed");
                ProducerResult::failed(kind, e.to_string())
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(kind = ?kind, panic = %message, "Producer panicked");
                ProducerResult::failed(kind, format!("producer panicked: {message}"))
            }
            Err(_) => {
                tracing::warn!(kind = ?kind, timeout = ?self.timeout, "Producer timed out");
                return self.timed_out();
            }
        };

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            if timeout_at(deadline, cache.store(key, &result, self.now)).await.is_err() {
                tracing::warn!(kind = ?kind, "Cache write timed out, result not cached");
            }
        }
        result
    }

    fn timed_out(&self) -> ProducerResult {
        let mut extra = Map::new();
        extra.insert("timeout".to_string(), json!(true));
        ProducerResult::failed_with(
            self.kind,
            ProducerError::Timeout(self.timeout).to_string(),
            extra,
        )
    }
}

/// Hold a producer's own result to the result invariants.
fn conform(kind: ProducerKind, result: ProducerResult) -> ProducerResult {
    if result.kind != kind {
        tracing::warn!(kind = ?kind, returned = ?result.kind, "Producer returned a result of another kind");
        return ProducerResult::failed(
            kind,
            format!("producer returned a {} result", result.kind.label()),
        );
    }
    if result.status != ProducerStatus::Failed {
        return result;
    }

    // Failed results always carry score 0 and an error.
    let error = result.error().unwrap_or("producer reported failure").to_string();
    let extra = match result.payload {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    };
    let mut failed = ProducerResult::failed_with(kind, error, extra);
    failed.raw_text = result.raw_text;
    failed
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
