//! Result cache: content-addressed memoization of producer output.
//!
//! Entries are keyed by a [`Fingerprint`] of the producer's normalized
//! inputs and expire according to a per-kind freshness window. The cache is
//! a pure memoization layer: read failures and corrupt entries are misses,
//! write failures are logged and dropped.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;

use sitecheck_core::address::normalize;
use sitecheck_core::{Coordinates, ProducerKind, ProducerResult, ProducerStatus};

/// Decimal places numeric inputs are rounded to before hashing.
pub const DEFAULT_PRECISION: usize = 2;

/// Errors from cache stores. Never surfaced past [`ResultCache`].
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Normalized inputs a producer result depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintInputs {
    address: Option<String>,
    numbers: Vec<(String, f64)>,
    precision: usize,
}

impl FingerprintInputs {
    /// Inputs keyed on address text (trimmed, lower-cased, whitespace collapsed).
    pub fn address(address: &str) -> Self {
        Self {
            address: Some(normalize(address)),
            numbers: Vec::new(),
            precision: DEFAULT_PRECISION,
        }
    }

    /// Inputs keyed on rounded coordinates only.
    pub fn coordinates(coordinates: Coordinates) -> Self {
        Self {
            address: None,
            numbers: Vec::new(),
            precision: DEFAULT_PRECISION,
        }
        .with_number("lat", coordinates.lat)
        .with_number("lon", coordinates.lon)
    }

    /// Add a numeric parameter.
    pub fn with_number(mut self, name: &str, value: f64) -> Self {
        self.numbers.push((name.to_string(), value));
        self
    }

    /// Change the rounding precision for numeric parameters.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    fn canonical(&self, kind: ProducerKind) -> String {
        let mut parts = vec![format!("kind={kind:?}")];
        if let Some(address) = &self.address {
            parts.push(format!("address={address}"));
        }
        for (name, value) in &self.numbers {
            parts.push(format!("{name}={}", round_for_key(*value, self.precision)));
        }
        parts.join("|")
    }
}

/// Format a number at fixed precision so float noise does not fragment keys.
fn round_for_key(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let formatted = format!("{value:.precision$}");
    // "-0.00" and "0.00" must share a key.
    if formatted.trim_start_matches('-').chars().all(|c| c == '0' || c == '.') {
        formatted.trim_start_matches('-').to_string()
    } else {
        formatted
    }
}

/// Deterministic cache key: SHA-256 over a producer's normalized inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(kind: ProducerKind, inputs: &FingerprintInputs) -> Self {
        let digest = Sha256::digest(inputs.canonical(kind).as_bytes());
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored producer result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub key: Fingerprint,
    pub value: ProducerResult,
    pub stored_at: DateTime<Utc>,
}

/// Key-value persistence behind the result cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read an entry. `Ok(None)` is a plain miss.
    async fn get(&self, key: &Fingerprint) -> Result<Option<CacheEntry>, CacheError>;

    /// Write an entry, replacing any previous one atomically.
    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError>;

    /// Drop an entry. Removing a missing key is not an error.
    async fn remove(&self, key: &Fingerprint) -> Result<(), CacheError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn remove(&self, key: &Fingerprint) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// JSON-on-disk store: one `<fingerprint>.json` file per entry.
///
/// Writes land in a unique temporary file in the same directory and are
/// renamed over the target, so concurrent writers never leave a torn file;
/// the last rename wins.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    directory: PathBuf,
}

impl JsonFileStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &Fingerprint) -> PathBuf {
        self.directory.join(format!("{key}.json"))
    }

    fn temp_path(&self, key: &Fingerprint) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.directory
            .join(format!(".{key}.{}.{n}.tmp", std::process::id()))
    }
}

#[async_trait]
impl CacheStore for JsonFileStore {
    async fn get(&self, key: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        let bytes = match tokio::fs::read(self.entry_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io(e)),
        };

        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        if &entry.key != key {
            return Err(CacheError::Corrupt(format!(
                "entry key {} does not match file {}",
                entry.key, key
            )));
        }
        Ok(Some(entry))
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let bytes = serde_json::to_vec_pretty(&entry)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;

        let temp = self.temp_path(&entry.key);
        tokio::fs::write(&temp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&temp, self.entry_path(&entry.key)).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CacheError::Io(e));
        }
        Ok(())
    }

    async fn remove(&self, key: &Fingerprint) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(CacheError::Io(e)),
            _ => Ok(()),
        }
    }
}

/// How long cached results stay usable, per producer kind.
///
/// `None` means the kind's results never expire.
#[derive(Debug, Clone, PartialEq)]
pub struct CachePolicy {
    freshness: BTreeMap<ProducerKind, Option<Duration>>,
    default_window: Option<Duration>,
}

impl CachePolicy {
    pub fn new(freshness: BTreeMap<ProducerKind, Option<Duration>>) -> Self {
        Self {
            freshness,
            default_window: Some(DAY),
        }
    }

    /// Freshness window for a kind.
    pub fn window(&self, kind: ProducerKind) -> Option<Duration> {
        self.freshness
            .get(&kind)
            .copied()
            .unwrap_or(self.default_window)
    }

    /// Whether an entry stored at `stored_at` may still be served at `now`.
    ///
    /// Entries stored after `now` are never fresh.
    pub fn is_fresh(&self, kind: ProducerKind, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if stored_at > now {
            return false;
        }
        let Some(window) = self.window(kind) else {
            return true;
        };
        match chrono::Duration::from_std(window) {
            Ok(window) => now.signed_duration_since(stored_at) < window,
            // Windows too large for chrono never expire in practice.
            Err(_) => true,
        }
    }
}

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

impl CachePolicy {
    /// Research and permitting go stale after a day; designs never do.
    pub fn default_windows() -> BTreeMap<ProducerKind, Option<Duration>> {
        let mut freshness = BTreeMap::new();
        freshness.insert(ProducerKind::Research, Some(DAY));
        freshness.insert(ProducerKind::Permitting, Some(DAY));
        freshness.insert(ProducerKind::Design, None);
        freshness
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(Self::default_windows())
    }
}

/// Freshness-aware front for a [`CacheStore`].
///
/// Only `Ok` results are stored; degraded and failed results are retried on
/// the next evaluation.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    policy: CachePolicy,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, policy: CachePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Serve a fresh result for `key`, or `None` on any kind of miss.
    pub async fn lookup(
        &self,
        kind: ProducerKind,
        key: &Fingerprint,
        now: DateTime<Utc>,
    ) -> Option<ProducerResult> {
        let entry = match self.store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(kind = ?kind, key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(kind = ?kind, key = %key, error = %e, "Unreadable cache entry treated as miss");
                return None;
            }
        };

        if entry.value.kind != kind {
            tracing::warn!(
                kind = ?kind,
                key = %key,
                stored_kind = ?entry.value.kind,
                "Cache entry kind mismatch treated as miss"
            );
            return None;
        }
        if entry.stored_at > now {
            tracing::debug!(
                kind = ?kind,
                key = %key,
                stored_at = %entry.stored_at,
                "Cache entry newer than evaluation time treated as miss"
            );
            return None;
        }
        if !self.policy.is_fresh(kind, entry.stored_at, now) {
            tracing::debug!(kind = ?kind, key = %key, stored_at = %entry.stored_at, "Evicting stale cache entry");
            if let Err(e) = self.store.remove(key).await {
                tracing::warn!(kind = ?kind, key = %key, error = %e, "Failed to evict stale cache entry");
            }
            return None;
        }

        tracing::debug!(kind = ?kind, key = %key, "Cache hit");
        Some(entry.value)
    }

    /// Remember a result. Non-`Ok` results are skipped.
    pub async fn store(&self, key: Fingerprint, result: &ProducerResult, now: DateTime<Utc>) {
        if result.status != ProducerStatus::Ok {
            return;
        }

        let entry = CacheEntry {
            key,
            value: result.clone(),
            stored_at: now,
        };
        if let Err(e) = self.store.put(entry).await {
            tracing::warn!(kind = ?result.kind, error = %e, "Failed to write cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn research_result(score: i64) -> ProducerResult {
        ProducerResult::ok(ProducerKind::Research, json!({ "analysis": { "score": score } }))
    }

    #[test]
    fn test_fingerprint_normalizes_address() {
        let a = Fingerprint::of(
            ProducerKind::Research,
            &FingerprintInputs::address("  123 Solar Way,  Phoenix, AZ "),
        );
        let b = Fingerprint::of(
            ProducerKind::Research,
            &FingerprintInputs::address("123 solar way, phoenix, az"),
        );
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_depends_on_kind() {
        let inputs = FingerprintInputs::address("1 Main St, Mesa, AZ");
        assert_ne!(
            Fingerprint::of(ProducerKind::Research, &inputs),
            Fingerprint::of(ProducerKind::Permitting, &inputs)
        );
    }

    #[test]
    fn test_fingerprint_rounds_coordinates() {
        let a = FingerprintInputs::coordinates(Coordinates { lat: 33.448_001, lon: -112.074_02 });
        let b = FingerprintInputs::coordinates(Coordinates { lat: 33.449_9, lon: -112.070_1 });
        let c = FingerprintInputs::coordinates(Coordinates { lat: 33.46, lon: -112.07 });

        assert_eq!(
            Fingerprint::of(ProducerKind::Design, &a),
            Fingerprint::of(ProducerKind::Design, &b)
        );
        assert_ne!(
            Fingerprint::of(ProducerKind::Design, &a),
            Fingerprint::of(ProducerKind::Design, &c)
        );
    }

    #[test]
    fn test_negative_zero_shares_key() {
        assert_eq!(round_for_key(-0.001, 2), "0.00");
        assert_eq!(round_for_key(0.0, 2), "0.00");
        assert_eq!(round_for_key(-1.234, 2), "-1.23");
    }

    #[test]
    fn test_policy_windows() {
        let policy = CachePolicy::default();
        let day = chrono::Duration::hours(24);

        assert!(policy.is_fresh(ProducerKind::Research, t0(), t0() + chrono::Duration::hours(23)));
        assert!(!policy.is_fresh(ProducerKind::Research, t0(), t0() + day));
        assert!(policy.is_fresh(ProducerKind::Design, t0(), t0() + day * 365));
    }

    #[test]
    fn test_entries_from_the_future_are_not_fresh() {
        let policy = CachePolicy::default();
        let later = t0() + chrono::Duration::minutes(5);

        assert!(!policy.is_fresh(ProducerKind::Research, later, t0()));
        assert!(!policy.is_fresh(ProducerKind::Design, later, t0()));
        assert!(policy.is_fresh(ProducerKind::Research, t0(), t0()));
    }

    #[tokio::test]
    async fn test_future_entry_is_miss_but_kept() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store.clone(), CachePolicy::default());
        let key = Fingerprint::of(ProducerKind::Research, &FingerprintInputs::address("a"));

        cache.store(key.clone(), &research_result(80), t0()).await;

        let earlier = t0() - chrono::Duration::days(30);
        assert_eq!(cache.lookup(ProducerKind::Research, &key, earlier).await, None);
        assert_eq!(store.len().await, 1);
        assert!(cache.lookup(ProducerKind::Research, &key, t0()).await.is_some());
    }

    #[tokio::test]
    async fn test_memory_round_trip_and_stale_miss() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store.clone(), CachePolicy::default());
        let key = Fingerprint::of(ProducerKind::Research, &FingerprintInputs::address("a"));

        cache.store(key.clone(), &research_result(80), t0()).await;
        assert_eq!(store.len().await, 1);

        let hit = cache.lookup(ProducerKind::Research, &key, t0()).await;
        assert_eq!(hit, Some(research_result(80)));

        let stale = cache
            .lookup(ProducerKind::Research, &key, t0() + chrono::Duration::hours(25))
            .await;
        assert_eq!(stale, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_non_ok_results_not_stored() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store.clone(), CachePolicy::default());
        let key = Fingerprint::of(ProducerKind::Design, &FingerprintInputs::address("a"));

        cache
            .store(key.clone(), &ProducerResult::failed(ProducerKind::Design, "x"), t0())
            .await;
        cache
            .store(
                key,
                &ProducerResult::degraded(ProducerKind::Design, json!({}), None),
                t0(),
            )
            .await;

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_miss() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store, CachePolicy::default());
        let key = Fingerprint::of(ProducerKind::Research, &FingerprintInputs::address("a"));

        cache.store(key.clone(), &research_result(80), t0()).await;
        assert_eq!(cache.lookup(ProducerKind::Permitting, &key, t0()).await, None);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("cache"));
        let key = Fingerprint::of(ProducerKind::Research, &FingerprintInputs::address("a"));
        let entry = CacheEntry {
            key: key.clone(),
            value: research_result(77),
            stored_at: t0(),
        };

        store.put(entry.clone()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(entry));

        let leftovers: Vec<_> = std::fs::read_dir(store.directory())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()));
        let key = Fingerprint::of(ProducerKind::Research, &FingerprintInputs::address("a"));

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let key = key.clone();
                tokio::spawn(async move {
                    store
                        .put(CacheEntry {
                            key,
                            value: research_result(i),
                            stored_at: t0(),
                        })
                        .await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        // Whichever write landed last, the file is a complete entry.
        let entry = store.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.key, key);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()));
        let key = Fingerprint::of(ProducerKind::Research, &FingerprintInputs::address("a"));
        std::fs::write(dir.path().join(format!("{key}.json")), b"{ not json").unwrap();

        assert!(matches!(store.get(&key).await, Err(CacheError::Corrupt(_))));

        let cache = ResultCache::new(store, CachePolicy::default());
        assert_eq!(cache.lookup(ProducerKind::Research, &key, t0()).await, None);
    }

    #[tokio::test]
    async fn test_missing_file_is_plain_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let key = Fingerprint::of(ProducerKind::Research, &FingerprintInputs::address("a"));

        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_evicts_stale_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()));
        let cache = ResultCache::new(store.clone(), CachePolicy::default());
        let key = Fingerprint::of(ProducerKind::Research, &FingerprintInputs::address("a"));

        cache.store(key.clone(), &research_result(80), t0()).await;
        let later = t0() + chrono::Duration::hours(25);
        assert_eq!(cache.lookup(ProducerKind::Research, &key, later).await, None);

        assert!(store.get(&key).await.unwrap().is_none());
        store.remove(&key).await.unwrap();
    }
}
