//! Configuration for sitecheck-runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use sitecheck_core::{FusionPolicy, ProducerKind, ScoringPolicy};

use crate::cache::CachePolicy;

/// Errors loading configuration or data files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Read a file, tagging I/O errors with its path.
pub(crate) fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Whether a path should be parsed as JSON rather than YAML.
pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Producers to run, in result order
    #[serde(default = "default_producer_order")]
    pub producer_order: Vec<ProducerKind>,

    /// Timeout configuration
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Weights, threshold and floor for fusion
    #[serde(default)]
    pub fusion: FusionPolicy,

    /// Substitute scores for missing or failed output
    #[serde(default)]
    pub scoring: ScoringPolicy,

    /// Determinism configuration
    #[serde(default)]
    pub determinism: DeterminismConfig,
}

fn default_producer_order() -> Vec<ProducerKind> {
    ProducerKind::ALL.to_vec()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            producer_order: default_producer_order(),
            timeouts: TimeoutConfig::default(),
            cache: CacheConfig::default(),
            fusion: FusionPolicy::default(),
            scoring: ScoringPolicy::default(),
            determinism: DeterminismConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load from a YAML or JSON file, chosen by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read_file(path)?;
        if is_json(path) {
            Self::from_json(&text)
        } else {
            Self::from_yaml(&text)
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.producer_order.is_empty() {
            return Err(ConfigError::Invalid(
                "producer_order must name at least one producer".to_string(),
            ));
        }
        for (i, kind) in self.producer_order.iter().enumerate() {
            if self.producer_order[..i].contains(kind) {
                return Err(ConfigError::Invalid(format!(
                    "producer_order lists {kind} more than once"
                )));
            }
        }

        let weights = self
            .fusion
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        for (kind, bp) in &weights {
            if *bp > 0 && !self.producer_order.contains(kind) {
                return Err(ConfigError::Invalid(format!(
                    "fusion weight given for {kind}, which is not in producer_order"
                )));
            }
        }

        if self.timeouts.producer_default.is_zero()
            || self.timeouts.per_producer.values().any(Duration::is_zero)
        {
            return Err(ConfigError::Invalid(
                "producer timeouts must be greater than zero".to_string(),
            ));
        }
        if self.scoring.fallback > 100 || self.scoring.failure_floor > 100 {
            return Err(ConfigError::Invalid(
                "scoring values must lie in [0, 100]".to_string(),
            ));
        }
        Ok(())
    }

    /// Get timeout for a specific producer.
    pub fn producer_timeout(&self, kind: ProducerKind) -> Duration {
        self.timeouts.for_kind(kind)
    }

    /// Cache freshness policy built from the configured windows.
    pub fn cache_policy(&self) -> CachePolicy {
        let mut freshness = CachePolicy::default_windows();
        for (kind, window) in &self.cache.freshness {
            freshness.insert(*kind, window.0);
        }
        CachePolicy::new(freshness)
    }

    /// Evaluation timestamp: the pinned one, or now.
    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.determinism.evaluated_at.unwrap_or_else(Utc::now)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutConfig {
    /// Default timeout for one producer
    #[serde(with = "humantime_serde", default = "default_producer_timeout")]
    pub producer_default: Duration,

    /// Per-producer timeout overrides
    #[serde(default, with = "humantime_map")]
    pub per_producer: BTreeMap<ProducerKind, Duration>,
}

fn default_producer_timeout() -> Duration {
    Duration::from_secs(10)
}

impl TimeoutConfig {
    /// Override for `kind`, else the default.
    pub fn for_kind(&self, kind: ProducerKind) -> Duration {
        self.per_producer
            .get(&kind)
            .copied()
            .unwrap_or(self.producer_default)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            producer_default: default_producer_timeout(),
            per_producer: BTreeMap::new(),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Enable caching
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for the on-disk store; in-memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Freshness window overrides, e.g. `research: 12h` or `design: never`
    #[serde(default)]
    pub freshness: BTreeMap<ProducerKind, Freshness>,
}

fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            freshness: BTreeMap::new(),
        }
    }
}

/// A freshness window; `None` never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness(pub Option<Duration>);

impl Serialize for Freshness {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(d) => serializer.serialize_str(&humantime::format_duration(d).to_string()),
            None => serializer.serialize_str("never"),
        }
    }
}

impl<'de> Deserialize<'de> for Freshness {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.trim().eq_ignore_ascii_case("never") {
            return Ok(Self(None));
        }
        humantime::parse_duration(s.trim())
            .map(|d| Self(Some(d)))
            .map_err(serde::de::Error::custom)
    }
}

/// Determinism configuration for reproducible evaluations.
///
/// For golden tests and audits, pin `evaluated_at`:
///
/// ```yaml
/// determinism:
///   evaluated_at: "2025-06-01T12:00:00Z"
/// ```
///
/// The pinned time is also the "now" used for cache freshness checks.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DeterminismConfig {
    /// Fixed timestamp for evaluation (ISO 8601)
    #[serde(default)]
    pub evaluated_at: Option<DateTime<Utc>>,
}

// Custom serialization for Duration using humantime format
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

mod humantime_map {
    use serde::{self, Deserialize, Deserializer, Serialize, Serializer};
    use sitecheck_core::ProducerKind;
    use std::collections::BTreeMap;
    use std::time::Duration;

    pub fn serialize<S>(
        map: &BTreeMap<ProducerKind, Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        map.iter()
            .map(|(k, d)| (*k, humantime::format_duration(*d).to_string()))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<ProducerKind, Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        BTreeMap::<ProducerKind, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, s)| {
                humantime::parse_duration(&s)
                    .map(|d| (k, d))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(
            config.producer_order,
            vec![
                ProducerKind::Research,
                ProducerKind::Permitting,
                ProducerKind::Design
            ]
        );
        assert!(config.cache.enabled);
        assert_eq!(config.fusion.go_threshold, 65);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_producer_timeout() {
        let mut config = RuntimeConfig::default();
        config
            .timeouts
            .per_producer
            .insert(ProducerKind::Design, Duration::from_secs(30));

        assert_eq!(
            config.producer_timeout(ProducerKind::Design),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.producer_timeout(ProducerKind::Research),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_yaml_with_humantime_and_never() {
        let yaml = r#"
timeouts:
  producer_default: 5s
  per_producer:
    design: 1m 30s
cache:
  directory: /tmp/sitecheck
  freshness:
    research: 12h
    design: never
fusion:
  go_threshold: 70
determinism:
  evaluated_at: "2025-06-01T12:00:00Z"
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.timeouts.producer_default, Duration::from_secs(5));
        assert_eq!(
            config.producer_timeout(ProducerKind::Design),
            Duration::from_secs(90)
        );
        assert_eq!(config.cache.directory, Some(PathBuf::from("/tmp/sitecheck")));
        assert_eq!(config.fusion.go_threshold, 70);
        assert_eq!(config.fusion.floor, 50);

        let policy = config.cache_policy();
        assert_eq!(
            policy.window(ProducerKind::Research),
            Some(Duration::from_secs(12 * 3600))
        );
        assert_eq!(policy.window(ProducerKind::Design), None);
        assert_eq!(
            policy.window(ProducerKind::Permitting),
            Some(Duration::from_secs(24 * 3600))
        );
        assert_eq!(
            config.evaluated_at(),
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_rejects_bad_weights() {
        let yaml = r#"
fusion:
  weights:
    research: 0.5
    permitting: 0.3
    design: 0.3
"#;
        assert!(matches!(
            RuntimeConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_producers() {
        let mut config = RuntimeConfig::default();
        config.producer_order.push(ProducerKind::Research);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_weight_for_unlisted_producer() {
        let mut config = RuntimeConfig::default();
        config.producer_order.retain(|k| *k != ProducerKind::Design);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let yaml = "timeouts:\n  producer_default: 0s\n";
        assert!(RuntimeConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_duration_is_yaml_error() {
        let yaml = "timeouts:\n  producer_default: soon\n";
        assert!(matches!(
            RuntimeConfig::from_yaml(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = RuntimeConfig::default();
        config.determinism.evaluated_at = Some(Utc.with_ymd_and_hms(2025, 12, 20, 10, 0, 0).unwrap());
        config
            .cache
            .freshness
            .insert(ProducerKind::Design, Freshness(None));
        config
            .timeouts
            .per_producer
            .insert(ProducerKind::Research, Duration::from_secs(3));

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"never\""));
        assert!(json.contains("2025-12-20"));

        let parsed = RuntimeConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml_path = dir.path().join("sitecheck.yaml");
        let json_path = dir.path().join("sitecheck.json");
        std::fs::write(&yaml_path, "fusion:\n  floor: 40\n").unwrap();
        std::fs::write(&json_path, r#"{"fusion": {"floor": 45}}"#).unwrap();

        assert_eq!(RuntimeConfig::from_file(&yaml_path).unwrap().fusion.floor, 40);
        assert_eq!(RuntimeConfig::from_file(&json_path).unwrap().fusion.floor, 45);
        assert!(matches!(
            RuntimeConfig::from_file(dir.path().join("missing.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
