//! Site context resolution.
//!
//! An address is resolved once per evaluation; every producer then shares
//! the result read-only.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use sitecheck_core::{parse_jurisdiction, Coordinates, SiteContext};

use crate::config::{read_file, ConfigError};

/// Errors from context resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Unresolved address '{address}': {reason}")]
    UnresolvedAddress { address: String, reason: String },
}

impl ResolveError {
    /// Human-readable cause, without the address.
    pub fn reason(&self) -> &str {
        match self {
            Self::UnresolvedAddress { reason, .. } => reason,
        }
    }
}

/// Turns an address into the context producers need.
#[async_trait]
pub trait ContextResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<SiteContext, ResolveError>;
}

/// Offline resolver: jurisdiction from the address text, coordinates from a
/// gazetteer keyed on `"city, st"`.
///
/// Jurisdictions missing from the gazetteer resolve without coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressResolver {
    gazetteer: BTreeMap<String, Coordinates>,
}

impl AddressResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver knowing a handful of city centres.
    pub fn builtin() -> Self {
        [
            ("Austin, TX", 30.2672, -97.7431),
            ("Denver, CO", 39.7392, -104.9903),
            ("Phoenix, AZ", 33.4484, -112.074),
            ("San Jose, CA", 37.3382, -121.8863),
        ]
        .into_iter()
        .fold(Self::new(), |resolver, (place, lat, lon)| {
            resolver.with_location(place, Coordinates { lat, lon })
        })
    }

    /// Register coordinates for a `"City, ST"` jurisdiction.
    pub fn with_location(mut self, jurisdiction: &str, coordinates: Coordinates) -> Self {
        self.gazetteer
            .insert(jurisdiction.trim().to_lowercase(), coordinates);
        self
    }

    /// Load a gazetteer: a JSON object of `"City, ST": {"lat": .., "lon": ..}`.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, Coordinates> = serde_json::from_str(text)?;
        Ok(raw
            .into_iter()
            .fold(Self::new(), |resolver, (key, coords)| {
                resolver.with_location(&key, coords)
            }))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&read_file(path.as_ref())?)
    }
}

#[async_trait]
impl ContextResolver for AddressResolver {
    async fn resolve(&self, address: &str) -> Result<SiteContext, ResolveError> {
        let jurisdiction =
            parse_jurisdiction(address).map_err(|e| ResolveError::UnresolvedAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let context = SiteContext::new(jurisdiction);
        Ok(match self.gazetteer.get(&context.jurisdiction.lookup_key()) {
            Some(coordinates) => context.with_coordinates(*coordinates),
            None => {
                tracing::debug!(jurisdiction = %context.jurisdiction, "No coordinates for jurisdiction");
                context
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitecheck_core::Jurisdiction;

    fn phoenix() -> Coordinates {
        Coordinates {
            lat: 33.4484,
            lon: -112.074,
        }
    }

    #[tokio::test]
    async fn test_resolves_jurisdiction_and_coordinates() {
        let resolver = AddressResolver::new().with_location("Phoenix, AZ", phoenix());
        let context = resolver.resolve("123 Solar Way, phoenix, az").await.unwrap();

        assert_eq!(context.jurisdiction, Jurisdiction::new("phoenix", "AZ"));
        assert_eq!(context.coordinates, Some(phoenix()));
    }

    #[tokio::test]
    async fn test_unknown_place_has_no_coordinates() {
        let context = AddressResolver::new()
            .resolve("1 Main St, Mesa, AZ")
            .await
            .unwrap();
        assert_eq!(context.coordinates, None);
    }

    #[tokio::test]
    async fn test_garbage_is_unresolved() {
        let err = AddressResolver::new().resolve("???").await.unwrap_err();

        assert!(matches!(err, ResolveError::UnresolvedAddress { ref address, .. } if address == "???"));
        assert!(err.reason().contains("Invalid address format"));
    }

    #[tokio::test]
    async fn test_builtin_knows_phoenix() {
        let context = AddressResolver::builtin()
            .resolve("123 Solar Way, Phoenix, AZ")
            .await
            .unwrap();
        assert_eq!(context.coordinates, Some(phoenix()));
    }

    #[test]
    fn test_gazetteer_from_json() {
        let resolver =
            AddressResolver::from_json(r#"{"Phoenix, AZ": {"lat": 33.4484, "lon": -112.074}}"#)
                .unwrap();
        assert_eq!(resolver, AddressResolver::new().with_location("phoenix, az", phoenix()));
    }
}
