//! Zone Resolver
//!
//! Maps a domain to the hosted zone that should receive its validation
//! record. Tiers are tried in order and the first answer wins:
//!
//! 1. explicit zone id override, returned verbatim
//! 2. static zone map (zone name -> zone id)
//! 3. provider zone listing, exact match on the name without its root dot
//!
//! Zone names are derived as the last two labels of the domain. Multi-label
//! public suffixes such as `co.uk` are not handled: `foo.co.uk` derives
//! `co.uk`. Use the override or the zone map for those domains.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::{Sleeper, TokioSleeper};
use crate::error::{HookError, HookResult, Stage};
use crate::policy::RetryPolicy;
use crate::provider::DnsProvider;

/// Last two dot-separated labels of `domain`
pub fn derive_zone_name(domain: &str) -> String {
    let labels: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
    labels[labels.len().saturating_sub(2)..].join(".")
}

/// Static zone name -> zone id mapping, possibly empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ZoneMap(HashMap<String, String>);

impl ZoneMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON object of `{ "zone name": "zone id" }`
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read zone map: {:?}", path))?;

        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse zone map: {:?}", path))
    }

    /// Like [`ZoneMap::from_json_file`], but a missing file is an empty map.
    /// A file that exists but cannot be read or parsed is still an error.
    pub fn from_json_file_if_present(path: &Path) -> Result<Self> {
        match std::fs::metadata(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?path, "Zone map file not found, using an empty map");
                Ok(Self::new())
            }
            _ => Self::from_json_file(path),
        }
    }

    pub fn insert(&mut self, zone_name: impl Into<String>, zone_id: impl Into<String>) {
        self.0.insert(zone_name.into(), zone_id.into());
    }

    pub fn get(&self, zone_name: &str) -> Option<&str> {
        self.0.get(zone_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ZoneMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Three-tier zone id lookup
pub struct ZoneResolver {
    zone_id_override: Option<String>,
    zone_map: ZoneMap,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl ZoneResolver {
    pub fn new(zone_id_override: Option<String>, zone_map: ZoneMap) -> Self {
        Self {
            zone_id_override,
            zone_map,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
        }
    }

    /// Backoff used when the zone listing hits a transient error
    pub fn with_retry(mut self, retry: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = retry;
        self.sleeper = sleeper;
        self
    }

    /// Token that aborts the zone listing when cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve the zone id for `zone_name`
    pub async fn resolve(&self, provider: &dyn DnsProvider, zone_name: &str) -> HookResult<String> {
        if let Some(zone_id) = &self.zone_id_override {
            info!(zone = %zone_name, zone_id = %zone_id, "Using zone ID override");
            return Ok(zone_id.clone());
        }

        if let Some(zone_id) = self.zone_map.get(zone_name) {
            info!(zone = %zone_name, zone_id = %zone_id, "Zone found in static zone map");
            return Ok(zone_id.to_string());
        }

        debug!(
            zone = %zone_name,
            provider = provider.provider_name(),
            "Zone not in static map, listing hosted zones"
        );

        let zones = self
            .retry
            .run(self.sleeper.as_ref(), &self.cancel, Stage::Resolution, || {
                provider.list_zones()
            })
            .await?;

        let zone = zones
            .iter()
            .find(|z| z.canonical_name() == zone_name)
            .ok_or_else(|| HookError::ZoneNotFound {
                zone_name: zone_name.to_string(),
            })?;

        info!(zone = %zone_name, zone_id = %zone.id, "Zone found via provider listing");
        Ok(zone.id.clone())
    }
}
