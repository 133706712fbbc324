//! Discovery with a last-known-good cache

use chrono::{DateTime, Local};
use mybaby_api::RecentDeviceSighting;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{DiscoveryError, DiscoveryService};

/// Result of a discovery fetch after fallback
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub sightings: Vec<RecentDeviceSighting>,
    /// True when `sightings` is the cached (or empty) substitute
    pub stale: bool,
    /// Set when the live fetch failed
    pub warning: Option<String>,
    /// When `sightings` was last fetched successfully
    pub fetched_at: Option<DateTime<Local>>,
}

impl DiscoveryOutcome {
    pub fn is_degraded(&self) -> bool {
        self.warning.is_some()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    sightings: Vec<RecentDeviceSighting>,
    fetched_at: DateTime<Local>,
}

/// Wraps a discovery service with a timeout and a last-known-good cache.
///
/// A failed or timed-out fetch never surfaces as an error: the previous
/// successful result (or an empty list) is returned with `stale = true`.
pub struct CachedDiscovery {
    inner: Arc<dyn DiscoveryService>,
    timeout: Duration,
    last_good: Mutex<Option<CacheEntry>>,
}

impl CachedDiscovery {
    pub fn new(inner: Arc<dyn DiscoveryService>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            last_good: Mutex::new(None),
        }
    }

    pub async fn fetch(&self) -> DiscoveryOutcome {
        let result = match tokio::time::timeout(self.timeout, self.inner.fetch_sightings()).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Timeout),
        };

        let mut cache = self.last_good.lock().unwrap_or_else(|e| e.into_inner());

        match result {
            Ok(sightings) => {
                let fetched_at = mybaby_util::now();
                debug!(count = sightings.len(), "Discovery fetch succeeded");
                *cache = Some(CacheEntry {
                    sightings: sightings.clone(),
                    fetched_at,
                });
                DiscoveryOutcome {
                    sightings,
                    stale: false,
                    warning: None,
                    fetched_at: Some(fetched_at),
                }
            }
            Err(e) => {
                warn!(error = %e, cached = cache.is_some(), "Discovery fetch failed, serving cache");
                let (sightings, fetched_at) = match cache.as_ref() {
                    Some(entry) => (entry.sightings.clone(), Some(entry.fetched_at)),
                    None => (Vec::new(), None),
                };
                DiscoveryOutcome {
                    sightings,
                    stale: true,
                    warning: Some(e.to_string()),
                    fetched_at,
                }
            }
        }
    }

    /// Last successful result without contacting the service
    pub fn cached(&self) -> Option<(Vec<RecentDeviceSighting>, DateTime<Local>)> {
        self.last_good
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|entry| (entry.sightings.clone(), entry.fetched_at))
    }
}
