// Address → region resolution for imported geo info. Never fails the caller: timeouts and
// lookup errors resolve to the unknown region.

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Region stored when an address could not be resolved.
pub const UNKNOWN_REGION: &str = "Not Known";

pub trait GeolocationResolver: Send + Sync + 'static {
    /// `None` = unknown. Must return within a bounded time.
    fn resolve(&self, address: IpAddr) -> impl Future<Output = Option<String>> + Send;
}

/// Backend behind [`CachedResolver`]; allowed to be slow or fail.
pub trait RegionLookup: Send + Sync + 'static {
    fn lookup(
        &self,
        address: IpAddr,
    ) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;
}

/// Fixed address → region table (from config).
#[derive(Debug, Clone, Default)]
pub struct StaticRegions {
    regions: HashMap<IpAddr, String>,
}

impl StaticRegions {
    pub fn new(regions: HashMap<IpAddr, String>) -> Self {
        Self { regions }
    }

    /// Parses string keys; entries that aren't addresses are skipped with a warning.
    pub fn from_config(table: &HashMap<String, String>) -> Self {
        let mut regions = HashMap::with_capacity(table.len());
        for (address, region) in table {
            match address.parse::<IpAddr>() {
                Ok(ip) => {
                    regions.insert(ip, region.clone());
                }
                Err(e) => warn!(address = %address, error = %e, "ignoring geolocation entry"),
            }
        }
        Self { regions }
    }
}

impl RegionLookup for StaticRegions {
    async fn lookup(&self, address: IpAddr) -> anyhow::Result<Option<String>> {
        Ok(self.regions.get(&address).cloned())
    }
}

/// Bounds every lookup with `timeout` and remembers answers per address.
/// Failed and timed-out lookups are not cached, so a later import may retry them.
pub struct CachedResolver<L> {
    lookup: L,
    timeout: Duration,
    cache: RwLock<HashMap<IpAddr, Option<String>>>,
}

impl<L: RegionLookup> CachedResolver<L> {
    pub fn new(lookup: L, timeout: Duration) -> Self {
        Self {
            lookup,
            timeout,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

impl<L: RegionLookup> GeolocationResolver for CachedResolver<L> {
    async fn resolve(&self, address: IpAddr) -> Option<String> {
        let cached = self.cache.read().await.get(&address).cloned();
        if let Some(hit) = cached {
            return hit;
        }
        match tokio::time::timeout(self.timeout, self.lookup.lookup(address)).await {
            Ok(Ok(region)) => {
                self.cache.write().await.insert(address, region.clone());
                region
            }
            Ok(Err(e)) => {
                warn!(address = %address, error = %e, "geolocation lookup failed");
                None
            }
            Err(_) => {
                debug!(
                    address = %address,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "geolocation lookup timed out"
                );
                None
            }
        }
    }
}
