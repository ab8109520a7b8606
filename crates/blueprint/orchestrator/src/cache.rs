//! Bounded, TTL-aware cache of CA TLS certificates keyed by CA URL

use crate::config::CertCacheConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct CachedCert {
    pem: String,
    stored_at: Instant,
}

/// Shared certificate cache. Construct once and hand out behind an `Arc`.
pub struct CertCache {
    entries: Mutex<HashMap<String, CachedCert>>,
    capacity: usize,
    ttl: Duration,
}

impl CertCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &CertCacheConfig) -> Self {
        Self::new(config.capacity, config.ttl())
    }

    /// Cached certificate for `url`, if present and not expired.
    pub fn get(&self, url: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(url) {
            Some(cached) if cached.stored_at.elapsed() < self.ttl => Some(cached.pem.clone()),
            Some(_) => {
                entries.remove(url);
                None
            }
            None => None,
        }
    }

    /// Store a certificate, evicting the oldest entry when full.
    pub fn insert(&self, url: impl Into<String>, pem: impl Into<String>) {
        let url = url.into();
        let mut entries = self.entries.lock();
        if !entries.contains_key(&url) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, cached)| cached.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                debug!(url = %oldest, "Evicting cached certificate");
                entries.remove(&oldest);
            }
        }
        entries.insert(
            url,
            CachedCert {
                pem: pem.into(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Cached certificate for `url`, fetching and storing it on a miss.
    pub async fn get_or_fetch<F, Fut, E>(&self, url: &str, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if let Some(pem) = self.get(url) {
            return Ok(pem);
        }
        let pem = fetch().await?;
        self.insert(url, pem.clone());
        Ok(pem)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for CertCache {
    fn default() -> Self {
        Self::from_config(&CertCacheConfig::default())
    }
}
