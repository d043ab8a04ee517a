//! Remote access backend with a read-through TTL cache

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long a backend answer is trusted
pub const BACKEND_ACCESS_TTL: Duration = Duration::from_secs(60);

/// Cache size above which expired entries are evicted
const MAX_CACHE_ENTRIES: usize = 10_000;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("backend request failed: {0}")]
    Request(String),

    #[error("backend client error: {0}")]
    Client(String),
}

/// A remote authority deciding whether a pubkey may use the relay
#[async_trait]
pub trait AccessBackend: Send + Sync {
    async fn check(&self, pubkey: &str) -> Result<bool, AccessError>;
}

/// `GET {base_url}{pubkey}`; a 200 grants access, anything else denies it
pub struct HttpAccessBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAccessBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AccessError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AccessError::Client(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

#[async_trait]
impl AccessBackend for HttpAccessBackend {
    async fn check(&self, pubkey: &str) -> Result<bool, AccessError> {
        let url = format!("{}{}", self.base_url, pubkey);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AccessError::Request(e.to_string()))?;

        Ok(response.status() == StatusCode::OK)
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    granted: bool,
    expires: Instant,
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

/// Per-pubkey cache of backend answers.
///
/// Each pubkey has its own slot lock, held across that pubkey's remote call
/// only, so a slow answer for one key never delays checks for another.
pub struct BackendAccessCache {
    backend: Arc<dyn AccessBackend>,
    ttl: Duration,
    slots: DashMap<String, Slot>,
    /// No eviction sweep runs before this instant
    next_sweep: parking_lot::Mutex<Instant>,
}

impl BackendAccessCache {
    pub fn new(backend: Arc<dyn AccessBackend>) -> Self {
        Self::with_ttl(backend, BACKEND_ACCESS_TTL)
    }

    pub fn with_ttl(backend: Arc<dyn AccessBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            slots: DashMap::new(),
            next_sweep: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Cached or fresh backend answer. Failures fall back to the last known
    /// answer, or deny when there is none.
    pub async fn check(&self, pubkey: &str) -> bool {
        // Clone the slot out so the map shard is released before awaiting
        let slot = self.slots.entry(pubkey.to_string()).or_default().clone();
        let mut entry = slot.lock().await;

        if let Some(cached) = *entry {
            if cached.expires > Instant::now() {
                return cached.granted;
            }
        }

        let granted = match self.backend.check(pubkey).await {
            Ok(granted) => {
                debug!(pubkey = %pubkey, granted, "Backend access check");
                *entry = Some(CacheEntry {
                    granted,
                    expires: Instant::now() + self.ttl,
                });
                granted
            }
            Err(e) => {
                warn!(pubkey = %pubkey, error = %e, "Backend access check failed");
                entry.map(|cached| cached.granted).unwrap_or(false)
            }
        };

        drop(entry);
        self.evict_expired();

        granted
    }

    /// Number of cached pubkeys
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Sweep expired entries once the cache is over its bound. Sweeps are
    /// spaced at least an eighth of the TTL apart, and skipped until the
    /// earliest surviving entry can have expired.
    fn evict_expired(&self) {
        if self.slots.len() <= MAX_CACHE_ENTRIES {
            return;
        }

        let now = Instant::now();
        {
            let mut next_sweep = self.next_sweep.lock();
            if now < *next_sweep {
                return;
            }
            *next_sweep = now + self.ttl;
        }

        let mut earliest = now + self.ttl;

        // Slots that are busy are kept; they are about to be refreshed
        self.slots.retain(|_, slot| match slot.try_lock() {
            Ok(entry) => match *entry {
                Some(cached) if cached.expires > now => {
                    earliest = earliest.min(cached.expires);
                    true
                }
                _ => false,
            },
            Err(_) => true,
        });

        let evicted_until = earliest.max(now + self.ttl / 8);
        *self.next_sweep.lock() = evicted_until;
        debug!(remaining = self.slots.len(), "Swept backend access cache");
    }
}
