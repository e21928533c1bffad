//! Time-bounded memo of idempotent API reads.
//!
//! Keys are call signatures (method plus full URL). Values are immutable
//! snapshots of the decoded response body; `None` records a remote 404.
//!
//! Every `invalidate_all` starts a new generation. A read that began in an
//! older generation may still hand its body to its caller but never stores it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

pub type CachedBody = Arc<Option<Value>>;

#[derive(Debug, Clone)]
struct CacheEntry {
    body: CachedBody,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    generation: AtomicU64,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<CachedBody> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                debug!(key, "cache hit");
                Some(Arc::clone(&entry.body))
            }
            Some(_) => {
                debug!(key, "cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Generation to pass to [`ResponseCache::insert_at`] for a read starting now.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn insert(&self, key: impl Into<String>, body: Option<Value>) -> CachedBody {
        self.insert_at(key, body, self.generation())
    }

    /// Stores `body` unless the cache was invalidated after `generation`.
    pub fn insert_at(
        &self,
        key: impl Into<String>,
        body: Option<Value>,
        generation: u64,
    ) -> CachedBody {
        let body = Arc::new(body);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let key = key.into();
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(key, generation, "dropping response read before invalidation");
            return body;
        }
        let entry = CacheEntry {
            body: Arc::clone(&body),
            expires_at: Instant::now() + self.ttl,
        };
        let now = Instant::now();
        entries.retain(|_, existing| existing.expires_at > now);
        entries.insert(key, entry);
        body
    }

    /// Drops every entry in one step; readers see all or nothing.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(entries = entries.len(), generation, "invalidating response cache");
        entries.clear();
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
