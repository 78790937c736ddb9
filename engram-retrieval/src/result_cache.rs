//! LRU + TTL cache of completed retrievals.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::debug;

use engram_core::models::{RetrievalOptions, RetrievalResponse};

struct CachedResponse {
    response: RetrievalResponse,
    inserted: Instant,
}

pub struct ResultCache {
    entries: Mutex<LruCache<String, CachedResponse>>,
    ttl: Duration,
}

/// Cache key over everything that shapes a response.
pub fn key(user_id: &str, query: &str, options: &RetrievalOptions) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(query.as_bytes());
    hasher.update(b"\x00");
    hasher.update(options.cache_key_part().as_bytes());
    hasher.finalize().to_hex().to_string()
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// A live cached response, or None. Expired entries are evicted on
    /// sight.
    pub fn get(&self, key: &str) -> Option<RetrievalResponse> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(cached) if cached.inserted.elapsed() <= self.ttl => {
                Some(cached.response.clone())
            }
            Some(_) => {
                debug!(key, "result cache entry expired");
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, response: RetrievalResponse) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, CachedResponse { response, inserted: Instant::now() });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
