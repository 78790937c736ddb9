//! Three-tier embedding cache.
//!
//! Tiers are consulted in order: L0 durable (SQLite, survives restarts),
//! L1 exact (in-memory LRU on the content hash), L2 semantic (in-memory
//! LRU on a sorted token-bag hash that shortcuts near-duplicates). When
//! the durable tier is offline the in-memory tiers carry the load.
//! Eviction is exact LRU: the least-recently-read entry goes first.

mod durable;

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::{debug, warn};

use engram_core::constants::{SEMANTIC_KEY_MIN_TOKEN_LEN, SEMANTIC_KEY_TOKENS};
use engram_core::errors::{EngramError, EngramResult};

pub use durable::DurableCache;

/// Which tier served a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Durable,
    Exact,
    Semantic,
}

/// Exact-tier key: hash of (model, trimmed lowercased text).
pub fn exact_key(model: &str, text: &str) -> String {
    let normalized = text.trim().to_lowercase();
    let mut hasher = blake3::Hasher::new();
    hasher.update(model.as_bytes());
    hasher.update(b"\x00");
    hasher.update(normalized.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Semantic-tier key: hash of the sorted multiset of tokens longer than
/// three characters, first 20 taken. None when the text has no such
/// tokens.
pub fn semantic_key(text: &str) -> Option<String> {
    let lowered = text.trim().to_lowercase();
    let mut tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= SEMANTIC_KEY_MIN_TOKEN_LEN)
        .collect();
    if tokens.is_empty() {
        return None;
    }
    tokens.sort_unstable();
    tokens.truncate(SEMANTIC_KEY_TOKENS);

    let mut hasher = blake3::Hasher::new();
    for token in tokens {
        hasher.update(token.as_bytes());
        hasher.update(b"\x1f");
    }
    Some(hasher.finalize().to_hex().to_string())
}

/// The tiered cache. `get` may suspend (durable reads); `set` populates
/// the in-memory tiers synchronously and defers the durable write to a
/// background task with a single retry.
pub struct EmbeddingCache {
    model: String,
    durable: Arc<DurableCache>,
    exact: Mutex<LruCache<String, Vec<f32>>>,
    semantic: Mutex<LruCache<String, Vec<f32>>>,
    require_durable: bool,
}

impl EmbeddingCache {
    pub fn new(
        model: &str,
        durable: DurableCache,
        exact_size: usize,
        semantic_size: usize,
    ) -> Self {
        let exact_cap = NonZeroUsize::new(exact_size).unwrap_or(NonZeroUsize::MIN);
        let semantic_cap = NonZeroUsize::new(semantic_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            model: model.to_string(),
            durable: Arc::new(durable),
            exact: Mutex::new(LruCache::new(exact_cap)),
            semantic: Mutex::new(LruCache::new(semantic_cap)),
            require_durable: false,
        }
    }

    /// Make an offline durable tier an error instead of a silent miss.
    pub fn require_durable(mut self) -> Self {
        self.require_durable = true;
        self
    }

    pub fn durable_available(&self) -> bool {
        self.durable.is_available()
    }

    /// Look up an embedding for `text`, reporting the serving tier.
    pub async fn get(&self, text: &str) -> EngramResult<Option<(Vec<f32>, CacheTier)>> {
        if self.require_durable && !self.durable.is_available() {
            return Err(EngramError::CacheUnavailable);
        }

        let key = exact_key(&self.model, text);

        let now = chrono::Utc::now().timestamp();
        if let Some(vec) = self.durable.get(&key, now) {
            return Ok(Some((vec, CacheTier::Durable)));
        }

        if let Ok(mut exact) = self.exact.lock() {
            if let Some(vec) = exact.get(&key) {
                return Ok(Some((vec.clone(), CacheTier::Exact)));
            }
        }

        if let Some(sem_key) = semantic_key(text) {
            if let Ok(mut semantic) = self.semantic.lock() {
                if let Some(vec) = semantic.get(&sem_key) {
                    return Ok(Some((vec.clone(), CacheTier::Semantic)));
                }
            }
        }

        Ok(None)
    }

    /// Populate all three tiers after a synthesized embedding.
    pub fn set(&self, text: &str, embedding: Vec<f32>) {
        let key = exact_key(&self.model, text);

        if let Ok(mut exact) = self.exact.lock() {
            exact.put(key.clone(), embedding.clone());
        }
        if let Some(sem_key) = semantic_key(text) {
            if let Ok(mut semantic) = self.semantic.lock() {
                semantic.put(sem_key, embedding.clone());
            }
        }

        if self.durable.is_available() {
            let durable = Arc::clone(&self.durable);
            let model = self.model.clone();
            tokio::spawn(async move {
                let now = chrono::Utc::now().timestamp();
                if !durable.insert(&key, &model, &embedding, now) {
                    // One retry, then give up; the durable tier is best effort.
                    if !durable.insert(&key, &model, &embedding, now) {
                        warn!(hash = %key, "durable cache write failed twice, dropping");
                        return;
                    }
                }
                debug!(hash = %key, "durable cache write complete");
            });
        }
    }

    pub fn exact_len(&self) -> usize {
        self.exact.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn semantic_len(&self) -> usize {
        self.semantic.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::constants::EMBEDDING_DIM;
    use engram_core::vector;

    fn sample_vec(seed: f32) -> Vec<f32> {
        vector::normalize((0..EMBEDDING_DIM).map(|i| ((i as f32) + seed).sin()).collect())
    }

    fn cache() -> EmbeddingCache {
        EmbeddingCache::new("test-model", DurableCache::in_memory(), 100, 100)
    }

    #[test]
    fn exact_key_normalizes_case_and_whitespace() {
        assert_eq!(exact_key("m", "  Hello World "), exact_key("m", "hello world"));
        assert_ne!(exact_key("m", "hello"), exact_key("other", "hello"));
    }

    #[test]
    fn semantic_key_ignores_token_order() {
        assert_eq!(
            semantic_key("chocolate cake recipe"),
            semantic_key("recipe cake chocolate")
        );
        assert_ne!(
            semantic_key("chocolate cake"),
            semantic_key("chocolate pie")
        );
    }

    #[test]
    fn semantic_key_drops_short_tokens() {
        // Only tokens longer than three characters participate.
        assert_eq!(semantic_key("the cat sat"), None);
        assert!(semantic_key("chocolate the cat").is_some());
        assert_eq!(
            semantic_key("chocolate the cat"),
            semantic_key("chocolate")
        );
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let cache = cache();
        assert!(cache.get("some text").await.unwrap().is_none());
        cache.set("some text", sample_vec(1.0));

        let (vec, _tier) = cache.get("some text").await.unwrap().unwrap();
        assert_eq!(vec, sample_vec(1.0));
    }

    #[tokio::test]
    async fn semantic_tier_shortcuts_reordered_text() {
        let cache = EmbeddingCache::new("m", DurableCache::disabled(), 100, 100);
        cache.set("loves chocolate cake", sample_vec(2.0));

        let hit = cache.get("cake chocolate loves").await.unwrap();
        let (vec, tier) = hit.unwrap();
        assert_eq!(tier, CacheTier::Semantic);
        assert_eq!(vec, sample_vec(2.0));
    }

    #[tokio::test]
    async fn lru_evicts_least_recently_read() {
        let cache = EmbeddingCache::new("m", DurableCache::disabled(), 2, 2);
        cache.set("first text", sample_vec(1.0));
        cache.set("second text", sample_vec(2.0));

        // Touch "first" so "second" becomes the eviction victim.
        assert!(cache.get("first text").await.unwrap().is_some());
        cache.set("third text", sample_vec(3.0));

        assert!(cache.get("first text").await.unwrap().is_some());
        assert!(cache.get("third text").await.unwrap().is_some());
        // "second" fell out of the exact tier; its token bag differs so
        // the semantic tier can still answer. Check the exact tier only.
        assert_eq!(cache.exact_len(), 2);
    }

    #[tokio::test]
    async fn offline_durable_required_fails() {
        let cache =
            EmbeddingCache::new("m", DurableCache::disabled(), 10, 10).require_durable();
        let err = cache.get("anything").await.unwrap_err();
        assert!(matches!(err, EngramError::CacheUnavailable));
    }

    #[tokio::test]
    async fn offline_durable_degrades_silently_by_default() {
        let cache = EmbeddingCache::new("m", DurableCache::disabled(), 10, 10);
        cache.set("text", sample_vec(4.0));
        assert!(cache.get("text").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn durable_write_is_deferred_but_lands() {
        let cache = cache();
        cache.set("persist me", sample_vec(5.0));

        // The spawned write is async; poll briefly.
        for _ in 0..50 {
            if !cache.durable.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(!cache.durable.is_empty());
    }
}
