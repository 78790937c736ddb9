//! EmbeddingEngine — the crate's entry point.
//!
//! Ties cache, coalescer, gate, and client into one flow:
//! cache lookup, then batch embed on miss, then write-through.
//! Every vector leaving the engine is unit-norm.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};

use engram_core::errors::EngramResult;
use engram_core::vector;
use engram_core::EngineConfig;

use crate::batcher::BatchEmbedder;
use crate::cache::{DurableCache, EmbeddingCache};
use crate::pool::{PoolSnapshot, RequestGate};
use crate::provider::EmbeddingClient;

pub struct EmbeddingEngine {
    cache: Arc<EmbeddingCache>,
    batcher: BatchEmbedder,
    gate: Arc<RequestGate>,
}

impl EmbeddingEngine {
    /// Assemble the pipeline from configuration, a provider client, and
    /// a durable cache tier (possibly disabled).
    pub fn new(config: &EngineConfig, client: Arc<dyn EmbeddingClient>, durable: DurableCache) -> Self {
        let cache = Arc::new(EmbeddingCache::new(
            client.model_name(),
            durable,
            config.embedding_cache_size,
            config.semantic_cache_size,
        ));
        let gate = Arc::new(RequestGate::new(config.connection_pool_size));
        let batcher = BatchEmbedder::new(
            Arc::clone(&client),
            Arc::clone(&gate),
            config.embedding_batch_size,
            Duration::from_millis(config.batch_timeout_ms),
            Duration::from_secs(config.embedding_timeout_secs),
        );

        info!(
            model = client.model_name(),
            batch_size = config.embedding_batch_size,
            pool = config.connection_pool_size,
            durable = cache.durable_available(),
            "embedding engine initialized"
        );

        Self { cache, batcher, gate }
    }

    /// Embed one text: cache tiers first, then the batched remote path.
    /// The result is always L2-normalized.
    pub async fn embed(&self, text: &str) -> EngramResult<Vec<f32>> {
        if let Some((vec, tier)) = self.cache.get(text).await? {
            debug!(?tier, chars = text.len(), "embedding cache hit");
            return Ok(vec);
        }

        let raw = self.batcher.embed(text).await?;
        let normalized = vector::normalize(raw);
        self.cache.set(text, normalized.clone());
        Ok(normalized)
    }

    /// Embed several texts concurrently, preserving input order.
    pub async fn embed_many(&self, texts: &[String]) -> Vec<EngramResult<Vec<f32>>> {
        join_all(texts.iter().map(|t| self.embed(t))).await
    }

    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.gate.snapshot()
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}
