//! # engram-engine
//!
//! The engine facade. Owns the store, the HNSW index, the BM25 corpus
//! statistics, the embedding pipeline, the retrieval pipeline, and the
//! background job queue. Ingest returns as soon as the row is written;
//! embedding, write-back, and indexing happen behind it.

pub mod jobs;

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use engram_core::models::{
    IndexHealthReport, NewMemory, NodeMetadata, PackedContext, RetrievalOptions,
    RetrievalResponse,
};
use engram_core::traits::MemoryStore;
use engram_core::{EngineConfig, EngramError, EngramResult};
use engram_embeddings::{DurableCache, EmbeddingClient, EmbeddingEngine, HttpEmbeddingClient, PoolSnapshot};
use engram_index::{Bm25Stats, HnswConfig, HnswIndex};
use engram_retrieval::{context, RetrievalPipeline};
use engram_storage::SqliteStore;

use jobs::JobQueue;

pub struct MemoryEngine {
    store: Arc<dyn MemoryStore>,
    index: Arc<RwLock<HnswIndex>>,
    bm25: Arc<RwLock<Bm25Stats>>,
    embeddings: Arc<EmbeddingEngine>,
    pipeline: RetrievalPipeline,
    jobs: JobQueue,
    config: EngineConfig,
}

fn poisoned() -> EngramError {
    EngramError::IndexInconsistency { details: "index lock poisoned".to_string() }
}

impl MemoryEngine {
    /// Wire an engine from explicit parts. Must be called inside a tokio
    /// runtime (the job queue spawns its workers immediately).
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn MemoryStore>,
        client: Arc<dyn EmbeddingClient>,
        durable: DurableCache,
    ) -> EngramResult<Self> {
        config.validate()?;
        let index = Arc::new(RwLock::new(HnswIndex::new(HnswConfig::from_engine(&config))));
        let bm25 = Arc::new(RwLock::new(Bm25Stats::new()));
        let embeddings = Arc::new(EmbeddingEngine::new(&config, client, durable));
        let pipeline = RetrievalPipeline::new(
            config.clone(),
            Arc::clone(&index),
            Arc::clone(&bm25),
            Arc::clone(&embeddings),
        );
        let jobs = JobQueue::new(config.background_concurrency);

        info!(
            hnsw_m = config.hnsw_m,
            ef_search = config.hnsw_ef_search,
            workers = config.background_concurrency,
            "memory engine initialized"
        );

        Ok(Self { store, index, bm25, embeddings, pipeline, jobs, config })
    }

    /// Open an engine on a data directory: SQLite store, SQLite durable
    /// embedding cache, and the configured remote embedding service.
    pub fn open(config: EngineConfig, data_dir: &Path) -> EngramResult<Self> {
        let store = Arc::new(SqliteStore::open(&data_dir.join("memories.db"))?);
        let durable = DurableCache::open(&data_dir.join("embedding_cache.db"));
        let client = Arc::new(HttpEmbeddingClient::new(
            &config.embedding_base_url,
            &config.embedding_model,
            Duration::from_secs(config.embedding_timeout_secs),
        )?);
        Self::new(config, store, client, durable)
    }

    /// Store a memory and schedule its embedding. Returns the row id as
    /// soon as the row is durable; the item becomes searchable when the
    /// background job completes. Embedding failure is a row state, not
    /// an ingest error.
    pub fn ingest(&self, memory: NewMemory) -> EngramResult<i64> {
        memory.validate()?;
        let id = self.store.insert(&memory)?;
        debug!(id, user = %memory.user_id, "memory row written, scheduling embedding");

        let store = Arc::clone(&self.store);
        let index = Arc::clone(&self.index);
        let bm25 = Arc::clone(&self.bm25);
        let embeddings = Arc::clone(&self.embeddings);
        let content = memory.content.clone();
        let meta = NodeMetadata {
            user_id: memory.user_id,
            character_id: memory.character_id,
            content: memory.content,
            created_at: memory.created_at,
            importance: memory.importance,
            emotional_weight: memory.emotional_weight,
            metadata: memory.metadata,
        };

        let _detached = self.jobs.enqueue(async move {
            let embedding = match embeddings.embed(&content).await {
                Ok(vec) => vec,
                Err(e) => {
                    warn!(id, error = %e, "embedding failed, marking row failed");
                    if let Err(e) = store.fail_embedding(id) {
                        error!(id, error = %e, "could not mark row failed");
                    }
                    return;
                }
            };

            // Background store writes get one retry before giving up.
            if let Err(first) = store.complete_embedding(id, &embedding) {
                warn!(id, error = %first, "embedding write-back failed, retrying once");
                if let Err(second) = store.complete_embedding(id, &embedding) {
                    error!(id, error = %second, "embedding write-back failed twice");
                    let _ = store.fail_embedding(id);
                    return;
                }
            }

            match index.write() {
                Ok(mut index) => {
                    if let Err(e) = index.insert(id, embedding, meta) {
                        error!(id, error = %e, "index insert failed");
                        return;
                    }
                }
                Err(_) => {
                    error!(id, "index lock poisoned, skipping insert");
                    return;
                }
            }
            if let Ok(mut bm25) = bm25.write() {
                bm25.add_document(&content);
            }
            debug!(id, "memory embedded and indexed");
        });

        Ok(id)
    }

    /// Rank stored memories against a query.
    pub async fn retrieve(
        &self,
        user_id: &str,
        query: &str,
        options: &RetrievalOptions,
    ) -> EngramResult<RetrievalResponse> {
        self.pipeline.retrieve(user_id, query, options).await
    }

    /// Pack a retrieval response into an LLM token budget. `max_tokens`
    /// overrides the configured budget.
    pub fn pack_context(
        &self,
        response: &RetrievalResponse,
        max_tokens: Option<usize>,
    ) -> PackedContext {
        context::pack(
            &response.results,
            max_tokens.unwrap_or(self.config.max_context_tokens),
            self.config.context_importance_weight,
            self.config.min_context_relevance,
        )
    }

    /// Load every embedded row from the store into the index and the
    /// BM25 statistics. Returns the number of memories indexed.
    pub fn load_from_store(&self) -> EngramResult<usize> {
        let rows = self.store.load_embedded()?;
        let total = rows.len();

        let mut items = Vec::with_capacity(rows.len());
        let mut contents = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(embedding) = row.embedding.clone() else {
                continue;
            };
            contents.push(row.content.clone());
            items.push((row.id, embedding, row.node_metadata()));
        }

        let mut loaded = 0usize;
        {
            let mut index = self.index.write().map_err(|_| poisoned())?;
            for (id, result) in index.batch_insert(items) {
                match result {
                    Ok(()) => loaded += 1,
                    Err(e) => warn!(id, error = %e, "startup load skipped row"),
                }
            }
        }
        {
            let mut bm25 = self.bm25.write().map_err(|_| poisoned())?;
            for content in &contents {
                bm25.add_document(content);
            }
        }

        info!(loaded, total, "startup load complete");
        Ok(loaded)
    }

    pub fn health_check(&self) -> EngramResult<IndexHealthReport> {
        Ok(self.index.read().map_err(|_| poisoned())?.health_check())
    }

    pub fn node_count(&self) -> usize {
        self.index.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.embeddings.pool_snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Wait for all background work to finish. Intended for shutdown
    /// and tests; ingest callers never need it.
    pub async fn drain(&self) {
        self.jobs.drain().await;
    }
}
