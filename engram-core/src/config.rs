//! Engine configuration.
//!
//! A single flat struct covering every tunable the engine recognizes,
//! loadable from TOML. Unknown keys are ignored so configs written for
//! newer versions still load.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{EngramError, EngramResult};

mod defaults {
    pub const HNSW_M: usize = 16;
    pub const HNSW_EF_CONSTRUCTION: usize = 200;
    pub const HNSW_EF_SEARCH: usize = 100;
    pub const HNSW_MAX_LAYERS: usize = 5;
    pub const EMBEDDING_CACHE_SIZE: usize = 10_000;
    pub const SEMANTIC_CACHE_SIZE: usize = 5_000;
    pub const RESULT_CACHE_SIZE: usize = 1_000;
    pub const SEMANTIC_CACHE_THRESHOLD: f64 = 0.95;
    pub const RESULT_CACHE_TTL_MS: u64 = 300_000;
    pub const SEMANTIC_WEIGHT: f64 = 0.7;
    pub const KEYWORD_WEIGHT: f64 = 0.3;
    pub const RRF_K: u32 = 60;
    pub const DIVERSITY_PENALTY: f64 = 0.1;
    pub const TEMPORAL_HALF_LIFE_DAYS: f64 = 30.0;
    pub const TEMPORAL_MIN_WEIGHT: f64 = 0.1;
    pub const MAX_CONTEXT_TOKENS: usize = 2_000;
    pub const MIN_CONTEXT_RELEVANCE: f64 = 0.3;
    pub const CONTEXT_IMPORTANCE_WEIGHT: f64 = 0.3;
    pub const EMBEDDING_BATCH_SIZE: usize = 10;
    pub const BATCH_TIMEOUT_MS: u64 = 50;
    pub const CONNECTION_POOL_SIZE: usize = 5;
    pub const BACKGROUND_CONCURRENCY: usize = 5;
    pub const EMBEDDING_BASE_URL: &str = "http://127.0.0.1:11434";
    pub const EMBEDDING_MODEL: &str = "nomic-embed-text";
    pub const EMBEDDING_TIMEOUT_SECS: u64 = 30;
}

/// Full engine configuration. Field defaults match the values the engine
/// was tuned with; a missing config file is equivalent to `Default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // HNSW
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    pub hnsw_max_layers: usize,

    // Caches
    pub embedding_cache_size: usize,
    pub semantic_cache_size: usize,
    pub result_cache_size: usize,
    /// Retained for compatibility; semantic-cache matching is exact
    /// equality on the token-bag hash.
    pub semantic_cache_threshold: f64,
    pub result_cache_ttl_ms: u64,

    // Hybrid search
    pub hybrid_search_enabled: bool,
    pub semantic_weight: f64,
    pub keyword_weight: f64,
    pub use_rrf: bool,
    pub rrf_k: u32,

    // Re-ranking
    pub reranking_enabled: bool,
    pub diversity_penalty: f64,

    // Temporal decay
    pub temporal_decay_enabled: bool,
    pub temporal_half_life_days: f64,
    pub temporal_min_weight: f64,

    // Context packing
    pub max_context_tokens: usize,
    pub min_context_relevance: f64,
    pub context_importance_weight: f64,

    // Embedding pipeline
    pub embedding_batch_size: usize,
    pub batch_timeout_ms: u64,
    pub connection_pool_size: usize,
    pub background_concurrency: usize,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub embedding_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hnsw_m: defaults::HNSW_M,
            hnsw_ef_construction: defaults::HNSW_EF_CONSTRUCTION,
            hnsw_ef_search: defaults::HNSW_EF_SEARCH,
            hnsw_max_layers: defaults::HNSW_MAX_LAYERS,
            embedding_cache_size: defaults::EMBEDDING_CACHE_SIZE,
            semantic_cache_size: defaults::SEMANTIC_CACHE_SIZE,
            result_cache_size: defaults::RESULT_CACHE_SIZE,
            semantic_cache_threshold: defaults::SEMANTIC_CACHE_THRESHOLD,
            result_cache_ttl_ms: defaults::RESULT_CACHE_TTL_MS,
            hybrid_search_enabled: true,
            semantic_weight: defaults::SEMANTIC_WEIGHT,
            keyword_weight: defaults::KEYWORD_WEIGHT,
            use_rrf: true,
            rrf_k: defaults::RRF_K,
            reranking_enabled: true,
            diversity_penalty: defaults::DIVERSITY_PENALTY,
            temporal_decay_enabled: true,
            temporal_half_life_days: defaults::TEMPORAL_HALF_LIFE_DAYS,
            temporal_min_weight: defaults::TEMPORAL_MIN_WEIGHT,
            max_context_tokens: defaults::MAX_CONTEXT_TOKENS,
            min_context_relevance: defaults::MIN_CONTEXT_RELEVANCE,
            context_importance_weight: defaults::CONTEXT_IMPORTANCE_WEIGHT,
            embedding_batch_size: defaults::EMBEDDING_BATCH_SIZE,
            batch_timeout_ms: defaults::BATCH_TIMEOUT_MS,
            connection_pool_size: defaults::CONNECTION_POOL_SIZE,
            background_concurrency: defaults::BACKGROUND_CONCURRENCY,
            embedding_base_url: defaults::EMBEDDING_BASE_URL.to_string(),
            embedding_model: defaults::EMBEDDING_MODEL.to_string(),
            embedding_timeout_secs: defaults::EMBEDDING_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn from_toml_file(path: &Path) -> EngramResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngramError::invalid(format!("config read failed: {e}")))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| EngramError::invalid(format!("config parse failed: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> EngramResult<()> {
        if self.hnsw_m == 0 {
            return Err(EngramError::invalid("hnsw_m must be at least 1"));
        }
        if self.hnsw_max_layers == 0 {
            return Err(EngramError::invalid("hnsw_max_layers must be at least 1"));
        }
        if self.hnsw_ef_search == 0 || self.hnsw_ef_construction == 0 {
            return Err(EngramError::invalid("ef parameters must be at least 1"));
        }
        if self.embedding_cache_size == 0
            || self.semantic_cache_size == 0
            || self.result_cache_size == 0
        {
            return Err(EngramError::invalid("cache sizes must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.semantic_weight)
            || !(0.0..=1.0).contains(&self.keyword_weight)
        {
            return Err(EngramError::invalid("fusion weights must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.temporal_min_weight) {
            return Err(EngramError::invalid("temporal_min_weight must be within [0, 1]"));
        }
        if self.temporal_half_life_days <= 0.0 {
            return Err(EngramError::invalid("temporal_half_life_days must be positive"));
        }
        if self.connection_pool_size == 0 || self.background_concurrency == 0 {
            return Err(EngramError::invalid("concurrency limits must be at least 1"));
        }
        if self.embedding_batch_size == 0 {
            return Err(EngramError::invalid("embedding_batch_size must be at least 1"));
        }
        Ok(())
    }
}
