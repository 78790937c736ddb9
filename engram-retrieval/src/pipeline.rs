//! The retrieval pipeline.
//!
//! expansion -> variant embedding -> dense + sparse channels -> fusion ->
//! temporal decay -> re-ranking -> threshold -> response, with a TTL+LRU
//! result cache in front. Compute-bound stages (graph search, BM25) run
//! on the caller's thread; only embedding and the cache tiers suspend.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use engram_core::models::{
    NodeMetadata, RetrievalOptions, RetrievalResponse, RetrievedMemory, SearchMethod,
};
use engram_core::{EngineConfig, EngramError, EngramResult};
use engram_embeddings::EmbeddingEngine;
use engram_index::{Bm25Stats, HnswIndex};

use crate::fusion::{self, FusedItem};
use crate::rerank::{self, RerankItem};
use crate::result_cache::{self, ResultCache};
use crate::{decay, expansion};

/// A candidate flowing through the pipeline stages.
#[derive(Debug, Clone)]
pub struct RankedMemory {
    pub id: i64,
    pub content: String,
    pub character_id: Option<String>,
    pub created_at: i64,
    pub importance: f32,
    pub metadata: Option<serde_json::Value>,
    /// Dense cosine similarity; 0 for sparse-only candidates.
    pub similarity: f64,
    /// Effective score, rewritten by fusion, decay, and re-ranking.
    pub score: f64,
    pub temporal_weight: f64,
}

pub struct RetrievalPipeline {
    index: Arc<RwLock<HnswIndex>>,
    bm25: Arc<RwLock<Bm25Stats>>,
    embeddings: Arc<EmbeddingEngine>,
    result_cache: ResultCache,
    config: EngineConfig,
}

fn poisoned() -> EngramError {
    EngramError::IndexInconsistency { details: "index lock poisoned".to_string() }
}

impl RetrievalPipeline {
    pub fn new(
        config: EngineConfig,
        index: Arc<RwLock<HnswIndex>>,
        bm25: Arc<RwLock<Bm25Stats>>,
        embeddings: Arc<EmbeddingEngine>,
    ) -> Self {
        let result_cache = ResultCache::new(
            config.result_cache_size,
            Duration::from_millis(config.result_cache_ttl_ms),
        );
        Self { index, bm25, embeddings, result_cache, config }
    }

    pub async fn retrieve(
        &self,
        user_id: &str,
        query: &str,
        options: &RetrievalOptions,
    ) -> EngramResult<RetrievalResponse> {
        let started = Instant::now();
        if user_id.is_empty() {
            return Err(EngramError::invalid("user_id must not be empty"));
        }
        if query.trim().is_empty() {
            return Err(EngramError::invalid("query must not be empty"));
        }

        let cache_key = result_cache::key(user_id, query, options);
        if let Some(mut cached) = self.result_cache.get(&cache_key) {
            debug!(user_id, "result cache hit");
            cached.performance_ms = started.elapsed().as_millis() as u64;
            return Ok(cached);
        }

        // Variants: original first; the rest warm the embedding cache for
        // follow-up queries.
        let variants = if options.use_expansion {
            expansion::variants(query, 2)
        } else {
            vec![query.to_string()]
        };
        debug!(user_id, variants = variants.len(), "query variants prepared");

        let mut variant_embeddings = self.embeddings.embed_many(&variants).await;
        let primary = match variant_embeddings.drain(..).next() {
            Some(result) => result?,
            None => return Err(EngramError::embedding("no query variant to embed")),
        };

        let limit = options.limit.max(1);
        let fetch = limit * 3;
        let uid = user_id.to_string();
        let cid = options.character_id.clone();
        let matches = |m: &NodeMetadata| {
            m.user_id == uid
                && cid
                    .as_ref()
                    .map_or(true, |c| m.character_id.as_deref() == Some(c.as_str()))
        };

        // Dense channel.
        let (dense_list, mut meta_by_id) = {
            let index = self.index.read().map_err(|_| poisoned())?;
            let hits = index.search(&primary, fetch, Some(&matches));
            let mut metas: HashMap<i64, NodeMetadata> = HashMap::new();
            for hit in &hits {
                if let Some(meta) = index.metadata(hit.id) {
                    metas.insert(hit.id, meta.clone());
                }
            }
            let list: Vec<(i64, f64)> = hits.iter().map(|h| (h.id, h.similarity)).collect();
            (list, metas)
        };

        // Sparse channel: lexical scan over this user's metadata.
        let use_hybrid = options.use_hybrid && self.config.hybrid_search_enabled;
        let sparse_list: Vec<(i64, f64)> = if use_hybrid {
            let candidates: Vec<(i64, NodeMetadata)> = {
                let index = self.index.read().map_err(|_| poisoned())?;
                index
                    .metadata_map()
                    .iter()
                    .filter(|(_, m)| matches(m) && !m.content.is_empty())
                    .map(|(id, m)| (*id, m.clone()))
                    .collect()
            };
            let bm25 = self.bm25.read().map_err(|_| poisoned())?;
            let mut scored: Vec<(i64, f64)> = Vec::new();
            for (id, meta) in candidates {
                let score = bm25.score(query, &meta.content);
                if score > 0.0 {
                    meta_by_id.entry(id).or_insert(meta);
                    scored.push((id, score));
                }
            }
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            scored.truncate(fetch);
            scored
        } else {
            Vec::new()
        };

        debug!(
            dense = dense_list.len(),
            sparse = sparse_list.len(),
            "channel search complete"
        );

        // Fusion. RRF scores are rescaled so the best candidate sits at
        // 1.0 and stays comparable with the similarity threshold.
        let fused: Vec<FusedItem> = if use_hybrid {
            if self.config.use_rrf {
                let mut fused =
                    fusion::reciprocal_rank(&dense_list, &sparse_list, self.config.rrf_k);
                fusion::normalize_scores(&mut fused);
                fused
            } else {
                fusion::linear(
                    &dense_list,
                    &sparse_list,
                    self.config.semantic_weight,
                    self.config.keyword_weight,
                )
            }
        } else {
            dense_list
                .iter()
                .map(|(id, similarity)| FusedItem {
                    id: *id,
                    score: *similarity,
                    dense_similarity: Some(*similarity),
                    sparse_score: None,
                })
                .collect()
        };

        let mut items: Vec<RankedMemory> = fused
            .into_iter()
            .filter_map(|f| {
                meta_by_id.get(&f.id).map(|m| RankedMemory {
                    id: f.id,
                    content: m.content.clone(),
                    character_id: m.character_id.clone(),
                    created_at: m.created_at,
                    importance: m.importance,
                    metadata: m.metadata.clone(),
                    similarity: f.dense_similarity.unwrap_or(0.0),
                    score: f.score,
                    temporal_weight: 1.0,
                })
            })
            .collect();

        // Temporal decay on the effective score, never on similarity.
        if self.config.temporal_decay_enabled {
            let now = chrono::Utc::now().timestamp();
            for item in &mut items {
                let age = (now - item.created_at).max(0) as f64;
                let weight = decay::temporal_weight(
                    age,
                    self.config.temporal_half_life_days,
                    self.config.temporal_min_weight,
                );
                item.temporal_weight = weight;
                item.score = decay::apply(item.score, weight);
            }
        }

        // Re-rank only when there is something to cut.
        let used_reranking =
            options.use_reranking && self.config.reranking_enabled && items.len() > limit;
        if used_reranking {
            let mut rerank_items: Vec<RerankItem> = items
                .iter()
                .map(|i| RerankItem {
                    id: i.id,
                    content: i.content.clone(),
                    similarity: i.similarity,
                    importance: i.importance as f64,
                    score: i.score,
                })
                .collect();
            rerank::rerank_scores(
                &mut rerank_items,
                query,
                self.config.diversity_penalty,
                limit,
            );
            let mut by_id: HashMap<i64, RankedMemory> =
                items.into_iter().map(|i| (i.id, i)).collect();
            items = rerank_items
                .into_iter()
                .filter_map(|r| {
                    by_id.remove(&r.id).map(|mut item| {
                        item.score = r.score;
                        item
                    })
                })
                .collect();
        } else {
            items.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }

        // Threshold on the effective score, then the caller's limit.
        items.retain(|i| i.score >= options.min_similarity);
        let total_found = items.len();
        items.truncate(limit);

        let response = RetrievalResponse {
            results: items
                .into_iter()
                .map(|i| RetrievedMemory {
                    id: i.id,
                    character_id: i.character_id,
                    content: i.content,
                    similarity: i.similarity,
                    score: i.score,
                    created_at: i.created_at,
                    metadata: if options.include_metadata { i.metadata } else { None },
                    importance: i.importance,
                    temporal_weight: i.temporal_weight,
                })
                .collect(),
            total_found,
            search_method: if use_hybrid { SearchMethod::Hybrid } else { SearchMethod::Semantic },
            used_expansion: options.use_expansion,
            used_reranking,
            performance_ms: started.elapsed().as_millis() as u64,
        };

        self.result_cache.put(cache_key, response.clone());
        info!(
            user_id,
            results = response.results.len(),
            method = ?response.search_method,
            ms = response.performance_ms,
            "retrieval complete"
        );
        Ok(response)
    }

    pub fn result_cache(&self) -> &ResultCache {
        &self.result_cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
