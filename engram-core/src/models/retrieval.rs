use serde::{Deserialize, Serialize};

/// Which retrieval channels produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Semantic,
    Hybrid,
}

/// Per-query knobs. Field defaults match `EngineConfig` defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalOptions {
    pub limit: usize,
    pub character_id: Option<String>,
    pub min_similarity: f64,
    pub use_hybrid: bool,
    pub use_reranking: bool,
    pub use_expansion: bool,
    pub include_metadata: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            character_id: None,
            min_similarity: 0.3,
            use_hybrid: true,
            use_reranking: true,
            use_expansion: true,
            include_metadata: true,
        }
    }
}

impl RetrievalOptions {
    /// Canonical string form used in result-cache keys. Stable across
    /// field reordering because it is hand-rendered.
    pub fn cache_key_part(&self) -> String {
        format!(
            "limit={};char={};min={};hybrid={};rerank={};expand={};meta={}",
            self.limit,
            self.character_id.as_deref().unwrap_or("-"),
            self.min_similarity,
            self.use_hybrid,
            self.use_reranking,
            self.use_expansion,
            self.include_metadata
        )
    }
}

/// One ranked item in a retrieval response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMemory {
    pub id: i64,
    pub character_id: Option<String>,
    pub content: String,
    /// Dense cosine similarity (0 for sparse-only items).
    pub similarity: f64,
    /// Effective ranking score after fusion, decay, and re-ranking.
    pub score: f64,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub importance: f32,
    /// Temporal decay weight applied to this item's score.
    pub temporal_weight: f64,
}

/// Full engine-boundary response for one retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub results: Vec<RetrievedMemory>,
    pub total_found: usize,
    pub search_method: SearchMethod,
    pub used_expansion: bool,
    pub used_reranking: bool,
    pub performance_ms: u64,
}

/// Result of packing retrieved items into an LLM token budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackedContext {
    /// Concatenated content of the selected items, in pack order.
    pub text: String,
    /// Ids of the selected items.
    pub selected: Vec<i64>,
    /// Estimated token total of `text`.
    pub estimated_tokens: usize,
}
