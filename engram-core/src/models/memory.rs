use serde::{Deserialize, Serialize};

use crate::constants::EMBEDDING_DIM;
use crate::errors::{EngramError, EngramResult};
use crate::vector;

/// Lifecycle state of a memory row's embedding.
///
/// A row is created `Pending`, then transitions exactly once to
/// `Completed` (embedding written back) or `Failed`, and is never
/// mutated afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    Pending,
    Completed,
    Failed,
}

impl EmbeddingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> EngramResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(EngramError::store(format!("unknown embedding status: {other}"))),
        }
    }
}

/// A memory item as stored: one row per remembered utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Store-assigned identifier, unique and stable across restarts.
    pub id: i64,
    /// Owning user.
    pub user_id: String,
    /// Optional owning character within the user's account.
    pub character_id: Option<String>,
    /// UTF-8 content, never empty.
    pub content: String,
    /// Creation time, Unix seconds.
    pub created_at: i64,
    /// Author-assigned importance in [0, 1].
    pub importance: f32,
    /// Emotional weight in [-1, 1].
    pub emotional_weight: f32,
    /// Opaque key-value bag, preserved verbatim.
    pub metadata: Option<serde_json::Value>,
    /// 768-component unit vector, or None while pending/failed.
    pub embedding: Option<Vec<f32>>,
    pub status: EmbeddingStatus,
}

impl MemoryRecord {
    /// Validate the stored-record invariants: non-empty content and, when
    /// present, a 768-component unit-norm embedding.
    pub fn validate(&self) -> EngramResult<()> {
        if self.content.is_empty() {
            return Err(EngramError::invalid("memory content must not be empty"));
        }
        if let Some(ref emb) = self.embedding {
            if emb.len() != EMBEDDING_DIM {
                return Err(EngramError::invalid(format!(
                    "embedding has {} components, expected {EMBEDDING_DIM}",
                    emb.len()
                )));
            }
            if !vector::is_unit(emb) {
                return Err(EngramError::invalid("embedding is not unit-norm"));
            }
        }
        Ok(())
    }

    /// The metadata projection carried into the HNSW index.
    pub fn node_metadata(&self) -> NodeMetadata {
        NodeMetadata {
            user_id: self.user_id.clone(),
            character_id: self.character_id.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
            importance: self.importance,
            emotional_weight: self.emotional_weight,
            metadata: self.metadata.clone(),
        }
    }
}

/// Input to ingest: everything the caller supplies for a new memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemory {
    pub user_id: String,
    pub character_id: Option<String>,
    pub content: String,
    pub created_at: i64,
    pub importance: f32,
    pub emotional_weight: f32,
    pub metadata: Option<serde_json::Value>,
}

impl NewMemory {
    pub fn validate(&self) -> EngramResult<()> {
        if self.content.trim().is_empty() {
            return Err(EngramError::invalid("memory content must not be empty"));
        }
        if self.user_id.is_empty() {
            return Err(EngramError::invalid("user_id must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.importance) {
            return Err(EngramError::invalid("importance must be within [0, 1]"));
        }
        if !(-1.0..=1.0).contains(&self.emotional_weight) {
            return Err(EngramError::invalid("emotional_weight must be within [-1, 1]"));
        }
        Ok(())
    }
}

/// Metadata projection stored next to each HNSW node. The opaque bag
/// rides along verbatim so responses can return it without a store read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub user_id: String,
    pub character_id: Option<String>,
    pub content: String,
    pub created_at: i64,
    pub importance: f32,
    pub emotional_weight: f32,
    pub metadata: Option<serde_json::Value>,
}
