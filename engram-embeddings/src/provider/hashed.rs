//! Deterministic in-process embedding fallback.
//!
//! Hashes each token into one of 768 buckets and normalizes the bucket
//! counts. Texts sharing vocabulary land near each other in cosine
//! space, which is enough for offline operation and for exercising the
//! full pipeline in tests without a remote model.

use async_trait::async_trait;

use engram_core::constants::EMBEDDING_DIM;
use engram_core::errors::EngramResult;
use engram_core::vector;

use super::EmbeddingClient;

pub struct HashEmbeddingClient {
    model: String,
}

impl HashEmbeddingClient {
    pub fn new() -> Self {
        Self {
            model: "hashed-bow-768".to_string(),
        }
    }

    fn embed_sync(text: &str) -> Vec<f32> {
        let mut buckets = vec![0.0f32; EMBEDDING_DIM];
        let lowered = text.to_lowercase();
        let mut any = false;
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
        {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let h = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]);
            buckets[(h % EMBEDDING_DIM as u64) as usize] += 1.0;
            any = true;
        }
        if !any {
            // Content with no usable tokens still needs a unit vector.
            buckets[0] = 1.0;
        }
        vector::normalize(buckets)
    }
}

impl Default for HashEmbeddingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn embed(&self, prompt: &str) -> EngramResult<Vec<f32>> {
        Ok(Self::embed_sync(prompt))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
