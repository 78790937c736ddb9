//! Embedding provider clients.
//!
//! The remote model is an opaque service behind `EmbeddingClient`; the
//! hashed client is the always-available in-process fallback used by
//! tests and offline operation.

mod hashed;
mod http;

use async_trait::async_trait;

use engram_core::errors::EngramResult;

pub use hashed::HashEmbeddingClient;
pub use http::HttpEmbeddingClient;

/// One prompt in, one 768-float vector out.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, prompt: &str) -> EngramResult<Vec<f32>>;

    /// Model identifier, used in cache keys.
    fn model_name(&self) -> &str;
}
