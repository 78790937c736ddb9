//! # engram-embeddings
//!
//! Everything between a piece of text and its 768-dim unit vector:
//! provider clients, the three-tier embedding cache, the bounded
//! connection gate for outbound requests, and the batch coalescer.
//! `EmbeddingEngine` ties the layers together.

pub mod batcher;
pub mod cache;
pub mod engine;
pub mod pool;
pub mod provider;

pub use batcher::BatchEmbedder;
pub use cache::{CacheTier, DurableCache, EmbeddingCache};
pub use engine::EmbeddingEngine;
pub use pool::{PoolSnapshot, RequestGate};
pub use provider::{EmbeddingClient, HashEmbeddingClient, HttpEmbeddingClient};
