//! # engram-retrieval
//!
//! The query side of the engine: expansion, dual-channel retrieval,
//! rank fusion, temporal decay, cross-encoder-style re-ranking, result
//! caching, and dynamic context packing. `RetrievalPipeline` orchestrates
//! the full flow.

pub mod context;
pub mod decay;
pub mod expansion;
pub mod fusion;
pub mod pipeline;
pub mod rerank;
pub mod result_cache;

pub use pipeline::{RankedMemory, RetrievalPipeline};
pub use result_cache::ResultCache;
