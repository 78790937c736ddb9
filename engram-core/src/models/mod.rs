//! Shared data models for the memory engine.

mod health;
mod memory;
mod retrieval;

pub use health::IndexHealthReport;
pub use memory::{EmbeddingStatus, MemoryRecord, NewMemory, NodeMetadata};
pub use retrieval::{
    PackedContext, RetrievalOptions, RetrievalResponse, RetrievedMemory, SearchMethod,
};
