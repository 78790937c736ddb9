//! # engram-core
//!
//! Foundation crate for the Engram memory engine.
//! Defines the shared types, traits, errors, config, constants, and the
//! float-vector primitives. Every other crate in the workspace depends
//! on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod traits;
pub mod vector;

// Re-export the most commonly used types at the crate root.
pub use config::EngineConfig;
pub use errors::{EngramError, EngramResult};
pub use models::{
    EmbeddingStatus, IndexHealthReport, MemoryRecord, NewMemory, NodeMetadata, PackedContext,
    RetrievalOptions, RetrievalResponse, RetrievedMemory, SearchMethod,
};
pub use traits::MemoryStore;
