//! # engram-index
//!
//! In-process search structures: the layered HNSW proximity graph for
//! approximate nearest-neighbor search and the BM25 lexical scorer.
//! Neither suspends; callers provide their own locking discipline.

pub mod bm25;
pub mod hnsw;

pub use bm25::{tokenize, Bm25Stats};
pub use hnsw::{HnswConfig, HnswIndex, SearchHit};
