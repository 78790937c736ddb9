//! # engram-storage
//!
//! SQLite-backed implementation of the `MemoryStore` trait. Rows are
//! inserted `pending`, mutated exactly once by the background embedder,
//! and read back in bulk at startup.

mod store;

pub use store::SqliteStore;
