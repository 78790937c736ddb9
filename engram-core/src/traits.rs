//! Trait seams between the engine and its collaborators.

use crate::errors::EngramResult;
use crate::models::{MemoryRecord, NewMemory};

/// Persistent memory store. The engine treats the store as append-only:
/// rows are inserted pending, mutated exactly once by the background
/// embedder, and never touched again.
pub trait MemoryStore: Send + Sync {
    /// Insert a new row with status `pending`, returning its id.
    fn insert(&self, memory: &NewMemory) -> EngramResult<i64>;

    /// All rows with a non-null embedding, for startup index load.
    fn load_embedded(&self) -> EngramResult<Vec<MemoryRecord>>;

    /// Write back both blob and float-array forms, status `completed`.
    fn complete_embedding(&self, id: i64, embedding: &[f32]) -> EngramResult<()>;

    /// Mark a row's embedding generation as permanently failed.
    fn fail_embedding(&self, id: i64) -> EngramResult<()>;
}
