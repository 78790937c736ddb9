use serde::{Deserialize, Serialize};

/// Findings from an HNSW index consistency sweep.
///
/// An insert that fails partway is not rolled back; this report is the
/// recovery path that enumerates what disagrees.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexHealthReport {
    /// Ids present in the vector map but missing metadata.
    pub missing_metadata: Vec<i64>,
    /// Ids referenced by layer adjacency without a vector or metadata.
    pub orphaned_nodes: Vec<i64>,
    /// Human-readable size mismatches among (node_count, vectors, metadata).
    pub count_mismatches: Vec<String>,
}

impl IndexHealthReport {
    pub fn healthy(&self) -> bool {
        self.missing_metadata.is_empty()
            && self.orphaned_nodes.is_empty()
            && self.count_mismatches.is_empty()
    }
}
