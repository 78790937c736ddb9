//! Hierarchical navigable small-world graph over 768-dim unit vectors.
//!
//! Adjacency is kept in flat id-keyed maps, one per layer; neighbor
//! references are ids, never ownership handles, because the graph is
//! undirected and cyclic. The index itself has no interior locking:
//! the engine wraps it in a reader-writer lock, which serializes inserts
//! and gives every search a self-consistent snapshot.

mod search;

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error};

use engram_core::constants::EMBEDDING_DIM;
use engram_core::models::{IndexHealthReport, NodeMetadata};
use engram_core::vector;
use engram_core::{EngineConfig, EngramError, EngramResult};

/// Graph shape parameters.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Max neighbors per node per layer.
    pub m: usize,
    /// Dynamic candidate set size during insertion.
    pub ef_construction: usize,
    /// Dynamic candidate set size during search.
    pub ef_search: usize,
    /// Number of layers, 0..max_layers.
    pub max_layers: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            max_layers: 5,
        }
    }
}

impl HnswConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            m: config.hnsw_m,
            ef_construction: config.hnsw_ef_construction,
            ef_search: config.hnsw_ef_search,
            max_layers: config.hnsw_max_layers,
        }
    }
}

/// One search result: distance is Euclidean, similarity is `1 - distance`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: i64,
    pub distance: f32,
    pub similarity: f64,
}

/// Heap entry ordered by (distance, id). Ties in distance break by id
/// ascending, which keeps search results deterministic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub dist: f32,
    pub id: i64,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// The layered proximity graph.
pub struct HnswIndex {
    config: HnswConfig,
    /// Normalized vectors by node id.
    vectors: HashMap<i64, Vec<f32>>,
    /// Metadata projection by node id. Key set must equal `vectors`.
    metadata: HashMap<i64, NodeMetadata>,
    /// Per-layer adjacency: node id -> neighbor ids. Symmetric.
    layers: Vec<HashMap<i64, BTreeSet<i64>>>,
    entry_point: Option<i64>,
    /// Top layer of the entry point, which is always the max assigned level.
    entry_level: usize,
    node_count: usize,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(config: HnswConfig) -> Self {
        Self::with_seed(config, rand::thread_rng().gen())
    }

    /// Deterministic construction for tests.
    pub fn with_seed(config: HnswConfig, seed: u64) -> Self {
        let layers = (0..config.max_layers).map(|_| HashMap::new()).collect();
        Self {
            config,
            vectors: HashMap::new(),
            metadata: HashMap::new(),
            layers,
            entry_point: None,
            entry_level: 0,
            node_count: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.node_count
    }

    pub fn is_empty(&self) -> bool {
        self.node_count == 0
    }

    pub fn contains(&self, id: i64) -> bool {
        self.vectors.contains_key(&id)
    }

    pub fn vector(&self, id: i64) -> Option<&Vec<f32>> {
        self.vectors.get(&id)
    }

    pub fn metadata(&self, id: i64) -> Option<&NodeMetadata> {
        self.metadata.get(&id)
    }

    /// The full metadata map, for lexical scans over the corpus.
    pub fn metadata_map(&self) -> &HashMap<i64, NodeMetadata> {
        &self.metadata
    }

    /// Number of nodes present in each layer, bottom-up.
    pub fn layer_sizes(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.len()).collect()
    }

    /// Draw a top layer for a new node: floor(-ln(U) / ln 2), clipped.
    fn random_level(&mut self) -> usize {
        let u: f64 = 1.0 - self.rng.gen::<f64>(); // (0, 1]
        let level = (-u.ln() / std::f64::consts::LN_2).floor() as usize;
        level.min(self.config.max_layers - 1)
    }

    /// Euclidean distance from a query to a stored node. A node whose
    /// vector is missing contributes +inf and can never become a result.
    pub(crate) fn distance_to(&self, q: &[f32], id: i64) -> f32 {
        match self.vectors.get(&id) {
            Some(v) => vector::euclidean(q, v),
            None => {
                debug!(id, "distance requested for node without vector");
                f32::INFINITY
            }
        }
    }

    /// Insert a node. Callers serialize inserts through a write lock;
    /// within that discipline inserts are totally ordered by arrival.
    pub fn insert(&mut self, id: i64, embedding: Vec<f32>, meta: NodeMetadata) -> EngramResult<()> {
        if embedding.len() != EMBEDDING_DIM {
            return Err(EngramError::invalid(format!(
                "vector has {} components, expected {EMBEDDING_DIM}",
                embedding.len()
            )));
        }
        if self.vectors.contains_key(&id) {
            return Err(EngramError::invalid(format!("node {id} already indexed")));
        }

        let v = vector::normalize(embedding);
        let level = self.random_level();

        self.vectors.insert(id, v.clone());
        self.metadata.insert(id, meta);
        for layer in 0..=level {
            self.layers[layer].entry(id).or_default();
        }
        self.node_count += 1;

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.entry_level = level;
            debug!(id, level, "first node becomes entry point");
            return Ok(());
        };

        // Greedy descent through the layers above the new node's level.
        let mut ep = entry;
        for layer in ((level + 1)..=self.entry_level).rev() {
            ep = self.greedy_closest(&v, ep, layer);
        }

        // Link into every layer the node occupies, nearest-first.
        for layer in (0..=level.min(self.entry_level)).rev() {
            let nearest = self.search_layer(&v, ep, self.config.ef_construction, layer);
            if let Some(best) = nearest.first() {
                ep = best.id;
            }
            let picked: Vec<i64> = nearest
                .iter()
                .filter(|c| c.id != id)
                .take(self.config.m)
                .map(|c| c.id)
                .collect();
            for neighbor in picked {
                self.layers[layer].entry(id).or_default().insert(neighbor);
                self.layers[layer].entry(neighbor).or_default().insert(id);
                let degree = self.layers[layer].get(&neighbor).map_or(0, |s| s.len());
                if degree > self.config.m {
                    self.prune(neighbor, layer);
                }
            }
        }

        if level > self.entry_level {
            self.entry_point = Some(id);
            self.entry_level = level;
            debug!(id, level, "entry point promoted");
        }

        if self.vectors.len() != self.metadata.len() || self.vectors.len() != self.node_count {
            // No rollback of partial state; health_check is the recovery path.
            error!(
                vectors = self.vectors.len(),
                metadata = self.metadata.len(),
                node_count = self.node_count,
                "index size invariant violated after insert"
            );
        }

        Ok(())
    }

    /// Reduce an over-degree node's edges to its `m` closest neighbors,
    /// removing the reverse edges of everything dropped.
    fn prune(&mut self, node: i64, layer: usize) {
        let Some(v) = self.vectors.get(&node).cloned() else {
            return;
        };
        let neighbor_ids: Vec<i64> = match self.layers[layer].get(&node) {
            Some(set) => set.iter().copied().collect(),
            None => return,
        };

        let mut ranked: Vec<Candidate> = neighbor_ids
            .iter()
            .map(|&n| Candidate {
                dist: self.distance_to(&v, n),
                id: n,
            })
            .collect();
        ranked.sort();

        if ranked.len() <= self.config.m {
            return;
        }
        let keep: BTreeSet<i64> = ranked.iter().take(self.config.m).map(|c| c.id).collect();
        let dropped: Vec<i64> = ranked.iter().skip(self.config.m).map(|c| c.id).collect();

        if let Some(set) = self.layers[layer].get_mut(&node) {
            *set = keep;
        }
        for d in dropped {
            if let Some(set) = self.layers[layer].get_mut(&d) {
                set.remove(&node);
            }
        }
    }

    /// Insert a batch sequentially under the caller's already-held lock,
    /// reporting per-item outcomes. The three maps remain consistent on
    /// completion regardless of individual failures.
    pub fn batch_insert(
        &mut self,
        items: Vec<(i64, Vec<f32>, NodeMetadata)>,
    ) -> Vec<(i64, EngramResult<()>)> {
        items
            .into_iter()
            .map(|(id, v, meta)| {
                let result = self.insert(id, v, meta);
                (id, result)
            })
            .collect()
    }

    /// Enumerate consistency violations across the three maps.
    pub fn health_check(&self) -> IndexHealthReport {
        let mut report = IndexHealthReport::default();

        for id in self.vectors.keys() {
            if !self.metadata.contains_key(id) {
                report.missing_metadata.push(*id);
            }
        }
        report.missing_metadata.sort_unstable();

        let mut referenced: BTreeSet<i64> = BTreeSet::new();
        for layer in &self.layers {
            for (id, neighbors) in layer {
                referenced.insert(*id);
                referenced.extend(neighbors.iter().copied());
            }
        }
        for id in referenced {
            if !self.vectors.contains_key(&id) || !self.metadata.contains_key(&id) {
                report.orphaned_nodes.push(id);
            }
        }

        if self.node_count != self.vectors.len() {
            report.count_mismatches.push(format!(
                "node_count {} != vectors {}",
                self.node_count,
                self.vectors.len()
            ));
        }
        if self.node_count != self.metadata.len() {
            report.count_mismatches.push(format!(
                "node_count {} != metadata {}",
                self.node_count,
                self.metadata.len()
            ));
        }

        report
    }
}
