//! Best-first graph search: greedy descent through the upper layers,
//! bounded beam at layer 0.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use tracing::debug;

use engram_core::models::NodeMetadata;
use engram_core::vector;

use super::{Candidate, HnswIndex, SearchHit};

impl HnswIndex {
    /// Greedy single-step descent: follow edges while a closer neighbor
    /// exists in the layer. Ties break toward the smaller id.
    pub(crate) fn greedy_closest(&self, q: &[f32], start: i64, layer: usize) -> i64 {
        let mut best = start;
        let mut best_dist = self.distance_to(q, start);
        loop {
            let mut improved = false;
            if let Some(neighbors) = self.layers[layer].get(&best) {
                for &n in neighbors {
                    let d = self.distance_to(q, n);
                    if d < best_dist || (d == best_dist && n < best) {
                        best = n;
                        best_dist = d;
                        improved = true;
                    }
                }
            }
            if !improved {
                return best;
            }
        }
    }

    /// Bounded best-first search within one layer. Maintains a frontier
    /// min-heap and a results max-heap of size <= ef; terminates when the
    /// best frontier distance exceeds the worst kept distance with the
    /// result set full. Returns candidates sorted ascending by
    /// (distance, id). Nodes without vectors are dead ends.
    pub(crate) fn search_layer(&self, q: &[f32], entry: i64, ef: usize, layer: usize) -> Vec<Candidate> {
        let mut visited: HashSet<i64> = HashSet::new();
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        let entry_dist = self.distance_to(q, entry);
        visited.insert(entry);
        let first = Candidate { dist: entry_dist, id: entry };
        frontier.push(Reverse(first));
        if entry_dist.is_finite() {
            results.push(first);
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if results.len() >= ef {
                if let Some(worst) = results.peek() {
                    if current > *worst {
                        break;
                    }
                }
            }
            let Some(neighbors) = self.layers[layer].get(&current.id) else {
                continue;
            };
            for &n in neighbors {
                if !visited.insert(n) {
                    continue;
                }
                let d = self.distance_to(q, n);
                if !d.is_finite() {
                    continue;
                }
                let candidate = Candidate { dist: d, id: n };
                let admit = results.len() < ef
                    || results.peek().map_or(true, |worst| candidate < *worst);
                if admit {
                    frontier.push(Reverse(candidate));
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out = results.into_vec();
        out.sort();
        out
    }

    /// Approximate k-nearest search with an optional metadata predicate.
    ///
    /// An empty index returns an empty list. The effective beam width is
    /// `max(ef_search, k)` so oversized k degrades to exhaustive behavior
    /// on small graphs. Filter-mismatched candidates are skipped, never
    /// errors.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&dyn Fn(&NodeMetadata) -> bool>,
    ) -> Vec<SearchHit> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let q = vector::normalize(query.to_vec());

        let mut ep = entry;
        for layer in (1..=self.entry_level).rev() {
            ep = self.greedy_closest(&q, ep, layer);
        }

        let ef = self.config.ef_search.max(k);
        let candidates = self.search_layer(&q, ep, ef, 0);

        let mut skipped = 0usize;
        let mut hits = Vec::with_capacity(k.min(candidates.len()));
        for c in candidates {
            let Some(meta) = self.metadata.get(&c.id) else {
                skipped += 1;
                continue;
            };
            if let Some(pred) = filter {
                if !pred(meta) {
                    skipped += 1;
                    continue;
                }
            }
            hits.push(SearchHit {
                id: c.id,
                distance: c.dist,
                similarity: 1.0 - c.dist as f64,
            });
            if hits.len() == k {
                break;
            }
        }

        if skipped > 0 {
            debug!(skipped, returned = hits.len(), "search skipped filtered candidates");
        }
        hits
    }
}
