//! Immutable graph snapshot
//!
//! A frozen arena view of the wants graph: accounts and item labels become
//! contiguous integer indices, adjacency is a compact table. SCC
//! decomposition and cycle enumeration run against snapshots while further
//! deltas proceed against the live store, so none of the algorithmic code
//! ever holds a lock.
//!
//! Account indices follow sorted-id order, which makes "lexicographically
//! smallest account" comparisons on indices equivalent to comparisons on the
//! identifiers themselves.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// One adjacency entry: all parallel edges from the owning node to `to`,
/// one label per distinct item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjEntry {
    pub to: usize,
    /// Interned item indices, sorted
    pub labels: Vec<usize>,
}

/// Frozen view of one tenant's wants graph
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    generation: u64,
    account_ids: Vec<String>,
    account_index: BTreeMap<String, usize>,
    item_ids: Vec<String>,
    valuations: Vec<Option<f64>>,
    adjacency: Vec<Vec<AdjEntry>>,
    reverse: Vec<Vec<usize>>,
    edge_count: usize,
}

impl GraphSnapshot {
    pub(crate) fn new(
        generation: u64,
        account_ids: Vec<String>,
        item_ids: Vec<String>,
        valuations: Vec<Option<f64>>,
        adjacency: Vec<Vec<AdjEntry>>,
        reverse: Vec<Vec<usize>>,
    ) -> Self {
        let account_index = account_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        let edge_count = adjacency
            .iter()
            .flat_map(|entries| entries.iter())
            .map(|entry| entry.labels.len())
            .sum();
        Self {
            generation,
            account_ids,
            account_index,
            item_ids,
            valuations,
            adjacency,
            reverse,
            edge_count,
        }
    }

    /// Store generation this snapshot was frozen at
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn account_count(&self) -> usize {
        self.account_ids.len()
    }

    /// Parallel edges counted individually
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn account_id(&self, idx: usize) -> &str {
        &self.account_ids[idx]
    }

    pub fn index_of_account(&self, id: &str) -> Option<usize> {
        self.account_index.get(id).copied()
    }

    pub fn item_id(&self, idx: usize) -> &str {
        &self.item_ids[idx]
    }

    /// Interned index of an item label; labels are interned in sorted order
    pub fn index_of_item(&self, id: &str) -> Option<usize> {
        self.item_ids.binary_search_by(|probe| probe.as_str().cmp(id)).ok()
    }

    pub fn item_count(&self) -> usize {
        self.item_ids.len()
    }

    /// Valuation of the interned item, when the submitter provided one
    pub fn valuation(&self, item_idx: usize) -> Option<f64> {
        self.valuations[item_idx]
    }

    /// Outgoing adjacency of a node, sorted by target index
    pub fn adjacency(&self, node: usize) -> &[AdjEntry] {
        &self.adjacency[node]
    }

    /// Sources with at least one edge into `node`, sorted
    pub fn reverse(&self, node: usize) -> &[usize] {
        &self.reverse[node]
    }

    /// Nodes that can participate in a cycle through any of `seeds`:
    /// the intersection of the forward and backward reachability closures.
    ///
    /// Used to restrict incremental re-discovery to the dirty region; cycles
    /// avoiding every seed are untouched by the triggering deltas and stay
    /// valid in the cache.
    pub fn cycle_closure(&self, seeds: &BTreeSet<usize>) -> BTreeSet<usize> {
        let forward = self.bfs(seeds, false);
        let backward = self.bfs(seeds, true);
        forward.intersection(&backward).copied().collect()
    }

    fn bfs(&self, seeds: &BTreeSet<usize>, reversed: bool) -> BTreeSet<usize> {
        let mut seen: BTreeSet<usize> = seeds.clone();
        let mut frontier: Vec<usize> = seeds.iter().copied().collect();
        while let Some(node) = frontier.pop() {
            if reversed {
                for &source in &self.reverse[node] {
                    if seen.insert(source) {
                        frontier.push(source);
                    }
                }
            } else {
                for entry in &self.adjacency[node] {
                    if seen.insert(entry.to) {
                        frontier.push(entry.to);
                    }
                }
            }
        }
        seen
    }
}
