//! Strongly connected component decomposition
//!
//! Tarjan's algorithm expressed iteratively (explicit frame stack) so graphs
//! with millions of nodes cannot overflow the call stack. Progress is
//! accounted in batches of `TARJAN_BATCH` nodes; after each batch the run
//! context is polled and on expiry the decomposer returns the components
//! completed so far marked `timed_out`. Partial components are usable as
//! long as cycle enumeration is limited to them.
//!
//! For snapshots above `PARALLEL_SCC_THRESHOLD` nodes a chunked variant
//! splits the node range into contiguous chunks, runs Tarjan on each induced
//! subgraph in parallel, and merges through the condensation: local
//! components become quotient nodes, cross-chunk edges are projected onto
//! them, and a sequential Tarjan over the (much smaller) quotient graph
//! drives a union-find over local component ids. Two nodes land in the same
//! merged component iff their local components are strongly connected
//! through the quotient, which holds exactly when the nodes are strongly
//! connected in the full graph.

use crate::graph::snapshot::GraphSnapshot;
use crate::runtime::RunContext;
use std::collections::BTreeSet;

/// Nodes processed between deadline/cancellation polls
pub const TARJAN_BATCH: usize = 2000;

/// Snapshot size at which the chunked parallel variant kicks in
pub const PARALLEL_SCC_THRESHOLD: usize = 1000;

/// Target chunk size for the parallel variant
const PARALLEL_CHUNK_TARGET: usize = 500;

/// Decomposition output, possibly partial
#[derive(Debug, Clone, Default)]
pub struct SccResult {
    /// Non-trivial components (≥ 2 nodes), each sorted, ordered by their
    /// smallest member
    pub sccs: Vec<Vec<usize>>,

    /// True when the deadline or cancellation cut the run short
    pub timed_out: bool,

    /// Nodes visited before returning
    pub processed_nodes: usize,
}

/// Find non-trivial SCCs, choosing the sequential or parallel variant by
/// snapshot size.
pub fn find_sccs_auto(
    snapshot: &GraphSnapshot,
    restrict: Option<&BTreeSet<usize>>,
    workers: usize,
    ctx: &RunContext,
) -> SccResult {
    let scope_len = restrict
        .map(|s| s.len())
        .unwrap_or_else(|| snapshot.account_count());
    if scope_len >= PARALLEL_SCC_THRESHOLD && workers > 1 {
        find_sccs_parallel(snapshot, restrict, workers, ctx)
    } else {
        find_sccs(snapshot, restrict, ctx)
    }
}

/// Sequential iterative Tarjan over the snapshot, optionally restricted to a
/// node subset (the induced subgraph).
pub fn find_sccs(
    snapshot: &GraphSnapshot,
    restrict: Option<&BTreeSet<usize>>,
    ctx: &RunContext,
) -> SccResult {
    let (components, timed_out, processed) = tarjan_components(snapshot, restrict, ctx);
    let mut sccs: Vec<Vec<usize>> = components
        .into_iter()
        .filter(|component| component.len() >= 2)
        .collect();
    sccs.sort_by_key(|component| component[0]);
    SccResult {
        sccs,
        timed_out,
        processed_nodes: processed,
    }
}

/// Chunked parallel Tarjan with condensation merge.
pub fn find_sccs_parallel(
    snapshot: &GraphSnapshot,
    restrict: Option<&BTreeSet<usize>>,
    workers: usize,
    ctx: &RunContext,
) -> SccResult {
    let nodes: Vec<usize> = match restrict {
        Some(set) => set.iter().copied().collect(),
        None => (0..snapshot.account_count()).collect(),
    };
    let n = nodes.len();
    let chunk_count = workers.min(n.div_ceil(PARALLEL_CHUNK_TARGET)).max(1);
    if chunk_count <= 1 {
        return find_sccs(snapshot, restrict, ctx);
    }

    let chunk_size = n.div_ceil(chunk_count);
    let chunks: Vec<BTreeSet<usize>> = nodes
        .chunks(chunk_size)
        .map(|chunk| chunk.iter().copied().collect())
        .collect();

    // Phase 1: local Tarjan per chunk, in parallel
    let mut local_results: Vec<(Vec<Vec<usize>>, bool, usize)> = Vec::with_capacity(chunks.len());
    std::thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                let ctx = ctx.clone();
                scope.spawn(move || tarjan_components(snapshot, Some(chunk), &ctx))
            })
            .collect();
        for handle in handles {
            local_results.push(handle.join().expect("scc chunk worker panicked"));
        }
    });

    let mut timed_out = false;
    let mut processed = 0;
    let mut comp_of: Vec<Option<usize>> = vec![None; snapshot.account_count()];
    let mut comp_members: Vec<Vec<usize>> = Vec::new();
    for (components, chunk_timed_out, chunk_processed) in local_results {
        timed_out |= chunk_timed_out;
        processed += chunk_processed;
        for component in components {
            let comp_id = comp_members.len();
            for &node in &component {
                comp_of[node] = Some(comp_id);
            }
            comp_members.push(component);
        }
    }
    // Nodes a timed-out chunk never reached become singleton components so
    // the quotient stays well-formed.
    for &node in &nodes {
        if comp_of[node].is_none() {
            let comp_id = comp_members.len();
            comp_of[node] = Some(comp_id);
            comp_members.push(vec![node]);
        }
    }

    // Phase 2: condensation. Project every in-scope edge onto component ids
    let comp_count = comp_members.len();
    let mut quotient_edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); comp_count];
    let in_scope = |node: usize| restrict.map_or(true, |set| set.contains(&node));
    for &from in &nodes {
        let from_comp = comp_of[from].expect("every in-scope node has a component");
        for entry in snapshot.adjacency(from) {
            if !in_scope(entry.to) {
                continue;
            }
            let to_comp = comp_of[entry.to].expect("every in-scope node has a component");
            if from_comp != to_comp {
                quotient_edges[from_comp].insert(to_comp);
            }
        }
    }
    let quotient_adj: Vec<Vec<usize>> = quotient_edges
        .into_iter()
        .map(|targets| targets.into_iter().collect())
        .collect();

    // Phase 3: union components strongly connected through the quotient
    let mut union = UnionFind::new(comp_count);
    for quotient_scc in tarjan_adjacency(&quotient_adj) {
        for window in quotient_scc.windows(2) {
            union.union(window[0], window[1]);
        }
    }

    let mut grouped: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
    for (comp_id, members) in comp_members.iter().enumerate() {
        grouped
            .entry(union.find(comp_id))
            .or_default()
            .extend(members.iter().copied());
    }
    let mut sccs: Vec<Vec<usize>> = grouped
        .into_values()
        .filter(|component| component.len() >= 2)
        .map(|mut component| {
            component.sort_unstable();
            component
        })
        .collect();
    sccs.sort_by_key(|component| component[0]);

    SccResult {
        sccs,
        timed_out,
        processed_nodes: processed,
    }
}

// ============================================================================
// Core iterative Tarjan
// ============================================================================

struct DfsFrame {
    node: usize,
    /// Next adjacency entry to examine
    pos: usize,
}

/// Iterative Tarjan returning ALL components (singletons included), the
/// timeout flag, and the number of nodes visited. The parallel merge needs
/// singletons, the public API filters them.
fn tarjan_components(
    snapshot: &GraphSnapshot,
    restrict: Option<&BTreeSet<usize>>,
    ctx: &RunContext,
) -> (Vec<Vec<usize>>, bool, usize) {
    let n = snapshot.account_count();
    let in_scope = |node: usize| restrict.map_or(true, |set| set.contains(&node));

    let mut index: Vec<Option<u32>> = vec![None; n];
    let mut lowlink: Vec<u32> = vec![0; n];
    let mut on_stack: Vec<bool> = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut frames: Vec<DfsFrame> = Vec::new();
    let mut components: Vec<Vec<usize>> = Vec::new();

    let mut next_index: u32 = 0;
    let mut processed: usize = 0;
    let mut timed_out = false;

    let roots: Vec<usize> = match restrict {
        Some(set) => set.iter().copied().collect(),
        None => (0..n).collect(),
    };

    'roots: for root in roots {
        if index[root].is_some() {
            continue;
        }
        index[root] = Some(next_index);
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        frames.push(DfsFrame { node: root, pos: 0 });
        processed += 1;

        while let Some(frame) = frames.last_mut() {
            let node = frame.node;
            let adjacency = snapshot.adjacency(node);
            if frame.pos < adjacency.len() {
                let target = adjacency[frame.pos].to;
                frame.pos += 1;
                if !in_scope(target) {
                    continue;
                }
                match index[target] {
                    None => {
                        index[target] = Some(next_index);
                        lowlink[target] = next_index;
                        next_index += 1;
                        stack.push(target);
                        on_stack[target] = true;
                        frames.push(DfsFrame {
                            node: target,
                            pos: 0,
                        });
                        processed += 1;
                        if processed % TARJAN_BATCH == 0 && ctx.check().is_some() {
                            timed_out = true;
                            break 'roots;
                        }
                    }
                    Some(target_index) if on_stack[target] => {
                        lowlink[node] = lowlink[node].min(target_index);
                    }
                    Some(_) => {}
                }
            } else {
                frames.pop();
                if lowlink[node] == index[node].expect("visited node has an index") {
                    let mut component = Vec::new();
                    loop {
                        let member = stack.pop().expect("tarjan stack underflow");
                        on_stack[member] = false;
                        component.push(member);
                        if member == node {
                            break;
                        }
                    }
                    component.sort_unstable();
                    components.push(component);
                }
                if let Some(parent) = frames.last() {
                    lowlink[parent.node] = lowlink[parent.node].min(lowlink[node]);
                }
            }
        }
    }

    (components, timed_out, processed)
}

/// Tarjan over a plain adjacency list; used for the quotient graph, which is
/// small enough not to need deadline accounting.
fn tarjan_adjacency(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut index: Vec<Option<u32>> = vec![None; n];
    let mut lowlink: Vec<u32> = vec![0; n];
    let mut on_stack: Vec<bool> = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut frames: Vec<DfsFrame> = Vec::new();
    let mut components: Vec<Vec<usize>> = Vec::new();
    let mut next_index: u32 = 0;

    for root in 0..n {
        if index[root].is_some() {
            continue;
        }
        index[root] = Some(next_index);
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        frames.push(DfsFrame { node: root, pos: 0 });

        while let Some(frame) = frames.last_mut() {
            let node = frame.node;
            if frame.pos < adjacency[node].len() {
                let target = adjacency[node][frame.pos];
                frame.pos += 1;
                match index[target] {
                    None => {
                        index[target] = Some(next_index);
                        lowlink[target] = next_index;
                        next_index += 1;
                        stack.push(target);
                        on_stack[target] = true;
                        frames.push(DfsFrame {
                            node: target,
                            pos: 0,
                        });
                    }
                    Some(target_index) if on_stack[target] => {
                        lowlink[node] = lowlink[node].min(target_index);
                    }
                    Some(_) => {}
                }
            } else {
                frames.pop();
                if lowlink[node] == index[node].expect("visited node has an index") {
                    let mut component = Vec::new();
                    loop {
                        let member = stack.pop().expect("tarjan stack underflow");
                        on_stack[member] = false;
                        component.push(member);
                        if member == node {
                            break;
                        }
                    }
                    component.sort_unstable();
                    components.push(component);
                }
                if let Some(parent) = frames.last() {
                    lowlink[parent.node] = lowlink[parent.node].min(lowlink[node]);
                }
            }
        }
    }

    components
}

/// Union-find over local component ids for the condensation merge
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cursor = x;
        while self.parent[cursor] != root {
            let next = self.parent[cursor];
            self.parent[cursor] = root;
            cursor = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent[root_a.max(root_b)] = root_a.min(root_b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::store::{GraphStore, StoreLimits};
    use crate::models::Item;

    fn ring(n: usize) -> GraphSnapshot {
        let mut store = GraphStore::new(StoreLimits::default());
        for j in 0..n {
            store
                .apply_inventory_delta(&format!("a{:04}", j), vec![Item::new(format!("i{:04}", j))], vec![])
                .unwrap();
        }
        for j in 0..n {
            store
                .apply_want_delta(&format!("a{:04}", (j + 1) % n), vec![format!("i{:04}", j)], vec![])
                .unwrap();
        }
        store.snapshot()
    }

    #[test]
    fn ring_is_one_component() {
        let snap = ring(5);
        let result = find_sccs(&snap, None, &RunContext::unbounded());
        assert!(!result.timed_out);
        assert_eq!(result.sccs.len(), 1);
        assert_eq!(result.sccs[0].len(), 5);
    }

    #[test]
    fn chain_has_no_nontrivial_component() {
        // a owns i0 wanted by b; b owns i1 wanted by c; no way back
        let mut store = GraphStore::new(StoreLimits::default());
        store
            .apply_inventory_delta("a", vec![Item::new("i0".to_string())], vec![])
            .unwrap();
        store
            .apply_inventory_delta("b", vec![Item::new("i1".to_string())], vec![])
            .unwrap();
        store.apply_want_delta("b", vec!["i0".to_string()], vec![]).unwrap();
        store.apply_want_delta("c", vec!["i1".to_string()], vec![]).unwrap();

        let result = find_sccs(&store.snapshot(), None, &RunContext::unbounded());
        assert!(result.sccs.is_empty());
    }

    #[test]
    fn restriction_induces_subgraph() {
        // 4-ring, restricted to three nodes: the induced path has no cycle
        let snap = ring(4);
        let restrict: BTreeSet<usize> = [0, 1, 2].into_iter().collect();
        let result = find_sccs(&snap, Some(&restrict), &RunContext::unbounded());
        assert!(result.sccs.is_empty());

        let full: BTreeSet<usize> = (0..4).collect();
        let result = find_sccs(&snap, Some(&full), &RunContext::unbounded());
        assert_eq!(result.sccs.len(), 1);
    }

    #[test]
    fn expired_deadline_yields_partial_result() {
        let snap = ring(5000);
        let ctx = RunContext::with_deadline(std::time::Instant::now());
        let result = find_sccs(&snap, None, &ctx);
        assert!(result.timed_out);
        assert!(result.processed_nodes <= 5000);
    }

    #[test]
    fn parallel_merge_matches_sequential_on_ring() {
        // a ring crossing every chunk boundary is the adversarial case for
        // the condensation merge
        let snap = ring(2400);
        let sequential = find_sccs(&snap, None, &RunContext::unbounded());
        let parallel = find_sccs_parallel(&snap, None, 4, &RunContext::unbounded());
        assert!(!parallel.timed_out);
        assert_eq!(parallel.sccs, sequential.sccs);
    }

    #[test]
    fn parallel_merge_matches_sequential_on_disjoint_rings() {
        let mut store = GraphStore::new(StoreLimits::default());
        // 300 disjoint 4-rings = 1200 nodes
        for ring_idx in 0..300 {
            for j in 0..4 {
                store
                    .apply_inventory_delta(
                        &format!("r{:03}n{}", ring_idx, j),
                        vec![Item::new(format!("r{:03}i{}", ring_idx, j))],
                        vec![],
                    )
                    .unwrap();
            }
            for j in 0..4 {
                store
                    .apply_want_delta(
                        &format!("r{:03}n{}", ring_idx, (j + 1) % 4),
                        vec![format!("r{:03}i{}", ring_idx, j)],
                        vec![],
                    )
                    .unwrap();
            }
        }
        let snap = store.snapshot();
        let sequential = find_sccs(&snap, None, &RunContext::unbounded());
        let parallel = find_sccs_parallel(&snap, None, 4, &RunContext::unbounded());
        assert_eq!(parallel.sccs, sequential.sccs);
        assert_eq!(parallel.sccs.len(), 300);
    }
}
