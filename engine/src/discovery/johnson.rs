//! Bounded elementary-cycle enumeration
//!
//! Johnson's algorithm over one SCC (or community), bounded by the tenant's
//! maximum cycle depth. The block/unblock machinery prevents re-exploring
//! non-elementary paths; the depth bound prunes without recursion. Because
//! the depth bound is at most 15, the recursion depth is trivially bounded
//! and needs no explicit stack.
//!
//! Edge labels are threaded through the search: where parallel edges exist
//! between the same two accounts, one cycle is emitted per label
//! combination, capped per pair by `label_cap` to avoid combinatorial
//! explosion.
//!
//! The enumeration is lazy in the consumer's direction: cycles are pushed
//! into a sink callback which may return `false` to stop early. Deadline and
//! cancellation are polled every `JOHNSON_POLL_INTERVAL` pushes; on expiry
//! the cycles found so far stand and the stats carry `truncated = true`.

use crate::graph::snapshot::GraphSnapshot;
use crate::runtime::{Interruption, RunContext};
use std::collections::BTreeSet;

/// Stack pushes between deadline/cancellation polls
pub const JOHNSON_POLL_INTERVAL: u64 = 1024;

/// Outcome of one enumeration
#[derive(Debug, Clone, Default)]
pub struct EnumerationStats {
    /// Cycles pushed into the sink
    pub cycles_emitted: usize,

    /// Recursion pushes performed (cancellation poll currency)
    pub pushes: u64,

    /// True when the deadline or cancellation cut the search short
    pub truncated: bool,

    /// What interrupted the search, when anything did
    pub interruption: Option<Interruption>,
}

/// Enumerate the elementary cycles of the subgraph induced by `subset`.
///
/// `subset` must be sorted ascending; since snapshot indices follow sorted
/// account-id order, starting each search round from the smallest remaining
/// index yields deterministic output. The sink receives each cycle as
/// parallel slices of snapshot account indices and item indices
/// (`accounts[j]` gives `items[j]` to `accounts[(j+1) % k]`); returning
/// `false` stops the enumeration.
pub fn enumerate_cycles(
    snapshot: &GraphSnapshot,
    subset: &[usize],
    max_depth: usize,
    label_cap: usize,
    ctx: &RunContext,
    sink: &mut dyn FnMut(&[usize], &[usize]) -> bool,
) -> EnumerationStats {
    let n = subset.len();
    if n < 2 {
        return EnumerationStats::default();
    }
    debug_assert!(subset.windows(2).all(|w| w[0] < w[1]), "subset must be sorted");

    // Local adjacency restricted to the subset, labels capped per pair
    let local_of = |node: usize| subset.binary_search(&node).ok();
    let adjacency: Vec<Vec<(usize, Vec<usize>)>> = subset
        .iter()
        .map(|&node| {
            snapshot
                .adjacency(node)
                .iter()
                .filter_map(|entry| {
                    local_of(entry.to).map(|local_to| {
                        let labels: Vec<usize> =
                            entry.labels.iter().copied().take(label_cap).collect();
                        (local_to, labels)
                    })
                })
                .collect()
        })
        .collect();

    let mut search = Search {
        subset,
        adjacency,
        max_depth,
        blocked: vec![false; n],
        blist: vec![BTreeSet::new(); n],
        path: Vec::new(),
        path_labels: Vec::new(),
        stats: EnumerationStats::default(),
        stopped: false,
        ctx,
    };

    for start in 0..n {
        if search.stopped {
            break;
        }
        // Reset block state for the round; only vertices >= start participate
        for v in start..n {
            search.blocked[v] = false;
            search.blist[v].clear();
        }
        search.circuit(start, start, sink);
    }

    search.stats.truncated = search.stats.interruption.is_some();
    search.stats
}

struct Search<'a> {
    subset: &'a [usize],
    adjacency: Vec<Vec<(usize, Vec<usize>)>>,
    max_depth: usize,
    blocked: Vec<bool>,
    blist: Vec<BTreeSet<usize>>,
    /// Current path, local indices
    path: Vec<usize>,
    /// Label options for each edge already on the path
    path_labels: Vec<Vec<usize>>,
    stats: EnumerationStats,
    stopped: bool,
    ctx: &'a RunContext,
}

impl<'a> Search<'a> {
    /// Explore elementary paths from `v` back to `start`. Returns whether a
    /// cycle was found at or below `v` (drives Johnson's unblocking).
    fn circuit(
        &mut self,
        v: usize,
        start: usize,
        sink: &mut dyn FnMut(&[usize], &[usize]) -> bool,
    ) -> bool {
        self.stats.pushes += 1;
        if self.stats.pushes % JOHNSON_POLL_INTERVAL == 0 {
            if let Some(interruption) = self.ctx.check() {
                self.stats.interruption = Some(interruption);
                self.stopped = true;
                return true;
            }
        }

        let mut found = false;
        self.path.push(v);
        self.blocked[v] = true;

        for edge_idx in 0..self.adjacency[v].len() {
            if self.stopped {
                break;
            }
            let w = self.adjacency[v][edge_idx].0;
            if w < start {
                continue;
            }
            if w == start && self.path.len() >= 2 {
                let closing = self.adjacency[v][edge_idx].1.clone();
                self.emit(&closing, sink);
                found = true;
            } else if w != start && !self.blocked[w] {
                if self.path.len() < self.max_depth {
                    let labels = self.adjacency[v][edge_idx].1.clone();
                    self.path_labels.push(labels);
                    if self.circuit(w, start, sink) {
                        found = true;
                    }
                    self.path_labels.pop();
                } else {
                    // Depth-pruned exploration may hide cycles; treat the
                    // branch as found so unblocking keeps the search
                    // complete within the bound
                    found = true;
                }
            }
        }

        if found {
            self.unblock(v);
        } else {
            for edge_idx in 0..self.adjacency[v].len() {
                let w = self.adjacency[v][edge_idx].0;
                if w >= start {
                    self.blist[w].insert(v);
                }
            }
        }
        self.path.pop();
        found
    }

    fn unblock(&mut self, v: usize) {
        self.blocked[v] = false;
        let pending = std::mem::take(&mut self.blist[v]);
        for w in pending {
            if self.blocked[w] {
                self.unblock(w);
            }
        }
    }

    /// Emit one cycle per label combination along the current path plus the
    /// closing edge
    fn emit(&mut self, closing: &[usize], sink: &mut dyn FnMut(&[usize], &[usize]) -> bool) {
        let k = self.path.len();
        let accounts: Vec<usize> = self.path.iter().map(|&local| self.subset[local]).collect();

        let mut option_lens: Vec<usize> = self.path_labels.iter().map(|l| l.len()).collect();
        option_lens.push(closing.len());
        debug_assert_eq!(option_lens.len(), k);

        let mut odometer = vec![0usize; k];
        let mut items = vec![0usize; k];
        loop {
            for j in 0..k {
                let labels = if j + 1 == k {
                    closing
                } else {
                    self.path_labels[j].as_slice()
                };
                items[j] = labels[odometer[j]];
            }
            self.stats.cycles_emitted += 1;
            if !sink(&accounts, &items) {
                self.stopped = true;
                return;
            }

            // advance the odometer
            let mut digit = k;
            loop {
                if digit == 0 {
                    return;
                }
                digit -= 1;
                odometer[digit] += 1;
                if odometer[digit] < option_lens[digit] {
                    break;
                }
                odometer[digit] = 0;
            }
        }
    }
}
