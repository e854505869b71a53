//! Cycle discovery pipeline
//!
//! One discovery run turns a graph snapshot into a ranked list of scored,
//! deduplicated trade cycles:
//!
//! 1. SCC decomposition prefilters the graph, since only non-trivial components
//!    can contain cycles (`graph::scc`)
//! 2. Oversized SCCs are partitioned into communities (`graph::community`)
//! 3. Johnson enumeration runs per community, in parallel across
//!    communities, single-threaded within one (`johnson`)
//! 4. Candidates are rotation-normalized (`canonical`), deduplicated
//!    (`dedup`), scored and filtered (`score`), and ranked
//!
//! Every stage honors the run's deadline and cancellation token; expiry
//! yields whatever was found so far, explicitly marked truncated.

pub mod canonical;
pub mod dedup;
pub mod johnson;
pub mod score;

pub use canonical::CanonicalCycle;
pub use dedup::SeenCycles;
pub use johnson::{enumerate_cycles, EnumerationStats, JOHNSON_POLL_INTERVAL};
pub use score::{rank, score_cycle, ScoredCycle, SubScores};

use crate::graph::community::partition_communities;
use crate::graph::scc::find_sccs_auto;
use crate::graph::snapshot::GraphSnapshot;
use crate::models::TenantConfig;
use crate::runtime::{Interruption, RunContext};
use std::collections::BTreeSet;
use tracing::debug;

/// Why a discovery run returned less than everything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationReason {
    /// The run's deadline expired
    Deadline,

    /// The run was cooperatively cancelled
    Cancelled,

    /// The per-run cycle cap was reached
    CycleCap,
}

impl std::fmt::Display for TruncationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TruncationReason::Deadline => write!(f, "deadline"),
            TruncationReason::Cancelled => write!(f, "cancelled"),
            TruncationReason::CycleCap => write!(f, "cycle cap"),
        }
    }
}

/// The slice of tenant configuration one discovery run needs
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub max_depth: usize,
    pub min_efficiency: f64,
    pub community_partition_threshold: usize,
    pub parallel_community_workers: usize,
    pub strict_mode: bool,
    pub max_parallel_edge_labels: usize,

    /// Cap on cycles kept per run; lowest-ranked beyond it are dropped
    pub max_cycles: usize,
}

impl From<&TenantConfig> for DiscoverySettings {
    fn from(config: &TenantConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            min_efficiency: config.min_efficiency,
            community_partition_threshold: config.community_partition_threshold,
            parallel_community_workers: config.parallel_community_workers,
            strict_mode: config.strict_mode,
            max_parallel_edge_labels: config.max_parallel_edge_labels,
            max_cycles: config.cycle_cache_limit,
        }
    }
}

/// Result of one discovery run
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Ranked scored cycles (score desc, length asc, canonical key)
    pub cycles: Vec<ScoredCycle>,

    pub sccs_processed: usize,
    pub communities_processed: usize,
    pub processed_nodes: usize,

    /// True when any stage returned early
    pub truncated: bool,
    pub truncation_reason: Option<TruncationReason>,
}

/// Run the full pipeline over a snapshot.
///
/// `restrict` limits the run to a node subset (the dirty-region closure for
/// incremental re-discovery); `None` means the whole graph.
pub fn discover(
    snapshot: &GraphSnapshot,
    settings: &DiscoverySettings,
    restrict: Option<&BTreeSet<usize>>,
    ctx: &RunContext,
) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();

    let scc_result = find_sccs_auto(
        snapshot,
        restrict,
        settings.parallel_community_workers,
        ctx,
    );
    report.processed_nodes = scc_result.processed_nodes;
    report.sccs_processed = scc_result.sccs.len();
    if scc_result.timed_out {
        report.truncated = true;
        report.truncation_reason = Some(match ctx.check() {
            Some(Interruption::Cancelled) => TruncationReason::Cancelled,
            _ => TruncationReason::Deadline,
        });
    }

    let tasks: Vec<Vec<usize>> = scc_result
        .sccs
        .iter()
        .flat_map(|scc| {
            partition_communities(
                snapshot,
                scc,
                settings.community_partition_threshold,
                settings.strict_mode,
            )
        })
        .collect();
    report.communities_processed = tasks.len();
    debug!(
        sccs = report.sccs_processed,
        communities = report.communities_processed,
        "enumeration tasks prepared"
    );

    let task_outputs = enumerate_tasks(snapshot, settings, &tasks, ctx);

    // Aggregate: canonicalize, dedup, score, filter, rank
    let mut seen = SeenCycles::new();
    let mut cycles: Vec<ScoredCycle> = Vec::new();
    for (raw_cycles, stats) in task_outputs {
        if stats.truncated {
            report.truncated = true;
            report.truncation_reason = Some(match stats.interruption {
                Some(Interruption::Cancelled) => TruncationReason::Cancelled,
                _ => TruncationReason::Deadline,
            });
        }
        if raw_cycles.len() >= settings.max_cycles {
            // the sink stopped this task at the cap
            report.truncated = true;
            report.truncation_reason.get_or_insert(TruncationReason::CycleCap);
        }
        for (account_idxs, item_idxs) in raw_cycles {
            let accounts: Vec<String> = account_idxs
                .iter()
                .map(|&idx| snapshot.account_id(idx).to_string())
                .collect();
            let items: Vec<String> = item_idxs
                .iter()
                .map(|&idx| snapshot.item_id(idx).to_string())
                .collect();
            let canonical = CanonicalCycle::new(accounts, items);
            if !seen.insert(canonical.key()) {
                continue;
            }
            let scored = score_cycle(canonical, |item| {
                snapshot
                    .index_of_item(item)
                    .and_then(|idx| snapshot.valuation(idx))
            });
            if scored.score >= settings.min_efficiency {
                cycles.push(scored);
            }
        }
    }

    cycles.sort_by(rank);
    if cycles.len() > settings.max_cycles {
        cycles.truncate(settings.max_cycles);
        report.truncated = true;
        report.truncation_reason.get_or_insert(TruncationReason::CycleCap);
    }
    report.cycles = cycles;
    report
}

type RawCycles = Vec<(Vec<usize>, Vec<usize>)>;

/// Run the per-community enumerations, in parallel when configured.
/// Outputs are returned in task order regardless of thread scheduling.
fn enumerate_tasks(
    snapshot: &GraphSnapshot,
    settings: &DiscoverySettings,
    tasks: &[Vec<usize>],
    ctx: &RunContext,
) -> Vec<(RawCycles, EnumerationStats)> {
    let worker_count = settings
        .parallel_community_workers
        .min(tasks.len())
        .max(1);

    if worker_count <= 1 || tasks.len() <= 1 {
        return tasks
            .iter()
            .map(|task| run_task(snapshot, settings, task, ctx))
            .collect();
    }

    let mut outputs: Vec<Option<(RawCycles, EnumerationStats)>> = Vec::new();
    outputs.resize_with(tasks.len(), || None);
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            let ctx = ctx.clone();
            handles.push(scope.spawn(move || {
                let mut slice_outputs = Vec::new();
                // strided assignment keeps the distribution deterministic
                let mut task_idx = worker;
                while task_idx < tasks.len() {
                    slice_outputs.push((task_idx, run_task(snapshot, settings, &tasks[task_idx], &ctx)));
                    task_idx += worker_count;
                }
                slice_outputs
            }));
        }
        for handle in handles {
            for (task_idx, output) in handle.join().expect("enumeration worker panicked") {
                outputs[task_idx] = Some(output);
            }
        }
    });
    outputs
        .into_iter()
        .map(|output| output.expect("every task produces an output"))
        .collect()
}

fn run_task(
    snapshot: &GraphSnapshot,
    settings: &DiscoverySettings,
    task: &[usize],
    ctx: &RunContext,
) -> (RawCycles, EnumerationStats) {
    let mut raw: RawCycles = Vec::new();
    let cap = settings.max_cycles;
    let stats = enumerate_cycles(
        snapshot,
        task,
        settings.max_depth,
        settings.max_parallel_edge_labels,
        ctx,
        &mut |accounts, items| {
            raw.push((accounts.to_vec(), items.to_vec()));
            raw.len() < cap
        },
    );
    (raw, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::store::{GraphStore, StoreLimits};
    use crate::models::Item;

    fn build(edges: &[(&str, &str, &str)]) -> GraphSnapshot {
        let mut store = GraphStore::new(StoreLimits::default());
        for (owner, item, _) in edges {
            if store.owner_of(item).is_none() {
                store
                    .apply_inventory_delta(owner, vec![Item::new(item.to_string())], vec![])
                    .unwrap();
            }
        }
        for (_, item, wanter) in edges {
            store
                .apply_want_delta(wanter, vec![item.to_string()], vec![])
                .unwrap();
        }
        store.snapshot()
    }

    fn settings() -> DiscoverySettings {
        DiscoverySettings::from(&TenantConfig::default())
    }

    #[test]
    fn bilateral_swap_discovered_and_scored() {
        let snap = build(&[("a", "nft_1", "b"), ("b", "nft_2", "a")]);
        let report = discover(&snap, &settings(), None, &RunContext::unbounded());
        assert!(!report.truncated);
        assert_eq!(report.cycles.len(), 1);
        let cycle = &report.cycles[0];
        assert_eq!(cycle.cycle.key(), "a:nft_1|b:nft_2");
        assert!(cycle.score >= 0.8 - 1e-9);
    }

    #[test]
    fn duplicate_surfacing_is_collapsed() {
        let snap = build(&[("a", "n1", "b"), ("b", "n2", "c"), ("c", "n3", "a")]);
        let report = discover(&snap, &settings(), None, &RunContext::unbounded());
        assert_eq!(report.cycles.len(), 1);

        // a second run over unchanged state surfaces the same identity
        let again = discover(&snap, &settings(), None, &RunContext::unbounded());
        assert_eq!(again.cycles[0].cycle.key(), report.cycles[0].cycle.key());
    }

    #[test]
    fn min_efficiency_filters_low_scores() {
        // a 5-ring scores 0.4·(1/5) + 0.4 + 0.2 = 0.68
        let snap = build(&[
            ("a", "n1", "b"),
            ("b", "n2", "c"),
            ("c", "n3", "d"),
            ("d", "n4", "e"),
            ("e", "n5", "a"),
        ]);
        let mut strict = settings();
        strict.min_efficiency = 0.7;
        let report = discover(&snap, &strict, None, &RunContext::unbounded());
        assert!(report.cycles.is_empty());

        let mut lax = settings();
        lax.min_efficiency = 0.5;
        let report = discover(&snap, &lax, None, &RunContext::unbounded());
        assert_eq!(report.cycles.len(), 1);
    }

    #[test]
    fn restricted_run_only_sees_the_closure() {
        let snap = build(&[
            ("a", "n1", "b"),
            ("b", "n2", "a"),
            ("c", "n3", "d"),
            ("d", "n4", "c"),
        ]);
        let seed: BTreeSet<usize> = [snap.index_of_account("a").unwrap()].into_iter().collect();
        let closure = snap.cycle_closure(&seed);
        let report = discover(&snap, &settings(), Some(&closure), &RunContext::unbounded());
        assert_eq!(report.cycles.len(), 1);
        assert!(report.cycles[0].cycle.contains_account("a"));
    }

    #[test]
    fn ranking_is_deterministic_and_ordered() {
        let snap = build(&[
            ("a", "n1", "b"),
            ("b", "n2", "a"),
            ("c", "n3", "d"),
            ("d", "n4", "e"),
            ("e", "n5", "c"),
        ]);
        let report = discover(&snap, &settings(), None, &RunContext::unbounded());
        assert_eq!(report.cycles.len(), 2);
        // bilateral outranks the triangle
        assert_eq!(report.cycles[0].cycle.len(), 2);
        assert_eq!(report.cycles[1].cycle.len(), 3);
        let rerun = discover(&snap, &settings(), None, &RunContext::unbounded());
        let keys: Vec<&str> = report.cycles.iter().map(|c| c.cycle.key()).collect();
        let rerun_keys: Vec<&str> = rerun.cycles.iter().map(|c| c.cycle.key()).collect();
        assert_eq!(keys, rerun_keys);
    }

    #[test]
    fn cycle_cap_truncates_with_reason() {
        // many parallel labels blow up the combination count
        let mut edges = Vec::new();
        for j in 0..4 {
            edges.push(("a".to_string(), format!("x{}", j), "b".to_string()));
            edges.push(("b".to_string(), format!("y{}", j), "a".to_string()));
        }
        let mut store = GraphStore::new(StoreLimits::default());
        for (owner, item, _) in &edges {
            store
                .apply_inventory_delta(owner, vec![Item::new(item.clone())], vec![])
                .unwrap();
        }
        for (_, item, wanter) in &edges {
            store.apply_want_delta(wanter, vec![item.clone()], vec![]).unwrap();
        }
        let snap = store.snapshot();

        let mut capped = settings();
        capped.max_cycles = 3;
        let report = discover(&snap, &capped, None, &RunContext::unbounded());
        assert_eq!(report.cycles.len(), 3);
        assert!(report.truncated);
        assert_eq!(report.truncation_reason, Some(TruncationReason::CycleCap));
    }
}
