//! Tenant state manager
//!
//! One instance per tenant. Owns the graph store, the scored-cycle cache,
//! the pending dirty set, and the tenant's health flags; coordinates delta
//! ingestion, incremental re-discovery, cache invalidation, and snapshot
//! offers to the persistence capability.
//!
//! # Concurrency
//!
//! All tenant state sits behind one `parking_lot::RwLock`: many readers
//! (queries against a fresh cache) or one writer (delta application, cache
//! refresh) at a time. Discovery itself always runs against an immutable
//! snapshot; the long-budget scheduled runs release the lock while
//! enumerating, only the short synchronous runs (bounded by
//! `sync_requery_budget_ms`) hold it.
//!
//! # Ordering
//!
//! The write lock is the tenant's ingest queue: deltas apply in lock
//! acquisition order and each gets the next logical sequence number.
//! Discovery results always reflect a snapshot taken at or after the
//! triggering delta.

use crate::discovery::{discover, DiscoveryReport, DiscoverySettings, ScoredCycle};
use crate::error::EngineError;
use crate::graph::{GraphStore, StoreLimits};
use crate::models::{Delta, RejectedItem, TenantConfig};
use crate::persist::{with_retries, SnapshotStore};
use crate::runtime::{Job, RunContext, WorkerPool};
use crate::tenant::cache::CycleCache;
use crate::tenant::snapshot::build_snapshot;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Deltas between periodic snapshot offers to the persistence capability
const PERSIST_EVERY: u64 = 64;

/// Passes one scheduled job may run before handing the worker back
const MAX_SCHEDULED_PASSES: usize = 4;

/// Response to a submitted delta
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    /// Logical sequence number assigned to the delta
    pub sequence: u64,

    pub items_accepted: Vec<String>,
    pub items_rejected: Vec<RejectedItem>,

    /// Cycles that became discoverable with this delta
    pub new_cycles_discovered: usize,

    /// The newly discovered cycles, capped at `max_cycles_per_query`
    pub cycles: Vec<ScoredCycle>,

    /// True when the inline re-discovery hit its budget; the scheduled run
    /// will finish the job
    pub truncated: bool,
}

/// Summary of the most recent discovery run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub duration: Duration,
    pub cycles_found: usize,
    pub sccs_processed: usize,
    pub processed_nodes: usize,
    pub truncated: bool,
    pub truncation_reason: Option<String>,
}

/// Health and size counters exposed by the status operation
#[derive(Debug, Clone, Serialize)]
pub struct TenantStatus {
    pub tenant: String,
    pub accounts: usize,
    pub items: usize,
    pub edges: usize,
    pub sccs: usize,
    pub cached_cycles: usize,
    pub last_sequence: u64,
    pub pending_dirty: usize,
    pub quarantined: bool,
    pub paused: bool,
    pub last_discovery_ms: Option<u64>,
    pub last_truncated: bool,
    pub last_truncation_reason: Option<String>,
}

struct TenantState {
    config: TenantConfig,
    store: GraphStore,
    cache: CycleCache,
    sequence: u64,
    pending_dirty: BTreeSet<String>,
    quarantined: bool,
    paused: bool,
    last_run: Option<RunSummary>,
    last_scc_count: usize,
}

pub struct TenantManager {
    id: String,
    state: RwLock<TenantState>,
    /// True while a scheduled discovery job is queued or running; further
    /// dirty sets coalesce into `pending_dirty` instead of new jobs
    job_pending: AtomicBool,
    persist: Option<Arc<dyn SnapshotStore>>,
}

impl TenantManager {
    pub fn new(
        id: String,
        config: TenantConfig,
        persist: Option<Arc<dyn SnapshotStore>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let limits = StoreLimits {
            max_items_per_account: config.max_items_per_account,
            max_wants_per_account: config.max_wants_per_account,
        };
        let cache = CycleCache::new(
            config.cycle_cache_limit,
            Duration::from_millis(config.cache_ttl_ms),
        );
        Ok(Self {
            id,
            state: RwLock::new(TenantState {
                config,
                store: GraphStore::new(limits),
                cache,
                sequence: 0,
                pending_dirty: BTreeSet::new(),
                quarantined: false,
                paused: false,
                last_run: None,
                last_scc_count: 0,
            }),
            job_pending: AtomicBool::new(false),
            persist,
        })
    }

    /// Construct a manager from restored state (persistence load path).
    pub fn from_restored(
        id: String,
        config: TenantConfig,
        persist: Option<Arc<dyn SnapshotStore>>,
        store: GraphStore,
        cycles: Vec<ScoredCycle>,
        last_sequence: u64,
    ) -> Result<Self, EngineError> {
        let manager = Self::new(id, config, persist)?;
        {
            let mut state = manager.state.write();
            state.store = store;
            state.cache.replace_all(cycles);
            state.sequence = last_sequence;
        }
        Ok(manager)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> TenantConfig {
        self.state.read().config.clone()
    }

    // =========================================================================
    // Delta ingestion
    // =========================================================================

    /// Apply one delta, invalidate affected cached cycles, and run a short
    /// bounded re-discovery over the affected region so the response can
    /// carry the newly discoverable cycles.
    pub fn submit_delta(&self, delta: Delta) -> Result<SubmissionOutcome, EngineError> {
        let (outcome, should_persist) = {
            let mut state = self.state.write();
            if state.quarantined {
                return Err(EngineError::Quarantined(self.id.clone()));
            }

            let effect = match delta {
                Delta::Inventory {
                    account,
                    added,
                    removed,
                } => state.store.apply_inventory_delta(&account, added, removed)?,
                Delta::Wants {
                    account,
                    added,
                    removed,
                } => state.store.apply_want_delta(&account, added, removed)?,
                Delta::Transfer { item, from, to } => {
                    state.store.transfer_ownership(&item, &from, &to)?
                }
                Delta::RemoveAccount { account } => state.store.remove_account(&account)?,
            };

            state.sequence += 1;
            let sequence = state.sequence;
            debug!(tenant = %self.id, sequence, touched = effect.touched.len(), "delta applied");

            let (new_cycles, truncated) = if effect.changed_graph() {
                let before = state.cache.key_set();
                for account in &effect.touched {
                    state.cache.invalidate_account(account);
                }
                let drained = state.store.drain_dirty();
                state.pending_dirty.extend(drained);

                let report = self.discover_region(&mut state, &effect.touched);
                let new: Vec<ScoredCycle> = report
                    .cycles
                    .iter()
                    .filter(|cycle| !before.contains(cycle.cycle.key()))
                    .cloned()
                    .collect();
                state.cache.merge(report.cycles);
                if !report.truncated {
                    state.cache.mark_refreshed();
                    for account in &effect.touched {
                        state.pending_dirty.remove(account);
                    }
                }
                (new, report.truncated)
            } else {
                (Vec::new(), false)
            };

            let cap = state.config.max_cycles_per_query;
            let outcome = SubmissionOutcome {
                sequence,
                items_accepted: effect.items_accepted,
                items_rejected: effect.items_rejected,
                new_cycles_discovered: new_cycles.len(),
                cycles: new_cycles.into_iter().take(cap).collect(),
                truncated,
            };
            (outcome, sequence % PERSIST_EVERY == 0)
        };

        if should_persist {
            if let Err(err) = self.persist_now() {
                warn!(tenant = %self.id, error = %err, "periodic snapshot offer failed");
            }
        }
        Ok(outcome)
    }

    /// True when a scheduled discovery run still has work to pick up
    pub fn has_pending_work(&self) -> bool {
        let state = self.state.read();
        !state.pending_dirty.is_empty() && !state.paused && !state.quarantined
    }

    /// Queue a scheduled discovery job unless one is already pending.
    /// Coalescing happens naturally: the pending job drains whatever dirty
    /// set has accumulated by the time it runs.
    pub fn schedule(self: &Arc<Self>, pool: &WorkerPool) {
        if !self.has_pending_work() {
            return;
        }
        if self.job_pending.swap(true, Ordering::SeqCst) {
            return; // already queued; dirty sets union in pending_dirty
        }
        let manager = Arc::clone(self);
        let job = Job::new(
            self.id.clone(),
            Box::new(move || manager.run_scheduled_discovery()),
        );
        if let Err(err) = pool.submit(job) {
            self.job_pending.store(false, Ordering::SeqCst);
            warn!(tenant = %self.id, error = %err, "discovery job not queued; dirty set retained");
        }
    }

    /// Body of a scheduled discovery job: drain the dirty set, enumerate its
    /// reachability closure under the full discovery budget, and fold the
    /// results into the cache. Runs without holding the tenant lock while
    /// enumerating.
    pub fn run_scheduled_discovery(&self) {
        for _ in 0..MAX_SCHEDULED_PASSES {
            let Some((snapshot, closure, settings, budget, dirty)) = ({
                let mut state = self.state.write();
                if state.quarantined || state.paused {
                    None
                } else {
                    let dirty = std::mem::take(&mut state.pending_dirty);
                    if dirty.is_empty() {
                        None
                    } else {
                        let snapshot = state.store.snapshot();
                        let seeds: BTreeSet<usize> = dirty
                            .iter()
                            .filter_map(|account| snapshot.index_of_account(account))
                            .collect();
                        let closure = snapshot.cycle_closure(&seeds);
                        let settings = DiscoverySettings::from(&state.config);
                        let budget = Duration::from_millis(state.config.discovery_timeout_ms);
                        Some((snapshot, closure, settings, budget, dirty))
                    }
                }
            }) else {
                break;
            };

            let run_id = Uuid::new_v4();
            let started = Instant::now();
            let ctx = RunContext::with_timeout(budget);
            let report = discover(&snapshot, &settings, Some(&closure), &ctx);
            info!(
                tenant = %self.id,
                run = %run_id,
                cycles = report.cycles.len(),
                truncated = report.truncated,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "scheduled discovery pass"
            );

            let mut state = self.state.write();
            state.last_scc_count = report.sccs_processed;
            state.last_run = Some(summary(run_id, started.elapsed(), &report));
            state.cache.merge(report.cycles);
            // cycles found from the pre-run snapshot may already be stale
            // for accounts dirtied during the run
            let dirtied_since: Vec<String> = state.pending_dirty.iter().cloned().collect();
            for account in &dirtied_since {
                state.cache.invalidate_account(account);
            }
            if report.truncated {
                state.pending_dirty.extend(dirty);
            } else if state.pending_dirty.is_empty() {
                state.cache.mark_refreshed();
            }
            if state.pending_dirty.is_empty() {
                break;
            }
        }
        self.job_pending.store(false, Ordering::SeqCst);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Ranked cycles currently valid for the tenant. A stale or invalidated
    /// cache triggers a synchronous recomputation bounded by the tenant's
    /// short budget and returns whatever is available.
    pub fn query_active_cycles(
        &self,
        limit: usize,
        min_score: Option<f64>,
    ) -> Result<Vec<ScoredCycle>, EngineError> {
        self.query_cycles(limit, min_score, None)
    }

    /// Same, restricted to cycles containing `account`.
    pub fn query_cycles_for(
        &self,
        account: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCycle>, EngineError> {
        self.query_cycles(limit, None, Some(account))
    }

    fn query_cycles(
        &self,
        limit: usize,
        min_score: Option<f64>,
        account: Option<&str>,
    ) -> Result<Vec<ScoredCycle>, EngineError> {
        if limit == 0 {
            return Err(EngineError::InvalidArgument(
                "limit must be positive".to_string(),
            ));
        }
        if let Some(min) = min_score {
            if !(0.0..=1.0).contains(&min) {
                return Err(EngineError::InvalidArgument(format!(
                    "min_score {} out of range [0, 1]",
                    min
                )));
            }
        }

        {
            let state = self.state.read();
            if !state.cache.is_stale(Instant::now()) {
                let cap = limit.min(state.config.max_cycles_per_query);
                return Ok(state.cache.query(cap, min_score, account));
            }
        }

        let mut state = self.state.write();
        if state.cache.is_stale(Instant::now()) {
            self.refresh_cache_locked(&mut state);
        }
        let cap = limit.min(state.config.max_cycles_per_query);
        Ok(state.cache.query(cap, min_score, account))
    }

    pub fn status(&self) -> TenantStatus {
        let state = self.state.read();
        TenantStatus {
            tenant: self.id.clone(),
            accounts: state.store.num_accounts(),
            items: state.store.num_items(),
            edges: state.store.num_edges(),
            sccs: state.last_scc_count,
            cached_cycles: state.cache.len(),
            last_sequence: state.sequence,
            pending_dirty: state.pending_dirty.len(),
            quarantined: state.quarantined,
            paused: state.paused,
            last_discovery_ms: state
                .last_run
                .as_ref()
                .map(|run| run.duration.as_millis() as u64),
            last_truncated: state
                .last_run
                .as_ref()
                .map(|run| run.truncated)
                .unwrap_or(false),
            last_truncation_reason: state
                .last_run
                .as_ref()
                .and_then(|run| run.truncation_reason.clone()),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop scheduling new discovery jobs; in-flight ones complete.
    pub fn pause(&self) {
        self.state.write().paused = true;
        info!(tenant = %self.id, "paused");
    }

    pub fn resume(&self) {
        self.state.write().paused = false;
        info!(tenant = %self.id, "resumed");
    }

    pub fn is_quarantined(&self) -> bool {
        self.state.read().quarantined
    }

    /// Offer a serialized snapshot to the persistence capability. Verifies
    /// store invariants first; a violation is `Fatal` and quarantines the
    /// tenant (reads stay permitted, writes are rejected).
    pub fn persist_now(&self) -> Result<bool, EngineError> {
        let Some(persist) = &self.persist else {
            return Ok(false);
        };
        let blob = {
            let mut state = self.state.write();
            if let Err(violation) = state.store.verify_invariants() {
                state.quarantined = true;
                error!(tenant = %self.id, violation = %violation, "invariant violation; tenant quarantined");
                return Err(EngineError::Fatal(violation));
            }
            let snapshot =
                build_snapshot(&state.store, &state.cache, &state.config, state.sequence)
                    .map_err(|err| EngineError::Transient(err.to_string()))?;
            serde_json::to_vec(&snapshot)
                .map_err(|err| EngineError::Transient(err.to_string()))?
        };
        with_retries("tenant snapshot save", || persist.save(&self.id, &blob))
            .map_err(|err| EngineError::Transient(err.to_string()))?;
        debug!(tenant = %self.id, bytes = blob.len(), "snapshot persisted");
        Ok(true)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Short bounded discovery over the reachability closure of `touched`,
    /// used inline during delta ingestion.
    fn discover_region(
        &self,
        state: &mut TenantState,
        touched: &BTreeSet<String>,
    ) -> DiscoveryReport {
        let snapshot = state.store.snapshot();
        let seeds: BTreeSet<usize> = touched
            .iter()
            .filter_map(|account| snapshot.index_of_account(account))
            .collect();
        if seeds.is_empty() {
            return DiscoveryReport::default();
        }
        let closure = snapshot.cycle_closure(&seeds);
        let settings = DiscoverySettings::from(&state.config);
        let ctx =
            RunContext::with_timeout(Duration::from_millis(state.config.sync_requery_budget_ms));
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let report = discover(&snapshot, &settings, Some(&closure), &ctx);
        state.last_scc_count = report.sccs_processed;
        state.last_run = Some(summary(run_id, started.elapsed(), &report));
        report
    }

    /// Full synchronous recomputation under the short budget, used when a
    /// query finds the cache stale.
    fn refresh_cache_locked(&self, state: &mut TenantState) {
        let snapshot = state.store.snapshot();
        let settings = DiscoverySettings::from(&state.config);
        let ctx =
            RunContext::with_timeout(Duration::from_millis(state.config.sync_requery_budget_ms));
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let report = discover(&snapshot, &settings, None, &ctx);
        state.last_scc_count = report.sccs_processed;
        state.last_run = Some(summary(run_id, started.elapsed(), &report));
        if report.truncated {
            // partial refresh: keep what we had, add what we found
            state.cache.merge(report.cycles);
            state.cache.mark_refreshed();
        } else {
            state.cache.replace_all(report.cycles);
            state.pending_dirty.clear();
        }
    }
}

fn summary(run_id: Uuid, duration: Duration, report: &DiscoveryReport) -> RunSummary {
    RunSummary {
        run_id,
        duration,
        cycles_found: report.cycles.len(),
        sccs_processed: report.sccs_processed,
        processed_nodes: report.processed_nodes,
        truncated: report.truncated,
        truncation_reason: report.truncation_reason.map(|reason| reason.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Item;

    fn manager() -> TenantManager {
        TenantManager::new("t1".to_string(), TenantConfig::default(), None).unwrap()
    }

    fn inventory(account: &str, items: &[&str]) -> Delta {
        Delta::Inventory {
            account: account.to_string(),
            added: items.iter().map(|id| Item::new(id.to_string())).collect(),
            removed: vec![],
        }
    }

    fn wants(account: &str, items: &[&str]) -> Delta {
        Delta::Wants {
            account: account.to_string(),
            added: items.iter().map(|id| id.to_string()).collect(),
            removed: vec![],
        }
    }

    #[test]
    fn bilateral_swap_surfaces_on_submission() {
        let m = manager();
        m.submit_delta(inventory("alice", &["nft_1"])).unwrap();
        m.submit_delta(inventory("bob", &["nft_2"])).unwrap();
        m.submit_delta(wants("alice", &["nft_2"])).unwrap();
        let outcome = m.submit_delta(wants("bob", &["nft_1"])).unwrap();

        assert_eq!(outcome.sequence, 4);
        assert_eq!(outcome.new_cycles_discovered, 1);
        assert_eq!(outcome.cycles[0].cycle.key(), "alice:nft_1|bob:nft_2");
        assert!(outcome.cycles[0].score >= 0.8 - 1e-9);
    }

    #[test]
    fn resubmitting_a_delta_changes_nothing() {
        let m = manager();
        m.submit_delta(inventory("alice", &["nft_1"])).unwrap();
        m.submit_delta(wants("bob", &["nft_1"])).unwrap();
        let status_before = m.status();

        let outcome = m.submit_delta(wants("bob", &["nft_1"])).unwrap();
        assert_eq!(outcome.new_cycles_discovered, 0);
        let status_after = m.status();
        assert_eq!(status_after.edges, status_before.edges);
        assert_eq!(status_after.accounts, status_before.accounts);
    }

    #[test]
    fn invalidation_drops_cycles_touching_the_account() {
        let m = manager();
        m.submit_delta(inventory("alice", &["n1"])).unwrap();
        m.submit_delta(inventory("bob", &["n2"])).unwrap();
        m.submit_delta(wants("alice", &["n2"])).unwrap();
        m.submit_delta(wants("bob", &["n1"])).unwrap();
        assert_eq!(m.query_active_cycles(10, None).unwrap().len(), 1);

        // alice drops her item: the swap is no longer possible
        m.submit_delta(Delta::Inventory {
            account: "alice".to_string(),
            added: vec![],
            removed: vec!["n1".to_string()],
        })
        .unwrap();
        assert!(m.query_active_cycles(10, None).unwrap().is_empty());
    }

    #[test]
    fn query_limit_validation() {
        let m = manager();
        assert!(matches!(
            m.query_active_cycles(0, None),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            m.query_active_cycles(10, Some(1.5)),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn cycles_for_account_filters() {
        let m = manager();
        for (owner, item, wanter) in [
            ("a", "n1", "b"),
            ("b", "n2", "a"),
            ("c", "n3", "d"),
            ("d", "n4", "c"),
        ] {
            m.submit_delta(inventory(owner, &[item])).unwrap();
            m.submit_delta(wants(wanter, &[item])).unwrap();
        }
        let for_a = m.query_cycles_for("a", 10).unwrap();
        assert_eq!(for_a.len(), 1);
        assert!(for_a[0].cycle.contains_account("a"));
        assert_eq!(m.query_active_cycles(10, None).unwrap().len(), 2);
    }

    #[test]
    fn paused_tenant_reports_no_pending_work() {
        let m = manager();
        m.submit_delta(inventory("alice", &["n1"])).unwrap();
        m.submit_delta(wants("bob", &["n1"])).unwrap();
        m.pause();
        assert!(!m.has_pending_work());
        m.resume();
    }
}
