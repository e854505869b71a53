//! Scored-cycle cache
//!
//! Per-tenant cache of the currently valid scored cycles, indexed two ways:
//! by canonical key for upserts and by participating account so a delta
//! touching account A invalidates exactly the cycles containing A in
//! O(|cycles touching A|).
//!
//! The cache is bounded; when over the limit the lowest-ranked cycles are
//! evicted first. Staleness is TTL-based plus an explicit invalidation mark;
//! a stale cache makes the next query trigger a synchronous bounded
//! re-discovery.

use crate::discovery::{rank, ScoredCycle};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CycleCache {
    by_key: BTreeMap<String, ScoredCycle>,
    by_account: BTreeMap<String, BTreeSet<String>>,
    limit: usize,
    ttl: Duration,
    refreshed_at: Option<Instant>,
    invalidated: bool,
}

impl CycleCache {
    pub fn new(limit: usize, ttl: Duration) -> Self {
        Self {
            by_key: BTreeMap::new(),
            by_account: BTreeMap::new(),
            limit,
            ttl,
            refreshed_at: None,
            invalidated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Canonical keys currently cached
    pub fn key_set(&self) -> BTreeSet<String> {
        self.by_key.keys().cloned().collect()
    }

    /// True when a query should trigger re-discovery before serving
    pub fn is_stale(&self, now: Instant) -> bool {
        if self.invalidated {
            return true;
        }
        match self.refreshed_at {
            Some(at) => now.duration_since(at) > self.ttl,
            None => true,
        }
    }

    /// Replace the whole cache with the output of a full discovery run
    pub fn replace_all(&mut self, cycles: Vec<ScoredCycle>) {
        self.by_key.clear();
        self.by_account.clear();
        for cycle in cycles {
            self.insert(cycle);
        }
        self.enforce_limit();
        self.refreshed_at = Some(Instant::now());
        self.invalidated = false;
    }

    /// Upsert the output of an incremental (restricted) run
    pub fn merge(&mut self, cycles: Vec<ScoredCycle>) {
        for cycle in cycles {
            self.insert(cycle);
        }
        self.enforce_limit();
    }

    /// Mark the cache fresh without touching its contents
    pub fn mark_refreshed(&mut self) {
        self.refreshed_at = Some(Instant::now());
        self.invalidated = false;
    }

    /// Drop every cycle containing `account`. Returns how many were evicted
    /// and marks the cache invalidated.
    pub fn invalidate_account(&mut self, account: &str) -> usize {
        let Some(keys) = self.by_account.remove(account) else {
            return 0;
        };
        let evicted = keys.len();
        for key in keys {
            if let Some(cycle) = self.by_key.remove(&key) {
                for participant in cycle.cycle.accounts() {
                    if participant != account {
                        self.unindex(participant, &key);
                    }
                }
            }
        }
        if evicted > 0 {
            self.invalidated = true;
        }
        evicted
    }

    /// Ranked query over the cache
    pub fn query(
        &self,
        limit: usize,
        min_score: Option<f64>,
        account: Option<&str>,
    ) -> Vec<ScoredCycle> {
        let mut matches: Vec<&ScoredCycle> = self
            .by_key
            .values()
            .filter(|cycle| min_score.map_or(true, |min| cycle.score >= min))
            .filter(|cycle| account.map_or(true, |a| cycle.cycle.contains_account(a)))
            .collect();
        matches.sort_by(|a, b| rank(a, b));
        matches.into_iter().take(limit).cloned().collect()
    }

    fn insert(&mut self, cycle: ScoredCycle) {
        let key = cycle.cycle.key().to_string();
        for account in cycle.cycle.accounts() {
            self.by_account
                .entry(account.clone())
                .or_default()
                .insert(key.clone());
        }
        self.by_key.insert(key, cycle);
    }

    fn unindex(&mut self, account: &str, key: &str) {
        if let Some(keys) = self.by_account.get_mut(account) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_account.remove(account);
            }
        }
    }

    /// Evict lowest-ranked cycles beyond the bound
    fn enforce_limit(&mut self) {
        if self.by_key.len() <= self.limit {
            return;
        }
        let mut ranked: Vec<(String, Vec<String>)> = {
            let mut all: Vec<&ScoredCycle> = self.by_key.values().collect();
            all.sort_by(|a, b| rank(a, b));
            all.split_off(self.limit)
                .into_iter()
                .map(|cycle| {
                    (
                        cycle.cycle.key().to_string(),
                        cycle.cycle.accounts().to_vec(),
                    )
                })
                .collect()
        };
        for (key, accounts) in ranked.drain(..) {
            self.by_key.remove(&key);
            for account in accounts {
                self.unindex(&account, &key);
            }
        }
    }
}
