//! Wants graph store
//!
//! Per-tenant directed multigraph of ownership-satisfies-want relations,
//! maintained incrementally under streaming deltas. Nodes are accounts; for
//! each (A owns item i) ∧ (B wants i) with A ≠ B there is an edge A→B
//! labeled i. Parallel edges between the same pair with different labels are
//! represented explicitly.
//!
//! # Indexes maintained
//!
//! - `owner_of`: item → owning account
//! - `accounts[*].owned` / `accounts[*].wanted`: per-account sets
//! - `wanted_by`: item → accounts wanting it (the inverted want index;
//!   retains wants for items not yet known to the system)
//! - `out_edges` / `in_edges`: adjacency caches patched on every delta
//!
//! # Critical Invariants
//!
//! 1. Edge A→B labeled i exists iff `owner_of(i) == A` and `i ∈ wants(B)`
//!    and A ≠ B
//! 2. No self-loops
//! 3. Each item has at most one owner
//! 4. `in_edges` is the exact mirror of `out_edges`
//!
//! # Determinism
//!
//! All indexes use BTreeMap/BTreeSet so iteration order, snapshots, and the
//! dirty set are reproducible regardless of delta arrival interleaving.

use crate::error::{EngineError, LimitExceeded, LimitKind};
use crate::graph::snapshot::{AdjEntry, GraphSnapshot};
use crate::models::{Account, DeltaEffect, Item};
use std::collections::{BTreeMap, BTreeSet};

/// Per-account caps enforced by the store
#[derive(Debug, Clone, Copy)]
pub struct StoreLimits {
    pub max_items_per_account: usize,
    pub max_wants_per_account: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_items_per_account: 10_000,
            max_wants_per_account: 10_000,
        }
    }
}

/// The per-tenant wants graph and its inverted indexes
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    /// All accounts, indexed by id
    accounts: BTreeMap<String, Account>,

    /// Known items (items with a current owner), indexed by id
    items: BTreeMap<String, Item>,

    /// item → current owner
    owner_of: BTreeMap<String, String>,

    /// item → accounts that want it. Entries persist even while the item is
    /// unknown, so the want activates the moment the item appears.
    wanted_by: BTreeMap<String, BTreeSet<String>>,

    /// from → to → item labels (adjacency cache)
    out_edges: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,

    /// to → from → item labels (mirror of `out_edges`)
    in_edges: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,

    /// Accounts whose incident edges changed since the last drain
    dirty: BTreeSet<String>,

    /// Parallel edges counted individually
    edge_count: usize,

    /// Bumped on every mutation; snapshots are tagged with it
    generation: u64,

    limits: StoreLimits,
}

impl GraphStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    // =========================================================================
    // Delta application
    // =========================================================================

    /// Apply an inventory delta: assert ownership of `added` items and drop
    /// ownership of `removed` items for `account`.
    ///
    /// The account is created on first mention. An added item already owned
    /// by a *different* account is rejected per-item (the caller must
    /// explicitly transfer); re-asserting an item the account already owns is
    /// a no-op. Removing an item the account does not own is rejected
    /// per-item. Exceeding `max_items_per_account` fails the whole delta
    /// with `ResourceLimit` and applies nothing.
    pub fn apply_inventory_delta(
        &mut self,
        account: &str,
        added: Vec<Item>,
        removed: Vec<String>,
    ) -> Result<DeltaEffect, EngineError> {
        validate_id(account, "account")?;
        let mut effect = DeltaEffect::default();

        // Phase 1: classify without mutating
        let mut to_add: Vec<Item> = Vec::new();
        let mut noop_adds: Vec<String> = Vec::new();
        for item in added {
            validate_id(item.id(), "item")?;
            match self.owner_of.get(item.id()) {
                Some(owner) if owner != account => {
                    effect.reject(item.id(), format!("owned by {}", owner));
                }
                Some(_) => noop_adds.push(item.id().to_string()),
                None => {
                    if to_add.iter().any(|queued| queued.id() == item.id()) {
                        noop_adds.push(item.id().to_string());
                    } else {
                        to_add.push(item);
                    }
                }
            }
        }

        let mut to_remove: Vec<String> = Vec::new();
        for item_id in removed {
            validate_id(&item_id, "item")?;
            match self.owner_of.get(&item_id) {
                Some(owner) if owner == account => {
                    if !to_remove.contains(&item_id) {
                        to_remove.push(item_id);
                    }
                }
                _ => effect.reject(&item_id, "not owned by account"),
            }
        }

        let owned_now = self
            .accounts
            .get(account)
            .map(|a| a.owned().len())
            .unwrap_or(0);
        let projected = owned_now + to_add.len() - to_remove.len();
        if projected > self.limits.max_items_per_account {
            return Err(EngineError::ResourceLimit(LimitExceeded {
                kind: LimitKind::ItemsPerAccount,
                account: Some(account.to_string()),
                limit: self.limits.max_items_per_account,
                attempted: projected,
            }));
        }

        // Phase 2: mutate
        self.ensure_account(account);
        for item in to_add {
            let id = item.id().to_string();
            self.owner_of.insert(id.clone(), account.to_string());
            self.items.insert(id.clone(), item);
            self.accounts
                .get_mut(account)
                .expect("account ensured above")
                .insert_owned(id.clone());
            self.activate_item_edges(&id, &mut effect);
            effect.items_accepted.push(id);
        }
        effect.items_accepted.extend(noop_adds);

        for item_id in to_remove {
            self.deactivate_item_edges(&item_id, &mut effect);
            self.owner_of.remove(&item_id);
            self.items.remove(&item_id);
            self.accounts
                .get_mut(account)
                .expect("account ensured above")
                .remove_owned(&item_id);
            effect.items_accepted.push(item_id);
        }

        self.bump(&effect);
        Ok(effect)
    }

    /// Apply a want delta for `account`.
    ///
    /// Duplicate adds and removals of absent wants are no-ops, not errors.
    /// Wants referencing unknown items are retained and activate when the
    /// item appears. Exceeding `max_wants_per_account` fails the whole delta
    /// with `ResourceLimit` and applies nothing.
    pub fn apply_want_delta(
        &mut self,
        account: &str,
        added: Vec<String>,
        removed: Vec<String>,
    ) -> Result<DeltaEffect, EngineError> {
        validate_id(account, "account")?;
        let mut effect = DeltaEffect::default();

        let existing = self
            .accounts
            .get(account)
            .map(|a| a.wanted().clone())
            .unwrap_or_default();

        let mut to_add: Vec<String> = Vec::new();
        for item_id in added {
            validate_id(&item_id, "item")?;
            if !existing.contains(&item_id) && !to_add.contains(&item_id) {
                to_add.push(item_id.clone());
            }
            effect.items_accepted.push(item_id);
        }

        let mut to_remove: Vec<String> = Vec::new();
        for item_id in removed {
            validate_id(&item_id, "item")?;
            if existing.contains(&item_id) && !to_remove.contains(&item_id) {
                to_remove.push(item_id.clone());
            }
            effect.items_accepted.push(item_id);
        }

        let projected = existing.len() + to_add.len() - to_remove.len();
        if projected > self.limits.max_wants_per_account {
            return Err(EngineError::ResourceLimit(LimitExceeded {
                kind: LimitKind::WantsPerAccount,
                account: Some(account.to_string()),
                limit: self.limits.max_wants_per_account,
                attempted: projected,
            }));
        }

        self.ensure_account(account);
        for item_id in to_add {
            self.accounts
                .get_mut(account)
                .expect("account ensured above")
                .insert_want(item_id.clone());
            self.wanted_by
                .entry(item_id.clone())
                .or_default()
                .insert(account.to_string());
            if let Some(owner) = self.owner_of.get(&item_id).cloned() {
                if owner != account {
                    self.add_edge(&owner, account, &item_id, &mut effect);
                }
            }
        }

        for item_id in to_remove {
            self.accounts
                .get_mut(account)
                .expect("account ensured above")
                .remove_want(&item_id);
            if let Some(wanters) = self.wanted_by.get_mut(&item_id) {
                wanters.remove(account);
                if wanters.is_empty() {
                    self.wanted_by.remove(&item_id);
                }
            }
            if let Some(owner) = self.owner_of.get(&item_id).cloned() {
                if owner != account {
                    self.remove_edge(&owner, account, &item_id, &mut effect);
                }
            }
        }

        self.bump(&effect);
        Ok(effect)
    }

    /// Atomically transfer `item` from `from` to `to`, re-labeling edges.
    ///
    /// Fails with `InvalidArgument` when `from` is not the current owner.
    /// The receiving account is created if unknown.
    pub fn transfer_ownership(
        &mut self,
        item: &str,
        from: &str,
        to: &str,
    ) -> Result<DeltaEffect, EngineError> {
        validate_id(item, "item")?;
        validate_id(from, "account")?;
        validate_id(to, "account")?;
        if from == to {
            return Err(EngineError::InvalidArgument(
                "transfer source and target are the same account".to_string(),
            ));
        }
        match self.owner_of.get(item) {
            Some(owner) if owner == from => {}
            Some(owner) => {
                return Err(EngineError::InvalidArgument(format!(
                    "item {} is owned by {}, not {}",
                    item, owner, from
                )));
            }
            None => {
                return Err(EngineError::InvalidArgument(format!(
                    "unknown item: {}",
                    item
                )));
            }
        }

        let target_owned = self.accounts.get(to).map(|a| a.owned().len()).unwrap_or(0);
        if target_owned + 1 > self.limits.max_items_per_account {
            return Err(EngineError::ResourceLimit(LimitExceeded {
                kind: LimitKind::ItemsPerAccount,
                account: Some(to.to_string()),
                limit: self.limits.max_items_per_account,
                attempted: target_owned + 1,
            }));
        }

        let mut effect = DeltaEffect::default();
        self.ensure_account(to);

        self.deactivate_item_edges(item, &mut effect);
        self.accounts
            .get_mut(from)
            .expect("owner account must exist")
            .remove_owned(item);
        self.owner_of.insert(item.to_string(), to.to_string());
        self.accounts
            .get_mut(to)
            .expect("account ensured above")
            .insert_owned(item.to_string());
        self.activate_item_edges(item, &mut effect);

        // The item moved even when no edges changed on either side
        effect.touch(from);
        effect.touch(to);
        effect.items_accepted.push(item.to_string());

        self.bump(&effect);
        Ok(effect)
    }

    /// Remove an account, its owned items, and all incident edges.
    /// Wants other accounts expressed for the removed items are retained.
    pub fn remove_account(&mut self, account: &str) -> Result<DeltaEffect, EngineError> {
        validate_id(account, "account")?;
        let record = self
            .accounts
            .get(account)
            .cloned()
            .ok_or_else(|| EngineError::InvalidArgument(format!("unknown account: {}", account)))?;

        let mut effect = DeltaEffect::default();
        for item_id in record.owned() {
            self.deactivate_item_edges(item_id, &mut effect);
            self.owner_of.remove(item_id);
            self.items.remove(item_id);
        }
        for item_id in record.wanted() {
            if let Some(owner) = self.owner_of.get(item_id).cloned() {
                if owner != *account {
                    self.remove_edge(&owner, account, item_id, &mut effect);
                }
            }
            if let Some(wanters) = self.wanted_by.get_mut(item_id) {
                wanters.remove(account);
                if wanters.is_empty() {
                    self.wanted_by.remove(item_id);
                }
            }
        }
        self.accounts.remove(account);
        self.dirty.remove(account);
        effect.touched.remove(account);

        self.bump(&effect);
        Ok(effect)
    }

    // =========================================================================
    // Read-only lookups
    // =========================================================================

    /// Outgoing edges of `account`, grouped by target with sorted labels
    pub fn neighbors(&self, account: &str) -> Vec<(String, Vec<String>)> {
        self.out_edges
            .get(account)
            .map(|targets| {
                targets
                    .iter()
                    .map(|(to, labels)| (to.clone(), labels.iter().cloned().collect()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Incoming edges of `account`, grouped by source with sorted labels
    pub fn incoming(&self, account: &str) -> Vec<(String, Vec<String>)> {
        self.in_edges
            .get(account)
            .map(|sources| {
                sources
                    .iter()
                    .map(|(from, labels)| (from.clone(), labels.iter().cloned().collect()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All (owner, wanter) edges carrying `item` as label
    pub fn edges_labeled(&self, item: &str) -> Vec<(String, String)> {
        let Some(owner) = self.owner_of.get(item) else {
            return Vec::new();
        };
        self.wanted_by
            .get(item)
            .map(|wanters| {
                wanters
                    .iter()
                    .filter(|wanter| *wanter != owner)
                    .map(|wanter| (owner.clone(), wanter.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn owner_of(&self, item: &str) -> Option<&str> {
        self.owner_of.get(item).map(|s| s.as_str())
    }

    pub fn accounts(&self) -> &BTreeMap<String, Account> {
        &self.accounts
    }

    pub fn items(&self) -> &BTreeMap<String, Item> {
        &self.items
    }

    pub fn num_accounts(&self) -> usize {
        self.accounts.len()
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Parallel edges counted individually
    pub fn num_edges(&self) -> usize {
        self.edge_count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    // =========================================================================
    // Dirty tracking
    // =========================================================================

    /// Take the set of accounts marked dirty since the last drain
    pub fn drain_dirty(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.dirty)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Re-mark accounts dirty (used when a discovery run is preempted and
    /// its drained set must be requeued)
    pub fn mark_dirty<I: IntoIterator<Item = String>>(&mut self, accounts: I) {
        self.dirty.extend(accounts);
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    /// Freeze the current adjacency structure into an immutable arena view.
    ///
    /// Accounts become contiguous indices in sorted-id order; item labels are
    /// interned the same way. Further deltas proceed against the live store
    /// without affecting the snapshot.
    pub fn snapshot(&self) -> GraphSnapshot {
        let account_ids: Vec<String> = self.accounts.keys().cloned().collect();
        let account_index: BTreeMap<String, usize> = account_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();

        let mut label_set: BTreeSet<String> = BTreeSet::new();
        for targets in self.out_edges.values() {
            for labels in targets.values() {
                label_set.extend(labels.iter().cloned());
            }
        }
        let item_ids: Vec<String> = label_set.into_iter().collect();
        let item_index: BTreeMap<&str, usize> = item_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx))
            .collect();

        let valuations: Vec<Option<f64>> = item_ids
            .iter()
            .map(|id| self.items.get(id).and_then(|item| item.valuation()))
            .collect();

        let mut adjacency: Vec<Vec<AdjEntry>> = vec![Vec::new(); account_ids.len()];
        let mut reverse: Vec<Vec<usize>> = vec![Vec::new(); account_ids.len()];
        for (from, targets) in &self.out_edges {
            let from_idx = account_index[from];
            for (to, labels) in targets {
                let to_idx = account_index[to];
                let label_idxs: Vec<usize> =
                    labels.iter().map(|label| item_index[label.as_str()]).collect();
                adjacency[from_idx].push(AdjEntry {
                    to: to_idx,
                    labels: label_idxs,
                });
                reverse[to_idx].push(from_idx);
            }
        }
        for entries in &mut adjacency {
            entries.sort_by_key(|entry| entry.to);
        }
        for sources in &mut reverse {
            sources.sort_unstable();
        }

        GraphSnapshot::new(
            self.generation,
            account_ids,
            item_ids,
            valuations,
            adjacency,
            reverse,
        )
    }

    // =========================================================================
    // Invariant verification
    // =========================================================================

    /// Check the structural invariants the rest of the engine relies on.
    /// A violation here is a `Fatal` condition: the tenant gets quarantined.
    pub fn verify_invariants(&self) -> Result<(), String> {
        for (from, targets) in &self.out_edges {
            for (to, labels) in targets {
                if from == to {
                    return Err(format!("self-loop on account {}", from));
                }
                for label in labels {
                    match self.owner_of.get(label) {
                        Some(owner) if owner == from => {}
                        Some(owner) => {
                            return Err(format!(
                                "edge {}→{} labeled {} but owner is {}",
                                from, to, label, owner
                            ));
                        }
                        None => {
                            return Err(format!(
                                "edge {}→{} labeled {} but item is unknown",
                                from, to, label
                            ));
                        }
                    }
                    let wants_it = self
                        .accounts
                        .get(to)
                        .map(|a| a.wants(label))
                        .unwrap_or(false);
                    if !wants_it {
                        return Err(format!(
                            "edge {}→{} labeled {} but {} does not want it",
                            from, to, label, to
                        ));
                    }
                    let mirrored = self
                        .in_edges
                        .get(to)
                        .and_then(|sources| sources.get(from))
                        .map(|labels| labels.contains(label))
                        .unwrap_or(false);
                    if !mirrored {
                        return Err(format!(
                            "edge {}→{} labeled {} missing from in_edges mirror",
                            from, to, label
                        ));
                    }
                }
            }
        }
        for (item, owner) in &self.owner_of {
            let owned = self
                .accounts
                .get(owner)
                .map(|a| a.owns(item))
                .unwrap_or(false);
            if !owned {
                return Err(format!(
                    "owner_of says {} owns {} but the account set disagrees",
                    owner, item
                ));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn ensure_account(&mut self, id: &str) {
        self.accounts
            .entry(id.to_string())
            .or_insert_with(|| Account::new(id.to_string()));
    }

    /// Materialize edges owner→wanter for every retained want of `item`
    fn activate_item_edges(&mut self, item: &str, effect: &mut DeltaEffect) {
        let Some(owner) = self.owner_of.get(item).cloned() else {
            return;
        };
        let wanters: Vec<String> = self
            .wanted_by
            .get(item)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for wanter in wanters {
            if wanter != owner {
                self.ensure_account(&wanter);
                self.add_edge(&owner, &wanter, item, effect);
            }
        }
    }

    /// Remove every edge carrying `item` as label (owner must still be set)
    fn deactivate_item_edges(&mut self, item: &str, effect: &mut DeltaEffect) {
        let Some(owner) = self.owner_of.get(item).cloned() else {
            return;
        };
        let wanters: Vec<String> = self
            .wanted_by
            .get(item)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for wanter in wanters {
            if wanter != owner {
                self.remove_edge(&owner, &wanter, item, effect);
            }
        }
    }

    fn add_edge(&mut self, from: &str, to: &str, item: &str, effect: &mut DeltaEffect) {
        debug_assert_ne!(from, to, "edges never self-loop");
        let inserted = self
            .out_edges
            .entry(from.to_string())
            .or_default()
            .entry(to.to_string())
            .or_default()
            .insert(item.to_string());
        if inserted {
            self.in_edges
                .entry(to.to_string())
                .or_default()
                .entry(from.to_string())
                .or_default()
                .insert(item.to_string());
            self.edge_count += 1;
            effect.edges_added += 1;
            effect.touch(from);
            effect.touch(to);
            self.dirty.insert(from.to_string());
            self.dirty.insert(to.to_string());
        }
    }

    fn remove_edge(&mut self, from: &str, to: &str, item: &str, effect: &mut DeltaEffect) {
        let mut removed = false;
        if let Some(targets) = self.out_edges.get_mut(from) {
            if let Some(labels) = targets.get_mut(to) {
                removed = labels.remove(item);
                if labels.is_empty() {
                    targets.remove(to);
                }
            }
            if targets.is_empty() {
                self.out_edges.remove(from);
            }
        }
        if removed {
            if let Some(sources) = self.in_edges.get_mut(to) {
                if let Some(labels) = sources.get_mut(from) {
                    labels.remove(item);
                    if labels.is_empty() {
                        sources.remove(from);
                    }
                }
                if sources.is_empty() {
                    self.in_edges.remove(to);
                }
            }
            self.edge_count -= 1;
            effect.edges_removed += 1;
            effect.touch(from);
            effect.touch(to);
            self.dirty.insert(from.to_string());
            self.dirty.insert(to.to_string());
        }
    }

    fn bump(&mut self, effect: &DeltaEffect) {
        if effect.changed_graph() || !effect.items_accepted.is_empty() {
            self.generation += 1;
        }
    }
}

fn validate_id(id: &str, what: &str) -> Result<(), EngineError> {
    if id.is_empty() {
        return Err(EngineError::InvalidArgument(format!(
            "{} id must not be empty",
            what
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GraphStore {
        GraphStore::new(StoreLimits::default())
    }

    #[test]
    fn edge_appears_when_ownership_meets_want() {
        let mut s = store();
        s.apply_inventory_delta("alice", vec![Item::new("n1".to_string())], vec![])
            .unwrap();
        assert_eq!(s.num_edges(), 0);

        let effect = s
            .apply_want_delta("bob", vec!["n1".to_string()], vec![])
            .unwrap();
        assert_eq!(effect.edges_added, 1);
        assert_eq!(s.num_edges(), 1);
        assert_eq!(s.neighbors("alice"), vec![("bob".to_string(), vec!["n1".to_string()])]);
        assert_eq!(s.incoming("bob"), vec![("alice".to_string(), vec!["n1".to_string()])]);
        s.verify_invariants().unwrap();
    }

    #[test]
    fn retained_want_activates_when_item_appears() {
        let mut s = store();
        s.apply_want_delta("bob", vec!["n1".to_string()], vec![])
            .unwrap();
        assert_eq!(s.num_edges(), 0);

        let effect = s
            .apply_inventory_delta("alice", vec![Item::new("n1".to_string())], vec![])
            .unwrap();
        assert_eq!(effect.edges_added, 1);
        assert_eq!(s.num_edges(), 1);
    }

    #[test]
    fn want_for_own_item_creates_no_edge() {
        let mut s = store();
        s.apply_inventory_delta("alice", vec![Item::new("n1".to_string())], vec![])
            .unwrap();
        let effect = s
            .apply_want_delta("alice", vec!["n1".to_string()], vec![])
            .unwrap();
        assert_eq!(effect.edges_added, 0);
        assert_eq!(s.num_edges(), 0);
        s.verify_invariants().unwrap();
    }

    #[test]
    fn conflicting_ownership_rejected_per_item() {
        let mut s = store();
        s.apply_inventory_delta("alice", vec![Item::new("n1".to_string())], vec![])
            .unwrap();
        let effect = s
            .apply_inventory_delta(
                "bob",
                vec![Item::new("n1".to_string()), Item::new("n2".to_string())],
                vec![],
            )
            .unwrap();
        assert_eq!(effect.items_accepted, vec!["n2".to_string()]);
        assert_eq!(effect.items_rejected.len(), 1);
        assert_eq!(effect.items_rejected[0].id, "n1");
        assert_eq!(s.owner_of("n1"), Some("alice"));
        assert_eq!(s.owner_of("n2"), Some("bob"));
    }

    #[test]
    fn add_then_remove_is_noop_on_graph() {
        let mut s = store();
        s.apply_want_delta("bob", vec!["n1".to_string()], vec![])
            .unwrap();
        s.apply_inventory_delta("alice", vec![Item::new("n1".to_string())], vec![])
            .unwrap();
        assert_eq!(s.num_edges(), 1);

        s.apply_inventory_delta("alice", vec![], vec!["n1".to_string()])
            .unwrap();
        assert_eq!(s.num_edges(), 0);
        assert_eq!(s.num_items(), 0);
        assert!(s.account("bob").unwrap().wants("n1"));
        s.verify_invariants().unwrap();
    }

    #[test]
    fn transfer_relabels_edges() {
        let mut s = store();
        s.apply_inventory_delta("alice", vec![Item::new("n1".to_string())], vec![])
            .unwrap();
        s.apply_want_delta("bob", vec!["n1".to_string()], vec![])
            .unwrap();
        s.apply_want_delta("carol", vec!["n1".to_string()], vec![])
            .unwrap();
        assert_eq!(s.num_edges(), 2);

        let effect = s.transfer_ownership("n1", "alice", "bob").unwrap();
        // bob now owns it: bob→carol remains the only edge
        assert_eq!(s.num_edges(), 1);
        assert_eq!(s.owner_of("n1"), Some("bob"));
        assert_eq!(s.neighbors("bob"), vec![("carol".to_string(), vec!["n1".to_string()])]);
        assert!(effect.touched.contains("alice"));
        assert!(effect.touched.contains("bob"));
        s.verify_invariants().unwrap();
    }

    #[test]
    fn transfer_from_non_owner_is_invalid() {
        let mut s = store();
        s.apply_inventory_delta("alice", vec![Item::new("n1".to_string())], vec![])
            .unwrap();
        let err = s.transfer_ownership("n1", "bob", "carol").unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn remove_account_drops_incident_edges() {
        let mut s = store();
        s.apply_inventory_delta("alice", vec![Item::new("n1".to_string())], vec![])
            .unwrap();
        s.apply_inventory_delta("bob", vec![Item::new("n2".to_string())], vec![])
            .unwrap();
        s.apply_want_delta("alice", vec!["n2".to_string()], vec![])
            .unwrap();
        s.apply_want_delta("bob", vec!["n1".to_string()], vec![])
            .unwrap();
        assert_eq!(s.num_edges(), 2);

        s.remove_account("bob").unwrap();
        assert_eq!(s.num_edges(), 0);
        assert!(s.account("bob").is_none());
        assert_eq!(s.owner_of("n2"), None);
        // alice's want for n2 is retained
        assert!(s.account("alice").unwrap().wants("n2"));
        s.verify_invariants().unwrap();
    }

    #[test]
    fn items_per_account_cap_enforced_atomically() {
        let mut s = GraphStore::new(StoreLimits {
            max_items_per_account: 2,
            max_wants_per_account: 10,
        });
        let err = s
            .apply_inventory_delta(
                "alice",
                vec![
                    Item::new("n1".to_string()),
                    Item::new("n2".to_string()),
                    Item::new("n3".to_string()),
                ],
                vec![],
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::ResourceLimit(_)));
        // nothing applied
        assert_eq!(s.num_items(), 0);
        assert!(s.account("alice").is_none());
    }

    #[test]
    fn dirty_set_tracks_edge_changes() {
        let mut s = store();
        s.apply_inventory_delta("alice", vec![Item::new("n1".to_string())], vec![])
            .unwrap();
        assert!(!s.has_dirty());

        s.apply_want_delta("bob", vec!["n1".to_string()], vec![])
            .unwrap();
        let dirty = s.drain_dirty();
        assert!(dirty.contains("alice") && dirty.contains("bob"));
        assert!(!s.has_dirty());
    }

    #[test]
    fn parallel_edges_kept_per_label() {
        let mut s = store();
        s.apply_inventory_delta(
            "alice",
            vec![Item::new("n1".to_string()), Item::new("n2".to_string())],
            vec![],
        )
        .unwrap();
        s.apply_want_delta("bob", vec!["n1".to_string(), "n2".to_string()], vec![])
            .unwrap();
        assert_eq!(s.num_edges(), 2);
        let neighbors = s.neighbors("alice");
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].1, vec!["n1".to_string(), "n2".to_string()]);
    }
}
