//! Delta model
//!
//! Atomic add/remove/transfer operations on the wants graph, and the effect
//! record each application produces. Deltas are the only way external
//! collaborators mutate tenant state; the effect's `touched` set feeds the
//! dirty tracking that drives incremental re-discovery.

use crate::models::Item;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single mutation submitted to a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Delta {
    /// Add and/or remove items from an account's owned set.
    /// The account is created on first mention.
    Inventory {
        account: String,
        added: Vec<Item>,
        removed: Vec<String>,
    },

    /// Add and/or remove items from an account's want set.
    /// Duplicate adds and removals of absent wants are no-ops.
    Wants {
        account: String,
        added: Vec<String>,
        removed: Vec<String>,
    },

    /// Atomically move an item between accounts, re-labeling edges
    Transfer {
        item: String,
        from: String,
        to: String,
    },

    /// Remove an account, its owned items, and all incident edges
    RemoveAccount { account: String },
}

impl Delta {
    /// Primary account the delta is about, used for log correlation
    pub fn account(&self) -> &str {
        match self {
            Delta::Inventory { account, .. } => account,
            Delta::Wants { account, .. } => account,
            Delta::Transfer { from, .. } => from,
            Delta::RemoveAccount { account } => account,
        }
    }
}

/// Per-item rejection with a caller-facing reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedItem {
    pub id: String,
    pub reason: String,
}

/// What applying a delta changed
///
/// `touched` contains every account whose incident edges were added,
/// removed, or re-labeled; these accounts are marked dirty for SCC
/// recomputation and their cached cycles are invalidated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaEffect {
    /// Accounts whose edges changed
    pub touched: BTreeSet<String>,

    /// Item ids accepted by the delta
    pub items_accepted: Vec<String>,

    /// Item ids rejected, each with a reason
    pub items_rejected: Vec<RejectedItem>,

    /// Edges added to the wants graph
    pub edges_added: usize,

    /// Edges removed from the wants graph
    pub edges_removed: usize,
}

impl DeltaEffect {
    /// True when the graph structure changed at all
    pub fn changed_graph(&self) -> bool {
        self.edges_added > 0 || self.edges_removed > 0
    }

    pub(crate) fn touch(&mut self, account: &str) {
        self.touched.insert(account.to_string());
    }

    pub(crate) fn reject(&mut self, id: &str, reason: impl Into<String>) {
        self.items_rejected.push(RejectedItem {
            id: id.to_string(),
            reason: reason.into(),
        });
    }
}
