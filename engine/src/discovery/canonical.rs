//! Cycle canonicalization
//!
//! Two enumerations starting from different nodes surface the same cycle as
//! different rotations. The canonical form rotates the cycle so the
//! lexicographically smallest account identifier comes first; equality of
//! cycles is equality of canonical forms, and the canonical key string is
//! what the deduper and the cycle cache index on.

use serde::{Deserialize, Serialize};

/// A rotation-normalized trade cycle
///
/// `accounts[j]` gives up `items[j]` to `accounts[(j+1) % k]`. All accounts
/// are distinct, all items are distinct, and `accounts[0]` is the
/// lexicographically smallest participant.
///
/// # Example
/// ```
/// use tradeweave_engine::discovery::CanonicalCycle;
///
/// let cycle = CanonicalCycle::new(
///     vec!["bob".to_string(), "alice".to_string()],
///     vec!["n2".to_string(), "n1".to_string()],
/// );
/// assert_eq!(cycle.accounts(), &["alice".to_string(), "bob".to_string()]);
/// assert_eq!(cycle.key(), "alice:n1|bob:n2");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCycle {
    accounts: Vec<String>,
    items: Vec<String>,
    key: String,
}

impl CanonicalCycle {
    /// Canonicalize a cycle given in any rotation.
    ///
    /// # Panics
    /// Panics if the slices are empty or of different lengths; enumeration
    /// never produces such cycles.
    pub fn new(accounts: Vec<String>, items: Vec<String>) -> Self {
        assert_eq!(accounts.len(), items.len(), "one outgoing item per account");
        assert!(!accounts.is_empty(), "cycles have at least two participants");

        let pivot = accounts
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(idx, _)| idx)
            .unwrap_or(0);

        let k = accounts.len();
        let rotated_accounts: Vec<String> =
            (0..k).map(|j| accounts[(pivot + j) % k].clone()).collect();
        let rotated_items: Vec<String> = (0..k).map(|j| items[(pivot + j) % k].clone()).collect();
        let key = build_key(&rotated_accounts, &rotated_items);

        Self {
            accounts: rotated_accounts,
            items: rotated_items,
            key,
        }
    }

    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Cycle length (number of participants)
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn contains_account(&self, account: &str) -> bool {
        self.accounts.iter().any(|a| a == account)
    }
}

fn build_key(accounts: &[String], items: &[String]) -> String {
    let mut key = String::new();
    for (j, (account, item)) in accounts.iter().zip(items.iter()).enumerate() {
        if j > 0 {
            key.push('|');
        }
        key.push_str(account);
        key.push(':');
        key.push_str(item);
    }
    key
}
