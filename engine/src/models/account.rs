//! Account model
//!
//! A participant identity within one tenant. Each account holds two sets:
//! the items it currently owns and the items it wants. Both are sets (no
//! duplicates). An account may want items it owns; such wants are trivially
//! ignorable when edges are derived, but they are not errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A participant in the barter network
///
/// # Example
/// ```
/// use tradeweave_engine::models::Account;
///
/// let mut account = Account::new("alice".to_string());
/// account.insert_owned("nft_1".to_string());
/// account.insert_want("nft_2".to_string());
///
/// assert!(account.owns("nft_1"));
/// assert!(account.wants("nft_2"));
/// assert_eq!(account.owned().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier within the tenant
    id: String,

    /// Items this account currently owns
    owned: BTreeSet<String>,

    /// Items this account wants. May reference items not yet known to the
    /// system; such wants are retained and become active when the item
    /// appears.
    wanted: BTreeSet<String>,
}

impl Account {
    /// Create an account with empty owned and wanted sets
    pub fn new(id: String) -> Self {
        Self {
            id,
            owned: BTreeSet::new(),
            wanted: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owned(&self) -> &BTreeSet<String> {
        &self.owned
    }

    pub fn wanted(&self) -> &BTreeSet<String> {
        &self.wanted
    }

    pub fn owns(&self, item: &str) -> bool {
        self.owned.contains(item)
    }

    pub fn wants(&self, item: &str) -> bool {
        self.wanted.contains(item)
    }

    /// Add an item to the owned set. Returns `true` if newly inserted.
    pub fn insert_owned(&mut self, item: String) -> bool {
        self.owned.insert(item)
    }

    /// Remove an item from the owned set. Returns `true` if it was present.
    pub fn remove_owned(&mut self, item: &str) -> bool {
        self.owned.remove(item)
    }

    /// Add an item to the want set. Returns `true` if newly inserted.
    pub fn insert_want(&mut self, item: String) -> bool {
        self.wanted.insert(item)
    }

    /// Remove an item from the want set. Returns `true` if it was present.
    pub fn remove_want(&mut self, item: &str) -> bool {
        self.wanted.remove(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_insert_is_noop() {
        let mut account = Account::new("a".to_string());
        assert!(account.insert_owned("n1".to_string()));
        assert!(!account.insert_owned("n1".to_string()));
        assert_eq!(account.owned().len(), 1);
    }

    #[test]
    fn may_want_owned_item() {
        let mut account = Account::new("a".to_string());
        account.insert_owned("n1".to_string());
        assert!(account.insert_want("n1".to_string()));
        assert!(account.owns("n1") && account.wants("n1"));
    }
}
