//! Tenant snapshot: save/load of per-tenant state
//!
//! Serializes one tenant's accounts, item ownership, and scored-cycle cache
//! into a versioned, self-describing blob for the persistence capability.
//! Set-valued fields carry explicit type tags so the format stays portable.
//!
//! # Critical Invariants
//!
//! - **Versioning**: an incompatible version on load rejects the blob; the
//!   tenant starts empty (warn, never crash)
//! - **Config matching**: the blob records a SHA-256 hash of the tenant
//!   configuration; a mismatch on load rejects the blob
//! - **Referential integrity**: every owned item references a known account
//!   and vice versa; cycles only reference known accounts

use crate::discovery::ScoredCycle;
use crate::graph::{GraphStore, StoreLimits};
use crate::models::{Item, TenantConfig};
use crate::tenant::cache::CycleCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

/// Current snapshot schema version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Why a snapshot was rejected on load
#[derive(Debug, Error, PartialEq)]
pub enum SnapshotRejection {
    #[error("snapshot version {found} is incompatible with {SNAPSHOT_VERSION}")]
    VersionMismatch { found: u32 },

    #[error("snapshot config hash does not match the tenant configuration")]
    ConfigMismatch,

    #[error("snapshot failed integrity validation: {0}")]
    Corrupt(String),
}

/// Self-describing set field: `{kind: "set", elements: [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetField {
    pub kind: String,
    pub elements: Vec<String>,
}

impl SetField {
    pub fn new(elements: Vec<String>) -> Self {
        Self {
            kind: "set".to_string(),
            elements,
        }
    }

    fn check(&self, what: &str) -> Result<(), SnapshotRejection> {
        if self.kind != "set" {
            return Err(SnapshotRejection::Corrupt(format!(
                "{} field tagged {:?}, expected \"set\"",
                what, self.kind
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: String,
    pub owned: SetField,
    pub wanted: SetField,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: String,
    pub owner: String,
    pub display_name: Option<String>,
    pub collection: Option<String>,
    pub valuation: Option<f64>,
}

/// Complete per-tenant persistence blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSnapshot {
    pub version: u32,
    pub config_hash: String,
    pub last_sequence: u64,
    pub accounts: Vec<AccountSnapshot>,
    pub items: Vec<ItemSnapshot>,
    pub cycles: Vec<ScoredCycle>,
}

// ============================================================================
// Config hashing
// ============================================================================

/// Deterministic SHA-256 over the canonical JSON form of the config.
///
/// Keys are recursively sorted so the hash is independent of serializer
/// field ordering.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, serde_json::Error> {
    use serde_json::Value;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(values) => Value::Array(values.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let canonical = canonicalize(serde_json::to_value(config)?);
    let json = serde_json::to_string(&canonical)?;
    let digest = Sha256::digest(json.as_bytes());
    Ok(format!("{:x}", digest))
}

// ============================================================================
// Build / validate / restore
// ============================================================================

/// Freeze a tenant's store and cycle cache into a snapshot.
pub fn build_snapshot(
    store: &GraphStore,
    cache: &CycleCache,
    config: &TenantConfig,
    last_sequence: u64,
) -> Result<TenantSnapshot, serde_json::Error> {
    let accounts = store
        .accounts()
        .values()
        .map(|account| AccountSnapshot {
            id: account.id().to_string(),
            owned: SetField::new(account.owned().iter().cloned().collect()),
            wanted: SetField::new(account.wanted().iter().cloned().collect()),
        })
        .collect();

    let items = store
        .items()
        .values()
        .map(|item| ItemSnapshot {
            id: item.id().to_string(),
            owner: store
                .owner_of(item.id())
                .unwrap_or_default()
                .to_string(),
            display_name: item.display_name().map(|s| s.to_string()),
            collection: item.collection().map(|s| s.to_string()),
            valuation: item.valuation(),
        })
        .collect();

    Ok(TenantSnapshot {
        version: SNAPSHOT_VERSION,
        config_hash: compute_config_hash(config)?,
        last_sequence,
        accounts,
        items,
        cycles: cache.query(usize::MAX, None, None),
    })
}

/// Validate snapshot integrity before restoring from it.
pub fn validate_snapshot(snapshot: &TenantSnapshot) -> Result<(), SnapshotRejection> {
    let mut account_ids = std::collections::BTreeSet::new();
    for account in &snapshot.accounts {
        account.owned.check("owned")?;
        account.wanted.check("wanted")?;
        if !account_ids.insert(account.id.as_str()) {
            return Err(SnapshotRejection::Corrupt(format!(
                "duplicate account {}",
                account.id
            )));
        }
    }

    let mut item_owners: BTreeMap<&str, &str> = BTreeMap::new();
    for item in &snapshot.items {
        if item_owners.insert(&item.id, &item.owner).is_some() {
            return Err(SnapshotRejection::Corrupt(format!(
                "item {} appears twice",
                item.id
            )));
        }
        if !account_ids.contains(item.owner.as_str()) {
            return Err(SnapshotRejection::Corrupt(format!(
                "item {} owned by unknown account {}",
                item.id, item.owner
            )));
        }
    }

    for account in &snapshot.accounts {
        for item_id in &account.owned.elements {
            match item_owners.get(item_id.as_str()) {
                Some(owner) if *owner == account.id => {}
                Some(owner) => {
                    return Err(SnapshotRejection::Corrupt(format!(
                        "account {} claims {} but the item record says {}",
                        account.id, item_id, owner
                    )));
                }
                None => {
                    return Err(SnapshotRejection::Corrupt(format!(
                        "account {} claims unknown item {}",
                        account.id, item_id
                    )));
                }
            }
        }
    }

    for cycle in &snapshot.cycles {
        for participant in cycle.cycle.accounts() {
            if !account_ids.contains(participant.as_str()) {
                return Err(SnapshotRejection::Corrupt(format!(
                    "cached cycle references unknown account {}",
                    participant
                )));
            }
        }
    }

    Ok(())
}

/// Rebuild a graph store and cached cycles from a snapshot.
///
/// The graph is reconstructed by replaying ownership and want assertions
/// through the store's public operations, so every index invariant holds by
/// construction.
pub fn restore_snapshot(
    snapshot: &TenantSnapshot,
    config: &TenantConfig,
) -> Result<(GraphStore, Vec<ScoredCycle>), SnapshotRejection> {
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(SnapshotRejection::VersionMismatch {
            found: snapshot.version,
        });
    }
    let expected_hash = compute_config_hash(config)
        .map_err(|err| SnapshotRejection::Corrupt(err.to_string()))?;
    if snapshot.config_hash != expected_hash {
        return Err(SnapshotRejection::ConfigMismatch);
    }
    validate_snapshot(snapshot)?;

    let mut store = GraphStore::new(StoreLimits {
        max_items_per_account: config.max_items_per_account,
        max_wants_per_account: config.max_wants_per_account,
    });

    let item_meta: BTreeMap<&str, &ItemSnapshot> = snapshot
        .items
        .iter()
        .map(|item| (item.id.as_str(), item))
        .collect();

    for account in &snapshot.accounts {
        let items: Vec<Item> = account
            .owned
            .elements
            .iter()
            .map(|id| {
                let mut item = Item::new(id.clone());
                if let Some(meta) = item_meta.get(id.as_str()) {
                    if let Some(name) = &meta.display_name {
                        item = item.with_display_name(name.clone());
                    }
                    if let Some(collection) = &meta.collection {
                        item = item.with_collection(collection.clone());
                    }
                    if let Some(valuation) = meta.valuation {
                        item = item.with_valuation(valuation);
                    }
                }
                item
            })
            .collect();
        store
            .apply_inventory_delta(&account.id, items, Vec::new())
            .map_err(|err| SnapshotRejection::Corrupt(err.to_string()))?;
    }
    for account in &snapshot.accounts {
        store
            .apply_want_delta(&account.id, account.wanted.elements.clone(), Vec::new())
            .map_err(|err| SnapshotRejection::Corrupt(err.to_string()))?;
    }
    // replay left everything dirty; a restored tenant starts clean
    store.drain_dirty();

    Ok((store, snapshot.cycles.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn populated_store() -> GraphStore {
        let mut store = GraphStore::new(StoreLimits::default());
        store
            .apply_inventory_delta(
                "alice",
                vec![Item::new("n1".to_string()).with_valuation(2.0)],
                vec![],
            )
            .unwrap();
        store
            .apply_inventory_delta("bob", vec![Item::new("n2".to_string())], vec![])
            .unwrap();
        store
            .apply_want_delta("alice", vec!["n2".to_string(), "ghost".to_string()], vec![])
            .unwrap();
        store
            .apply_want_delta("bob", vec!["n1".to_string()], vec![])
            .unwrap();
        store
    }

    #[test]
    fn config_hash_is_deterministic_and_sensitive() {
        let config = TenantConfig::default();
        let h1 = compute_config_hash(&config).unwrap();
        let h2 = compute_config_hash(&config).unwrap();
        assert_eq!(h1, h2);

        let mut other = TenantConfig::default();
        other.max_depth = 5;
        assert_ne!(h1, compute_config_hash(&other).unwrap());
    }

    #[test]
    fn roundtrip_reproduces_graph_structure() {
        let store = populated_store();
        let config = TenantConfig::default();
        let cache = CycleCache::new(100, Duration::from_secs(60));
        let snapshot = build_snapshot(&store, &cache, &config, 7).unwrap();
        assert_eq!(snapshot.last_sequence, 7);

        let (restored, cycles) = restore_snapshot(&snapshot, &config).unwrap();
        assert!(cycles.is_empty());
        assert_eq!(restored.num_accounts(), store.num_accounts());
        assert_eq!(restored.num_items(), store.num_items());
        assert_eq!(restored.num_edges(), store.num_edges());
        assert_eq!(restored.owner_of("n1"), Some("alice"));
        assert_eq!(
            restored.item("n1").unwrap().valuation(),
            Some(2.0),
            "item metadata survives"
        );
        assert!(restored.account("alice").unwrap().wants("ghost"));
        restored.verify_invariants().unwrap();
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let config = TenantConfig::default();
        let cache = CycleCache::new(100, Duration::from_secs(60));
        let mut snapshot = build_snapshot(&populated_store(), &cache, &config, 1).unwrap();
        snapshot.version = 99;
        assert_eq!(
            restore_snapshot(&snapshot, &config).unwrap_err(),
            SnapshotRejection::VersionMismatch { found: 99 }
        );
    }

    #[test]
    fn config_mismatch_is_rejected() {
        let config = TenantConfig::default();
        let cache = CycleCache::new(100, Duration::from_secs(60));
        let snapshot = build_snapshot(&populated_store(), &cache, &config, 1).unwrap();

        let mut other = TenantConfig::default();
        other.max_depth = 3;
        assert_eq!(
            restore_snapshot(&snapshot, &other).unwrap_err(),
            SnapshotRejection::ConfigMismatch
        );
    }

    #[test]
    fn corrupt_set_tag_is_rejected() {
        let config = TenantConfig::default();
        let cache = CycleCache::new(100, Duration::from_secs(60));
        let mut snapshot = build_snapshot(&populated_store(), &cache, &config, 1).unwrap();
        snapshot.accounts[0].owned.kind = "list".to_string();
        assert!(matches!(
            restore_snapshot(&snapshot, &config).unwrap_err(),
            SnapshotRejection::Corrupt(_)
        ));
    }

    #[test]
    fn orphaned_item_is_rejected() {
        let config = TenantConfig::default();
        let cache = CycleCache::new(100, Duration::from_secs(60));
        let mut snapshot = build_snapshot(&populated_store(), &cache, &config, 1).unwrap();
        snapshot.items.push(ItemSnapshot {
            id: "stray".to_string(),
            owner: "nobody".to_string(),
            display_name: None,
            collection: None,
            valuation: None,
        });
        assert!(matches!(
            restore_snapshot(&snapshot, &config).unwrap_err(),
            SnapshotRejection::Corrupt(_)
        ));
    }
}
