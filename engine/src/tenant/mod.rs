//! Per-tenant state management
//!
//! - `manager`: the tenant state manager coordinating deltas, discovery,
//!   caching, and persistence offers
//! - `cache`: the account-indexed scored-cycle cache
//! - `snapshot`: versioned persistence blobs and config hashing

pub mod cache;
pub mod manager;
pub mod snapshot;

pub use cache::CycleCache;
pub use manager::{RunSummary, SubmissionOutcome, TenantManager, TenantStatus};
pub use snapshot::{
    build_snapshot, compute_config_hash, restore_snapshot, validate_snapshot, SnapshotRejection,
    TenantSnapshot, SNAPSHOT_VERSION,
};
