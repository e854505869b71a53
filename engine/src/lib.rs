//! Tradeweave Engine: multi-party barter cycle discovery
//!
//! Given a population of accounts, each holding owned items and expressing
//! wanted items, the engine continuously discovers trade loops: directed
//! cycles over accounts where each edge transfers an item from its current
//! owner to a participant who wants it. Bilateral swaps are the length-2
//! special case; discovery extends to cycles of bounded length.
//!
//! # Architecture
//!
//! - **models**: domain types (items, accounts, deltas, tenant config)
//! - **graph**: the per-tenant wants graph, immutable snapshots, Tarjan SCC
//!   decomposition, community partitioning
//! - **discovery**: bounded Johnson enumeration, canonicalization,
//!   deduplication, scoring
//! - **tenant**: per-tenant state managers, the scored-cycle cache,
//!   versioned persistence snapshots
//! - **runtime**: deadlines, cancellation tokens, the discovery worker pool
//! - **persist**: the save/load capability (filesystem and key-value)
//! - **engine**: the process root object and discovery façade
//!
//! # Critical Invariants
//!
//! 1. Every edge A→B labeled i satisfies `owner(i) == A` and `i ∈ wants(B)`
//! 2. Emitted cycles have all accounts distinct and all item labels distinct
//! 3. Canonical-form equality means duplicate; the deduper never returns both
//! 4. Tenants are fully isolated: no operation observes another tenant's
//!    state
//! 5. Partial results are first-class: deadline or cancellation yields
//!    usable output explicitly marked truncated

pub mod discovery;
pub mod engine;
pub mod error;
pub mod graph;
pub mod models;
pub mod persist;
pub mod runtime;
pub mod tenant;

// Re-exports for convenience
pub use discovery::{CanonicalCycle, ScoredCycle, SubScores};
pub use engine::{Engine, EngineConfig, PersistenceConfig};
pub use error::{EngineError, LimitExceeded, LimitKind};
pub use graph::{GraphSnapshot, GraphStore, StoreLimits};
pub use models::{Account, Delta, Item, TenantConfig};
pub use tenant::{SubmissionOutcome, TenantManager, TenantStatus};
