//! Wants graph subsystem
//!
//! - `store`: the live per-tenant multigraph with inverted indexes and
//!   dirty tracking
//! - `snapshot`: immutable arena views the algorithms run against
//! - `scc`: Tarjan decomposition (sequential and chunked parallel)
//! - `community`: modularity partitioning of oversized SCCs

pub mod community;
pub mod scc;
pub mod snapshot;
pub mod store;

pub use community::partition_communities;
pub use scc::{find_sccs, find_sccs_auto, find_sccs_parallel, SccResult, TARJAN_BATCH};
pub use snapshot::{AdjEntry, GraphSnapshot};
pub use store::{GraphStore, StoreLimits};
