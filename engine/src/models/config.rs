//! Per-tenant configuration
//!
//! All knobs that shape discovery behavior for one tenant. Defaults follow
//! the operating envelope the engine is tuned for; `validate()` rejects
//! out-of-range values with `InvalidArgument` so a tenant can never be
//! provisioned into an unsupported regime.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Hard bounds on the cycle search depth
pub const MIN_CYCLE_DEPTH: usize = 2;
pub const MAX_CYCLE_DEPTH: usize = 15;

/// Tenant configuration record
///
/// # Example
/// ```
/// use tradeweave_engine::models::TenantConfig;
///
/// let config = TenantConfig::default();
/// assert_eq!(config.max_depth, 10);
/// assert!(config.validate().is_ok());
///
/// let bad = TenantConfig { max_depth: 40, ..TenantConfig::default() };
/// assert!(bad.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Maximum cycle length to enumerate, in [2, 15]
    pub max_depth: usize,

    /// Minimum composite score a cycle must reach to be kept, in [0, 1]
    pub min_efficiency: f64,

    /// Maximum cycles returned from a single query
    pub max_cycles_per_query: usize,

    /// Time budget for a scheduled discovery run
    pub discovery_timeout_ms: u64,

    /// SCCs larger than this are split into communities before enumeration
    pub community_partition_threshold: usize,

    /// Worker threads used for per-community enumeration within one run
    pub parallel_community_workers: usize,

    /// Disable community partitioning and enumerate whole SCCs (exhaustive,
    /// slower)
    pub strict_mode: bool,

    /// Cap on parallel-edge label combinations expanded per account pair
    pub max_parallel_edge_labels: usize,

    /// Cap on items one account may own
    pub max_items_per_account: usize,

    /// Cap on wants one account may express
    pub max_wants_per_account: usize,

    /// Bound on cached cycles per tenant; lowest-scored are evicted first
    pub cycle_cache_limit: usize,

    /// Cache age beyond which queries trigger a synchronous re-discovery
    pub cache_ttl_ms: u64,

    /// Deadline for the synchronous re-discovery a stale query triggers
    pub sync_requery_budget_ms: u64,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_efficiency: 0.3,
            max_cycles_per_query: 100,
            discovery_timeout_ms: 30_000,
            community_partition_threshold: 500,
            parallel_community_workers: 8,
            strict_mode: false,
            max_parallel_edge_labels: 4,
            max_items_per_account: 10_000,
            max_wants_per_account: 10_000,
            cycle_cache_limit: 10_000,
            cache_ttl_ms: 60_000,
            sync_requery_budget_ms: 500,
        }
    }
}

impl TenantConfig {
    /// Check every knob against its documented bounds.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_depth < MIN_CYCLE_DEPTH || self.max_depth > MAX_CYCLE_DEPTH {
            return Err(EngineError::InvalidArgument(format!(
                "max_depth {} out of range [{}, {}]",
                self.max_depth, MIN_CYCLE_DEPTH, MAX_CYCLE_DEPTH
            )));
        }
        if !(0.0..=1.0).contains(&self.min_efficiency) {
            return Err(EngineError::InvalidArgument(format!(
                "min_efficiency {} out of range [0, 1]",
                self.min_efficiency
            )));
        }
        if self.max_cycles_per_query == 0 {
            return Err(EngineError::InvalidArgument(
                "max_cycles_per_query must be positive".to_string(),
            ));
        }
        if self.max_parallel_edge_labels == 0 {
            return Err(EngineError::InvalidArgument(
                "max_parallel_edge_labels must be positive".to_string(),
            ));
        }
        if self.parallel_community_workers == 0 {
            return Err(EngineError::InvalidArgument(
                "parallel_community_workers must be positive".to_string(),
            ));
        }
        if self.cycle_cache_limit == 0 {
            return Err(EngineError::InvalidArgument(
                "cycle_cache_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
