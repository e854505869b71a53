//! Engine error taxonomy
//!
//! Error kinds surfaced across the engine boundary:
//! - `InvalidArgument`: malformed delta, unknown tenant, out-of-range config
//! - `Conflict`: item asserted owned while another account holds it
//! - `ResourceLimit`: per-tenant caps exceeded, with a structured detail
//! - `Transient`: persistence unreachable; retried internally before surfacing
//! - `Fatal`: invariant violation detected at runtime; quarantines the tenant
//! - `Quarantined`: writes rejected on a quarantined tenant
//!
//! Truncation is deliberately NOT an error: partial results carry a
//! `truncated` flag and remain usable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which per-tenant cap was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitKind {
    /// `max_items_per_account`
    ItemsPerAccount,

    /// `max_wants_per_account`
    WantsPerAccount,

    /// `cycle_cache_limit`
    CycleCache,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::ItemsPerAccount => write!(f, "items per account"),
            LimitKind::WantsPerAccount => write!(f, "wants per account"),
            LimitKind::CycleCache => write!(f, "cycle cache"),
        }
    }
}

/// Structured detail for `ResourceLimit` errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitExceeded {
    /// Which cap was hit
    pub kind: LimitKind,

    /// Account the cap applies to, when account-scoped
    pub account: Option<String>,

    /// Configured maximum
    pub limit: usize,

    /// Size the operation would have produced
    pub attempted: usize,
}

impl std::fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.account {
            Some(account) => write!(
                f,
                "{} cap for {}: limit {}, attempted {}",
                self.kind, account, self.limit, self.attempted
            ),
            None => write!(
                f,
                "{} cap: limit {}, attempted {}",
                self.kind, self.limit, self.attempted
            ),
        }
    }
}

/// Errors surfaced by the discovery engine
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: item {item} is owned by {owner}; transfer explicitly")]
    Conflict { item: String, owner: String },

    #[error("resource limit exceeded: {0}")]
    ResourceLimit(LimitExceeded),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal invariant violation: {0}")]
    Fatal(String),

    #[error("tenant {0} is quarantined; writes rejected pending operator intervention")]
    Quarantined(String),
}

impl EngineError {
    /// Unknown-tenant errors are a flavor of `InvalidArgument`.
    pub fn unknown_tenant(id: &str) -> Self {
        EngineError::InvalidArgument(format!("unknown tenant: {}", id))
    }
}
