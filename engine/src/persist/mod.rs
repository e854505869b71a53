//! Persistence capability
//!
//! The engine treats persistence as an opaque save/load oracle behind the
//! `SnapshotStore` capability: `save`, `load`, `delete`, `list` over
//! per-tenant blobs. Two variants ship: a local filesystem store and an
//! embedded key-value store (sled). Failures are `Transient` from the
//! engine's point of view and are retried with bounded exponential backoff
//! before being surfaced.

pub mod fs;
pub mod kv;

pub use fs::FsStore;
pub use kv::KvStore;

use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors from the persistence backends
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sled::Error> for PersistError {
    fn from(err: sled::Error) -> Self {
        PersistError::Backend(err.to_string())
    }
}

/// Save/load oracle the engine holds per tenant
pub trait SnapshotStore: Send + Sync {
    fn save(&self, tenant: &str, blob: &[u8]) -> Result<(), PersistError>;
    fn load(&self, tenant: &str) -> Result<Option<Vec<u8>>, PersistError>;
    fn delete(&self, tenant: &str) -> Result<(), PersistError>;
    fn list(&self) -> Result<Vec<String>, PersistError>;
}

/// Attempts made before a persistence failure is surfaced
pub const RETRY_ATTEMPTS: usize = 3;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Run a persistence operation with bounded exponential backoff.
pub fn with_retries<T>(
    what: &str,
    mut op: impl FnMut() -> Result<T, PersistError>,
) -> Result<T, PersistError> {
    let mut delay = RETRY_BASE_DELAY;
    let mut last_err = None;
    for attempt in 1..=RETRY_ATTEMPTS {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(attempt, error = %err, "{} failed", what);
                last_err = Some(err);
                if attempt < RETRY_ATTEMPTS {
                    std::thread::sleep(delay);
                    delay *= 2;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt ran"))
}
