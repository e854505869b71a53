//! Engine root: process-wide state and the discovery façade
//!
//! The `Engine` is the single root object constructed at startup: it owns
//! the tenant registry, the worker pool, and the persistence capability, and
//! threads them explicitly into every component (no ambient globals).
//! Lifecycle is init-then-teardown: `Engine::new` spawns the workers,
//! `shutdown` drains the job queue, joins the workers, and offers a final
//! snapshot for every live tenant.
//!
//! The façade operations translate between the external world and the
//! tenant state managers. They contain no algorithmic logic.

use crate::error::EngineError;
use crate::models::{Delta, Item, TenantConfig};
use crate::persist::{FsStore, KvStore, SnapshotStore};
use crate::runtime::WorkerPool;
use crate::tenant::{restore_snapshot, SubmissionOutcome, TenantManager, TenantSnapshot, TenantStatus};
use crate::discovery::ScoredCycle;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Where tenant snapshots go
#[derive(Debug, Clone)]
pub enum PersistenceConfig {
    /// No persistence; tenants are memory-only
    None,

    /// JSON blobs under a directory
    Filesystem { root: PathBuf },

    /// Embedded key-value store
    KeyValue { path: PathBuf },
}

/// Process-wide engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Key required for tenant provisioning and lifecycle operations
    pub admin_key: String,

    /// Worker threads; `None` means hardware threads clamped to [2, 16]
    pub workers: Option<usize>,

    /// Bound on queued discovery jobs across all tenants
    pub job_queue_capacity: usize,

    /// Configuration given to tenants provisioned without an explicit one
    pub default_tenant_config: TenantConfig,

    pub persistence: PersistenceConfig,
}

impl EngineConfig {
    pub fn new(admin_key: impl Into<String>) -> Self {
        Self {
            admin_key: admin_key.into(),
            workers: None,
            job_queue_capacity: crate::runtime::DEFAULT_QUEUE_CAPACITY,
            default_tenant_config: TenantConfig::default(),
            persistence: PersistenceConfig::None,
        }
    }
}

/// The engine root object
pub struct Engine {
    admin_key: String,
    default_config: TenantConfig,
    registry: RwLock<BTreeMap<String, Arc<TenantManager>>>,
    pool: Option<WorkerPool>,
    persist: Option<Arc<dyn SnapshotStore>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        if config.admin_key.is_empty() {
            return Err(EngineError::InvalidArgument(
                "admin key must not be empty".to_string(),
            ));
        }
        config.default_tenant_config.validate()?;

        let persist: Option<Arc<dyn SnapshotStore>> = match config.persistence {
            PersistenceConfig::None => None,
            PersistenceConfig::Filesystem { root } => Some(Arc::new(
                FsStore::new(root).map_err(|err| EngineError::Transient(err.to_string()))?,
            )),
            PersistenceConfig::KeyValue { path } => Some(Arc::new(
                KvStore::open(path).map_err(|err| EngineError::Transient(err.to_string()))?,
            )),
        };

        let workers = config.workers.unwrap_or_else(WorkerPool::default_worker_count);
        let pool = WorkerPool::new(workers, config.job_queue_capacity);
        info!(workers, "engine started");

        Ok(Self {
            admin_key: config.admin_key,
            default_config: config.default_tenant_config,
            registry: RwLock::new(BTreeMap::new()),
            pool: Some(pool),
            persist,
        })
    }

    // =========================================================================
    // Tenant lifecycle
    // =========================================================================

    /// Provision a tenant. Requires the admin key; fails if the tenant
    /// already exists.
    pub fn provision_tenant(
        &self,
        admin_key: &str,
        tenant_id: &str,
        config: Option<TenantConfig>,
    ) -> Result<(), EngineError> {
        self.check_admin(admin_key)?;
        validate_tenant_id(tenant_id)?;
        let config = config.unwrap_or_else(|| self.default_config.clone());
        config.validate()?;

        let mut registry = self.registry.write();
        if registry.contains_key(tenant_id) {
            return Err(EngineError::InvalidArgument(format!(
                "tenant {} already exists",
                tenant_id
            )));
        }
        let manager = TenantManager::new(tenant_id.to_string(), config, self.persist.clone())?;
        registry.insert(tenant_id.to_string(), Arc::new(manager));
        info!(tenant = %tenant_id, "tenant provisioned");
        Ok(())
    }

    /// Stop scheduling discovery for a tenant; in-flight jobs complete.
    pub fn pause_tenant(&self, admin_key: &str, tenant_id: &str) -> Result<(), EngineError> {
        self.check_admin(admin_key)?;
        self.tenant(tenant_id)?.pause();
        Ok(())
    }

    pub fn resume_tenant(&self, admin_key: &str, tenant_id: &str) -> Result<(), EngineError> {
        self.check_admin(admin_key)?;
        let manager = self.tenant(tenant_id)?;
        manager.resume();
        if let Some(pool) = &self.pool {
            manager.schedule(pool);
        }
        Ok(())
    }

    // =========================================================================
    // Submission operations
    // =========================================================================

    /// Add items to an account's owned set (implicit account creation).
    pub fn submit_inventory(
        &self,
        tenant_id: &str,
        account: &str,
        items: Vec<Item>,
    ) -> Result<SubmissionOutcome, EngineError> {
        self.submit(tenant_id, Delta::Inventory {
            account: account.to_string(),
            added: items,
            removed: Vec::new(),
        })
    }

    /// Remove items from an account's owned set.
    pub fn remove_inventory(
        &self,
        tenant_id: &str,
        account: &str,
        items: Vec<String>,
    ) -> Result<SubmissionOutcome, EngineError> {
        self.submit(tenant_id, Delta::Inventory {
            account: account.to_string(),
            added: Vec::new(),
            removed: items,
        })
    }

    /// Add items to an account's want set.
    pub fn submit_wants(
        &self,
        tenant_id: &str,
        account: &str,
        wanted: Vec<String>,
    ) -> Result<SubmissionOutcome, EngineError> {
        self.submit(tenant_id, Delta::Wants {
            account: account.to_string(),
            added: wanted,
            removed: Vec::new(),
        })
    }

    /// Remove items from an account's want set.
    pub fn remove_wants(
        &self,
        tenant_id: &str,
        account: &str,
        wanted: Vec<String>,
    ) -> Result<SubmissionOutcome, EngineError> {
        self.submit(tenant_id, Delta::Wants {
            account: account.to_string(),
            added: Vec::new(),
            removed: wanted,
        })
    }

    /// Explicitly transfer an item between accounts.
    pub fn transfer_item(
        &self,
        tenant_id: &str,
        item: &str,
        from: &str,
        to: &str,
    ) -> Result<SubmissionOutcome, EngineError> {
        self.submit(tenant_id, Delta::Transfer {
            item: item.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Delete an account, its owned items, and all incident edges.
    pub fn remove_account(
        &self,
        tenant_id: &str,
        account: &str,
    ) -> Result<SubmissionOutcome, EngineError> {
        self.submit(tenant_id, Delta::RemoveAccount {
            account: account.to_string(),
        })
    }

    fn submit(&self, tenant_id: &str, delta: Delta) -> Result<SubmissionOutcome, EngineError> {
        let manager = self.tenant(tenant_id)?;
        let outcome = manager.submit_delta(delta)?;
        if let Some(pool) = &self.pool {
            manager.schedule(pool);
        }
        Ok(outcome)
    }

    // =========================================================================
    // Query operations
    // =========================================================================

    /// Currently valid cycles, ranked by score desc, length asc, canonical
    /// key.
    pub fn active_cycles(
        &self,
        tenant_id: &str,
        limit: usize,
        min_score: Option<f64>,
    ) -> Result<Vec<ScoredCycle>, EngineError> {
        self.tenant(tenant_id)?.query_active_cycles(limit, min_score)
    }

    /// Same, restricted to cycles containing `account`.
    pub fn cycles_for_account(
        &self,
        tenant_id: &str,
        account: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCycle>, EngineError> {
        self.tenant(tenant_id)?.query_cycles_for(account, limit)
    }

    /// Counts, health flags, and last-run indicators for a tenant.
    pub fn status(&self, tenant_id: &str) -> Result<TenantStatus, EngineError> {
        Ok(self.tenant(tenant_id)?.status())
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Drain the job queue, join the workers, and offer a final snapshot for
    /// every live tenant.
    pub fn shutdown(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
        let registry = self.registry.read();
        for (tenant_id, manager) in registry.iter() {
            if let Err(err) = manager.persist_now() {
                warn!(tenant = %tenant_id, error = %err, "final snapshot offer failed");
            }
        }
        info!("engine shut down");
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn check_admin(&self, admin_key: &str) -> Result<(), EngineError> {
        if admin_key != self.admin_key {
            return Err(EngineError::InvalidArgument(
                "admin key rejected".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve a tenant, loading it lazily from persistence on first
    /// reference. A snapshot that fails version or config validation is
    /// rejected and the tenant starts empty (warn, never crash).
    fn tenant(&self, tenant_id: &str) -> Result<Arc<TenantManager>, EngineError> {
        if let Some(manager) = self.registry.read().get(tenant_id) {
            return Ok(Arc::clone(manager));
        }

        let Some(persist) = &self.persist else {
            return Err(EngineError::unknown_tenant(tenant_id));
        };
        let Some(blob) = persist
            .load(tenant_id)
            .map_err(|err| EngineError::Transient(err.to_string()))?
        else {
            return Err(EngineError::unknown_tenant(tenant_id));
        };

        let manager = match serde_json::from_slice::<TenantSnapshot>(&blob) {
            Ok(snapshot) => match restore_snapshot(&snapshot, &self.default_config) {
                Ok((store, cycles)) => TenantManager::from_restored(
                    tenant_id.to_string(),
                    self.default_config.clone(),
                    self.persist.clone(),
                    store,
                    cycles,
                    snapshot.last_sequence,
                )?,
                Err(rejection) => {
                    warn!(tenant = %tenant_id, reason = %rejection, "snapshot rejected; tenant starts empty");
                    TenantManager::new(
                        tenant_id.to_string(),
                        self.default_config.clone(),
                        self.persist.clone(),
                    )?
                }
            },
            Err(err) => {
                warn!(tenant = %tenant_id, error = %err, "snapshot unreadable; tenant starts empty");
                TenantManager::new(
                    tenant_id.to_string(),
                    self.default_config.clone(),
                    self.persist.clone(),
                )?
            }
        };

        let mut registry = self.registry.write();
        // another thread may have won the race while we were restoring
        let entry = registry
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(manager));
        Ok(Arc::clone(entry))
    }
}

fn validate_tenant_id(tenant_id: &str) -> Result<(), EngineError> {
    if tenant_id.is_empty() || tenant_id.len() > 64 {
        return Err(EngineError::InvalidArgument(
            "tenant id must be 1-64 characters".to_string(),
        ));
    }
    if !tenant_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(EngineError::InvalidArgument(
            "tenant id may contain only alphanumerics, '-' and '_'".to_string(),
        ));
    }
    Ok(())
}
