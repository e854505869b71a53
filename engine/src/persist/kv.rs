//! Embedded key-value snapshot store
//!
//! sled-backed variant of the persistence capability. Keys are tenant ids,
//! values the serialized snapshot blobs; every write is flushed so a crash
//! cannot lose an acknowledged save.

use crate::persist::{PersistError, SnapshotStore};
use std::path::Path;

pub struct KvStore {
    db: sled::Db,
}

impl KvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl SnapshotStore for KvStore {
    fn save(&self, tenant: &str, blob: &[u8]) -> Result<(), PersistError> {
        self.db.insert(tenant.as_bytes(), blob)?;
        self.db.flush()?;
        Ok(())
    }

    fn load(&self, tenant: &str) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.db.get(tenant.as_bytes())?.map(|value| value.to_vec()))
    }

    fn delete(&self, tenant: &str) -> Result<(), PersistError> {
        self.db.remove(tenant.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, PersistError> {
        let mut tenants = Vec::new();
        for entry in self.db.iter() {
            let (key, _) = entry?;
            tenants.push(String::from_utf8_lossy(&key).into_owned());
        }
        tenants.sort();
        Ok(tenants)
    }
}
