//! Filesystem snapshot store
//!
//! One JSON blob per tenant under a root directory. Writes go through a
//! temporary file renamed into place so a crash mid-write never leaves a
//! half-written snapshot behind.

use crate::persist::{PersistError, SnapshotStore};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn blob_path(&self, tenant: &str) -> PathBuf {
        self.root.join(format!("{}.json", tenant))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SnapshotStore for FsStore {
    fn save(&self, tenant: &str, blob: &[u8]) -> Result<(), PersistError> {
        let target = self.blob_path(tenant);
        let staging = self.root.join(format!("{}.json.tmp", tenant));
        fs::write(&staging, blob)?;
        fs::rename(&staging, &target)?;
        Ok(())
    }

    fn load(&self, tenant: &str) -> Result<Option<Vec<u8>>, PersistError> {
        match fs::read(self.blob_path(tenant)) {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, tenant: &str) -> Result<(), PersistError> {
        match fs::remove_file(self.blob_path(tenant)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>, PersistError> {
        let mut tenants = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(tenant) = name.strip_suffix(".json") {
                tenants.push(tenant.to_string());
            }
        }
        tenants.sort();
        Ok(tenants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        assert_eq!(store.load("t1").unwrap(), None);
        store.save("t1", b"{\"v\":1}").unwrap();
        assert_eq!(store.load("t1").unwrap().unwrap(), b"{\"v\":1}");
        assert_eq!(store.list().unwrap(), vec!["t1".to_string()]);

        store.delete("t1").unwrap();
        assert_eq!(store.load("t1").unwrap(), None);
        store.delete("t1").unwrap(); // idempotent
    }

    #[test]
    fn overwrite_replaces_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();
        store.save("t1", b"one").unwrap();
        store.save("t1", b"two").unwrap();
        assert_eq!(store.load("t1").unwrap().unwrap(), b"two");
    }
}
