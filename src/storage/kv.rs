use std::{collections::HashMap, fs, path::Path, sync::RwLock};

use rocksdb::{Options, DB};
use tracing::info;

use crate::error::{AppError, AppResult};

/// Whole-value key/value port: values are read and replaced as a unit.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> AppResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AppError::Storage("memory store poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> AppResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AppError::Storage("memory store poisoned".into()))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path).map_err(|e| {
            AppError::Storage(format!("cannot create {}: {e}", path.display()))
        })?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        info!(path = %path.display(), "rocksdb store opened");
        Ok(Self { db })
    }
}

impl KeyValueStore for RocksStore {
    fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn put(&self, key: &str, value: &[u8]) -> AppResult<()> {
        self.db.put(key, value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("k").unwrap(), None);
        store.put("k", b"one").unwrap();
        store.put("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(store.get("other").unwrap(), None);
    }

    #[test]
    fn memory_store_replaces_whole_values() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn rocks_store_replaces_whole_values() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&RocksStore::open(dir.path().join("nested/store")).unwrap());
    }
}
