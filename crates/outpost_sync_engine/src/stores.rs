//! Store handles and the per-session transaction scope.

use crate::error::SyncResult;
use outpost_storage::{SqlStore, SqliteStore};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens named relational store handles.
///
/// # Implementors
///
/// - [`SqliteStoreProvider`]
pub trait StoreProvider: Send + Sync {
    /// Returns the handle for `name`, opening it on first use. Repeated
    /// calls return the same handle.
    fn open(&self, name: &str) -> SyncResult<Arc<dyn SqlStore>>;
}

/// One SQLite database per handle name.
#[derive(Debug)]
pub struct SqliteStoreProvider {
    dir: Option<PathBuf>,
    handles: Mutex<BTreeMap<String, Arc<SqliteStore>>>,
}

impl SqliteStoreProvider {
    /// Stores live in `dir` as `<name>.db`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            handles: Mutex::new(BTreeMap::new()),
        }
    }

    /// Stores live in memory for the provider's lifetime.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            handles: Mutex::new(BTreeMap::new()),
        }
    }
}

impl StoreProvider for SqliteStoreProvider {
    fn open(&self, name: &str) -> SyncResult<Arc<dyn SqlStore>> {
        let mut handles = self.handles.lock();
        if let Some(store) = handles.get(name) {
            let store: Arc<dyn SqlStore> = store.clone();
            return Ok(store);
        }
        let store = match &self.dir {
            Some(dir) => SqliteStore::open(name, dir.join(format!("{name}.db")))?,
            None => SqliteStore::open_in_memory(name)?,
        };
        let store = Arc::new(store);
        handles.insert(name.to_string(), store.clone());
        let store: Arc<dyn SqlStore> = store;
        Ok(store)
    }
}

/// The store handles used by one session.
///
/// Each handle's transaction opens the first time the session asks for it
/// and stays open until [`SessionStores::commit`] or
/// [`SessionStores::rollback`], so a failed session leaves no partial
/// writes in any store.
pub struct SessionStores<'a> {
    provider: &'a dyn StoreProvider,
    open: Mutex<BTreeMap<String, Arc<dyn SqlStore>>>,
}

impl<'a> SessionStores<'a> {
    /// Creates an empty scope.
    pub fn new(provider: &'a dyn StoreProvider) -> Self {
        Self {
            provider,
            open: Mutex::new(BTreeMap::new()),
        }
    }

    /// Handle for `name` with its session transaction open.
    pub fn get(&self, name: &str) -> SyncResult<Arc<dyn SqlStore>> {
        let mut open = self.open.lock();
        if let Some(store) = open.get(name) {
            return Ok(store.clone());
        }
        let store = self.provider.open(name)?;
        store.begin()?;
        debug!(store = name, "opened session transaction");
        open.insert(name.to_string(), store.clone());
        Ok(store)
    }

    /// Names of the handles with an open transaction.
    pub fn open_names(&self) -> Vec<String> {
        self.open.lock().keys().cloned().collect()
    }

    /// Commits every open transaction. If one commit fails the remaining
    /// handles are rolled back and the error is returned.
    pub fn commit(&self) -> SyncResult<()> {
        let stores = std::mem::take(&mut *self.open.lock());
        let mut failure = None;
        for (name, store) in stores {
            if failure.is_some() {
                rollback_quietly(&name, store.as_ref());
                continue;
            }
            match store.commit() {
                Ok(()) => debug!(store = %name, "committed"),
                Err(e) => {
                    rollback_quietly(&name, store.as_ref());
                    failure = Some(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Rolls back every open transaction.
    pub fn rollback(&self) {
        let stores = std::mem::take(&mut *self.open.lock());
        for (name, store) in stores {
            rollback_quietly(&name, store.as_ref());
        }
    }
}

fn rollback_quietly(name: &str, store: &dyn SqlStore) {
    match store.rollback() {
        Ok(()) => debug!(store = name, "rolled back"),
        Err(e) => warn!(store = name, error = %e, "rollback failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_reuses_handles() {
        let provider = SqliteStoreProvider::in_memory();
        let a = provider.open("crm").unwrap();
        a.execute_batch("CREATE TABLE t (x INT)").unwrap();
        let b = provider.open("crm").unwrap();
        assert!(b.query("SELECT * FROM t", &[]).unwrap().is_empty());
    }

    #[test]
    fn file_provider_creates_databases() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SqliteStoreProvider::new(dir.path());
        provider.open("outpost_admin").unwrap();
        assert!(dir.path().join("outpost_admin.db").exists());
    }

    #[test]
    fn commit_persists_all_handles() {
        let provider = SqliteStoreProvider::in_memory();
        for name in ["a", "b"] {
            provider
                .open(name)
                .unwrap()
                .execute_batch("CREATE TABLE t (x INT)")
                .unwrap();
        }

        let stores = SessionStores::new(&provider);
        for name in ["a", "b"] {
            let store = stores.get(name).unwrap();
            assert!(store.in_transaction());
            store.execute("INSERT INTO t VALUES (1)", &[]).unwrap();
        }
        assert_eq!(stores.open_names(), ["a", "b"]);
        stores.commit().unwrap();

        for name in ["a", "b"] {
            let store = provider.open(name).unwrap();
            assert!(!store.in_transaction());
            assert_eq!(store.query("SELECT * FROM t", &[]).unwrap().len(), 1);
        }
    }

    #[test]
    fn rollback_discards_all_handles() {
        let provider = SqliteStoreProvider::in_memory();
        provider
            .open("a")
            .unwrap()
            .execute_batch("CREATE TABLE t (x INT)")
            .unwrap();

        let stores = SessionStores::new(&provider);
        stores
            .get("a")
            .unwrap()
            .execute("INSERT INTO t VALUES (1)", &[])
            .unwrap();
        stores.rollback();

        let store = provider.open("a").unwrap();
        assert!(store.query("SELECT * FROM t", &[]).unwrap().is_empty());
        assert!(stores.open_names().is_empty());
    }
}
