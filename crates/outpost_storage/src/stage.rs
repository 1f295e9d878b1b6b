//! Persisted staging for transport payloads.

use crate::error::StorageResult;
use crate::sql::{SqlStore, SqlValue};
use crate::sqlite::SqliteStore;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;

/// Which staging sequence a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageSequence {
    /// Message bodies waiting to be posted.
    Outbound,
    /// Response bodies waiting to be decoded.
    Inbound,
}

impl StageSequence {
    fn table(self) -> &'static str {
        match self {
            Self::Outbound => "payload_out",
            Self::Inbound => "payload_in",
        }
    }
}

/// Two id-ordered payload sequences that survive process restarts.
///
/// # Implementors
///
/// - [`MemoryPayloadStage`] - For tests
/// - [`SqlitePayloadStage`] - For persistent staging
pub trait PayloadStage: Send + Sync {
    /// Removes every payload from both sequences.
    fn purge(&self) -> StorageResult<()>;

    /// Stores a payload under `id`, replacing any previous one.
    fn put(&self, seq: StageSequence, id: u64, payload: &str) -> StorageResult<()>;

    /// Loads the payload stored under `id`.
    fn get(&self, seq: StageSequence, id: u64) -> StorageResult<Option<String>>;

    /// Number of payloads in a sequence.
    fn count(&self, seq: StageSequence) -> StorageResult<usize>;
}

/// In-memory staging.
#[derive(Debug, Default)]
pub struct MemoryPayloadStage {
    slots: Mutex<BTreeMap<(StageSequence, u64), String>>,
}

impl MemoryPayloadStage {
    /// Creates empty staging.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadStage for MemoryPayloadStage {
    fn purge(&self) -> StorageResult<()> {
        self.slots.lock().clear();
        Ok(())
    }

    fn put(&self, seq: StageSequence, id: u64, payload: &str) -> StorageResult<()> {
        self.slots.lock().insert((seq, id), payload.to_string());
        Ok(())
    }

    fn get(&self, seq: StageSequence, id: u64) -> StorageResult<Option<String>> {
        Ok(self.slots.lock().get(&(seq, id)).cloned())
    }

    fn count(&self, seq: StageSequence) -> StorageResult<usize> {
        Ok(self.slots.lock().keys().filter(|(s, _)| *s == seq).count())
    }
}

/// Staging in a dedicated SQLite file.
///
/// Writes autocommit so a staged payload is durable as soon as `put`
/// returns, independently of the session's store transactions.
#[derive(Debug)]
pub struct SqlitePayloadStage {
    store: SqliteStore,
}

impl SqlitePayloadStage {
    /// Opens the staging database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::with_store(SqliteStore::open("staging", path)?)
    }

    /// Opens in-memory staging.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_store(SqliteStore::open_in_memory("staging")?)
    }

    fn with_store(store: SqliteStore) -> StorageResult<Self> {
        store.execute_batch(
            "CREATE TABLE IF NOT EXISTS payload_out (id INTEGER PRIMARY KEY, payload TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS payload_in (id INTEGER PRIMARY KEY, payload TEXT NOT NULL);",
        )?;
        Ok(Self { store })
    }
}

impl PayloadStage for SqlitePayloadStage {
    fn purge(&self) -> StorageResult<()> {
        self.store
            .execute_batch("DELETE FROM payload_out; DELETE FROM payload_in;")
    }

    fn put(&self, seq: StageSequence, id: u64, payload: &str) -> StorageResult<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (id, payload) VALUES (?, ?)",
            seq.table()
        );
        self.store.execute(&sql, &[id.into(), payload.into()])?;
        Ok(())
    }

    fn get(&self, seq: StageSequence, id: u64) -> StorageResult<Option<String>> {
        let sql = format!("SELECT payload FROM {} WHERE id = ?", seq.table());
        Ok(self
            .store
            .query_row(&sql, &[SqlValue::from(id)])?
            .map(|row| row.text("payload")))
    }

    fn count(&self, seq: StageSequence) -> StorageResult<usize> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", seq.table());
        let n = self
            .store
            .query_row(&sql, &[])?
            .and_then(|row| row.opt_i64("n"))
            .unwrap_or(0);
        Ok(usize::try_from(n).unwrap_or(0))
    }
}
