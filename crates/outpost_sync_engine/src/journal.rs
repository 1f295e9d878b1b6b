//! Change journal: one shadow row per primary key recording the pending
//! local change and the version last acknowledged by the server.
//!
//! Journal rows live in `<table>__journal` next to the synchronized table:
//!
//! | column | meaning |
//! |---|---|
//! | key columns | primary key of the live row |
//! | `sync_version` | server version, `-1` until first acknowledged |
//! | `sync_op` | pending `I`, `U` or `D`, NULL when nothing is pending |
//! | `sync_txn` | check-in transaction the change was stamped with |

use crate::dialect::quote_ident;
use crate::error::SyncResult;
use crate::layout::TableLayout;
use crate::summary::OpCounts;
use outpost_storage::{SqlRow, SqlStore, SqlValue};
use outpost_sync_protocol::DmlOp;
use tracing::trace;

/// Table holding per-schema properties in each schema store.
pub const SCHEMA_PROPERTIES_TABLE: &str = "sync_schema_properties";

/// Property switching change capture on and off.
pub const CAPTURE_STATUS: &str = "capture.status";

/// Creates the schema properties table, with capture enabled by default.
pub fn provision_schema_store(store: &dyn SqlStore) -> SyncResult<()> {
    store.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {SCHEMA_PROPERTIES_TABLE} (name TEXT PRIMARY KEY, value TEXT);
         INSERT OR IGNORE INTO {SCHEMA_PROPERTIES_TABLE} (name, value) VALUES ('{CAPTURE_STATUS}', 'ENABLED');"
    ))?;
    Ok(())
}

/// Returns true unless capture was switched off for the schema store.
pub fn capture_enabled(store: &dyn SqlStore) -> SyncResult<bool> {
    let row = store.query_row(
        &format!("SELECT value FROM {SCHEMA_PROPERTIES_TABLE} WHERE name=?"),
        &[CAPTURE_STATUS.into()],
    )?;
    Ok(row.map_or(true, |r| r.text("value") != "DISABLED"))
}

/// Switches change capture for the schema store.
pub fn set_capture_enabled(store: &dyn SqlStore, enabled: bool) -> SyncResult<()> {
    store.execute(
        &format!("INSERT OR REPLACE INTO {SCHEMA_PROPERTIES_TABLE} (name, value) VALUES (?, ?)"),
        &[
            CAPTURE_STATUS.into(),
            (if enabled { "ENABLED" } else { "DISABLED" }).into(),
        ],
    )?;
    Ok(())
}

/// Callbacks invoked after every local write to a synchronized table.
///
/// # Implementors
///
/// - [`ChangeJournal`]
pub trait ChangeCapture {
    /// A row with `key` was inserted.
    fn on_row_inserted(&self, table: &TableLayout, key: &[SqlValue]) -> SyncResult<()>;

    /// The row with `key` was deleted.
    fn on_row_deleted(&self, table: &TableLayout, key: &[SqlValue]) -> SyncResult<()>;

    /// A row was updated; the key may have changed.
    fn on_row_updated(
        &self,
        table: &TableLayout,
        old_key: &[SqlValue],
        new_key: &[SqlValue],
    ) -> SyncResult<()> {
        self.on_row_deleted(table, old_key)?;
        self.on_row_inserted(table, new_key)
    }
}

/// One journal row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Acknowledged server version, `-1` if never acknowledged.
    pub version: i64,
    /// Pending change, if any.
    pub op: Option<DmlOp>,
    /// Transaction the pending change was stamped with.
    pub txn: Option<i64>,
}

/// Journal access for one schema store.
pub struct ChangeJournal<'a> {
    store: &'a dyn SqlStore,
}

impl<'a> ChangeJournal<'a> {
    /// Wraps a schema store.
    pub fn new(store: &'a dyn SqlStore) -> Self {
        Self { store }
    }

    fn journal(table: &TableLayout) -> String {
        quote_ident(&table.journal_name())
    }

    /// Journal row for a key.
    pub fn entry(&self, table: &TableLayout, key: &[SqlValue]) -> SyncResult<Option<JournalEntry>> {
        let row = self.store.query_row(
            &format!(
                "SELECT sync_version, sync_op, sync_txn FROM {} WHERE {}",
                Self::journal(table),
                table.pk_predicate(None)
            ),
            key,
        )?;
        Ok(row.map(|r| JournalEntry {
            version: r.opt_i64("sync_version").unwrap_or(-1),
            op: r.opt_text("sync_op").and_then(|c| DmlOp::from_code(&c)),
            txn: r.opt_i64("sync_txn"),
        }))
    }

    /// Stamps every pending row of a table with `txn`, fixing the set of
    /// changes the coming check-in uploads. Returns the number stamped.
    pub fn stamp(&self, table: &TableLayout, txn: i64) -> SyncResult<usize> {
        Ok(self.store.execute(
            &format!(
                "UPDATE {} SET sync_txn=? WHERE sync_op IS NOT NULL",
                Self::journal(table)
            ),
            &[txn.into()],
        )?)
    }

    /// Reconciles a table after the server accepted transaction `txn`.
    /// Returns the number of journal rows touched.
    pub fn acknowledge(&self, table: &TableLayout, txn: i64) -> SyncResult<usize> {
        let journal = Self::journal(table);
        let deleted = self.store.execute(
            &format!("DELETE FROM {journal} WHERE sync_op='D' AND sync_txn=?"),
            &[txn.into()],
        )?;
        let advanced = self.store.execute(
            &format!(
                "UPDATE {journal} SET sync_version=sync_version+1, sync_op=NULL \
                 WHERE sync_op IN ('I','U') AND sync_txn=?"
            ),
            &[txn.into()],
        )?;
        Ok(deleted + advanced)
    }

    /// Records a server-sent version for a key, clearing any pending op.
    pub fn upsert_server_version(
        &self,
        table: &TableLayout,
        key: &[SqlValue],
        version: i64,
    ) -> SyncResult<()> {
        let verb = if table.def.has_pk {
            "INSERT OR REPLACE"
        } else {
            self.remove(table, key)?;
            "INSERT"
        };
        let mut params = Vec::with_capacity(key.len() + 1);
        params.push(version.into());
        params.extend_from_slice(key);
        self.store.execute(
            &format!(
                "{verb} INTO {} (sync_version,{}) VALUES (?,{})",
                Self::journal(table),
                table.pk_columns_sql(),
                vec!["?"; key.len()].join(",")
            ),
            &params,
        )?;
        Ok(())
    }

    /// Removes the journal row for a key.
    pub fn remove(&self, table: &TableLayout, key: &[SqlValue]) -> SyncResult<usize> {
        Ok(self.store.execute(
            &format!(
                "DELETE FROM {} WHERE {}",
                Self::journal(table),
                table.pk_predicate(None)
            ),
            key,
        )?)
    }

    /// Pending inserts or updates stamped with `txn`, joined with the live
    /// rows: version first, then key, regular and LOB columns.
    pub fn pending_rows(&self, table: &TableLayout, op: DmlOp, txn: i64) -> SyncResult<Vec<SqlRow>> {
        Ok(self
            .store
            .query(&table.pending_rows_sql(), &[op.code().into(), txn.into()])?)
    }

    /// Pending deletes stamped with `txn`: version then key.
    pub fn pending_deletes(&self, table: &TableLayout, txn: i64) -> SyncResult<Vec<SqlRow>> {
        Ok(self.store.query(&table.pending_deletes_sql(), &[txn.into()])?)
    }

    /// Number of pending changes per operation, stamped or not.
    pub fn pending_counts(&self, table: &TableLayout) -> SyncResult<OpCounts> {
        let rows = self.store.query(
            &format!(
                "SELECT sync_op, COUNT(*) AS n FROM {} WHERE sync_op IS NOT NULL GROUP BY sync_op",
                Self::journal(table)
            ),
            &[],
        )?;
        let mut counts = OpCounts::default();
        for row in rows {
            if let Some(op) = DmlOp::from_code(&row.text("sync_op")) {
                counts.add(op, u64::try_from(row.i64("n")?).unwrap_or(0));
            }
        }
        Ok(counts)
    }

    fn set_op(&self, table: &TableLayout, key: &[SqlValue], op: DmlOp) -> SyncResult<()> {
        let mut params = vec![SqlValue::from(op.code())];
        params.extend_from_slice(key);
        self.store.execute(
            &format!(
                "UPDATE {} SET sync_op=?, sync_txn=NULL WHERE {}",
                Self::journal(table),
                table.pk_predicate(None)
            ),
            &params,
        )?;
        Ok(())
    }
}

impl ChangeCapture for ChangeJournal<'_> {
    fn on_row_inserted(&self, table: &TableLayout, key: &[SqlValue]) -> SyncResult<()> {
        if !capture_enabled(self.store)? {
            return Ok(());
        }
        match self.entry(table, key)? {
            None => {
                self.store.execute(
                    &format!(
                        "INSERT INTO {} ({},sync_op) VALUES ({},'I')",
                        Self::journal(table),
                        table.pk_columns_sql(),
                        vec!["?"; key.len()].join(",")
                    ),
                    key,
                )?;
                trace!(table = table.name(), "captured insert");
            }
            // Re-created after a synced delete: the server still has a version.
            Some(entry) if entry.version > -1 => {
                self.set_op(table, key, DmlOp::Update)?;
                trace!(table = table.name(), "captured re-insert as update");
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn on_row_deleted(&self, table: &TableLayout, key: &[SqlValue]) -> SyncResult<()> {
        if !capture_enabled(self.store)? {
            return Ok(());
        }
        match self.entry(table, key)? {
            None => {}
            // The server never saw this row.
            Some(entry) if entry.version == -1 => {
                self.remove(table, key)?;
                trace!(table = table.name(), "dropped unsynced row");
            }
            Some(_) => {
                self.set_op(table, key, DmlOp::Delete)?;
                trace!(table = table.name(), "captured delete");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DefaultColumnMapper;
    use outpost_storage::SqliteStore;
    use outpost_sync_protocol::{ColumnDef, TableDef};

    fn setup() -> (SqliteStore, TableLayout) {
        let def = TableDef {
            id: 1,
            name: "items".into(),
            has_pk: true,
            columns: vec![
                ColumnDef {
                    column_name: "id".into(),
                    type_name: "INT".into(),
                    pk_seq: 1,
                    ordinal_position: 1,
                    ..ColumnDef::default()
                },
                ColumnDef {
                    column_name: "label".into(),
                    type_name: "VARCHAR".into(),
                    column_size: 20,
                    nullable: true,
                    ordinal_position: 2,
                    ..ColumnDef::default()
                },
            ],
            ..TableDef::default()
        };
        let layout = TableLayout::new(def, "MYSQL", &DefaultColumnMapper);
        let store = SqliteStore::open_in_memory("s").unwrap();
        provision_schema_store(&store).unwrap();
        for sql in layout.create_sql() {
            store.execute_batch(&sql).unwrap();
        }
        (store, layout)
    }

    fn key(id: i64) -> Vec<SqlValue> {
        vec![SqlValue::Integer(id)]
    }

    #[test]
    fn insert_then_delete_leaves_nothing() {
        let (store, table) = setup();
        let journal = ChangeJournal::new(&store);
        journal.on_row_inserted(&table, &key(1)).unwrap();
        assert_eq!(
            journal.entry(&table, &key(1)).unwrap(),
            Some(JournalEntry {
                version: -1,
                op: Some(DmlOp::Insert),
                txn: None
            })
        );
        journal.on_row_deleted(&table, &key(1)).unwrap();
        assert_eq!(journal.entry(&table, &key(1)).unwrap(), None);
    }

    #[test]
    fn acknowledged_row_lifecycle() {
        let (store, table) = setup();
        let journal = ChangeJournal::new(&store);
        journal.on_row_inserted(&table, &key(1)).unwrap();
        assert_eq!(journal.stamp(&table, 4).unwrap(), 1);
        assert_eq!(journal.acknowledge(&table, 4).unwrap(), 1);
        let entry = journal.entry(&table, &key(1)).unwrap().unwrap();
        assert_eq!((entry.version, entry.op), (0, None));

        journal.on_row_updated(&table, &key(1), &key(1)).unwrap();
        let entry = journal.entry(&table, &key(1)).unwrap().unwrap();
        assert_eq!(entry.op, Some(DmlOp::Update));

        journal.on_row_deleted(&table, &key(1)).unwrap();
        let entry = journal.entry(&table, &key(1)).unwrap().unwrap();
        assert_eq!(entry.op, Some(DmlOp::Delete));

        // Re-created before the delete was checked in.
        journal.on_row_inserted(&table, &key(1)).unwrap();
        let entry = journal.entry(&table, &key(1)).unwrap().unwrap();
        assert_eq!(entry.op, Some(DmlOp::Update));
        assert_eq!(entry.version, 0);
    }

    #[test]
    fn key_change_is_delete_plus_insert() {
        let (store, table) = setup();
        let journal = ChangeJournal::new(&store);
        journal.upsert_server_version(&table, &key(1), 3).unwrap();
        journal.on_row_updated(&table, &key(1), &key(2)).unwrap();

        assert_eq!(
            journal.entry(&table, &key(1)).unwrap().unwrap().op,
            Some(DmlOp::Delete)
        );
        let new = journal.entry(&table, &key(2)).unwrap().unwrap();
        assert_eq!((new.version, new.op), (-1, Some(DmlOp::Insert)));
    }

    #[test]
    fn unstamped_changes_survive_acknowledgment() {
        let (store, table) = setup();
        let journal = ChangeJournal::new(&store);
        journal.on_row_inserted(&table, &key(1)).unwrap();
        journal.stamp(&table, 1).unwrap();
        journal.on_row_inserted(&table, &key(2)).unwrap();
        journal.acknowledge(&table, 1).unwrap();

        assert_eq!(journal.entry(&table, &key(1)).unwrap().unwrap().op, None);
        assert_eq!(
            journal.entry(&table, &key(2)).unwrap().unwrap().op,
            Some(DmlOp::Insert)
        );
        let counts = journal.pending_counts(&table).unwrap();
        assert_eq!(counts.inserts, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn disabled_capture_records_nothing() {
        let (store, table) = setup();
        set_capture_enabled(&store, false).unwrap();
        assert!(!capture_enabled(&store).unwrap());
        let journal = ChangeJournal::new(&store);
        journal.on_row_inserted(&table, &key(9)).unwrap();
        assert_eq!(journal.entry(&table, &key(9)).unwrap(), None);

        set_capture_enabled(&store, true).unwrap();
        journal.on_row_inserted(&table, &key(9)).unwrap();
        assert!(journal.entry(&table, &key(9)).unwrap().is_some());
    }

    #[test]
    fn server_version_upsert_is_idempotent() {
        let (store, table) = setup();
        let journal = ChangeJournal::new(&store);
        journal.upsert_server_version(&table, &key(5), 2).unwrap();
        journal.upsert_server_version(&table, &key(5), 2).unwrap();
        let entry = journal.entry(&table, &key(5)).unwrap().unwrap();
        assert_eq!((entry.version, entry.op), (2, None));
        assert_eq!(journal.remove(&table, &key(5)).unwrap(), 1);
    }
}
