//! Application-facing writes to synchronized tables.
//!
//! Every write runs the statement and then reports it to the change
//! journal, inside one transaction unless the caller already holds one.

use crate::catalog::SchemaState;
use crate::error::{SyncError, SyncResult};
use crate::journal::{ChangeCapture, ChangeJournal};
use crate::layout::TableLayout;
use outpost_storage::{SqlRow, SqlStore, SqlValue};
use std::sync::Arc;

/// A synchronized schema opened for application use.
pub struct SchemaHandle {
    schema: SchemaState,
    store: Arc<dyn SqlStore>,
}

impl SchemaHandle {
    pub(crate) fn new(schema: SchemaState, store: Arc<dyn SqlStore>) -> Self {
        Self { schema, store }
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.schema.def.name
    }

    /// Tables of the schema, parents first.
    pub fn tables(&self) -> &[TableLayout] {
        &self.schema.tables
    }

    /// The schema's store, for reads.
    pub fn store(&self) -> &dyn SqlStore {
        self.store.as_ref()
    }

    /// Writer for a table, looked up case-insensitively.
    pub fn table(&self, name: &str) -> SyncResult<TableWriter<'_>> {
        let layout = self
            .schema
            .tables
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                SyncError::Catalog(format!("schema {} has no table {name}", self.name()))
            })?;
        Ok(TableWriter {
            store: self.store.as_ref(),
            layout,
        })
    }
}

/// Writes to one synchronized table. Rows are given in wire order: key
/// columns, then regular columns, then LOB columns.
pub struct TableWriter<'a> {
    store: &'a dyn SqlStore,
    layout: &'a TableLayout,
}

impl TableWriter<'_> {
    fn check_width(&self, row: &[SqlValue]) -> SyncResult<()> {
        let expected = self.layout.column_count();
        if row.len() == expected {
            Ok(())
        } else {
            Err(SyncError::Catalog(format!(
                "table {} takes {expected} values, got {}",
                self.layout.name(),
                row.len()
            )))
        }
    }

    fn key_of<'r>(&self, row: &'r [SqlValue]) -> &'r [SqlValue] {
        &row[..self.layout.pk.len()]
    }

    fn atomically<T>(&self, f: impl FnOnce() -> SyncResult<T>) -> SyncResult<T> {
        if self.store.in_transaction() {
            return f();
        }
        self.store.begin()?;
        match f() {
            Ok(value) => {
                self.store.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.store.rollback() {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Inserts a row.
    pub fn insert(&self, row: &[SqlValue]) -> SyncResult<()> {
        self.check_width(row)?;
        self.atomically(|| {
            self.store.execute(&self.layout.insert_sql(), row)?;
            ChangeJournal::new(self.store).on_row_inserted(self.layout, self.key_of(row))
        })
    }

    /// Replaces the row with key `old_key`; the key itself may change.
    /// Returns the number of rows updated.
    pub fn update(&self, old_key: &[SqlValue], row: &[SqlValue]) -> SyncResult<usize> {
        self.check_width(row)?;
        self.atomically(|| {
            let mut params = row.to_vec();
            params.extend_from_slice(old_key);
            let updated = self.store.execute(&self.layout.update_sql(), &params)?;
            if updated > 0 {
                ChangeJournal::new(self.store).on_row_updated(self.layout, old_key, self.key_of(row))?;
            }
            Ok(updated)
        })
    }

    /// Deletes the row with `key`. Returns the number of rows deleted.
    pub fn delete(&self, key: &[SqlValue]) -> SyncResult<usize> {
        self.atomically(|| {
            let deleted = self.store.execute(&self.layout.delete_sql(), key)?;
            if deleted > 0 {
                ChangeJournal::new(self.store).on_row_deleted(self.layout, key)?;
            }
            Ok(deleted)
        })
    }

    /// The row with `key`, columns in wire order.
    pub fn get(&self, key: &[SqlValue]) -> SyncResult<Option<SqlRow>> {
        Ok(self.store.query_row(&self.layout.select_row_sql(), key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaState;
    use crate::dialect::DefaultColumnMapper;
    use crate::journal::{provision_schema_store, set_capture_enabled};
    use outpost_storage::SqliteStore;
    use outpost_sync_protocol::{ColumnDef, DmlOp, SchemaDef, SchemaSub, TableDef};

    fn handle() -> SchemaHandle {
        let column = |name: &str, ty: &str, pk_seq: i64, pos: i64| ColumnDef {
            column_name: name.into(),
            type_name: ty.into(),
            column_size: 20,
            nullable: pk_seq == 0,
            pk_seq,
            ordinal_position: pos,
            ..ColumnDef::default()
        };
        let def = TableDef {
            id: 1,
            name: "items".into(),
            has_pk: true,
            allow_check_in: true,
            columns: vec![column("id", "INT", 1, 1), column("label", "VARCHAR", 0, 2)],
            ..TableDef::default()
        };
        let layout = TableLayout::new(def, "MYSQL", &DefaultColumnMapper);
        let store = SqliteStore::open_in_memory("app").unwrap();
        provision_schema_store(&store).unwrap();
        for sql in layout.create_sql() {
            store.execute(&sql, &[]).unwrap();
        }
        let schema = SchemaState {
            def: SchemaDef {
                id: 1,
                name: "app".into(),
                ..SchemaDef::default()
            },
            sub: SchemaSub::default(),
            tables: vec![layout],
        };
        SchemaHandle::new(schema, Arc::new(store))
    }

    fn key(id: i64) -> Vec<SqlValue> {
        vec![SqlValue::Integer(id)]
    }

    fn row(id: i64, label: &str) -> Vec<SqlValue> {
        vec![id.into(), label.into()]
    }

    #[test]
    fn writes_are_journaled() {
        let handle = handle();
        let items = handle.table("ITEMS").unwrap();
        items.insert(&row(1, "one")).unwrap();
        items.insert(&row(2, "two")).unwrap();

        let journal = ChangeJournal::new(handle.store());
        let layout = &handle.tables()[0];
        let entry = journal.entry(layout, &key(1)).unwrap().unwrap();
        assert_eq!(entry.op, Some(DmlOp::Insert));
        assert_eq!(entry.version, -1);

        // Never synced: deleting leaves no trace.
        assert_eq!(items.delete(&key(2)).unwrap(), 1);
        assert!(journal.entry(layout, &key(2)).unwrap().is_none());

        let fetched = items.get(&key(1)).unwrap().unwrap();
        assert_eq!(fetched.text("label"), "one");
    }

    #[test]
    fn key_change_is_delete_plus_insert() {
        let handle = handle();
        let items = handle.table("items").unwrap();
        let layout = &handle.tables()[0];
        let journal = ChangeJournal::new(handle.store());
        items.insert(&row(1, "one")).unwrap();
        journal.upsert_server_version(layout, &key(1), 3).unwrap();

        assert_eq!(items.update(&key(1), &row(5, "five")).unwrap(), 1);
        let old = journal.entry(layout, &key(1)).unwrap().unwrap();
        assert_eq!(old.op, Some(DmlOp::Delete));
        let new = journal.entry(layout, &key(5)).unwrap().unwrap();
        assert_eq!(new.op, Some(DmlOp::Insert));
    }

    #[test]
    fn disabled_capture_writes_silently() {
        let handle = handle();
        set_capture_enabled(handle.store(), false).unwrap();
        let items = handle.table("items").unwrap();
        items.insert(&row(1, "one")).unwrap();
        let journal = ChangeJournal::new(handle.store());
        assert!(journal.entry(&handle.tables()[0], &key(1)).unwrap().is_none());
    }

    #[test]
    fn wrong_width_and_unknown_table() {
        let handle = handle();
        assert!(handle.table("missing").is_err());
        let items = handle.table("items").unwrap();
        assert!(items.insert(&key(1)).is_err());
    }
}
