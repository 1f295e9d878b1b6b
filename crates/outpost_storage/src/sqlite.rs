//! SQLite-backed relational store.

use crate::error::{StorageError, StorageResult};
use crate::sql::{SqlRow, SqlStore, SqlValue};
use parking_lot::Mutex;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// A [`SqlStore`] over one SQLite database file.
///
/// The connection is guarded by a mutex so the handle can be shared
/// across threads, although a sync session only uses it from one.
pub struct SqliteStore {
    name: String,
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// file cannot be opened.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        Ok(Self {
            name: name.into(),
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(name: impl Into<String>) -> StorageResult<Self> {
        Ok(Self {
            name: name.into(),
            path: None,
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Path of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn transaction_error(&self, message: &str) -> StorageError {
        StorageError::Transaction {
            store: self.name.clone(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqlStore for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> StorageResult<usize> {
        trace!(store = %self.name, sql, "execute");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        Ok(stmt.execute(rusqlite::params_from_iter(params.iter()))?)
    }

    fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        trace!(store = %self.name, sql, "execute_batch");
        Ok(self.conn.lock().execute_batch(sql)?)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<SqlRow>> {
        trace!(store = %self.name, sql, "query");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let columns: Arc<Vec<String>> = Arc::new(
            stmt.column_names()
                .into_iter()
                .map(String::from)
                .collect(),
        );
        let width = columns.len();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(SqlValue::from(row.get_ref(i)?));
            }
            out.push(SqlRow::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    fn begin(&self) -> StorageResult<()> {
        let conn = self.conn.lock();
        if !conn.is_autocommit() {
            return Err(self.transaction_error("transaction already open"));
        }
        conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self) -> StorageResult<()> {
        let conn = self.conn.lock();
        if conn.is_autocommit() {
            return Err(self.transaction_error("no open transaction to commit"));
        }
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> StorageResult<()> {
        let conn = self.conn.lock();
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.lock().is_autocommit()
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory("test").unwrap();
        store
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, data BLOB)")
            .unwrap();
        store
    }

    #[test]
    fn execute_and_query() {
        let store = store();
        let n = store
            .execute(
                "INSERT INTO t (id, name, data) VALUES (?, ?, ?)",
                &[1i64.into(), "a".into(), SqlValue::Blob(vec![1, 2])],
            )
            .unwrap();
        assert_eq!(n, 1);
        let rows = store.query("SELECT id, name, data FROM t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].i64("id").unwrap(), 1);
        assert_eq!(rows[0].text("name"), "a");
        assert_eq!(rows[0].by_name("data"), &SqlValue::Blob(vec![1, 2]));
    }

    #[test]
    fn rollback_discards_writes() {
        let store = store();
        store.begin().unwrap();
        assert!(store.in_transaction());
        store
            .execute("INSERT INTO t (id) VALUES (?)", &[5i64.into()])
            .unwrap();
        store.rollback().unwrap();
        assert!(!store.in_transaction());
        assert!(store.query_row("SELECT id FROM t", &[]).unwrap().is_none());
    }

    #[test]
    fn double_begin_is_an_error() {
        let store = store();
        store.begin().unwrap();
        assert!(matches!(
            store.begin(),
            Err(StorageError::Transaction { .. })
        ));
        store.commit().unwrap();
        assert!(store.commit().is_err());
    }

    #[test]
    fn committed_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("db.sqlite");
        {
            let store = SqliteStore::open("disk", &path).unwrap();
            store.execute_batch("CREATE TABLE k (v TEXT)").unwrap();
            store.begin().unwrap();
            store.execute("INSERT INTO k VALUES (?)", &["x".into()]).unwrap();
            store.commit().unwrap();
        }
        let store = SqliteStore::open("disk", &path).unwrap();
        let row = store.query_row("SELECT v FROM k", &[]).unwrap().unwrap();
        assert_eq!(row.text("v"), "x");
    }
}
