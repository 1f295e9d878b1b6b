//! Relational store contract.

use crate::error::{StorageError, StorageResult};
use std::fmt;
use std::sync::Arc;

/// A value bound to or read from a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// Floating point number.
    Real(f64),
    /// Text.
    Text(String),
    /// Binary data.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns true for NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view; text holding a number is parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Real(f) => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view without conversion.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical string form; `None` for NULL. Blobs render as hex.
    pub fn to_canonical_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Integer(i) => Some(i.to_string()),
            Self::Real(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Blob(b) => Some(b.iter().map(|byte| format!("{byte:02x}")).collect()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_canonical_string() {
            Some(s) => f.write_str(&s),
            None => f.write_str("NULL"),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        Self::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One result row.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    /// Creates a row from column names and values.
    pub fn new(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// All values in column order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Consumes the row, returning its values.
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Value at `index`, NULL when out of range.
    pub fn get(&self, index: usize) -> &SqlValue {
        self.values.get(index).unwrap_or(&SqlValue::Null)
    }

    /// Value of the column named `name`, compared case-insensitively.
    pub fn by_name(&self, name: &str) -> &SqlValue {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .map_or(&SqlValue::Null, |i| self.get(i))
    }

    /// Integer column by name.
    pub fn i64(&self, name: &str) -> StorageResult<i64> {
        self.by_name(name)
            .as_i64()
            .ok_or_else(|| StorageError::row_shape(format!("column {name} is not an integer")))
    }

    /// Optional integer column by name.
    pub fn opt_i64(&self, name: &str) -> Option<i64> {
        self.by_name(name).as_i64()
    }

    /// Text column by name, empty for NULL.
    pub fn text(&self, name: &str) -> String {
        self.by_name(name).to_canonical_string().unwrap_or_default()
    }

    /// Optional text column by name.
    pub fn opt_text(&self, name: &str) -> Option<String> {
        self.by_name(name).to_canonical_string()
    }

    /// `Y`/`N` flag column by name.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.by_name(name), SqlValue::Text(s) if s.eq_ignore_ascii_case("Y"))
            || matches!(self.by_name(name), SqlValue::Integer(1))
    }
}

/// A relational store handle.
///
/// Writes run inside an ambient transaction opened with [`SqlStore::begin`]
/// and closed with [`SqlStore::commit`] or [`SqlStore::rollback`]. Without
/// an open transaction each statement commits on its own.
///
/// # Implementors
///
/// - [`super::SqliteStore`]
pub trait SqlStore: Send + Sync {
    /// Name of the store, used in logs and errors.
    fn name(&self) -> &str;

    /// Executes one statement, returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> StorageResult<usize>;

    /// Executes several `;`-separated statements without parameters.
    fn execute_batch(&self, sql: &str) -> StorageResult<()>;

    /// Runs a query and returns every row.
    fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<SqlRow>>;

    /// Opens the ambient transaction.
    fn begin(&self) -> StorageResult<()>;

    /// Commits the ambient transaction.
    fn commit(&self) -> StorageResult<()>;

    /// Rolls back the ambient transaction.
    fn rollback(&self) -> StorageResult<()>;

    /// Returns true while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// First row of a query, if any.
    fn query_row(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Option<SqlRow>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_strings() {
        assert_eq!(SqlValue::Integer(7).to_canonical_string().as_deref(), Some("7"));
        assert_eq!(SqlValue::Real(1.0).to_canonical_string().as_deref(), Some("1"));
        assert_eq!(SqlValue::Real(2.5).to_canonical_string().as_deref(), Some("2.5"));
        assert_eq!(SqlValue::Blob(vec![0xab, 0x01]).to_canonical_string().as_deref(), Some("ab01"));
        assert_eq!(SqlValue::Null.to_canonical_string(), None);
    }

    #[test]
    fn row_lookup_ignores_case() {
        let row = SqlRow::new(
            Arc::new(vec!["ID".into(), "allow_check_in".into()]),
            vec![SqlValue::Integer(3), SqlValue::Text("Y".into())],
        );
        assert_eq!(row.i64("id").unwrap(), 3);
        assert!(row.flag("ALLOW_CHECK_IN"));
        assert!(row.by_name("missing").is_null());
    }
}
