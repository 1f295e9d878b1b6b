//! Column layout of a synchronized table and the SQL built from it.

use crate::dialect::{quote_ident, ColumnMapper};
use outpost_sync_protocol::{ColumnDef, TableDef};

/// Suffix of the journal table kept next to every synchronized table.
pub const JOURNAL_SUFFIX: &str = "__journal";

/// A large-object column.
#[derive(Debug, Clone, PartialEq)]
pub struct LobColumn {
    /// Column metadata.
    pub column: ColumnDef,
    /// Binary (`true`) or character (`false`) data.
    pub is_binary: bool,
}

/// A synchronized table with its columns split into primary-key, regular
/// and LOB groups.
///
/// Row values always travel in that order: primary-key columns sorted by
/// `pk_seq`, then regular and LOB columns in ordinal order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    /// Table definition as stored in the catalog.
    pub def: TableDef,
    /// Primary-key columns.
    pub pk: Vec<ColumnDef>,
    /// Non-key, non-LOB columns.
    pub regular: Vec<ColumnDef>,
    /// LOB columns.
    pub lobs: Vec<LobColumn>,
}

impl TableLayout {
    /// Splits a table definition using the mapper's LOB classification.
    pub fn new(def: TableDef, server_db_type: &str, mapper: &dyn ColumnMapper) -> Self {
        let mut columns = def.columns.clone();
        columns.sort_by_key(|c| c.ordinal_position);

        let mut pk = Vec::new();
        let mut regular = Vec::new();
        let mut lobs = Vec::new();
        for column in columns {
            if column.is_pk() {
                pk.push(column);
            } else if mapper.is_blob(server_db_type, &column) {
                lobs.push(LobColumn {
                    column,
                    is_binary: true,
                });
            } else if mapper.is_clob(server_db_type, &column) {
                lobs.push(LobColumn {
                    column,
                    is_binary: false,
                });
            } else {
                regular.push(column);
            }
        }
        pk.sort_by_key(|c| c.pk_seq);

        Self {
            def,
            pk,
            regular,
            lobs,
        }
    }

    /// Server table id.
    pub fn id(&self) -> i64 {
        self.def.id
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Name of the journal table.
    pub fn journal_name(&self) -> String {
        format!("{}{JOURNAL_SUFFIX}", self.def.name)
    }

    /// Number of values in a non-delete row, version excluded.
    pub fn row_width(&self) -> usize {
        self.pk.len() + self.regular.len()
    }

    fn table(&self) -> String {
        quote_ident(&self.def.name)
    }

    fn journal(&self) -> String {
        quote_ident(&self.journal_name())
    }

    fn pk_names(&self) -> Vec<String> {
        self.pk.iter().map(|c| quote_ident(&c.column_name)).collect()
    }

    fn data_names(&self) -> Vec<String> {
        self.pk
            .iter()
            .chain(self.regular.iter())
            .map(|c| quote_ident(&c.column_name))
            .chain(self.lobs.iter().map(|l| quote_ident(&l.column.column_name)))
            .collect()
    }

    /// Quoted key column names joined by commas.
    pub fn pk_columns_sql(&self) -> String {
        self.pk_names().join(",")
    }

    /// `"a"=? AND "b"=?` over the primary key, optionally prefixed.
    pub fn pk_predicate(&self, alias: Option<&str>) -> String {
        self.pk
            .iter()
            .map(|c| match alias {
                Some(a) => format!("{a}.{}=?", quote_ident(&c.column_name)),
                None => format!("{}=?", quote_ident(&c.column_name)),
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Statements creating the table, its journal and the journal indexes.
    pub fn create_sql(&self) -> Vec<String> {
        let mut cols: Vec<String> = self
            .pk
            .iter()
            .chain(self.regular.iter())
            .chain(self.lobs.iter().map(|l| &l.column))
            .map(|c| {
                let def = c
                    .device_col_def
                    .clone()
                    .unwrap_or_else(|| c.type_name.clone());
                format!("{} {def}", quote_ident(&c.column_name))
            })
            .collect();
        if self.def.has_pk && !self.pk.is_empty() {
            cols.push(format!("PRIMARY KEY({})", self.pk_names().join(",")));
        }

        let mut journal_cols: Vec<String> = self
            .pk
            .iter()
            .map(|c| {
                let def = c
                    .device_col_def
                    .clone()
                    .unwrap_or_else(|| c.type_name.clone());
                format!("{} {def}", quote_ident(&c.column_name))
            })
            .collect();
        journal_cols.push("sync_version INTEGER NOT NULL DEFAULT -1".into());
        journal_cols.push("sync_op CHAR(1)".into());
        journal_cols.push("sync_txn INTEGER".into());
        if self.def.has_pk && !self.pk.is_empty() {
            journal_cols.push(format!("PRIMARY KEY({})", self.pk_names().join(",")));
        }

        let journal_name = self.journal_name();
        vec![
            format!("CREATE TABLE IF NOT EXISTS {} ({})", self.table(), cols.join(", ")),
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                self.journal(),
                journal_cols.join(", ")
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} (sync_op)",
                quote_ident(&format!("{journal_name}_op")),
                self.journal()
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} (sync_txn)",
                quote_ident(&format!("{journal_name}_txn")),
                self.journal()
            ),
        ]
    }

    /// Statements dropping the table and its journal.
    pub fn drop_sql(&self) -> Vec<String> {
        vec![
            format!("DROP TABLE IF EXISTS {}", self.table()),
            format!("DROP TABLE IF EXISTS {}", self.journal()),
        ]
    }

    /// Insert-or-replace of a live row. LOB columns are written as NULL and
    /// filled by [`TableLayout::lob_update_sql`].
    pub fn upsert_sql(&self) -> String {
        let params = std::iter::repeat("?")
            .take(self.row_width())
            .chain(std::iter::repeat("NULL").take(self.lobs.len()))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({params})",
            self.table(),
            self.data_names().join(",")
        )
    }

    /// Plain insert of a live row, every column in wire order.
    pub fn insert_sql(&self) -> String {
        let names = self.data_names();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            names.join(","),
            vec!["?"; names.len()].join(",")
        )
    }

    /// Update of every column of one row; new values in wire order, then
    /// the old key.
    pub fn update_sql(&self) -> String {
        let sets = self
            .data_names()
            .iter()
            .map(|c| format!("{c}=?"))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "UPDATE {} SET {sets} WHERE {}",
            self.table(),
            self.pk_predicate(None)
        )
    }

    /// Number of columns of a full row.
    pub fn column_count(&self) -> usize {
        self.pk.len() + self.regular.len() + self.lobs.len()
    }

    /// Update of the LOB columns of one row; LOB values first, then key.
    pub fn lob_update_sql(&self) -> Option<String> {
        if self.lobs.is_empty() {
            return None;
        }
        let sets = self
            .lobs
            .iter()
            .map(|l| format!("{}=?", quote_ident(&l.column.column_name)))
            .collect::<Vec<_>>()
            .join(",");
        Some(format!(
            "UPDATE {} SET {sets} WHERE {}",
            self.table(),
            self.pk_predicate(None)
        ))
    }

    /// Delete of one live row by key.
    pub fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE {}", self.table(), self.pk_predicate(None))
    }

    /// Select of one live row by key, all columns in wire order.
    pub fn select_row_sql(&self) -> String {
        format!(
            "SELECT {} FROM {} WHERE {}",
            self.data_names().join(","),
            self.table(),
            self.pk_predicate(None)
        )
    }

    /// Pending inserts or updates of a transaction: journal version, then
    /// key, regular and LOB columns. Parameters: op code, transaction id.
    pub fn pending_rows_sql(&self) -> String {
        let cols = self
            .data_names()
            .into_iter()
            .map(|c| format!("t.{c}"))
            .collect::<Vec<_>>()
            .join(",");
        let join = self
            .pk_names()
            .iter()
            .map(|c| format!("t.{c}=m.{c}"))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(
            "SELECT m.sync_version,{cols} FROM {} t, {} m \
             WHERE m.sync_op=? AND m.sync_txn=? AND {join}",
            self.table(),
            self.journal()
        )
    }

    /// Pending deletes of a transaction: version and key. Parameter:
    /// transaction id.
    pub fn pending_deletes_sql(&self) -> String {
        format!(
            "SELECT sync_version,{} FROM {} WHERE sync_op='D' AND sync_txn=?",
            self.pk_names().join(","),
            self.journal()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DefaultColumnMapper;

    fn col(name: &str, ty: &str, pk_seq: i64, pos: i64) -> ColumnDef {
        ColumnDef {
            column_name: name.into(),
            type_name: ty.into(),
            column_size: 10,
            nullable: true,
            pk_seq,
            ordinal_position: pos,
            ..ColumnDef::default()
        }
    }

    fn layout() -> TableLayout {
        let def = TableDef {
            id: 7,
            name: "notes".into(),
            has_pk: true,
            columns: vec![
                col("body", "LONGTEXT", 0, 4),
                col("title", "VARCHAR", 0, 3),
                col("owner", "INT", 2, 2),
                col("id", "INT", 1, 1),
                col("photo", "BLOB", 0, 5),
            ],
            ..TableDef::default()
        };
        TableLayout::new(def, "MYSQL", &DefaultColumnMapper)
    }

    #[test]
    fn splits_columns() {
        let l = layout();
        let pk: Vec<_> = l.pk.iter().map(|c| c.column_name.as_str()).collect();
        assert_eq!(pk, ["id", "owner"]);
        assert_eq!(l.regular.len(), 1);
        assert_eq!(l.lobs.len(), 2);
        assert!(!l.lobs[0].is_binary);
        assert!(l.lobs[1].is_binary);
        assert_eq!(l.row_width(), 3);
        assert_eq!(l.journal_name(), "notes__journal");
    }

    #[test]
    fn upsert_nulls_lobs() {
        let sql = layout().upsert_sql();
        assert!(sql.starts_with("INSERT OR REPLACE INTO \"notes\""));
        assert!(sql.ends_with("VALUES (?,?,?,NULL,NULL)"));
    }

    #[test]
    fn lob_update_keys_last() {
        let sql = layout().lob_update_sql().unwrap();
        assert_eq!(
            sql,
            "UPDATE \"notes\" SET \"body\"=?,\"photo\"=? WHERE \"id\"=? AND \"owner\"=?"
        );
    }

    #[test]
    fn full_row_statements() {
        let l = layout();
        assert_eq!(l.column_count(), 5);
        assert_eq!(
            l.insert_sql(),
            "INSERT INTO \"notes\" (\"id\",\"owner\",\"title\",\"body\",\"photo\") VALUES (?,?,?,?,?)"
        );
        assert!(l
            .update_sql()
            .ends_with("\"photo\"=? WHERE \"id\"=? AND \"owner\"=?"));
    }

    #[test]
    fn create_includes_journal() {
        let sql = layout().create_sql();
        assert_eq!(sql.len(), 4);
        assert!(sql[0].contains("PRIMARY KEY(\"id\",\"owner\")"));
        assert!(sql[1].contains("\"notes__journal\""));
        assert!(sql[1].contains("sync_version INTEGER NOT NULL DEFAULT -1"));
    }

    #[test]
    fn pending_queries() {
        let l = layout();
        let rows = l.pending_rows_sql();
        assert!(rows.starts_with("SELECT m.sync_version,t.\"id\",t.\"owner\",t.\"title\",t.\"body\""));
        assert!(rows.contains("t.\"id\"=m.\"id\" AND t.\"owner\"=m.\"owner\""));
        assert_eq!(
            l.pending_deletes_sql(),
            "SELECT sync_version,\"id\",\"owner\" FROM \"notes__journal\" WHERE sync_op='D' AND sync_txn=?"
        );
    }
}
