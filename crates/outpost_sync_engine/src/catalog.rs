//! Administrative catalog: client properties, schema/table/column
//! definitions, folder definitions and file records.

use crate::dialect::ColumnMapper;
use crate::error::SyncResult;
use crate::layout::TableLayout;
use outpost_storage::{SqlRow, SqlStore, SqlValue};
use outpost_sync_protocol::{
    ChangeType, ColumnDef, FileRecord, FolderDef, FolderSub, SchemaDef, SchemaSub, TableDef,
    TableSub,
};
use std::collections::BTreeMap;

/// Property holding the server-assigned client id.
pub const PROP_CLIENT_ID: &str = "client.id";
/// Property holding the id of the server instance this client is bound to.
pub const PROP_SERVER_ID: &str = "server.id";
/// Property holding the device name last confirmed by the server.
pub const PROP_DEVICE_NAME: &str = "device.name";
/// Property holding the transaction id stamped on the next check-in.
pub const PROP_TRANSACTION_ID: &str = "transaction.id";

const PROVISION_SQL: &str = "
CREATE TABLE IF NOT EXISTS sync_client_properties (
    name TEXT PRIMARY KEY,
    value TEXT
);
CREATE TABLE IF NOT EXISTS sync_schemas (
    sync_schema_id INTEGER PRIMARY KEY,
    sync_client_id INTEGER,
    sync_schema_name TEXT NOT NULL,
    server_db_type TEXT,
    server_db_schema TEXT,
    client_db_schema TEXT,
    def_cn INTEGER,
    sub_cn INTEGER,
    data_cn INTEGER NOT NULL DEFAULT -1
);
CREATE TABLE IF NOT EXISTS sync_tables (
    sync_table_id INTEGER PRIMARY KEY,
    sync_schema_id INTEGER NOT NULL,
    table_name TEXT NOT NULL,
    table_rank INTEGER,
    def_cn INTEGER,
    subsetting_mode TEXT,
    subsetting_query TEXT,
    is_new TEXT,
    allow_check_in TEXT,
    allow_refresh TEXT,
    has_pk TEXT,
    check_in_super_users TEXT,
    UNIQUE (sync_schema_id, table_name)
);
CREATE TABLE IF NOT EXISTS sync_table_columns (
    sync_table_id INTEGER NOT NULL,
    column_name TEXT NOT NULL,
    device_col_def TEXT,
    data_type TEXT,
    type_name TEXT,
    column_size INTEGER,
    decimal_digits INTEGER,
    nullable TEXT,
    pk_seq INTEGER,
    ordinal_position INTEGER,
    default_value TEXT,
    PRIMARY KEY (sync_table_id, column_name)
);
CREATE TABLE IF NOT EXISTS sync_folders (
    sync_folder_id INTEGER PRIMARY KEY,
    sync_client_id INTEGER,
    sync_folder_name TEXT NOT NULL UNIQUE,
    server_folder_path TEXT,
    client_folder_path TEXT,
    recursive TEXT,
    file_path_starts_with TEXT,
    file_name_ends_with TEXT,
    allow_check_in TEXT,
    allow_refresh TEXT,
    check_in_super_users TEXT,
    def_cn INTEGER,
    sub_cn INTEGER,
    file_cn INTEGER NOT NULL DEFAULT -1,
    no_init_sync_networks TEXT,
    no_sync_networks TEXT
);
CREATE TABLE IF NOT EXISTS sync_files (
    sync_folder_id INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    is_directory TEXT,
    length INTEGER,
    last_modified INTEGER,
    file_cn INTEGER,
    file_ct TEXT,
    PRIMARY KEY (sync_folder_id, file_name)
);
";

fn yn(flag: bool) -> SqlValue {
    SqlValue::from(if flag { "Y" } else { "N" })
}

/// A schema known to this client.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaState {
    /// Schema definition; its `table_list` is left empty, see `tables`.
    pub def: SchemaDef,
    /// Subscription state reported in `SCHEMA_SUB_STATE`.
    pub sub: SchemaSub,
    /// Tables ordered by rank, parents first.
    pub tables: Vec<TableLayout>,
}

impl SchemaState {
    /// Store handle holding the schema's tables.
    pub fn store_name(&self) -> &str {
        store_name_of(&self.def)
    }

    /// Table with the given server id.
    pub fn table(&self, table_id: i64) -> Option<&TableLayout> {
        self.tables.iter().find(|t| t.id() == table_id)
    }
}

/// Store handle name for a schema: its client schema, or its name.
pub fn store_name_of(def: &SchemaDef) -> &str {
    if def.client_db_schema.trim().is_empty() {
        &def.name
    } else {
        &def.client_db_schema
    }
}

/// A folder known to this client.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderState {
    /// Folder definition.
    pub def: FolderDef,
    /// Subscription state reported in `FOLDER_SUB_STATE`.
    pub sub: FolderSub,
}

/// Client identity properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProperties {
    /// Server-assigned client id, `-1` before the first sync.
    pub client_id: i64,
    /// Bound server id, `-1` before the first sync.
    pub server_id: i64,
    /// Device name last confirmed by the server.
    pub device_name: Option<String>,
    /// Transaction id for the next check-in.
    pub transaction_id: i64,
}

/// Typed access to the catalog tables in the admin store.
pub struct Catalog<'a> {
    store: &'a dyn SqlStore,
}

impl<'a> Catalog<'a> {
    /// Wraps the admin store.
    pub fn new(store: &'a dyn SqlStore) -> Self {
        Self { store }
    }

    /// Creates the catalog tables if missing.
    pub fn provision(&self) -> SyncResult<()> {
        self.store.execute_batch(PROVISION_SQL)?;
        Ok(())
    }

    /// Reads a client property.
    pub fn property(&self, name: &str) -> SyncResult<Option<String>> {
        let row = self.store.query_row(
            "SELECT value FROM sync_client_properties WHERE name=?",
            &[name.into()],
        )?;
        Ok(row.and_then(|r| r.opt_text("value")))
    }

    /// Writes a client property.
    pub fn set_property(&self, name: &str, value: impl ToString) -> SyncResult<()> {
        self.store.execute(
            "INSERT OR REPLACE INTO sync_client_properties (name, value) VALUES (?, ?)",
            &[name.into(), value.to_string().into()],
        )?;
        Ok(())
    }

    fn int_property(&self, name: &str, default: i64) -> SyncResult<i64> {
        Ok(self
            .property(name)?
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default))
    }

    /// Loads the identity properties, with defaults for missing ones.
    pub fn client_properties(&self) -> SyncResult<ClientProperties> {
        Ok(ClientProperties {
            client_id: self.int_property(PROP_CLIENT_ID, -1)?,
            server_id: self.int_property(PROP_SERVER_ID, -1)?,
            device_name: self.property(PROP_DEVICE_NAME)?,
            transaction_id: self.int_property(PROP_TRANSACTION_ID, 0)?,
        })
    }

    /// Loads every schema with its tables, ranked parents first.
    pub fn load_schemas(&self, mapper: &dyn ColumnMapper) -> SyncResult<Vec<SchemaState>> {
        let rows = self
            .store
            .query("SELECT * FROM sync_schemas ORDER BY sync_schema_id", &[])?;
        let mut schemas = Vec::with_capacity(rows.len());
        for row in rows {
            let def = SchemaDef {
                id: row.i64("sync_schema_id")?,
                name: row.text("sync_schema_name"),
                server_db_schema: row.text("server_db_schema"),
                client_db_schema: row.text("client_db_schema"),
                def_cn: row.opt_i64("def_cn").unwrap_or(-1),
                sub_cn: row.opt_i64("sub_cn").unwrap_or(-1),
                server_db_type: row.text("server_db_type"),
                ..SchemaDef::default()
            };
            let mut sub = SchemaSub {
                sync_schema_id: def.id,
                def_cn: def.def_cn,
                sub_cn: def.sub_cn,
                data_cn: row.opt_i64("data_cn").unwrap_or(-1),
                sync_client_id: row.opt_i64("sync_client_id").unwrap_or(-1),
                ..SchemaSub::default()
            };

            let mut tables = Vec::new();
            for (table, is_new) in self.load_tables(def.id)? {
                sub.table_sub_map
                    .insert(table.id.to_string(), TableSub { table_id: table.id });
                if is_new {
                    sub.new_tables.push(table.id);
                }
                tables.push(TableLayout::new(table, &def.server_db_type, mapper));
            }
            schemas.push(SchemaState { def, sub, tables });
        }
        Ok(schemas)
    }

    fn load_tables(&self, schema_id: i64) -> SyncResult<Vec<(TableDef, bool)>> {
        let rows = self.store.query(
            "SELECT * FROM sync_tables WHERE sync_schema_id=? ORDER BY table_rank, sync_table_id",
            &[schema_id.into()],
        )?;
        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.i64("sync_table_id")?;
            let def = TableDef {
                id,
                name: row.text("table_name"),
                rank: row.opt_i64("table_rank").unwrap_or(0),
                def_cn: row.opt_i64("def_cn").unwrap_or(-1),
                def_ct: None,
                allow_check_in: row.flag("allow_check_in"),
                allow_refresh: row.flag("allow_refresh"),
                has_pk: row.flag("has_pk"),
                check_in_super_users: split_list(&row.text("check_in_super_users")),
                subsetting_mode: row.opt_text("subsetting_mode"),
                subsetting_query: row.opt_text("subsetting_query"),
                columns: self.load_columns(id)?,
            };
            tables.push((def, row.flag("is_new")));
        }
        Ok(tables)
    }

    fn load_columns(&self, table_id: i64) -> SyncResult<Vec<ColumnDef>> {
        let rows = self.store.query(
            "SELECT * FROM sync_table_columns WHERE sync_table_id=? ORDER BY ordinal_position",
            &[table_id.into()],
        )?;
        Ok(rows
            .into_iter()
            .map(|row| ColumnDef {
                column_name: row.text("column_name"),
                device_col_def: row.opt_text("device_col_def"),
                data_type: row.opt_text("data_type"),
                type_name: row.text("type_name"),
                column_size: row.opt_i64("column_size").unwrap_or(0),
                decimal_digits: row.opt_i64("decimal_digits").unwrap_or(0),
                nullable: row.flag("nullable"),
                pk_seq: row.opt_i64("pk_seq").unwrap_or(0),
                ordinal_position: row.opt_i64("ordinal_position").unwrap_or(0),
                default_value: row.opt_text("default_value"),
            })
            .collect())
    }

    /// Inserts or updates a schema. A new schema starts with no data
    /// (`data_cn = -1`); an existing one keeps its data cursor.
    pub fn upsert_schema(&self, def: &SchemaDef, client_id: i64) -> SyncResult<()> {
        let updated = self.store.execute(
            "UPDATE sync_schemas SET sync_client_id=?, sync_schema_name=?, server_db_type=?, \
             server_db_schema=?, client_db_schema=?, def_cn=?, sub_cn=? WHERE sync_schema_id=?",
            &[
                client_id.into(),
                def.name.as_str().into(),
                def.server_db_type.as_str().into(),
                def.server_db_schema.as_str().into(),
                def.client_db_schema.as_str().into(),
                def.def_cn.into(),
                def.sub_cn.into(),
                def.id.into(),
            ],
        )?;
        if updated == 0 {
            self.store.execute(
                "INSERT INTO sync_schemas (sync_schema_id, sync_client_id, sync_schema_name, \
                 server_db_type, server_db_schema, client_db_schema, def_cn, sub_cn, data_cn) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, -1)",
                &[
                    def.id.into(),
                    client_id.into(),
                    def.name.as_str().into(),
                    def.server_db_type.as_str().into(),
                    def.server_db_schema.as_str().into(),
                    def.client_db_schema.as_str().into(),
                    def.def_cn.into(),
                    def.sub_cn.into(),
                ],
            )?;
        }
        Ok(())
    }

    /// Removes a schema and every table and column under it.
    pub fn delete_schema(&self, schema_id: i64) -> SyncResult<()> {
        self.store.execute(
            "DELETE FROM sync_table_columns WHERE sync_table_id IN \
             (SELECT sync_table_id FROM sync_tables WHERE sync_schema_id=?)",
            &[schema_id.into()],
        )?;
        self.store
            .execute("DELETE FROM sync_tables WHERE sync_schema_id=?", &[schema_id.into()])?;
        self.store
            .execute("DELETE FROM sync_schemas WHERE sync_schema_id=?", &[schema_id.into()])?;
        Ok(())
    }

    /// Writes a table definition and its columns, replacing any previous one.
    pub fn upsert_table(&self, schema_id: i64, def: &TableDef, is_new: bool) -> SyncResult<()> {
        self.delete_table(def.id)?;
        self.store.execute(
            "INSERT INTO sync_tables (sync_table_id, sync_schema_id, table_name, table_rank, \
             def_cn, subsetting_mode, subsetting_query, is_new, allow_check_in, allow_refresh, \
             has_pk, check_in_super_users) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            &[
                def.id.into(),
                schema_id.into(),
                def.name.as_str().into(),
                def.rank.into(),
                def.def_cn.into(),
                def.subsetting_mode.clone().into(),
                def.subsetting_query.clone().into(),
                yn(is_new),
                yn(def.allow_check_in),
                yn(def.allow_refresh),
                yn(def.has_pk),
                def.check_in_super_users.join(",").into(),
            ],
        )?;
        for column in &def.columns {
            self.store.execute(
                "INSERT INTO sync_table_columns (sync_table_id, column_name, device_col_def, \
                 data_type, type_name, column_size, decimal_digits, nullable, pk_seq, \
                 ordinal_position, default_value) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                &[
                    def.id.into(),
                    column.column_name.as_str().into(),
                    column.device_col_def.clone().into(),
                    column.data_type.clone().into(),
                    column.type_name.as_str().into(),
                    column.column_size.into(),
                    column.decimal_digits.into(),
                    yn(column.nullable),
                    column.pk_seq.into(),
                    column.ordinal_position.into(),
                    column.default_value.clone().into(),
                ],
            )?;
        }
        Ok(())
    }

    /// Removes a table definition and its columns.
    pub fn delete_table(&self, table_id: i64) -> SyncResult<()> {
        self.store.execute(
            "DELETE FROM sync_table_columns WHERE sync_table_id=?",
            &[table_id.into()],
        )?;
        self.store
            .execute("DELETE FROM sync_tables WHERE sync_table_id=?", &[table_id.into()])?;
        Ok(())
    }

    /// Records the data cursor reached by a refresh.
    pub fn set_data_cn(&self, schema_id: i64, data_cn: i64) -> SyncResult<()> {
        self.store.execute(
            "UPDATE sync_schemas SET data_cn=? WHERE sync_schema_id=?",
            &[data_cn.into(), schema_id.into()],
        )?;
        Ok(())
    }

    /// Marks tables as having received their initial data.
    pub fn clear_new_tables(&self, table_ids: &[i64]) -> SyncResult<()> {
        for id in table_ids {
            self.store.execute(
                "UPDATE sync_tables SET is_new='N' WHERE sync_table_id=?",
                &[(*id).into()],
            )?;
        }
        Ok(())
    }

    /// Loads every folder.
    pub fn load_folders(&self) -> SyncResult<Vec<FolderState>> {
        let rows = self
            .store
            .query("SELECT * FROM sync_folders ORDER BY sync_folder_id", &[])?;
        rows.into_iter().map(|row| folder_from_row(&row)).collect()
    }

    /// Stores a folder definition with the given file cursor.
    pub fn upsert_folder(&self, def: &FolderDef, file_cn: i64, client_id: i64) -> SyncResult<()> {
        self.store.execute(
            "INSERT OR REPLACE INTO sync_folders (sync_folder_id, sync_client_id, \
             sync_folder_name, server_folder_path, client_folder_path, recursive, \
             file_path_starts_with, file_name_ends_with, allow_check_in, allow_refresh, \
             check_in_super_users, def_cn, sub_cn, file_cn, no_init_sync_networks, \
             no_sync_networks) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            &[
                def.id.into(),
                client_id.into(),
                def.name.as_str().into(),
                def.server_folder_path.as_str().into(),
                def.client_folder_path.as_str().into(),
                yn(def.recursive),
                def.file_path_starts_with.clone().into(),
                def.file_name_ends_with.clone().into(),
                yn(def.allow_check_in),
                yn(def.allow_refresh),
                def.check_in_super_users.join(",").into(),
                def.def_cn.into(),
                def.sub_cn.into(),
                file_cn.into(),
                def.no_init_sync_networks.clone().into(),
                def.no_sync_networks.clone().into(),
            ],
        )?;
        Ok(())
    }

    /// Removes a folder and all of its file records.
    pub fn delete_folder(&self, folder_id: i64) -> SyncResult<()> {
        self.delete_files(folder_id)?;
        self.store
            .execute("DELETE FROM sync_folders WHERE sync_folder_id=?", &[folder_id.into()])?;
        Ok(())
    }

    /// Records the file cursor reached by a refresh.
    pub fn set_file_cn(&self, folder_id: i64, file_cn: i64) -> SyncResult<()> {
        self.store.execute(
            "UPDATE sync_folders SET file_cn=? WHERE sync_folder_id=?",
            &[file_cn.into(), folder_id.into()],
        )?;
        Ok(())
    }

    /// File records of a folder keyed by relative path.
    pub fn files(&self, folder_id: i64) -> SyncResult<BTreeMap<String, FileRecord>> {
        let rows = self.store.query(
            "SELECT * FROM sync_files WHERE sync_folder_id=? ORDER BY file_name",
            &[folder_id.into()],
        )?;
        let mut files = BTreeMap::new();
        for row in rows {
            let record = file_from_row(&row)?;
            files.insert(record.file_name.clone(), record);
        }
        Ok(files)
    }

    /// Inserts or replaces a file record.
    pub fn put_file(&self, folder_id: i64, file: &FileRecord) -> SyncResult<()> {
        self.store.execute(
            "INSERT OR REPLACE INTO sync_files (sync_folder_id, file_name, is_directory, \
             length, last_modified, file_cn, file_ct) VALUES (?, ?, ?, ?, ?, ?, ?)",
            &[
                folder_id.into(),
                file.file_name.as_str().into(),
                yn(file.is_directory),
                file.length.into(),
                file.last_modified.into(),
                file.file_cn.into(),
                file.file_ct.code().into(),
            ],
        )?;
        Ok(())
    }

    /// Removes one file record.
    pub fn delete_file(&self, folder_id: i64, file_name: &str) -> SyncResult<()> {
        self.store.execute(
            "DELETE FROM sync_files WHERE sync_folder_id=? AND file_name=?",
            &[folder_id.into(), file_name.into()],
        )?;
        Ok(())
    }

    /// Removes every file record of a folder.
    pub fn delete_files(&self, folder_id: i64) -> SyncResult<()> {
        self.store
            .execute("DELETE FROM sync_files WHERE sync_folder_id=?", &[folder_id.into()])?;
        Ok(())
    }

    /// Reconciles a folder after the server accepted its check-in: pending
    /// deletes vanish and pending inserts/updates become synced. Returns the
    /// number of records touched.
    pub fn ack_files(&self, folder_id: i64) -> SyncResult<usize> {
        let deleted = self.store.execute(
            "DELETE FROM sync_files WHERE sync_folder_id=? AND file_ct='D'",
            &[folder_id.into()],
        )?;
        let synced = self.store.execute(
            "UPDATE sync_files SET file_ct='S' WHERE sync_folder_id=? AND file_ct IN ('I','U')",
            &[folder_id.into()],
        )?;
        Ok(deleted + synced)
    }

    /// Number of file records of a folder per pending change type.
    pub fn pending_file_counts(&self, folder_id: i64) -> SyncResult<BTreeMap<ChangeType, u64>> {
        let rows = self.store.query(
            "SELECT file_ct, COUNT(*) AS n FROM sync_files \
             WHERE sync_folder_id=? AND file_ct<>'S' GROUP BY file_ct",
            &[folder_id.into()],
        )?;
        let mut counts = BTreeMap::new();
        for row in rows {
            if let Some(ct) = ChangeType::from_code(&row.text("file_ct")) {
                counts.insert(ct, u64::try_from(row.i64("n")?).unwrap_or(0));
            }
        }
        Ok(counts)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn folder_from_row(row: &SqlRow) -> SyncResult<FolderState> {
    let def = FolderDef {
        id: row.i64("sync_folder_id")?,
        name: row.text("sync_folder_name"),
        server_folder_path: row.text("server_folder_path"),
        client_folder_path: row.text("client_folder_path"),
        recursive: row.flag("recursive"),
        file_path_starts_with: row.opt_text("file_path_starts_with"),
        file_name_ends_with: row.opt_text("file_name_ends_with"),
        allow_check_in: row.flag("allow_check_in"),
        allow_refresh: row.flag("allow_refresh"),
        check_in_super_users: split_list(&row.text("check_in_super_users")),
        def_cn: row.opt_i64("def_cn").unwrap_or(-1),
        sub_cn: row.opt_i64("sub_cn").unwrap_or(-1),
        def_ct: None,
        no_init_sync_networks: row.opt_text("no_init_sync_networks"),
        no_sync_networks: row.opt_text("no_sync_networks"),
    };
    let sub = FolderSub {
        sync_folder_id: def.id,
        def_cn: def.def_cn,
        sub_cn: def.sub_cn,
        file_cn: row.opt_i64("file_cn").unwrap_or(-1),
        sync_client_id: row.opt_i64("sync_client_id").unwrap_or(-1),
    };
    Ok(FolderState { def, sub })
}

fn file_from_row(row: &SqlRow) -> SyncResult<FileRecord> {
    Ok(FileRecord {
        file_name: row.text("file_name"),
        is_directory: row.flag("is_directory"),
        length: u64::try_from(row.opt_i64("length").unwrap_or(0)).unwrap_or(0),
        last_modified: row.opt_i64("last_modified").unwrap_or(0),
        file_cn: row.opt_i64("file_cn").unwrap_or(-1),
        file_ct: ChangeType::from_code(&row.text("file_ct")).unwrap_or(ChangeType::Synced),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DefaultColumnMapper;
    use outpost_storage::SqliteStore;

    fn catalog_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory("admin").unwrap();
        Catalog::new(&store).provision().unwrap();
        store
    }

    fn table(id: i64, name: &str, rank: i64) -> TableDef {
        TableDef {
            id,
            name: name.into(),
            rank,
            allow_check_in: true,
            allow_refresh: true,
            has_pk: true,
            check_in_super_users: vec!["root".into()],
            columns: vec![ColumnDef {
                column_name: "id".into(),
                type_name: "INT".into(),
                pk_seq: 1,
                ordinal_position: 1,
                ..ColumnDef::default()
            }],
            ..TableDef::default()
        }
    }

    #[test]
    fn provision_is_idempotent() {
        let store = catalog_store();
        Catalog::new(&store).provision().unwrap();
    }

    #[test]
    fn properties_default_and_persist() {
        let store = catalog_store();
        let catalog = Catalog::new(&store);
        let props = catalog.client_properties().unwrap();
        assert_eq!(props.client_id, -1);
        assert_eq!(props.server_id, -1);
        assert_eq!(props.transaction_id, 0);

        catalog.set_property(PROP_CLIENT_ID, 12).unwrap();
        catalog.set_property(PROP_TRANSACTION_ID, 3).unwrap();
        catalog.set_property(PROP_DEVICE_NAME, "tab").unwrap();
        let props = catalog.client_properties().unwrap();
        assert_eq!(props.client_id, 12);
        assert_eq!(props.transaction_id, 3);
        assert_eq!(props.device_name.as_deref(), Some("tab"));
    }

    #[test]
    fn schemas_load_ranked_with_sub_state() {
        let store = catalog_store();
        let catalog = Catalog::new(&store);
        let schema = SchemaDef {
            id: 1,
            name: "crm".into(),
            server_db_type: "MYSQL".into(),
            def_cn: 4,
            sub_cn: 2,
            ..SchemaDef::default()
        };
        catalog.upsert_schema(&schema, 9).unwrap();
        catalog.upsert_table(1, &table(11, "orders", 2), true).unwrap();
        catalog.upsert_table(1, &table(10, "customers", 1), false).unwrap();

        let schemas = catalog.load_schemas(&DefaultColumnMapper).unwrap();
        assert_eq!(schemas.len(), 1);
        let s = &schemas[0];
        assert_eq!(s.store_name(), "crm");
        assert_eq!(s.sub.data_cn, -1);
        assert_eq!(s.sub.sync_client_id, 9);
        assert_eq!(s.sub.new_tables, vec![11]);
        assert!(s.sub.table_sub_map.contains_key("10"));
        let names: Vec<_> = s.tables.iter().map(|t| t.name()).collect();
        assert_eq!(names, ["customers", "orders"]);
        assert_eq!(s.tables[0].def.check_in_super_users, vec!["root".to_string()]);

        catalog.set_data_cn(1, 40).unwrap();
        catalog.upsert_schema(&schema, 9).unwrap();
        catalog.clear_new_tables(&[11]).unwrap();
        let s = &catalog.load_schemas(&DefaultColumnMapper).unwrap()[0];
        assert_eq!(s.sub.data_cn, 40);
        assert!(s.sub.new_tables.is_empty());

        catalog.delete_schema(1).unwrap();
        assert!(catalog.load_schemas(&DefaultColumnMapper).unwrap().is_empty());
    }

    #[test]
    fn file_records_ack() {
        let store = catalog_store();
        let catalog = Catalog::new(&store);
        let folder = FolderDef {
            id: 5,
            name: "docs".into(),
            client_folder_path: "docs".into(),
            ..FolderDef::default()
        };
        catalog.upsert_folder(&folder, -1, 1).unwrap();
        for (name, ct) in [
            ("a.txt", ChangeType::Insert),
            ("b.txt", ChangeType::Update),
            ("c.txt", ChangeType::Delete),
            ("d.txt", ChangeType::Synced),
        ] {
            let record = FileRecord {
                file_name: name.into(),
                length: 3,
                file_cn: -1,
                file_ct: ct,
                ..FileRecord::default()
            };
            catalog.put_file(5, &record).unwrap();
        }
        assert_eq!(catalog.pending_file_counts(5).unwrap().len(), 3);
        assert_eq!(catalog.ack_files(5).unwrap(), 3);

        let files = catalog.files(5).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.values().all(|f| f.file_ct == ChangeType::Synced));
        assert!(catalog.pending_file_counts(5).unwrap().is_empty());

        catalog.set_file_cn(5, 17).unwrap();
        let folders = catalog.load_folders().unwrap();
        assert_eq!(folders[0].sub.file_cn, 17);

        catalog.delete_folder(5).unwrap();
        assert!(catalog.load_folders().unwrap().is_empty());
        assert!(catalog.files(5).unwrap().is_empty());
    }
}
