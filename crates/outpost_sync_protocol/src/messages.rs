//! Payload types carried by protocol commands.
//!
//! Field names follow the wire's camelCase JSON. Every inbound type is
//! lenient about missing fields so that older or newer servers can add
//! or drop optional metadata.

use crate::types::{ChangeType, SyncDirection};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Opening request of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Agent version string.
    pub client_version: String,
    /// Sync user name.
    pub user: String,
    /// Device name.
    pub device: String,
    /// Sync user password.
    pub password: String,
    /// Last known server id, -1 before the first session.
    pub server_id: i64,
    /// Last known client id, -1 before the first session.
    pub client_id: i64,
    /// Session direction.
    pub sync_direction: SyncDirection,
    /// Schemas selected for this session; empty means all.
    pub sync_schema_names: Vec<String>,
    /// Folders selected for this session; empty means all.
    pub sync_folder_names: Vec<String>,
}

/// Subscription to one table inside a schema subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSub {
    /// Server table id.
    pub table_id: i64,
}

/// Client-side cursor state for one schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaSub {
    /// Server schema id.
    pub sync_schema_id: i64,
    /// Definition change number last applied.
    pub def_cn: i64,
    /// Subscription change number last applied.
    pub sub_cn: i64,
    /// Data change number last applied, -1 before the first refresh.
    pub data_cn: i64,
    /// Client id assigned by the server.
    pub sync_client_id: i64,
    /// Subscribed tables keyed by stringified table id.
    pub table_sub_map: BTreeMap<String, TableSub>,
    /// Tables created locally but never refreshed.
    pub new_tables: Vec<i64>,
}

/// Client-side cursor state for one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderSub {
    /// Server folder id.
    pub sync_folder_id: i64,
    /// Definition change number last applied.
    pub def_cn: i64,
    /// Subscription change number last applied.
    pub sub_cn: i64,
    /// File change number last applied, -1 before the first refresh.
    pub file_cn: i64,
    /// Client id assigned by the server.
    pub sync_client_id: i64,
}

/// Server's answer to a sync request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncResponse {
    /// Server id; negative means the server rejected the client.
    pub server_id: i64,
    /// Client id assigned to this device.
    pub client_id: i64,
    /// Device name as known to the server.
    pub device: Option<String>,
    /// Schemas whose check-in the server accepted.
    pub success_schema_names: Vec<String>,
    /// Folders whose check-in the server accepted.
    pub success_folder_names: Vec<String>,
}

/// Column metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnDef {
    /// Column name.
    pub column_name: String,
    /// Local column definition, filled in by the column mapper.
    pub device_col_def: Option<String>,
    /// Generic SQL type name, e.g. `LONGVARBINARY`.
    #[serde(deserialize_with = "lenient_string")]
    pub data_type: Option<String>,
    /// Native type name on the server.
    pub type_name: String,
    /// Column size or precision.
    pub column_size: i64,
    /// Scale.
    pub decimal_digits: i64,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Position in the primary key, 0 when not a key column.
    pub pk_seq: i64,
    /// Position in the table.
    pub ordinal_position: i64,
    /// Default value expression.
    #[serde(deserialize_with = "lenient_string")]
    pub default_value: Option<String>,
}

impl ColumnDef {
    /// Returns true for primary key columns.
    pub fn is_pk(&self) -> bool {
        self.pk_seq > 0
    }
}

/// Replicated table definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableDef {
    /// Server table id.
    pub id: i64,
    /// Table name.
    pub name: String,
    /// Dependency rank; parents rank lower than children.
    pub rank: i64,
    /// Definition change number.
    pub def_cn: i64,
    /// Definition change type.
    pub def_ct: Option<ChangeType>,
    /// Whether clients may upload changes.
    pub allow_check_in: bool,
    /// Whether clients receive changes.
    pub allow_refresh: bool,
    /// Whether the table has a primary key.
    pub has_pk: bool,
    /// Users allowed to check in regardless of `allow_check_in`.
    #[serde(deserialize_with = "string_list")]
    pub check_in_super_users: Vec<String>,
    /// Subsetting mode, opaque to the client.
    pub subsetting_mode: Option<String>,
    /// Subsetting query, opaque to the client.
    pub subsetting_query: Option<String>,
    /// Columns.
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Whether `user` may upload changes to this table.
    pub fn allows_check_in_for(&self, user: &str) -> bool {
        self.allow_check_in
            || self
                .check_in_super_users
                .iter()
                .any(|u| u.eq_ignore_ascii_case(user))
    }

    /// Returns true if the definition is being removed.
    pub fn is_deleted(&self) -> bool {
        self.def_ct == Some(ChangeType::Delete)
    }
}

/// A dialect-tagged statement shipped with a schema definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSql {
    /// Definition change type.
    pub def_ct: Option<ChangeType>,
    /// Target client database type: `SQLITE`, `ALL`, ...
    pub client_db_type: String,
    /// Statement text.
    pub sql_text: Option<String>,
    /// Whether an execution failure may be ignored.
    pub ignore_exec_error: bool,
}

/// Synchronized schema definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaDef {
    /// Server schema id.
    pub id: i64,
    /// Sync schema name.
    pub name: String,
    /// Schema name on the server.
    pub server_db_schema: String,
    /// Local store name.
    pub client_db_schema: String,
    /// Definition change number.
    pub def_cn: i64,
    /// Subscription change number.
    pub sub_cn: i64,
    /// Server database dialect: `MYSQL`, `ORADB`, `MSSQL`, `POSTGRESQL`.
    pub server_db_type: String,
    /// Definition change type.
    pub def_ct: Option<ChangeType>,
    /// Changed tables.
    pub table_list: Vec<TableDef>,
    /// Statements to run after table changes.
    pub sql_list: Vec<SyncSql>,
}

impl SchemaDef {
    /// Returns true if the schema is being removed.
    pub fn is_deleted(&self) -> bool {
        self.def_ct == Some(ChangeType::Delete)
    }
}

/// Synchronized folder definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderDef {
    /// Server folder id.
    pub id: i64,
    /// Sync folder name.
    pub name: String,
    /// Folder path on the server.
    pub server_folder_path: String,
    /// Folder path on the client, relative to the files root.
    pub client_folder_path: String,
    /// Whether subdirectories are synchronized.
    pub recursive: bool,
    /// Comma-separated path prefixes; empty matches everything.
    pub file_path_starts_with: Option<String>,
    /// Comma-separated name suffixes; empty matches everything.
    pub file_name_ends_with: Option<String>,
    /// Whether clients may upload changes.
    pub allow_check_in: bool,
    /// Whether clients receive changes.
    pub allow_refresh: bool,
    /// Users allowed to check in regardless of `allow_check_in`.
    #[serde(deserialize_with = "string_list")]
    pub check_in_super_users: Vec<String>,
    /// Definition change number.
    pub def_cn: i64,
    /// Subscription change number.
    pub sub_cn: i64,
    /// Definition change type.
    pub def_ct: Option<ChangeType>,
    /// Networks on which the initial sync is skipped.
    pub no_init_sync_networks: Option<String>,
    /// Networks on which sync is skipped.
    pub no_sync_networks: Option<String>,
}

impl FolderDef {
    /// Whether `user` may upload changes to this folder.
    pub fn allows_check_in_for(&self, user: &str) -> bool {
        self.allow_check_in
            || self
                .check_in_super_users
                .iter()
                .any(|u| u.eq_ignore_ascii_case(user))
    }

    /// Returns true if the definition is being removed.
    pub fn is_deleted(&self) -> bool {
        self.def_ct == Some(ChangeType::Delete)
    }
}

/// A file or directory entry inside a folder stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileRecord {
    /// Path relative to the folder root, `/`-separated.
    pub file_name: String,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Size in bytes.
    pub length: u64,
    /// Modification time in milliseconds since the epoch.
    pub last_modified: i64,
    /// Change number assigned by the server, -1 for local changes.
    pub file_cn: i64,
    /// Change state.
    pub file_ct: ChangeType,
}

/// One chunk of a large object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncLob {
    /// Whether the payload is hex-encoded binary.
    pub is_binary: bool,
    /// Whether the value is NULL.
    pub is_null: bool,
    /// Total payload length: UTF-16 units for text, bytes for binary.
    pub total_length: u64,
    /// Chunk text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txt_payload: Option<String>,
}

/// Outcome report the server sends near the end of a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSyncSummary {
    /// Check-in status, e.g. `SUCCESS` or `FAILURE`.
    pub check_in_status: Option<String>,
    /// Refresh status.
    pub refresh_status: Option<String>,
    /// Schemas the server checked in.
    pub check_in_schema_names: Vec<String>,
    /// Folders the server checked in.
    pub check_in_folder_names: Vec<String>,
    /// Rows the server applied, as `[deletes, inserts, updates]`.
    #[serde(rename = "checkInDIU_done")]
    pub check_in_diu_done: Option<[u64; 3]>,
    /// Error messages.
    pub sync_error_messages: Option<String>,
    /// Error code; 0 or negative means no error.
    pub error_code: i64,
    /// Server-side stack traces.
    pub sync_error_stacktraces: Option<String>,
    /// Age of the server snapshot the refresh was taken from.
    pub server_snapshot_age: i64,
}

/// Renders a JSON scalar as the canonical string used in rows.
pub fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_string))
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items.into_iter().filter_map(value_to_string).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sync_request_uses_camel_case() {
        let request = SyncRequest {
            client_version: "9.0.0".into(),
            user: "alice".into(),
            device: "DEFAULT".into(),
            password: "pw".into(),
            server_id: -1,
            client_id: -1,
            sync_direction: SyncDirection::TwoWay,
            sync_schema_names: vec![],
            sync_folder_names: vec!["docs".into()],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["clientVersion"], "9.0.0");
        assert_eq!(json["syncDirection"], "TWO_WAY");
        assert_eq!(json["syncFolderNames"], json!(["docs"]));
    }

    #[test]
    fn table_def_accepts_sparse_json() {
        let table: TableDef = serde_json::from_value(json!({
            "id": 3,
            "name": "orders",
            "rank": 2,
            "defCt": "I",
            "checkInSuperUsers": "admin, ops",
            "columns": [
                {"columnName": "id", "typeName": "INT", "dataType": 4, "pkSeq": 1}
            ]
        }))
        .unwrap();
        assert_eq!(table.def_ct, Some(ChangeType::Insert));
        assert_eq!(table.check_in_super_users, vec!["admin", "ops"]);
        assert_eq!(table.columns[0].data_type.as_deref(), Some("4"));
        assert!(table.columns[0].is_pk());
        assert!(!table.allow_check_in);
        assert!(table.allows_check_in_for("ADMIN"));
        assert!(!table.allows_check_in_for("guest"));
    }

    #[test]
    fn summary_reads_diu_counters() {
        let summary: ServerSyncSummary = serde_json::from_value(json!({
            "checkInStatus": "SUCCESS",
            "checkInDIU_done": [1, 2, 3],
            "errorCode": 0
        }))
        .unwrap();
        assert_eq!(summary.check_in_diu_done, Some([1, 2, 3]));
        assert_eq!(summary.server_snapshot_age, 0);
    }

    #[test]
    fn lob_omits_missing_payload() {
        let lob = SyncLob {
            is_binary: true,
            is_null: true,
            total_length: 0,
            txt_payload: None,
        };
        assert_eq!(
            serde_json::to_value(&lob).unwrap(),
            json!({"isBinary": true, "isNull": true, "totalLength": 0})
        );
    }
}
