//! Typed protocol commands.
//!
//! Each wire name maps to one [`Command`] variant with a defined payload,
//! so the check-in and refresh state machines match on variants instead
//! of inspecting untyped JSON.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{
    value_to_string, FileRecord, FolderDef, FolderSub, SchemaDef, SchemaSub, ServerSyncSummary,
    SyncLob, SyncRequest, SyncResponse,
};
use crate::types::DmlOp;
use outpost_codec::RawCommand;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A protocol command. `MORE` has no variant; the transport hides it.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `SYNC_REQUEST`
    SyncRequest(SyncRequest),
    /// `SCHEMA_SUB_STATE`
    SchemaSubState(Vec<SchemaSub>),
    /// `FOLDER_SUB_STATE`
    FolderSubState(Vec<FolderSub>),
    /// `CHECK_IN_DATA`
    CheckInData,
    /// `SCHEMA`, opening one schema's data stream.
    Schema(SchemaSub),
    /// `INSERT`, `UPDATE` or `DELETE`, opening a row group for a table.
    Dml {
        /// Operation of the group.
        op: DmlOp,
        /// Server table id.
        table_id: i64,
    },
    /// `ROW`: version followed by column values.
    Row(Vec<Option<String>>),
    /// `LOB`: one large-object chunk.
    Lob(SyncLob),
    /// `END_INSERT`, `END_UPDATE` or `END_DELETE`.
    EndDml(DmlOp),
    /// `END_SCHEMA`
    EndSchema,
    /// `END_CHECK_IN_DATA`
    EndCheckInData,
    /// `CHECK_IN_FILES`
    CheckInFiles,
    /// `FOLDER`, opening one folder's file stream.
    Folder(FolderSub),
    /// `FILE`
    File(FileRecord),
    /// `END_FOLDER`
    EndFolder,
    /// `END_CHECK_IN_FILES`
    EndCheckInFiles,
    /// `END_SYNC_REQUEST`
    EndSyncRequest,
    /// `SYNC_RESPONSE`
    SyncResponse(SyncResponse),
    /// `REFRESH_SCHEMA_DEF`
    RefreshSchemaDef(Vec<SchemaDef>),
    /// `REFRESH_FOLDER_DEF`
    RefreshFolderDef(Vec<FolderDef>),
    /// `REFRESH_DATA`
    RefreshData,
    /// `END_REFRESH_DATA`
    EndRefreshData,
    /// `REFRESH_FILES`
    RefreshFiles,
    /// `END_REFRESH_FILES`
    EndRefreshFiles,
    /// `SYNC_SUMMARY`
    SyncSummary(ServerSyncSummary),
    /// `END_SYNC_RESPONSE`
    EndSyncResponse,
}

impl Command {
    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SyncRequest(_) => "SYNC_REQUEST",
            Self::SchemaSubState(_) => "SCHEMA_SUB_STATE",
            Self::FolderSubState(_) => "FOLDER_SUB_STATE",
            Self::CheckInData => "CHECK_IN_DATA",
            Self::Schema(_) => "SCHEMA",
            Self::Dml { op, .. } => op.command_name(),
            Self::Row(_) => "ROW",
            Self::Lob(_) => "LOB",
            Self::EndDml(op) => op.end_command_name(),
            Self::EndSchema => "END_SCHEMA",
            Self::EndCheckInData => "END_CHECK_IN_DATA",
            Self::CheckInFiles => "CHECK_IN_FILES",
            Self::Folder(_) => "FOLDER",
            Self::File(_) => "FILE",
            Self::EndFolder => "END_FOLDER",
            Self::EndCheckInFiles => "END_CHECK_IN_FILES",
            Self::EndSyncRequest => "END_SYNC_REQUEST",
            Self::SyncResponse(_) => "SYNC_RESPONSE",
            Self::RefreshSchemaDef(_) => "REFRESH_SCHEMA_DEF",
            Self::RefreshFolderDef(_) => "REFRESH_FOLDER_DEF",
            Self::RefreshData => "REFRESH_DATA",
            Self::EndRefreshData => "END_REFRESH_DATA",
            Self::RefreshFiles => "REFRESH_FILES",
            Self::EndRefreshFiles => "END_REFRESH_FILES",
            Self::SyncSummary(_) => "SYNC_SUMMARY",
            Self::EndSyncResponse => "END_SYNC_RESPONSE",
        }
    }

    /// Converts to the untyped frame form.
    pub fn to_raw(&self) -> ProtocolResult<RawCommand> {
        let name = self.name();
        let value = match self {
            Self::SyncRequest(v) => Some(to_json(name, v)?),
            Self::SchemaSubState(v) => Some(to_json(name, v)?),
            Self::FolderSubState(v) => Some(to_json(name, v)?),
            Self::Schema(v) => Some(to_json(name, v)?),
            Self::Dml { table_id, .. } => Some(Value::from(*table_id)),
            Self::Row(values) => Some(Value::Array(
                values
                    .iter()
                    .map(|v| v.clone().map_or(Value::Null, Value::String))
                    .collect(),
            )),
            Self::Lob(v) => Some(to_json(name, v)?),
            Self::Folder(v) => Some(to_json(name, v)?),
            Self::File(v) => Some(to_json(name, v)?),
            Self::SyncResponse(v) => Some(to_json(name, v)?),
            Self::RefreshSchemaDef(v) => Some(to_json(name, v)?),
            Self::RefreshFolderDef(v) => Some(to_json(name, v)?),
            Self::SyncSummary(v) => Some(to_json(name, v)?),
            _ => None,
        };
        Ok(RawCommand {
            name: name.to_string(),
            value,
        })
    }

    /// Parses an untyped frame into a typed command.
    ///
    /// # Errors
    ///
    /// Fails for unknown names, for `MORE` (which must never reach the
    /// protocol layer) and for values of the wrong shape.
    pub fn from_raw(raw: RawCommand) -> ProtocolResult<Self> {
        let RawCommand { name, value } = raw;
        let command = match name.as_str() {
            "SYNC_REQUEST" => Self::SyncRequest(required(&name, value)?),
            "SCHEMA_SUB_STATE" => Self::SchemaSubState(optional_list(&name, value)?),
            "FOLDER_SUB_STATE" => Self::FolderSubState(optional_list(&name, value)?),
            "CHECK_IN_DATA" => Self::CheckInData,
            "SCHEMA" => Self::Schema(required(&name, value)?),
            "INSERT" | "UPDATE" | "DELETE" => {
                let op = match name.as_str() {
                    "INSERT" => DmlOp::Insert,
                    "UPDATE" => DmlOp::Update,
                    _ => DmlOp::Delete,
                };
                Self::Dml {
                    op,
                    table_id: table_id(&name, value)?,
                }
            }
            "ROW" => Self::Row(row_values(&name, value)?),
            "LOB" => Self::Lob(required(&name, value)?),
            "END_INSERT" => Self::EndDml(DmlOp::Insert),
            "END_UPDATE" => Self::EndDml(DmlOp::Update),
            "END_DELETE" => Self::EndDml(DmlOp::Delete),
            "END_SCHEMA" => Self::EndSchema,
            "END_CHECK_IN_DATA" => Self::EndCheckInData,
            "CHECK_IN_FILES" => Self::CheckInFiles,
            "FOLDER" => Self::Folder(required(&name, value)?),
            "FILE" => Self::File(required(&name, value)?),
            "END_FOLDER" => Self::EndFolder,
            "END_CHECK_IN_FILES" => Self::EndCheckInFiles,
            "END_SYNC_REQUEST" => Self::EndSyncRequest,
            "SYNC_RESPONSE" => Self::SyncResponse(required(&name, value)?),
            "REFRESH_SCHEMA_DEF" => Self::RefreshSchemaDef(optional_list(&name, value)?),
            "REFRESH_FOLDER_DEF" => Self::RefreshFolderDef(optional_list(&name, value)?),
            "REFRESH_DATA" => Self::RefreshData,
            "END_REFRESH_DATA" => Self::EndRefreshData,
            "REFRESH_FILES" => Self::RefreshFiles,
            "END_REFRESH_FILES" => Self::EndRefreshFiles,
            "SYNC_SUMMARY" => Self::SyncSummary(required(&name, value)?),
            "END_SYNC_RESPONSE" => Self::EndSyncResponse,
            _ => return Err(ProtocolError::UnknownCommand { name }),
        };
        Ok(command)
    }
}

fn to_json<T: Serialize>(name: &str, value: &T) -> ProtocolResult<Value> {
    serde_json::to_value(value).map_err(|e| ProtocolError::invalid_value(name, e.to_string()))
}

fn required<T: DeserializeOwned>(name: &str, value: Option<Value>) -> ProtocolResult<T> {
    let value = value.ok_or_else(|| ProtocolError::MissingValue {
        name: name.to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| ProtocolError::invalid_value(name, e.to_string()))
}

fn optional_list<T: DeserializeOwned>(name: &str, value: Option<Value>) -> ProtocolResult<Vec<T>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| ProtocolError::invalid_value(name, e.to_string())),
    }
}

fn table_id(name: &str, value: Option<Value>) -> ProtocolResult<i64> {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| ProtocolError::invalid_value(name, format!("table id {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| ProtocolError::invalid_value(name, format!("table id {s:?}"))),
        Some(other) => Err(ProtocolError::invalid_value(name, format!("table id {other}"))),
        None => Err(ProtocolError::MissingValue {
            name: name.to_string(),
        }),
    }
}

fn row_values(name: &str, value: Option<Value>) -> ProtocolResult<Vec<Option<String>>> {
    match value {
        Some(Value::Array(items)) => Ok(items.into_iter().map(value_to_string).collect()),
        Some(other) => Err(ProtocolError::invalid_value(
            name,
            format!("expected array, got {other}"),
        )),
        None => Err(ProtocolError::MissingValue {
            name: name.to_string(),
        }),
    }
}
