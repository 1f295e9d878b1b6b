//! # Outpost Sync Protocol
//!
//! Typed commands for the Outpost device sync protocol.
//!
//! This crate provides:
//! - [`Command`], one variant per wire command name
//! - Payload types for requests, subscriptions, definitions and summaries
//! - LOB chunking and reassembly
//! - Named server result codes
//!
//! This is a pure protocol crate with no I/O operations. Framing lives in
//! `outpost_codec`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod error;
mod lob;
mod messages;
mod types;

pub use command::Command;
pub use error::{ProtocolError, ProtocolResult};
pub use lob::{lob_frames, LobAssembler, LobPayload, LobProgress};
pub use messages::{
    value_to_string, ColumnDef, FileRecord, FolderDef, FolderSub, SchemaDef, SchemaSub,
    ServerSyncSummary, SyncLob, SyncRequest, SyncResponse, SyncSql, TableDef, TableSub,
};
pub use types::{ChangeType, DmlOp, SyncDirection};

/// Agent version reported in `SYNC_REQUEST`.
pub const CLIENT_VERSION: &str = "9.0.0";

/// Server error code meaning the check-in was skipped; not fatal.
pub const CHECK_IN_SKIPPED: i64 = 2059;

/// Server error code meaning the client is bound to another server
/// instance and must be re-provisioned.
pub const WRONG_SYNC_SERVER_ID: i64 = 2025;

/// Encodes a typed command into a frame.
pub fn encode_command(command: &Command) -> ProtocolResult<String> {
    Ok(outpost_codec::encode(&command.to_raw()?)?)
}
