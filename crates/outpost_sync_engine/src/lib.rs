//! # Outpost Sync Engine
//!
//! Device-side replication agent for Outpost.
//!
//! This crate provides:
//! - Change capture into per-table journals
//! - Check-in of pending rows and files in dependency order
//! - Refresh of schema definitions, rows and files from the server
//! - Chunked, staged transport over an HTTP seam
//! - The session orchestrator and its summary
//!
//! ## Architecture
//!
//! A session is one request/response exchange driven by the client:
//! 1. Compose: `SYNC_REQUEST`, subscription state, check-in streams
//! 2. Send: staged messages posted in order, continuations pulled
//! 3. Receive: definitions, rows and files applied locally
//! 4. Commit every store touched, or roll all of them back
//!
//! ## Key Invariants
//!
//! - The server is authoritative
//! - Check-in completes before any refresh command is read
//! - Applying server data never adds journal entries
//! - A failed session leaves no local writes behind
//! - At most one session runs per agent

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod checkin;
mod config;
mod context;
mod dialect;
mod error;
mod files;
mod http;
mod journal;
mod layout;
mod refresh;
mod session;
mod state;
mod stores;
mod summary;
mod transport;
mod writer;

pub use catalog::{
    store_name_of, Catalog, ClientProperties, FolderState, SchemaState, PROP_CLIENT_ID,
    PROP_DEVICE_NAME, PROP_SERVER_ID, PROP_TRANSACTION_ID,
};
pub use config::{SyncConfig, MIN_MESSAGE_SIZE};
pub use context::SyncScope;
pub use dialect::{quote_ident, ColumnMapper, DefaultColumnMapper, SERVER_DB_TYPES};
pub use error::{SyncError, SyncResult};
pub use files::{folder_root, resolve_relative, scan_folder, FileFilter};
#[cfg(feature = "http")]
pub use http::BlockingHttpClient;
pub use http::{HttpClient, HttpRequest, HttpResponse};
pub use journal::{
    capture_enabled, provision_schema_store, set_capture_enabled, ChangeCapture, ChangeJournal,
    JournalEntry, CAPTURE_STATUS, SCHEMA_PROPERTIES_TABLE,
};
pub use layout::{LobColumn, TableLayout, JOURNAL_SUFFIX};
pub use session::{
    ClientStatus, FolderStatus, PendingChanges, PendingFolder, PendingTable, SchemaStatus,
    SyncAgent, SyncReport, TableStatus, STAGE_DB_NAME,
};
pub use state::{SyncObserver, SyncState, SyncStatus};
pub use stores::{SessionStores, SqliteStoreProvider, StoreProvider};
pub use summary::{OpCounts, SyncSummary};
pub use transport::{ChunkedTransport, HEADER_MESSAGE_ID, HEADER_SESSION_ID};
pub use writer::{SchemaHandle, TableWriter};
