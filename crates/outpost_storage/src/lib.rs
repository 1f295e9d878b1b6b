//! # Outpost Storage
//!
//! Local I/O contracts used by the Outpost sync engine.
//!
//! This crate provides the thin access layers the engine drives but does
//! not interpret:
//!
//! - [`SqlStore`] - relational statements inside an ambient transaction
//! - [`FileSystem`] - the synchronized file tree
//! - [`PayloadStage`] - durable id-ordered transport payloads
//!
//! ## Available Implementations
//!
//! - [`SqliteStore`] - SQLite through `rusqlite`
//! - [`LocalFileSystem`] - `std::fs`
//! - [`SqlitePayloadStage`] / [`MemoryPayloadStage`]
//!
//! ## Example
//!
//! ```rust
//! use outpost_storage::{SqlStore, SqliteStore};
//!
//! let store = SqliteStore::open_in_memory("demo").unwrap();
//! store.execute_batch("CREATE TABLE t (v TEXT)").unwrap();
//! store.execute("INSERT INTO t VALUES (?)", &["x".into()]).unwrap();
//! assert_eq!(store.query("SELECT v FROM t", &[]).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod fs;
mod sql;
mod sqlite;
mod stage;

pub use error::{StorageError, StorageResult};
pub use fs::{FileStat, FileSystem, LocalFileSystem};
pub use sql::{SqlRow, SqlStore, SqlValue};
pub use sqlite::SqliteStore;
pub use stage::{MemoryPayloadStage, PayloadStage, SqlitePayloadStage, StageSequence};
