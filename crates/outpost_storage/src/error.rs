//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The relational store rejected a statement.
    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// A path could not be found.
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A transaction call did not match the store's transaction state.
    #[error("transaction state error on {store}: {message}")]
    Transaction {
        /// Store name.
        store: String,
        /// What went wrong.
        message: String,
    },

    /// A row did not have the expected shape.
    #[error("unexpected row shape: {0}")]
    RowShape(String),
}

impl StorageError {
    /// Create a row shape error.
    pub fn row_shape(message: impl Into<String>) -> Self {
        Self::RowShape(message.into())
    }
}
