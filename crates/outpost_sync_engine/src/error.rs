//! Error types for the sync engine.

use outpost_codec::CodecError;
use outpost_storage::StorageError;
use outpost_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync session.
///
/// Every variant is fatal to the session: the orchestrator rolls back all
/// open store transactions and reports the session as failed.
#[derive(Error, Debug)]
pub enum SyncError {
    /// An unexpected command arrived for the current parse state.
    #[error("protocol violation: expected {expected}, got {received}")]
    ProtocolViolation {
        /// What the parser accepts at this point.
        expected: String,
        /// Name of the command that arrived.
        received: String,
    },

    /// Network, HTTP status or staging failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// A refresh command reached a check-in-only session.
    #[error("refresh not allowed: {0}")]
    PolicyViolation(String),

    /// The server reported an error in its summary.
    #[error("server reported error {code}: {message}")]
    ServerReported {
        /// Server error code.
        code: i64,
        /// Server error messages.
        message: String,
    },

    /// The server rejected the session outright.
    #[error("server rejected session: {0}")]
    Rejected(String),

    /// A definition statement failed and was not flagged ignorable.
    #[error("statement failed: {message} ({sql})")]
    StatementFailed {
        /// Statement text.
        sql: String,
        /// Store error message.
        message: String,
    },

    /// Local metadata does not match what the server refers to.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// A session is already running.
    #[error("there is already an active sync session")]
    SessionActive,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Frame codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Command mapping or LOB framing error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local store or filesystem error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a protocol violation for an unexpected command.
    pub fn unexpected(expected: impl Into<String>, received: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            expected: expected.into(),
            received: received.into(),
        }
    }

    /// Returns true for errors raised while moving bytes: HTTP failures,
    /// malformed frames and LOB length mismatches.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Codec(_) => true,
            Self::Protocol(e) => e.is_lob_error(),
            _ => false,
        }
    }

    /// Server error code, if the server reported one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::ServerReported { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(SyncError::transport("HTTP status 500").is_transport());
        assert!(SyncError::Codec(CodecError::HeaderLength { length: 120 }).is_transport());
        assert!(SyncError::Protocol(ProtocolError::LobOvershoot {
            expected: 1,
            received: 2
        })
        .is_transport());
        assert!(!SyncError::SessionActive.is_transport());
        assert!(!SyncError::unexpected("SYNC_RESPONSE", "ROW").is_transport());
    }

    #[test]
    fn server_code() {
        let err = SyncError::ServerReported {
            code: 2025,
            message: "wrong server".into(),
        };
        assert_eq!(err.code(), Some(2025));
        assert!(err.to_string().contains("2025"));
        assert_eq!(SyncError::PolicyViolation("x".into()).code(), None);
    }
}
