//! Error types for the protocol crate.

use outpost_codec::CodecError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while mapping frames to typed commands.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame-level failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The command name is not part of the protocol.
    #[error("unknown command {name}")]
    UnknownCommand {
        /// Name as received.
        name: String,
    },

    /// A command that needs a value arrived without one.
    #[error("command {name} requires a value")]
    MissingValue {
        /// Command name.
        name: String,
    },

    /// The value does not have the shape the command expects.
    #[error("invalid value for {name}: {message}")]
    InvalidValue {
        /// Command name.
        name: String,
        /// Description of the mismatch.
        message: String,
    },

    /// A binary LOB chunk is not valid hex.
    #[error("invalid hex in binary LOB: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// LOB chunks add up to more than the announced total.
    #[error("LOB length mismatch: expected {expected}, received {received}")]
    LobOvershoot {
        /// Announced total length.
        expected: u64,
        /// Length accumulated so far.
        received: u64,
    },

    /// The LOB stream ended before the announced total arrived.
    #[error("LOB stream ended short: expected {expected}, received {received}")]
    LobTruncated {
        /// Announced total length.
        expected: u64,
        /// Length accumulated before the stream ended.
        received: u64,
    },
}

impl ProtocolError {
    /// Create an invalid value error.
    pub fn invalid_value(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns true for LOB framing errors.
    pub fn is_lob_error(&self) -> bool {
        matches!(
            self,
            Self::LobOvershoot { .. } | Self::LobTruncated { .. } | Self::InvalidHex(_)
        )
    }
}
