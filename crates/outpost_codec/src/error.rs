//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while framing or unframing commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The serialized header does not fit the two-digit length prefix.
    #[error("command header length {length} is outside 1..=99")]
    HeaderLength {
        /// Length of the serialized header in bytes.
        length: usize,
    },

    /// The two-digit length prefix is not a decimal number.
    #[error("invalid length prefix {prefix:?} at offset {offset}")]
    InvalidLengthPrefix {
        /// The raw prefix text.
        prefix: String,
        /// Offset of the prefix in the buffer.
        offset: usize,
    },

    /// The buffer ended before the frame was complete.
    #[error("unexpected end of frame at offset {offset}: needed {needed} units, {available} available")]
    UnexpectedEof {
        /// Byte offset where reading started.
        offset: usize,
        /// UTF-16 code units required.
        needed: usize,
        /// UTF-16 code units left in the buffer.
        available: usize,
    },

    /// A length ends between the two halves of a surrogate pair.
    #[error("frame length splits a character at offset {offset}")]
    SplitCharacter {
        /// Byte offset of the split character.
        offset: usize,
    },

    /// The header JSON could not be parsed.
    #[error("malformed command header: {message}")]
    MalformedHeader {
        /// Parser message.
        message: String,
    },

    /// The value JSON could not be parsed.
    #[error("malformed value for command {name}: {message}")]
    MalformedValue {
        /// Name of the command the value belongs to.
        name: String,
        /// Parser message.
        message: String,
    },

    /// The value could not be serialized.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Serializer message.
        message: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a malformed header error.
    pub fn malformed_header(message: impl Into<String>) -> Self {
        Self::MalformedHeader {
            message: message.into(),
        }
    }
}
