//! The untyped command carried by a single frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the transport continuation command.
pub const MORE: &str = "MORE";

/// A protocol command as it travels on the wire: a name and an optional
/// JSON value.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommand {
    /// Command name, e.g. `SYNC_REQUEST`.
    pub name: String,
    /// Optional structured payload.
    pub value: Option<Value>,
}

impl RawCommand {
    /// Creates a command without a value.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Creates a command carrying a value.
    pub fn with_value(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }

    /// The continuation marker.
    pub fn more() -> Self {
        Self::bare(MORE)
    }

    /// Returns true for the continuation marker.
    pub fn is_more(&self) -> bool {
        self.name == MORE
    }
}

/// Frame header: the command name plus the byte length of the value JSON.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FrameHeader<'a> {
    #[serde(borrow)]
    pub name: std::borrow::Cow<'a, str>,
    #[serde(rename = "valueLength", default)]
    pub value_length: usize,
}
