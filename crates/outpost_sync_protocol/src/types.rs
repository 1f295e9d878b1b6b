//! Small enumerations shared by commands and local metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which halves of a session run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncDirection {
    /// Only apply server changes.
    RefreshOnly,
    /// Only upload local changes.
    CheckInOnly,
    /// Upload, then apply server changes.
    #[default]
    TwoWay,
}

impl SyncDirection {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RefreshOnly => "REFRESH_ONLY",
            Self::CheckInOnly => "CHECK_IN_ONLY",
            Self::TwoWay => "TWO_WAY",
        }
    }

    /// Returns true when local changes are uploaded.
    pub fn checks_in(self) -> bool {
        self != Self::RefreshOnly
    }

    /// Returns true when server changes may be applied.
    pub fn refreshes(self) -> bool {
        self != Self::CheckInOnly
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "REFRESH_ONLY" => Ok(Self::RefreshOnly),
            "CHECK_IN_ONLY" => Ok(Self::CheckInOnly),
            "TWO_WAY" => Ok(Self::TwoWay),
            other => Err(format!("unknown sync direction {other}")),
        }
    }
}

/// Change state of a definition or file record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum ChangeType {
    /// In sync with the server.
    #[default]
    #[serde(rename = "S")]
    Synced,
    /// Created.
    #[serde(rename = "I")]
    Insert,
    /// Modified.
    #[serde(rename = "U")]
    Update,
    /// Removed.
    #[serde(rename = "D")]
    Delete,
}

impl ChangeType {
    /// Single-letter code used on the wire and in local metadata.
    pub fn code(self) -> &'static str {
        match self {
            Self::Synced => "S",
            Self::Insert => "I",
            Self::Update => "U",
            Self::Delete => "D",
        }
    }

    /// Parses a single-letter code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "S" => Some(Self::Synced),
            "I" => Some(Self::Insert),
            "U" => Some(Self::Update),
            "D" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Row-level operation inside a data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmlOp {
    /// `INSERT` group.
    Insert,
    /// `UPDATE` group.
    Update,
    /// `DELETE` group.
    Delete,
}

impl DmlOp {
    /// Name of the command opening a group.
    pub fn command_name(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Name of the command closing a group.
    pub fn end_command_name(self) -> &'static str {
        match self {
            Self::Insert => "END_INSERT",
            Self::Update => "END_UPDATE",
            Self::Delete => "END_DELETE",
        }
    }

    /// Journal code for the operation.
    pub fn code(self) -> &'static str {
        match self {
            Self::Insert => "I",
            Self::Update => "U",
            Self::Delete => "D",
        }
    }

    /// Parses a journal code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I" => Some(Self::Insert),
            "U" => Some(Self::Update),
            "D" => Some(Self::Delete),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_loosely() {
        assert_eq!("two-way".parse::<SyncDirection>().unwrap(), SyncDirection::TwoWay);
        assert_eq!(
            "REFRESH_ONLY".parse::<SyncDirection>().unwrap(),
            SyncDirection::RefreshOnly
        );
        assert!("sideways".parse::<SyncDirection>().is_err());
    }

    #[test]
    fn change_type_serializes_as_letter() {
        assert_eq!(serde_json::to_string(&ChangeType::Delete).unwrap(), "\"D\"");
        let parsed: ChangeType = serde_json::from_str("\"U\"").unwrap();
        assert_eq!(parsed, ChangeType::Update);
    }
}
