//! Session states and the observer they are reported to.

use crate::summary::SyncSummary;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    /// No session has run yet.
    #[default]
    Ready,
    /// Building the outbound request.
    Composing,
    /// Posting staged messages to the server.
    Sending,
    /// Waiting for and decoding the server response.
    Receiving,
    /// Applying the server response locally.
    Processing,
    /// The session committed.
    Succeeded,
    /// The session rolled back.
    Failed,
}

impl SyncState {
    /// Fraction of the session completed when this state is entered.
    pub fn progress(self) -> f64 {
        match self {
            Self::Ready | Self::Composing => 0.0,
            Self::Sending => 0.25,
            Self::Receiving => 0.5,
            Self::Processing => 0.75,
            Self::Succeeded | Self::Failed => 1.0,
        }
    }

    /// Returns true while a session is running.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Composing | Self::Sending | Self::Receiving | Self::Processing
        )
    }

    /// Wire-style name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Composing => "COMPOSING",
            Self::Sending => "SENDING",
            Self::Receiving => "RECEIVING",
            Self::Processing => "PROCESSING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one direction of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// The direction did not run.
    #[default]
    NotAvailable,
    /// The direction is running.
    InProgress,
    /// The direction completed.
    Success,
    /// The direction failed.
    Failure,
}

impl SyncStatus {
    /// Parses a server status; unknown values map to `NotAvailable`.
    pub fn from_server(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("SUCCESS") => Self::Success,
            Some(s) if s.eq_ignore_ascii_case("FAILURE") => Self::Failure,
            Some(s) if s.eq_ignore_ascii_case("IN_PROGRESS") => Self::InProgress,
            _ => Self::NotAvailable,
        }
    }
}

/// Receives session state changes.
pub trait SyncObserver: Send + Sync {
    /// Called on every state change with the summary so far.
    fn on_state_change(&self, state: SyncState, progress: f64, summary: &SyncSummary);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_monotonic_through_a_session() {
        let states = [
            SyncState::Composing,
            SyncState::Sending,
            SyncState::Receiving,
            SyncState::Processing,
            SyncState::Succeeded,
        ];
        let progress: Vec<_> = states.iter().map(|s| s.progress()).collect();
        assert_eq!(progress, [0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!(SyncState::Sending.is_active());
        assert!(!SyncState::Failed.is_active());
        assert_eq!(SyncState::Processing.to_string(), "PROCESSING");
    }

    #[test]
    fn server_status() {
        assert_eq!(SyncStatus::from_server(Some("SUCCESS")), SyncStatus::Success);
        assert_eq!(SyncStatus::from_server(Some("failure")), SyncStatus::Failure);
        assert_eq!(SyncStatus::from_server(Some("??")), SyncStatus::NotAvailable);
        assert_eq!(SyncStatus::from_server(None), SyncStatus::NotAvailable);
    }
}
