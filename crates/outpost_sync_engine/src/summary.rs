//! Per-session result summary.

use crate::error::{SyncError, SyncResult};
use crate::state::{SyncState, SyncStatus};
use chrono::{DateTime, Utc};
use outpost_sync_protocol::{DmlOp, ServerSyncSummary, SyncDirection, CHECK_IN_SKIPPED};
use serde::{Deserialize, Serialize};

/// Row or file counts per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpCounts {
    /// Deletes.
    pub deletes: u64,
    /// Inserts.
    pub inserts: u64,
    /// Updates.
    pub updates: u64,
}

impl OpCounts {
    /// Builds counts from the server's `[deletes, inserts, updates]` triple.
    pub fn from_diu(diu: [u64; 3]) -> Self {
        Self {
            deletes: diu[0],
            inserts: diu[1],
            updates: diu[2],
        }
    }

    /// Adds `n` to the counter of `op`.
    pub fn add(&mut self, op: DmlOp, n: u64) {
        match op {
            DmlOp::Delete => self.deletes += n,
            DmlOp::Insert => self.inserts += n,
            DmlOp::Update => self.updates += n,
        }
    }

    /// Adds every counter of `other`.
    pub fn merge(&mut self, other: OpCounts) {
        self.deletes += other.deletes;
        self.inserts += other.inserts;
        self.updates += other.updates;
    }

    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.deletes + self.inserts + self.updates
    }
}

/// What a session did. Always produced, whether the session committed or
/// rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// Transport session id.
    pub session_id: Option<String>,
    /// Sync user.
    pub user: String,
    /// Device name.
    pub device: String,
    /// Session direction.
    pub sync_direction: SyncDirection,
    /// Schemas in scope.
    pub sync_schema_names: Vec<String>,
    /// Folders in scope.
    pub sync_folder_names: Vec<String>,
    /// Session start.
    pub begin_time: DateTime<Utc>,
    /// Start of the upload of the first pass.
    pub upload_begin_time: Option<DateTime<Utc>>,
    /// Start of the download of the last pass.
    pub download_begin_time: Option<DateTime<Utc>>,
    /// Session end.
    pub end_time: Option<DateTime<Utc>>,
    /// Session duration in milliseconds.
    pub duration_ms: Option<i64>,
    /// Local changes sent.
    pub check_in_requested: OpCounts,
    /// Local changes the server applied.
    pub check_in_done: OpCounts,
    /// Server changes received.
    pub refresh_requested: OpCounts,
    /// Server changes applied locally.
    pub refresh_done: OpCounts,
    /// Check-in outcome.
    pub check_in_status: SyncStatus,
    /// Refresh outcome.
    pub refresh_status: SyncStatus,
    /// Schemas the server accepted a check-in for.
    pub check_in_schema_names: Vec<String>,
    /// Folders the server accepted a check-in for.
    pub check_in_folder_names: Vec<String>,
    /// Schemas refreshed.
    pub refresh_schema_names: Vec<String>,
    /// Folders refreshed.
    pub refresh_folder_names: Vec<String>,
    /// A pass applied schema or folder definition changes.
    pub has_def_changes: bool,
    /// Rows or files were applied locally.
    pub has_data_changes: bool,
    /// Age of the server snapshot, `-1` if unknown.
    pub server_snapshot_age: i64,
    /// Server error code, `-1` if none.
    pub error_code: i64,
    /// Error messages, newline separated.
    pub error_messages: String,
    /// Server stack traces, newline separated.
    pub error_stacktraces: String,
    /// Final session state.
    pub state: SyncState,
}

impl SyncSummary {
    /// Fresh summary for a pass starting now.
    pub fn new(user: &str, device: &str, direction: SyncDirection) -> Self {
        Self {
            session_id: None,
            user: user.to_string(),
            device: device.to_string(),
            sync_direction: direction,
            sync_schema_names: Vec::new(),
            sync_folder_names: Vec::new(),
            begin_time: Utc::now(),
            upload_begin_time: None,
            download_begin_time: None,
            end_time: None,
            duration_ms: None,
            check_in_requested: OpCounts::default(),
            check_in_done: OpCounts::default(),
            refresh_requested: OpCounts::default(),
            refresh_done: OpCounts::default(),
            check_in_status: SyncStatus::NotAvailable,
            refresh_status: SyncStatus::NotAvailable,
            check_in_schema_names: Vec::new(),
            check_in_folder_names: Vec::new(),
            refresh_schema_names: Vec::new(),
            refresh_folder_names: Vec::new(),
            has_def_changes: false,
            has_data_changes: false,
            server_snapshot_age: -1,
            error_code: -1,
            error_messages: String::new(),
            error_stacktraces: String::new(),
            state: SyncState::Ready,
        }
    }

    /// Returns true if the session committed.
    pub fn succeeded(&self) -> bool {
        self.state == SyncState::Succeeded
    }

    /// Appends an error message.
    pub fn push_error(&mut self, message: &str) {
        append_line(&mut self.error_messages, message);
    }

    /// Stamps the end time and duration.
    pub fn finish(&mut self, state: SyncState) {
        let end = Utc::now();
        self.duration_ms = Some((end - self.begin_time).num_milliseconds());
        self.end_time = Some(end);
        self.state = state;
    }

    /// Folds the check-in of an earlier pass of the same session into this
    /// one: counters add up and accepted names are unioned.
    pub(crate) fn carry_check_in(&mut self, earlier: &SyncSummary) {
        self.check_in_requested.merge(earlier.check_in_requested);
        self.check_in_done.merge(earlier.check_in_done);
        union_into(&mut self.check_in_schema_names, &earlier.check_in_schema_names);
        union_into(&mut self.check_in_folder_names, &earlier.check_in_folder_names);
        if earlier.upload_begin_time.is_some() {
            self.upload_begin_time = earlier.upload_begin_time;
        }
    }

    /// Merges a server `SYNC_SUMMARY`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ServerReported`] when the server reports an
    /// error code other than [`CHECK_IN_SKIPPED`]; the code, messages and
    /// stack traces are recorded first.
    pub fn merge_server(&mut self, server: ServerSyncSummary) -> SyncResult<()> {
        if self.check_in_status != SyncStatus::Failure {
            self.check_in_status = SyncStatus::from_server(server.check_in_status.as_deref());
        }
        if SyncStatus::from_server(server.refresh_status.as_deref()) == SyncStatus::Failure {
            self.refresh_status = SyncStatus::Failure;
        }
        self.check_in_schema_names = server.check_in_schema_names;
        self.check_in_folder_names = server.check_in_folder_names;
        if let Some(diu) = server.check_in_diu_done {
            self.check_in_done = OpCounts::from_diu(diu);
        }
        self.server_snapshot_age = server.server_snapshot_age;

        if server.error_code > 0 && server.error_code != CHECK_IN_SKIPPED {
            let message = server.sync_error_messages.unwrap_or_default();
            self.error_code = server.error_code;
            self.push_error(&message);
            if let Some(trace) = server.sync_error_stacktraces {
                append_line(&mut self.error_stacktraces, &trace);
            }
            return Err(SyncError::ServerReported {
                code: server.error_code,
                message,
            });
        }
        Ok(())
    }
}

fn union_into(target: &mut Vec<String>, earlier: &[String]) {
    let mut merged: Vec<String> = earlier.to_vec();
    for name in target.drain(..) {
        if !merged.contains(&name) {
            merged.push(name);
        }
    }
    *target = merged;
}

fn append_line(target: &mut String, line: &str) {
    if line.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(line);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> SyncSummary {
        SyncSummary::new("ann", "pad", SyncDirection::TwoWay)
    }

    #[test]
    fn merge_takes_server_progress() {
        let mut s = summary();
        s.merge_server(ServerSyncSummary {
            check_in_status: Some("SUCCESS".into()),
            refresh_status: Some("SUCCESS".into()),
            check_in_schema_names: vec!["crm".into()],
            check_in_diu_done: Some([1, 2, 3]),
            server_snapshot_age: 12,
            ..ServerSyncSummary::default()
        })
        .unwrap();

        assert_eq!(s.check_in_status, SyncStatus::Success);
        assert_eq!(s.refresh_status, SyncStatus::NotAvailable);
        assert_eq!(s.check_in_done, OpCounts::from_diu([1, 2, 3]));
        assert_eq!(s.check_in_done.total(), 6);
        assert_eq!(s.check_in_schema_names, ["crm"]);
        assert_eq!(s.server_snapshot_age, 12);
    }

    #[test]
    fn local_failure_is_sticky() {
        let mut s = summary();
        s.check_in_status = SyncStatus::Failure;
        s.merge_server(ServerSyncSummary {
            check_in_status: Some("SUCCESS".into()),
            refresh_status: Some("FAILURE".into()),
            ..ServerSyncSummary::default()
        })
        .unwrap();
        assert_eq!(s.check_in_status, SyncStatus::Failure);
        assert_eq!(s.refresh_status, SyncStatus::Failure);
    }

    #[test]
    fn skipped_check_in_is_benign() {
        let mut s = summary();
        s.merge_server(ServerSyncSummary {
            error_code: CHECK_IN_SKIPPED,
            sync_error_messages: Some("skipped".into()),
            ..ServerSyncSummary::default()
        })
        .unwrap();
        assert_eq!(s.error_code, -1);
        assert!(s.error_messages.is_empty());
    }

    #[test]
    fn server_error_is_recorded_and_fatal() {
        let mut s = summary();
        s.push_error("local note");
        let err = s
            .merge_server(ServerSyncSummary {
                error_code: 2025,
                sync_error_messages: Some("wrong server".into()),
                sync_error_stacktraces: Some("at server".into()),
                ..ServerSyncSummary::default()
            })
            .unwrap_err();
        assert_eq!(err.code(), Some(2025));
        assert_eq!(s.error_code, 2025);
        assert_eq!(s.error_messages, "local note\nwrong server");
        assert_eq!(s.error_stacktraces, "at server");
    }

    #[test]
    fn later_pass_keeps_earlier_check_in() {
        let mut first = summary();
        first.check_in_requested = OpCounts::from_diu([0, 2, 1]);
        first.check_in_done = OpCounts::from_diu([0, 2, 1]);
        first.check_in_schema_names = vec!["crm".into()];
        first.check_in_folder_names = vec!["docs".into()];
        first.upload_begin_time = Some(first.begin_time);

        let mut second = summary();
        second.check_in_requested.add(DmlOp::Delete, 1);
        second.check_in_done.add(DmlOp::Delete, 1);
        second.check_in_schema_names = vec!["crm".into(), "hr".into()];
        second.upload_begin_time = Some(Utc::now());

        second.carry_check_in(&first);
        assert_eq!(second.check_in_requested, OpCounts::from_diu([1, 2, 1]));
        assert_eq!(second.check_in_done.total(), 4);
        assert_eq!(second.check_in_schema_names, ["crm", "hr"]);
        assert_eq!(second.check_in_folder_names, ["docs"]);
        assert_eq!(second.upload_begin_time, first.upload_begin_time);
    }

    #[test]
    fn finish_records_duration() {
        let mut s = summary();
        s.finish(SyncState::Succeeded);
        assert!(s.succeeded());
        assert!(s.duration_ms.unwrap() >= 0);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["state"], "SUCCEEDED");
        assert_eq!(json["checkInStatus"], "NOT_AVAILABLE");
        assert_eq!(json["refreshDone"]["inserts"], 0);
    }
}
