//! Sync command implementation.

use super::open_agent;
use outpost_sync_engine::{SyncScope, SyncSummary};
use outpost_sync_protocol::SyncDirection;
use std::path::Path;
use tracing::info;

/// Runs the sync command.
///
/// Prints the summary whether or not the session committed, then fails
/// with the session error so the process exits non-zero.
pub fn run(
    config_path: &Path,
    direction: SyncDirection,
    schemas: Vec<String>,
    folders: Vec<String>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent = open_agent(config_path)?;
    let scope = SyncScope::new(direction)
        .with_schemas(schemas)
        .with_folders(folders);
    info!(server = %agent.config().server_url, %direction, "starting sync");

    let report = agent.sync(&scope);
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report.summary)?),
        _ => print_text_output(&report.summary),
    }
    match report.error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn print_text_output(summary: &SyncSummary) {
    println!("Sync session {}", summary.session_id.as_deref().unwrap_or("-"));
    println!("==============");
    println!("State:            {}", summary.state);
    println!("Direction:        {}", summary.sync_direction);
    println!("Duration:         {} ms", summary.duration_ms.unwrap_or_default());
    println!(
        "Checked in:       {} inserts, {} updates, {} deletes ({:?})",
        summary.check_in_requested.inserts,
        summary.check_in_requested.updates,
        summary.check_in_requested.deletes,
        summary.check_in_status
    );
    println!(
        "Refreshed:        {} inserts, {} updates, {} deletes ({:?})",
        summary.refresh_done.inserts,
        summary.refresh_done.updates,
        summary.refresh_done.deletes,
        summary.refresh_status
    );
    if summary.has_def_changes {
        println!("Definitions changed during this session.");
    }
    if !summary.refresh_schema_names.is_empty() {
        println!("Refreshed schemas: {}", summary.refresh_schema_names.join(", "));
    }
    if !summary.refresh_folder_names.is_empty() {
        println!("Refreshed folders: {}", summary.refresh_folder_names.join(", "));
    }
    if !summary.error_messages.is_empty() {
        println!();
        println!("Errors (code {}):", summary.error_code);
        for line in summary.error_messages.lines() {
            println!("  {line}");
        }
    }
}
