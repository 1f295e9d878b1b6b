//! Pending command implementation.

use super::open_agent;
use outpost_sync_engine::PendingChanges;
use std::path::Path;

/// Runs the pending command.
pub fn run(config_path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let agent = open_agent(config_path)?;
    let pending = agent.pending()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&pending)?),
        _ => print!("{}", render_text(&pending)),
    }
    Ok(())
}

fn render_text(pending: &PendingChanges) -> String {
    if pending.is_empty() {
        return "Nothing to check in.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!(
        "{:<40} {:>8} {:>8} {:>8}\n",
        "TABLE / FOLDER", "INSERTS", "UPDATES", "DELETES"
    ));
    for table in &pending.tables {
        let name = format!("{}.{}", table.schema, table.table);
        let c = &table.changes;
        out.push_str(&format!(
            "{:<40} {:>8} {:>8} {:>8}\n",
            name, c.inserts, c.updates, c.deletes
        ));
    }
    for folder in &pending.folders {
        let name = format!("{}/", folder.folder);
        let c = &folder.changes;
        out.push_str(&format!(
            "{:<40} {:>8} {:>8} {:>8}\n",
            name, c.inserts, c.updates, c.deletes
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_sync_engine::{OpCounts, PendingFolder, PendingTable};

    #[test]
    fn empty_pending() {
        assert_eq!(render_text(&PendingChanges::default()), "Nothing to check in.\n");
    }

    #[test]
    fn pending_rows_per_table_and_folder() {
        let pending = PendingChanges {
            tables: vec![PendingTable {
                schema: "tracker".into(),
                table: "projects".into(),
                changes: OpCounts {
                    inserts: 2,
                    updates: 1,
                    deletes: 0,
                },
            }],
            folders: vec![PendingFolder {
                folder: "docs".into(),
                changes: OpCounts {
                    inserts: 1,
                    ..OpCounts::default()
                },
            }],
        };
        let text = render_text(&pending);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("tracker.projects"));
        assert!(lines[1].ends_with("       2        1        0"));
        assert!(lines[2].starts_with("docs/"));
    }
}
