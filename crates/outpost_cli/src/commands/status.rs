//! Status command implementation.

use super::open_agent;
use outpost_sync_engine::ClientStatus;
use std::path::Path;

/// Runs the status command.
pub fn run(config_path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let agent = open_agent(config_path)?;
    let status = agent.status()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&status)?),
        _ => print_text_output(&status),
    }
    Ok(())
}

fn print_text_output(status: &ClientStatus) {
    println!("Outpost Client Status");
    println!("=====================");
    println!("Client ID:      {}", status.client_id);
    println!("Server ID:      {}", status.server_id);
    println!(
        "Device:         {}",
        status.device_name.as_deref().unwrap_or("-")
    );
    println!("Transaction ID: {}", status.transaction_id);

    if status.server_id < 0 {
        println!();
        println!("Not provisioned yet; run `outpost sync` first.");
        return;
    }

    println!();
    println!("Schemas ({}):", status.schemas.len());
    for schema in &status.schemas {
        println!(
            "  {} [store {}] def {} sub {} data {}",
            schema.name, schema.store, schema.def_cn, schema.sub_cn, schema.data_cn
        );
        for table in &schema.tables {
            let mut modes = Vec::new();
            if table.allow_check_in {
                modes.push("check-in");
            }
            if table.allow_refresh {
                modes.push("refresh");
            }
            println!("    {:>3}  {:<30} {}", table.rank, table.name, modes.join(", "));
        }
    }

    println!();
    println!("Folders ({}):", status.folders.len());
    for folder in &status.folders {
        println!(
            "  {} -> {}{} file {}",
            folder.name,
            folder.path.display(),
            if folder.recursive { " (recursive)" } else { "" },
            folder.file_cn
        );
    }
}
