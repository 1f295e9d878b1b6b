//! Outpost CLI
//!
//! Command-line sync agent for Outpost devices.
//!
//! # Commands
//!
//! - `sync` - Run one sync session against the configured server
//! - `status` - Display client identity, schemas, tables and folders
//! - `pending` - Display local changes waiting for check-in

mod commands;

use clap::{Parser, Subcommand};
use outpost_sync_protocol::SyncDirection;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Outpost device sync agent.
#[derive(Parser)]
#[command(name = "outpost")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON agent configuration
    #[arg(global = true, short, long, default_value = "outpost.json")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync session
    Sync {
        /// Direction: two-way, check-in-only or refresh-only
        #[arg(short, long, default_value = "two-way")]
        direction: SyncDirection,

        /// Restrict the session to this schema (repeatable)
        #[arg(short, long = "schema")]
        schemas: Vec<String>,

        /// Restrict the session to this folder (repeatable)
        #[arg(short, long = "folder")]
        folders: Vec<String>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Display schemas, tables, folders and cursors
    Status {
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Display local changes waiting for check-in
    Pending {
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over the default level
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Sync {
            direction,
            schemas,
            folders,
            format,
        } => commands::sync::run(&cli.config, direction, schemas, folders, &format)?,
        Commands::Status { format } => commands::status::run(&cli.config, &format)?,
        Commands::Pending { format } => commands::pending::run(&cli.config, &format)?,
    }

    Ok(())
}
