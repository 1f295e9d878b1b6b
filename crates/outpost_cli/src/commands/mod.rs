//! CLI command implementations.

pub mod pending;
pub mod status;
pub mod sync;

use outpost_sync_engine::{SyncAgent, SyncConfig};
use std::path::Path;

/// Loads the configuration and builds an HTTP agent from it.
pub fn open_agent(config_path: &Path) -> Result<SyncAgent, Box<dyn std::error::Error>> {
    let config = SyncConfig::load(config_path)?;
    Ok(SyncAgent::connect(config)?)
}
