//! Configuration for the sync agent.

use crate::error::{SyncError, SyncResult};
use outpost_codec::MORE_FRAME;
use outpost_sync_protocol::CLIENT_VERSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest accepted message size; anything lower cannot carry a `SYNC_REQUEST`.
pub const MIN_MESSAGE_SIZE: usize = 1024;

/// Configuration for sync sessions.
///
/// Every component receives what it needs from this value; nothing reads
/// ambient globals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Sync server endpoint.
    pub server_url: String,
    /// Sync user name.
    pub user: String,
    /// Sync user password.
    pub password: String,
    /// Device name reported to the server.
    pub device_name: String,
    /// Agent version reported to the server.
    pub client_version: String,
    /// Upper bound for one outbound message body, in bytes.
    pub max_message_size: usize,
    /// LOB chunk size, in characters.
    pub lob_buffer_size: usize,
    /// Directory holding one SQLite file per store handle.
    pub data_dir: PathBuf,
    /// Root directory of synchronized folders.
    pub files_dir: PathBuf,
    /// Store handle name of the administrative catalog.
    pub admin_db_name: String,
    /// Trailing marker announcing that the server has more data.
    pub more_sentinel: String,
    /// HTTP request timeout.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Run one more pass after a pass that applied definition changes.
    pub resync_on_def_change: bool,
}

impl SyncConfig {
    /// Creates a configuration for a server and user.
    pub fn new(server_url: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            user: user.into(),
            ..Self::default()
        }
    }

    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| SyncError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Checks the values a session cannot run without.
    pub fn validate(&self) -> SyncResult<()> {
        if self.server_url.trim().is_empty() {
            return Err(SyncError::Config("serverUrl is empty".into()));
        }
        if self.user.trim().is_empty() {
            return Err(SyncError::Config("user is empty".into()));
        }
        if self.max_message_size < MIN_MESSAGE_SIZE {
            return Err(SyncError::Config(format!(
                "maxMessageSize {} is below {MIN_MESSAGE_SIZE}",
                self.max_message_size
            )));
        }
        if self.lob_buffer_size == 0 {
            return Err(SyncError::Config("lobBufferSize must be positive".into()));
        }
        if self.more_sentinel.is_empty() {
            return Err(SyncError::Config("moreSentinel is empty".into()));
        }
        Ok(())
    }

    /// Sets the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Sets the device name.
    pub fn with_device_name(mut self, device: impl Into<String>) -> Self {
        self.device_name = device.into();
        self
    }

    /// Sets the maximum message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets the LOB chunk size.
    pub fn with_lob_buffer_size(mut self, size: usize) -> Self {
        self.lob_buffer_size = size;
        self
    }

    /// Sets the store directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Sets the synchronized folder root.
    pub fn with_files_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.files_dir = dir.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enables or disables the extra pass after definition changes.
    pub fn with_resync_on_def_change(mut self, enabled: bool) -> Self {
        self.resync_on_def_change = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080/pervasync/server".into(),
            user: String::new(),
            password: String::new(),
            device_name: "DEFAULT".into(),
            client_version: CLIENT_VERSION.into(),
            max_message_size: 2_000_000,
            lob_buffer_size: 400_000,
            data_dir: PathBuf::from("./outpost-data"),
            files_dir: PathBuf::from("./outpost-files"),
            admin_db_name: "outpost_admin".into(),
            more_sentinel: MORE_FRAME.into(),
            request_timeout: Duration::from_secs(120),
            resync_on_def_change: true,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.max_message_size, 2_000_000);
        assert_eq!(config.lob_buffer_size, 400_000);
        assert_eq!(config.device_name, "DEFAULT");
        assert_eq!(config.client_version, "9.0.0");
        assert_eq!(config.more_sentinel, r#"31{"name":"MORE","valueLength":0}"#);
        assert!(config.resync_on_def_change);
    }

    #[test]
    fn builder() {
        let config = SyncConfig::new("http://sync.local/server", "alice")
            .with_password("secret")
            .with_device_name("tablet-7")
            .with_max_message_size(4096)
            .with_lob_buffer_size(64)
            .with_request_timeout(Duration::from_secs(5));

        assert_eq!(config.user, "alice");
        assert_eq!(config.device_name, "tablet-7");
        assert_eq!(config.max_message_size, 4096);
        assert_eq!(config.lob_buffer_size, 64);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation() {
        assert!(SyncConfig::default().validate().is_err());
        let base = SyncConfig::new("http://x", "bob");
        assert!(base.clone().with_max_message_size(100).validate().is_err());
        assert!(base.clone().with_lob_buffer_size(0).validate().is_err());
        assert!(SyncConfig::new("  ", "bob").validate().is_err());
        assert!(base.validate().is_ok());
    }

    #[test]
    fn load_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outpost.json");
        std::fs::write(
            &path,
            r#"{"serverUrl":"http://srv/sync","user":"carol","maxMessageSize":8192,"requestTimeout":9}"#,
        )
        .unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.server_url, "http://srv/sync");
        assert_eq!(config.user, "carol");
        assert_eq!(config.max_message_size, 8192);
        assert_eq!(config.request_timeout, Duration::from_secs(9));
        assert_eq!(config.lob_buffer_size, 400_000);
    }

    #[test]
    fn load_missing_file() {
        let err = SyncConfig::load("/nonexistent/outpost.json").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
