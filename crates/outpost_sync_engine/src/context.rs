//! Per-session scope and the state shared by the check-in and refresh
//! passes.

use crate::catalog::{Catalog, ClientProperties, FolderState, SchemaState};
use crate::config::SyncConfig;
use crate::dialect::ColumnMapper;
use crate::error::SyncResult;
use crate::files::folder_root;
use crate::stores::SessionStores;
use crate::summary::SyncSummary;
use outpost_storage::{FileSystem, SqlStore};
use outpost_sync_protocol::SyncDirection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// What one session synchronizes.
///
/// Empty name lists select every schema or folder known to the client
/// when the session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncScope {
    /// Direction of the session.
    pub direction: SyncDirection,
    /// Selected schema names.
    pub schemas: Vec<String>,
    /// Selected folder names.
    pub folders: Vec<String>,
}

impl SyncScope {
    /// Every schema and folder in `direction`.
    pub fn new(direction: SyncDirection) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    /// Restricts the session to the named schemas.
    pub fn with_schemas<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas = names.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts the session to the named folders.
    pub fn with_folders<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.folders = names.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces empty selections with every known name.
    pub(crate) fn resolve(&self, schemas: &[SchemaState], folders: &[FolderState]) -> Self {
        let mut resolved = self.clone();
        if resolved.schemas.is_empty() {
            resolved.schemas = schemas.iter().map(|s| s.def.name.clone()).collect();
        }
        if resolved.folders.is_empty() {
            resolved.folders = folders.iter().map(|f| f.def.name.clone()).collect();
        }
        resolved
    }

    /// Returns true if the schema is selected. Names compare case-insensitively.
    pub fn includes_schema(&self, name: &str) -> bool {
        self.schemas.iter().any(|s| s.eq_ignore_ascii_case(name))
    }

    /// Returns true if the folder is selected. Names compare case-insensitively.
    pub fn includes_folder(&self, name: &str) -> bool {
        self.folders.iter().any(|f| f.eq_ignore_ascii_case(name))
    }
}

/// Returns true if `user` may check in to an object with these settings.
pub(crate) fn may_check_in(allow_check_in: bool, super_users: &[String], user: &str) -> bool {
    allow_check_in || super_users.iter().any(|u| u.eq_ignore_ascii_case(user))
}

/// Everything one pass needs, owned by the session for its lifetime.
pub(crate) struct SessionContext<'s> {
    pub config: &'s SyncConfig,
    pub mapper: &'s dyn ColumnMapper,
    pub fs: &'s dyn FileSystem,
    pub stores: &'s SessionStores<'s>,
    pub admin: Arc<dyn SqlStore>,
    pub scope: SyncScope,
    pub props: ClientProperties,
    pub schemas: Vec<SchemaState>,
    pub folders: Vec<FolderState>,
    pub summary: SyncSummary,
}

impl<'s> SessionContext<'s> {
    /// Loads the client state for a new pass.
    pub fn load(
        config: &'s SyncConfig,
        mapper: &'s dyn ColumnMapper,
        fs: &'s dyn FileSystem,
        stores: &'s SessionStores<'s>,
        scope: &SyncScope,
    ) -> SyncResult<Self> {
        let admin = stores.get(&config.admin_db_name)?;
        let catalog = Catalog::new(admin.as_ref());
        catalog.provision()?;
        let props = catalog.client_properties()?;
        let schemas = catalog.load_schemas(mapper)?;
        let folders = catalog.load_folders()?;
        let scope = scope.resolve(&schemas, &folders);

        let device = props
            .device_name
            .clone()
            .unwrap_or_else(|| config.device_name.clone());
        let mut summary = SyncSummary::new(&config.user, &device, scope.direction);
        summary.sync_schema_names = scope.schemas.clone();
        summary.sync_folder_names = scope.folders.clone();

        Ok(Self {
            config,
            mapper,
            fs,
            stores,
            admin,
            scope,
            props,
            schemas,
            folders,
            summary,
        })
    }

    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(self.admin.as_ref())
    }

    /// Device name the server knows this client by.
    pub fn device_name(&self) -> &str {
        self.props
            .device_name
            .as_deref()
            .unwrap_or(&self.config.device_name)
    }

    pub fn folder_root(&self, folder: &FolderState) -> SyncResult<PathBuf> {
        folder_root(&self.config.files_dir, &folder.def)
    }

    /// Reloads schemas and folders after definition changes.
    pub fn reload_definitions(&mut self) -> SyncResult<()> {
        let catalog = Catalog::new(self.admin.as_ref());
        self.schemas = catalog.load_schemas(self.mapper)?;
        self.folders = catalog.load_folders()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_ignores_case() {
        let scope = SyncScope::new(SyncDirection::TwoWay)
            .with_schemas(["Sales"])
            .with_folders(["Docs"]);
        assert!(scope.includes_schema("SALES"));
        assert!(!scope.includes_schema("hr"));
        assert!(scope.includes_folder("docs"));
    }

    #[test]
    fn super_users_bypass_policy() {
        let supers = vec!["Admin".to_string()];
        assert!(may_check_in(true, &[], "ann"));
        assert!(may_check_in(false, &supers, "admin"));
        assert!(!may_check_in(false, &supers, "ann"));
    }
}
