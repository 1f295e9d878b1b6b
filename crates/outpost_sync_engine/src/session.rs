//! The session orchestrator.
//!
//! A session runs compose, send, receive and apply as one unit of work:
//! every store handle it touches keeps one transaction open until the end,
//! and the session either commits all of them or rolls all of them back.

use crate::catalog::{Catalog, FolderState, SchemaState};
use crate::checkin;
use crate::config::SyncConfig;
use crate::context::{SessionContext, SyncScope};
use crate::dialect::{ColumnMapper, DefaultColumnMapper};
use crate::error::{SyncError, SyncResult};
use crate::files::folder_root;
use crate::http::HttpClient;
use crate::journal::{provision_schema_store, ChangeJournal};
use crate::refresh;
use crate::state::{SyncObserver, SyncState, SyncStatus};
use crate::stores::{SessionStores, SqliteStoreProvider, StoreProvider};
use crate::summary::{OpCounts, SyncSummary};
use crate::transport::ChunkedTransport;
use crate::writer::SchemaHandle;
use chrono::Utc;
use outpost_storage::{FileSystem, LocalFileSystem, PayloadStage, SqlStore, SqlitePayloadStage};
use outpost_sync_protocol::{ChangeType, DmlOp};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// File name of the payload stage inside the data directory.
pub const STAGE_DB_NAME: &str = "outpost_stage.db";

/// Result of one [`SyncAgent::sync`] call.
///
/// The summary is always present; `error` holds the failure that rolled
/// the session back, if any.
#[derive(Debug)]
pub struct SyncReport {
    /// What the session did.
    pub summary: SyncSummary,
    /// Why the session failed.
    pub error: Option<SyncError>,
}

impl SyncReport {
    /// Returns true if the session committed.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Converts into a result, dropping the summary of a failed session.
    pub fn into_result(self) -> SyncResult<SyncSummary> {
        match self.error {
            None => Ok(self.summary),
            Some(e) => Err(e),
        }
    }
}

/// Catalog view reported by [`SyncAgent::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatus {
    /// Server-assigned client id.
    pub client_id: i64,
    /// Bound server id.
    pub server_id: i64,
    /// Device name the server knows.
    pub device_name: Option<String>,
    /// Transaction id of the next check-in.
    pub transaction_id: i64,
    /// State of the last session run by this agent.
    pub state: SyncState,
    /// Known schemas.
    pub schemas: Vec<SchemaStatus>,
    /// Known folders.
    pub folders: Vec<FolderStatus>,
}

/// One schema in a [`ClientStatus`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaStatus {
    /// Schema name.
    pub name: String,
    /// Store handle holding its tables.
    pub store: String,
    /// Definition change number.
    pub def_cn: i64,
    /// Subscription change number.
    pub sub_cn: i64,
    /// Data cursor.
    pub data_cn: i64,
    /// Tables, parents first.
    pub tables: Vec<TableStatus>,
}

/// One table in a [`SchemaStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatus {
    /// Table name.
    pub name: String,
    /// Dependency rank.
    pub rank: i64,
    /// Check-in allowed.
    pub allow_check_in: bool,
    /// Refresh allowed.
    pub allow_refresh: bool,
}

/// One folder in a [`ClientStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStatus {
    /// Folder name.
    pub name: String,
    /// Local directory.
    pub path: PathBuf,
    /// Subdirectories synchronized.
    pub recursive: bool,
    /// File cursor, `-1` before the first refresh.
    pub file_cn: i64,
}

/// Local changes waiting for the next check-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChanges {
    /// Tables with pending journal rows.
    pub tables: Vec<PendingTable>,
    /// Folders with pending file records.
    pub folders: Vec<PendingFolder>,
}

impl PendingChanges {
    /// Returns true if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.folders.is_empty()
    }
}

/// Pending journal rows of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTable {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Pending rows per operation.
    pub changes: OpCounts,
}

/// Pending file records of one folder, as of the last scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFolder {
    /// Folder name.
    pub folder: String,
    /// Pending files per operation.
    pub changes: OpCounts,
}

struct SessionGuard<'a>(&'a AtomicBool);

impl<'a> SessionGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The sync agent: runs sessions against one server for one user.
///
/// At most one session runs at a time; a concurrent [`SyncAgent::sync`]
/// call fails immediately with [`SyncError::SessionActive`].
pub struct SyncAgent {
    config: SyncConfig,
    stores: Box<dyn StoreProvider>,
    client: Box<dyn HttpClient>,
    fs: Box<dyn FileSystem>,
    mapper: Box<dyn ColumnMapper>,
    stage: Box<dyn PayloadStage>,
    observer: Option<Arc<dyn SyncObserver>>,
    active: AtomicBool,
    state: RwLock<SyncState>,
}

impl SyncAgent {
    /// Creates an agent with SQLite stores and stage under
    /// `config.data_dir` and the local filesystem.
    pub fn new(config: SyncConfig, client: impl HttpClient + 'static) -> SyncResult<Self> {
        config.validate()?;
        let stage = SqlitePayloadStage::open(config.data_dir.join(STAGE_DB_NAME))?;
        Ok(Self {
            stores: Box::new(SqliteStoreProvider::new(config.data_dir.clone())),
            client: Box::new(client),
            fs: Box::new(LocalFileSystem::new()),
            mapper: Box::new(DefaultColumnMapper::new()),
            stage: Box::new(stage),
            observer: None,
            active: AtomicBool::new(false),
            state: RwLock::new(SyncState::Ready),
            config,
        })
    }

    /// Creates an agent talking HTTP to `config.server_url`.
    #[cfg(feature = "http")]
    pub fn connect(config: SyncConfig) -> SyncResult<Self> {
        let client = crate::http::BlockingHttpClient::new(config.request_timeout)?;
        Self::new(config, client)
    }

    /// Replaces the store provider.
    pub fn with_store_provider(mut self, stores: impl StoreProvider + 'static) -> Self {
        self.stores = Box::new(stores);
        self
    }

    /// Replaces the filesystem.
    pub fn with_file_system(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Box::new(fs);
        self
    }

    /// Replaces the column mapper.
    pub fn with_column_mapper(mut self, mapper: impl ColumnMapper + 'static) -> Self {
        self.mapper = Box::new(mapper);
        self
    }

    /// Replaces the payload stage.
    pub fn with_payload_stage(mut self, stage: impl PayloadStage + 'static) -> Self {
        self.stage = Box::new(stage);
        self
    }

    /// Registers a state observer.
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The agent configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// State of the current or last session.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Returns true while a session runs.
    pub fn is_syncing(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: SyncState, summary: &SyncSummary) {
        *self.state.write() = state;
        if let Some(observer) = &self.observer {
            observer.on_state_change(state, state.progress(), summary);
        }
    }

    /// Runs one session.
    ///
    /// A pass that applied definition changes is followed by exactly one
    /// more pass when `resync_on_def_change` is set, inside the same store
    /// transactions.
    pub fn sync(&self, scope: &SyncScope) -> SyncReport {
        let mut summary = SyncSummary::new(&self.config.user, &self.config.device_name, scope.direction);
        summary.sync_schema_names = scope.schemas.clone();
        summary.sync_folder_names = scope.folders.clone();

        let Some(_guard) = SessionGuard::acquire(&self.active) else {
            let error = SyncError::SessionActive;
            summary.push_error(&error.to_string());
            summary.finish(SyncState::Failed);
            return SyncReport {
                summary,
                error: Some(error),
            };
        };

        info!(user = %self.config.user, direction = %scope.direction, "sync session started");
        let stores = SessionStores::new(self.stores.as_ref());
        let mut transport = ChunkedTransport::new(&self.config, self.client.as_ref(), self.stage.as_ref());

        let mut data_changed = false;
        let mut result = self.pass(&stores, scope, &mut transport, &mut summary);
        data_changed |= summary.refresh_done.total() > 0;
        if result.is_ok() && summary.has_def_changes && self.config.resync_on_def_change {
            info!("definitions changed, running one more pass");
            result = self.pass(&stores, scope, &mut transport, &mut summary);
            data_changed |= summary.refresh_done.total() > 0;
        }
        let result = result.and_then(|()| stores.commit());

        let error = match result {
            Ok(()) => {
                summary.has_data_changes = data_changed;
                summary.finish(SyncState::Succeeded);
                self.set_state(SyncState::Succeeded, &summary);
                info!(
                    checked_in = summary.check_in_requested.total(),
                    refreshed = summary.refresh_done.total(),
                    duration_ms = summary.duration_ms.unwrap_or_default(),
                    "sync session succeeded"
                );
                None
            }
            Err(e) => {
                stores.rollback();
                record_failure(&mut summary, &e);
                summary.finish(SyncState::Failed);
                self.set_state(SyncState::Failed, &summary);
                warn!(error = %e, "sync session failed, local changes rolled back");
                Some(e)
            }
        };
        SyncReport { summary, error }
    }

    /// One compose/send/receive round with a freshly loaded context. The
    /// context's summary replaces `summary`, keeping the session start and
    /// the check-in of any earlier pass.
    fn pass(
        &self,
        stores: &SessionStores<'_>,
        scope: &SyncScope,
        transport: &mut ChunkedTransport<'_>,
        summary: &mut SyncSummary,
    ) -> SyncResult<()> {
        let mut ctx = SessionContext::load(&self.config, self.mapper.as_ref(), self.fs.as_ref(), stores, scope)?;
        ctx.summary.begin_time = summary.begin_time;
        ctx.summary.has_def_changes = summary.has_def_changes;
        let result = self.exchange(&mut ctx, transport);
        let earlier = std::mem::replace(summary, ctx.summary);
        summary.carry_check_in(&earlier);
        result
    }

    fn exchange(&self, ctx: &mut SessionContext<'_>, transport: &mut ChunkedTransport<'_>) -> SyncResult<()> {
        self.set_state(SyncState::Composing, &ctx.summary);
        let session_id = format!(
            "{}-{}-{}",
            ctx.config.user,
            ctx.device_name(),
            Utc::now().timestamp_millis()
        );
        transport.open_output(session_id.clone())?;
        ctx.summary.session_id = Some(session_id);
        ctx.summary.upload_begin_time = Some(Utc::now());
        if ctx.scope.direction.checks_in() {
            ctx.summary.check_in_status = SyncStatus::InProgress;
        }
        checkin::compose(ctx, transport)?;

        self.set_state(SyncState::Sending, &ctx.summary);
        transport.send()?;
        ctx.summary.session_id = Some(transport.session_id().to_string());

        ctx.summary.download_begin_time = Some(Utc::now());
        self.set_state(SyncState::Receiving, &ctx.summary);
        self.set_state(SyncState::Processing, &ctx.summary);
        refresh::receive(ctx, transport)?;

        if ctx.summary.check_in_status == SyncStatus::InProgress {
            ctx.summary.check_in_status = SyncStatus::Success;
        }
        Ok(())
    }

    fn load_catalog(&self) -> SyncResult<(Arc<dyn SqlStore>, Vec<SchemaState>, Vec<FolderState>)> {
        let admin = self.stores.open(&self.config.admin_db_name)?;
        let catalog = Catalog::new(admin.as_ref());
        catalog.provision()?;
        let schemas = catalog.load_schemas(self.mapper.as_ref())?;
        let folders = catalog.load_folders()?;
        Ok((admin, schemas, folders))
    }

    /// Client identity, schemas, tables, folders and cursors.
    pub fn status(&self) -> SyncResult<ClientStatus> {
        let (admin, schemas, folders) = self.load_catalog()?;
        let props = Catalog::new(admin.as_ref()).client_properties()?;
        let schemas = schemas
            .into_iter()
            .map(|s| SchemaStatus {
                store: s.store_name().to_string(),
                def_cn: s.def.def_cn,
                sub_cn: s.def.sub_cn,
                data_cn: s.sub.data_cn,
                tables: s
                    .tables
                    .iter()
                    .map(|t| TableStatus {
                        name: t.name().to_string(),
                        rank: t.def.rank,
                        allow_check_in: t.def.allow_check_in,
                        allow_refresh: t.def.allow_refresh,
                    })
                    .collect(),
                name: s.def.name,
            })
            .collect();
        let folders = folders
            .into_iter()
            .map(|f| {
                Ok(FolderStatus {
                    path: folder_root(&self.config.files_dir, &f.def)?,
                    recursive: f.def.recursive,
                    file_cn: f.sub.file_cn,
                    name: f.def.name,
                })
            })
            .collect::<SyncResult<Vec<_>>>()?;
        Ok(ClientStatus {
            client_id: props.client_id,
            server_id: props.server_id,
            device_name: props.device_name,
            transaction_id: props.transaction_id,
            state: self.state(),
            schemas,
            folders,
        })
    }

    /// Pending journal rows per table and pending file records per folder.
    pub fn pending(&self) -> SyncResult<PendingChanges> {
        let (admin, schemas, folders) = self.load_catalog()?;
        let mut pending = PendingChanges::default();
        for schema in &schemas {
            let store = self.stores.open(schema.store_name())?;
            let journal = ChangeJournal::new(store.as_ref());
            for table in &schema.tables {
                let changes = journal.pending_counts(table)?;
                if changes.total() > 0 {
                    pending.tables.push(PendingTable {
                        schema: schema.def.name.clone(),
                        table: table.name().to_string(),
                        changes,
                    });
                }
            }
        }
        let catalog = Catalog::new(admin.as_ref());
        for folder in &folders {
            let mut changes = OpCounts::default();
            for (ct, n) in catalog.pending_file_counts(folder.def.id)? {
                match ct {
                    ChangeType::Insert => changes.add(DmlOp::Insert, n),
                    ChangeType::Update => changes.add(DmlOp::Update, n),
                    ChangeType::Delete => changes.add(DmlOp::Delete, n),
                    ChangeType::Synced => {}
                }
            }
            if changes.total() > 0 {
                pending.folders.push(PendingFolder {
                    folder: folder.def.name.clone(),
                    changes,
                });
            }
        }
        Ok(pending)
    }

    /// Local directory of a synchronized folder.
    pub fn folder_path(&self, name: &str) -> SyncResult<PathBuf> {
        let (_, _, folders) = self.load_catalog()?;
        let folder = folders
            .iter()
            .find(|f| f.def.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| SyncError::Catalog(format!("unknown folder {name}")))?;
        folder_root(&self.config.files_dir, &folder.def)
    }

    /// Opens a synchronized schema for application reads and writes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SessionActive`] while a session runs, since
    /// its open transactions would absorb the writes.
    pub fn open_schema(&self, name: &str) -> SyncResult<SchemaHandle> {
        if self.is_syncing() {
            return Err(SyncError::SessionActive);
        }
        let (_, schemas, _) = self.load_catalog()?;
        let schema = schemas
            .into_iter()
            .find(|s| s.def.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| SyncError::Catalog(format!("unknown schema {name}")))?;
        let store = self.stores.open(schema.store_name())?;
        provision_schema_store(store.as_ref())?;
        Ok(SchemaHandle::new(schema, store))
    }
}

/// Folds a session failure into the summary.
fn record_failure(summary: &mut SyncSummary, error: &SyncError) {
    if summary.check_in_status == SyncStatus::InProgress {
        summary.check_in_status = SyncStatus::Failure;
    }
    if summary.refresh_status == SyncStatus::InProgress {
        summary.refresh_status = SyncStatus::Failure;
    }
    // Server-reported errors were merged into the summary when they arrived.
    if let Some(code) = error.code() {
        summary.error_code = code;
    } else {
        summary.push_error(&error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_is_exclusive_and_released() {
        let flag = AtomicBool::new(false);
        {
            let _held = SessionGuard::acquire(&flag).unwrap();
            assert!(SessionGuard::acquire(&flag).is_none());
        }
        assert!(SessionGuard::acquire(&flag).is_some());
    }

    #[test]
    fn failure_marks_running_directions() {
        let mut summary = SyncSummary::new("u", "d", Default::default());
        summary.check_in_status = SyncStatus::InProgress;
        summary.refresh_status = SyncStatus::Success;
        record_failure(&mut summary, &SyncError::transport("HTTP status 500"));
        assert_eq!(summary.check_in_status, SyncStatus::Failure);
        assert_eq!(summary.refresh_status, SyncStatus::Success);
        assert!(summary.error_messages.contains("HTTP status 500"));
        assert_eq!(summary.error_code, -1);
    }

    #[test]
    fn report_converts_to_result() {
        let summary = SyncSummary::new("u", "d", Default::default());
        let report = SyncReport {
            summary: summary.clone(),
            error: None,
        };
        assert!(report.succeeded());
        assert_eq!(report.into_result().unwrap(), summary);

        let failed = SyncReport {
            summary,
            error: Some(SyncError::SessionActive),
        };
        assert!(matches!(failed.into_result(), Err(SyncError::SessionActive)));
    }
}
