//! Definition fixtures and a temporary client environment.
//!
//! The canned schema is a two-table project tracker: `projects` (rank 1)
//! is the parent of `tasks` (rank 2), and `tasks.notes` is a character
//! LOB.

use crate::server::ScriptedServer;
use outpost_sync_engine::{SyncAgent, SyncConfig, SyncReport, SyncScope};
use outpost_sync_protocol::{
    ChangeType, ColumnDef, Command, FolderDef, FolderSub, SchemaDef, SchemaSub, ServerSyncSummary,
    SyncDirection, SyncResponse, TableDef,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Server id the fixtures bind to.
pub const SERVER_ID: i64 = 1;
/// Client id the fixtures assign.
pub const CLIENT_ID: i64 = 42;
/// Schema id of [`tracker_schema`].
pub const TRACKER_SCHEMA_ID: i64 = 1;
/// Table id of `projects`.
pub const PROJECTS_TABLE_ID: i64 = 10;
/// Table id of `tasks`.
pub const TASKS_TABLE_ID: i64 = 11;
/// Folder id of [`docs_folder`].
pub const DOCS_FOLDER_ID: i64 = 5;

/// A column of a MySQL-typed table.
pub fn column(name: &str, type_name: &str, size: i64, pk_seq: i64, position: i64) -> ColumnDef {
    ColumnDef {
        column_name: name.into(),
        type_name: type_name.into(),
        column_size: size,
        nullable: pk_seq == 0,
        pk_seq,
        ordinal_position: position,
        ..ColumnDef::default()
    }
}

/// A new table open for check-in and refresh.
pub fn table(id: i64, name: &str, rank: i64, columns: Vec<ColumnDef>) -> TableDef {
    TableDef {
        id,
        name: name.into(),
        rank,
        def_cn: 1,
        def_ct: Some(ChangeType::Insert),
        allow_check_in: true,
        allow_refresh: true,
        has_pk: true,
        columns,
        ..TableDef::default()
    }
}

/// The `projects` table.
pub fn projects_table() -> TableDef {
    table(
        PROJECTS_TABLE_ID,
        "projects",
        1,
        vec![column("id", "INT", 10, 1, 1), column("name", "VARCHAR", 40, 0, 2)],
    )
}

/// The `tasks` table, child of `projects`, with a `TEXT` LOB.
pub fn tasks_table() -> TableDef {
    table(
        TASKS_TABLE_ID,
        "tasks",
        2,
        vec![
            column("id", "INT", 10, 1, 1),
            column("project_id", "INT", 10, 0, 2),
            column("title", "VARCHAR", 80, 0, 3),
            column("notes", "TEXT", 65535, 0, 4),
        ],
    )
}

/// A new schema on a MySQL server.
pub fn schema(id: i64, name: &str, tables: Vec<TableDef>) -> SchemaDef {
    SchemaDef {
        id,
        name: name.into(),
        server_db_schema: name.into(),
        def_cn: 1,
        sub_cn: 1,
        server_db_type: "MYSQL".into(),
        def_ct: Some(ChangeType::Insert),
        table_list: tables,
        ..SchemaDef::default()
    }
}

/// The `tracker` schema with `projects` and `tasks`.
pub fn tracker_schema() -> SchemaDef {
    schema(TRACKER_SCHEMA_ID, "tracker", vec![projects_table(), tasks_table()])
}

/// A new recursive folder open for check-in and refresh.
pub fn folder(id: i64, name: &str, client_path: &str) -> FolderDef {
    FolderDef {
        id,
        name: name.into(),
        server_folder_path: format!("/srv/{name}"),
        client_folder_path: client_path.into(),
        recursive: true,
        allow_check_in: true,
        allow_refresh: true,
        def_cn: 1,
        sub_cn: 1,
        def_ct: Some(ChangeType::Insert),
        ..FolderDef::default()
    }
}

/// The `docs` folder, syncing only `.txt` files.
pub fn docs_folder() -> FolderDef {
    FolderDef {
        file_name_ends_with: Some(".txt".into()),
        ..folder(DOCS_FOLDER_ID, "docs", "docs")
    }
}

/// `SYNC_RESPONSE` binding the fixture server and client ids.
pub fn sync_response(success_schemas: &[&str], success_folders: &[&str]) -> Command {
    Command::SyncResponse(SyncResponse {
        server_id: SERVER_ID,
        client_id: CLIENT_ID,
        device: None,
        success_schema_names: success_schemas.iter().map(|s| s.to_string()).collect(),
        success_folder_names: success_folders.iter().map(|s| s.to_string()).collect(),
    })
}

/// A successful `SYNC_SUMMARY`.
pub fn summary_ok() -> Command {
    Command::SyncSummary(ServerSyncSummary {
        check_in_status: Some("SUCCESS".into()),
        refresh_status: Some("SUCCESS".into()),
        ..ServerSyncSummary::default()
    })
}

/// A `SYNC_SUMMARY` reporting a server error.
pub fn summary_error(code: i64, message: &str) -> Command {
    Command::SyncSummary(ServerSyncSummary {
        check_in_status: Some("FAILURE".into()),
        error_code: code,
        sync_error_messages: Some(message.into()),
        ..ServerSyncSummary::default()
    })
}

/// A response carrying definitions only.
pub fn bootstrap_response(schemas: &[SchemaDef], folders: &[FolderDef]) -> Vec<Command> {
    vec![
        sync_response(&[], &[]),
        Command::RefreshSchemaDef(schemas.to_vec()),
        Command::RefreshFolderDef(folders.to_vec()),
        summary_ok(),
        Command::EndSyncResponse,
    ]
}

/// A response acknowledging the named check-ins and carrying nothing else.
pub fn ack_response(success_schemas: &[&str], success_folders: &[&str]) -> Vec<Command> {
    vec![
        sync_response(success_schemas, success_folders),
        summary_ok(),
        Command::EndSyncResponse,
    ]
}

/// A response with nothing to acknowledge or apply.
pub fn empty_response() -> Vec<Command> {
    ack_response(&[], &[])
}

/// `SCHEMA` header of a data stream.
pub fn schema_data(schema_id: i64, data_cn: i64) -> Command {
    Command::Schema(SchemaSub {
        sync_schema_id: schema_id,
        data_cn,
        sync_client_id: CLIENT_ID,
        ..SchemaSub::default()
    })
}

/// `FOLDER` header of a file stream.
pub fn folder_data(folder_id: i64, file_cn: i64) -> Command {
    Command::Folder(FolderSub {
        sync_folder_id: folder_id,
        file_cn,
        sync_client_id: CLIENT_ID,
        ..FolderSub::default()
    })
}

/// A `ROW` command from string cells.
pub fn row(cells: &[Option<&str>]) -> Command {
    Command::Row(cells.iter().map(|c| c.map(str::to_string)).collect())
}

/// A client with stores and folders in a temporary directory, talking to
/// a [`ScriptedServer`].
pub struct TestEnv {
    /// The agent under test.
    pub agent: SyncAgent,
    /// Handle on the agent's server.
    pub server: ScriptedServer,
    _dir: TempDir,
    files_dir: PathBuf,
}

impl TestEnv {
    /// Creates an environment with the default test configuration.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Creates an environment after adjusting the test configuration.
    pub fn with_config(adjust: impl FnOnce(SyncConfig) -> SyncConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let files_dir = dir.path().join("files");
        let config = adjust(
            SyncConfig::new("http://scripted.test/sync", "alice")
                .with_password("secret")
                .with_device_name("laptop")
                .with_data_dir(dir.path().join("data"))
                .with_files_dir(&files_dir),
        );
        let server = ScriptedServer::new();
        let agent = SyncAgent::new(config, server.clone()).expect("Failed to create agent");
        Self {
            agent,
            server,
            _dir: dir,
            files_dir,
        }
    }

    /// Root of synchronized folders.
    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    /// Directory holding the agent's stores.
    pub fn data_dir(&self) -> &Path {
        &self.agent.config().data_dir
    }

    /// Runs a session over every known schema and folder.
    pub fn sync(&self, direction: SyncDirection) -> SyncReport {
        self.agent.sync(&SyncScope::new(direction))
    }

    /// Runs a two-way session and panics if it fails.
    pub fn sync_ok(&self) -> SyncReport {
        let report = self.sync(SyncDirection::TwoWay);
        assert!(report.succeeded(), "sync failed: {:?}", report.error);
        report
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
