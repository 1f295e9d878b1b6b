//! Application of the server response.
//!
//! The response is a self-terminating stream:
//!
//! ```text
//! SYNC_RESPONSE
//! ( REFRESH_SCHEMA_DEF | REFRESH_FOLDER_DEF
//! | REFRESH_DATA  SCHEMA ( INSERT|UPDATE|DELETE  ROW [LOB...]...  END_x )...  END_SCHEMA ...  END_REFRESH_DATA
//! | REFRESH_FILES FOLDER ( FILE [LOB...] )...  END_FOLDER ...  END_REFRESH_FILES
//! | SYNC_SUMMARY )*
//! END_SYNC_RESPONSE
//! ```
//!
//! Every write goes through the session's store transactions; nothing is
//! visible until the session commits.

use crate::catalog::{store_name_of, Catalog, PROP_CLIENT_ID, PROP_DEVICE_NAME, PROP_SERVER_ID, PROP_TRANSACTION_ID};
use crate::context::{may_check_in, SessionContext};
use crate::error::{SyncError, SyncResult};
use crate::files::resolve_relative;
use crate::journal::{provision_schema_store, set_capture_enabled, ChangeJournal};
use crate::layout::TableLayout;
use crate::state::SyncStatus;
use crate::summary::SyncSummary;
use crate::transport::ChunkedTransport;
use outpost_storage::{FileSystem, SqlStore, SqlValue};
use outpost_sync_protocol::{
    ChangeType, Command, DmlOp, FileRecord, FolderDef, LobAssembler, LobPayload, LobProgress,
    SchemaDef, SyncResponse,
};
use std::path::Path;
use tracing::{debug, info, warn};

/// Client database type tags whose statements run locally.
const LOCAL_SQL_TYPES: [&str; 2] = ["SQLITE", "ALL"];

/// Reads and applies the whole response of one pass.
pub(crate) fn receive(ctx: &mut SessionContext<'_>, transport: &mut ChunkedTransport<'_>) -> SyncResult<()> {
    let first = transport.read()?;
    let Command::SyncResponse(response) = first else {
        return Err(SyncError::unexpected("SYNC_RESPONSE", first.name()));
    };
    apply_sync_response(ctx, response)?;

    ctx.summary.refresh_status = SyncStatus::InProgress;
    loop {
        let command = transport.read()?;
        match command {
            Command::EndSyncResponse => break,
            Command::RefreshSchemaDef(defs) => {
                ensure_refresh(ctx, "REFRESH_SCHEMA_DEF")?;
                refresh_schema_defs(ctx, defs)?;
            }
            Command::RefreshFolderDef(defs) => {
                ensure_refresh(ctx, "REFRESH_FOLDER_DEF")?;
                refresh_folder_defs(ctx, defs)?;
            }
            Command::RefreshData => {
                ensure_refresh(ctx, "REFRESH_DATA")?;
                refresh_data(ctx, transport)?;
            }
            Command::RefreshFiles => {
                ensure_refresh(ctx, "REFRESH_FILES")?;
                refresh_files(ctx, transport)?;
            }
            Command::SyncSummary(server) => ctx.summary.merge_server(server)?,
            other => {
                return Err(SyncError::unexpected(
                    "END_SYNC_RESPONSE, SYNC_SUMMARY, REFRESH_SCHEMA_DEF, REFRESH_FOLDER_DEF, \
                     REFRESH_DATA or REFRESH_FILES",
                    other.name(),
                ))
            }
        }
    }
    if ctx.summary.refresh_status != SyncStatus::Failure {
        ctx.summary.refresh_status = SyncStatus::Success;
    }
    Ok(())
}

fn ensure_refresh(ctx: &SessionContext<'_>, command: &str) -> SyncResult<()> {
    if ctx.scope.direction.refreshes() {
        Ok(())
    } else {
        Err(SyncError::PolicyViolation(format!(
            "{command} received in a {} session",
            ctx.scope.direction
        )))
    }
}

/// Acknowledges what the server accepted and records the identities it
/// assigned.
fn apply_sync_response(ctx: &mut SessionContext<'_>, response: SyncResponse) -> SyncResult<()> {
    if response.server_id < 0 {
        return Err(SyncError::Rejected(format!(
            "invalid server response (serverId={}, clientId={})",
            response.server_id, response.client_id
        )));
    }
    let txn = ctx.props.transaction_id;
    let user = ctx.config.user.as_str();
    let catalog = Catalog::new(ctx.admin.as_ref());
    let mut reconciled = 0;

    for name in &response.success_schema_names {
        let Some(schema) = ctx.schemas.iter().find(|s| s.def.name.eq_ignore_ascii_case(name)) else {
            warn!(schema = %name, "server accepted an unknown schema");
            continue;
        };
        let store = ctx.stores.get(schema.store_name())?;
        let journal = ChangeJournal::new(store.as_ref());
        for table in &schema.tables {
            if may_check_in(table.def.allow_check_in, &table.def.check_in_super_users, user) {
                reconciled += journal.acknowledge(table, txn)?;
            }
        }
        debug!(schema = %schema.def.name, "acknowledged check-in");
    }
    for name in &response.success_folder_names {
        let Some(folder) = ctx.folders.iter().find(|f| f.def.name.eq_ignore_ascii_case(name)) else {
            warn!(folder = %name, "server accepted an unknown folder");
            continue;
        };
        reconciled += catalog.ack_files(folder.def.id)?;
        debug!(folder = %folder.def.name, "acknowledged file check-in");
    }

    if reconciled > 0 {
        ctx.props.transaction_id += 1;
        catalog.set_property(PROP_TRANSACTION_ID, ctx.props.transaction_id)?;
        info!(reconciled, next_txn = ctx.props.transaction_id, "check-in acknowledged");
    }
    if response.client_id != ctx.props.client_id {
        info!(old = ctx.props.client_id, new = response.client_id, "client id changed");
        catalog.set_property(PROP_CLIENT_ID, response.client_id)?;
        ctx.props.client_id = response.client_id;
    }
    if response.server_id != ctx.props.server_id {
        info!(old = ctx.props.server_id, new = response.server_id, "server id changed");
        catalog.set_property(PROP_SERVER_ID, response.server_id)?;
        ctx.props.server_id = response.server_id;
    }
    if let Some(device) = response.device.filter(|d| !d.is_empty()) {
        if ctx.props.device_name.as_deref() != Some(device.as_str()) {
            info!(device = %device, "device name changed");
            catalog.set_property(PROP_DEVICE_NAME, &device)?;
            ctx.summary.device = device.clone();
            ctx.props.device_name = Some(device);
        }
    }
    Ok(())
}

fn is_deleted(ct: Option<ChangeType>) -> bool {
    ct == Some(ChangeType::Delete)
}

/// Applies schema definitions: drops across every schema first, then
/// creates parent to child, then the schema's statements, then the
/// catalog rewrite.
fn refresh_schema_defs(ctx: &mut SessionContext<'_>, mut defs: Vec<SchemaDef>) -> SyncResult<()> {
    if defs.is_empty() {
        return Ok(());
    }
    ctx.summary.has_def_changes = true;

    for def in &defs {
        let store = ctx.stores.get(store_name_of(def))?;
        provision_schema_store(store.as_ref())?;
        let Some(existing) = ctx.schemas.iter().find(|s| s.def.id == def.id) else {
            continue;
        };
        let doomed: Vec<&TableLayout> = if is_deleted(def.def_ct) {
            existing.tables.iter().collect()
        } else {
            def.table_list
                .iter()
                .filter(|t| is_deleted(t.def_ct))
                .filter_map(|t| existing.table(t.id))
                .collect()
        };
        for table in doomed {
            info!(schema = %def.name, table = table.name(), "dropping table");
            drop_quietly(store.as_ref(), table);
        }
    }

    for def in &mut defs {
        if is_deleted(def.def_ct) {
            continue;
        }
        let store = ctx.stores.get(store_name_of(def))?;
        for table in &mut def.table_list {
            for column in &mut table.columns {
                column.device_col_def = Some(ctx.mapper.map_column(&def.server_db_type, column)?);
            }
        }
        def.table_list.sort_by_key(|t| t.rank);
        let layouts: Vec<TableLayout> = def
            .table_list
            .iter()
            .map(|t| TableLayout::new(t.clone(), &def.server_db_type, ctx.mapper))
            .collect();

        for table in layouts.iter().rev() {
            drop_quietly(store.as_ref(), table);
        }
        for table in layouts.iter().filter(|t| !is_deleted(t.def.def_ct)) {
            debug!(schema = %def.name, table = table.name(), "creating table");
            for sql in table.create_sql() {
                store.execute(&sql, &[]).map_err(|e| SyncError::StatementFailed {
                    sql: sql.clone(),
                    message: e.to_string(),
                })?;
            }
        }

        for statement in &def.sql_list {
            let Some(sql) = statement.sql_text.as_deref().filter(|s| !s.trim().is_empty()) else {
                continue;
            };
            let local = LOCAL_SQL_TYPES
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&statement.client_db_type));
            if is_deleted(statement.def_ct) || !local {
                continue;
            }
            debug!(schema = %def.name, sql, "executing schema statement");
            if let Err(e) = store.execute_batch(sql) {
                if statement.ignore_exec_error {
                    warn!(sql, error = %e, "ignoring failed schema statement");
                } else {
                    return Err(SyncError::StatementFailed {
                        sql: sql.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    let catalog = Catalog::new(ctx.admin.as_ref());
    for def in &defs {
        let existing = ctx.schemas.iter().find(|s| s.def.id == def.id);
        if is_deleted(def.def_ct) {
            catalog.delete_schema(def.id)?;
            info!(schema = %def.name, "schema removed");
            continue;
        }
        for table in &def.table_list {
            if is_deleted(table.def_ct) {
                catalog.delete_table(table.id)?;
            } else {
                let is_new = table.def_ct == Some(ChangeType::Insert)
                    || existing.map_or(true, |s| s.table(table.id).is_none());
                catalog.upsert_table(def.id, table, is_new)?;
            }
        }
        catalog.upsert_schema(def, ctx.props.client_id)?;
        info!(schema = %def.name, def_cn = def.def_cn, "schema definition applied");
    }

    ctx.reload_definitions()
}

fn drop_quietly(store: &dyn SqlStore, table: &TableLayout) {
    for sql in table.drop_sql() {
        if let Err(e) = store.execute(&sql, &[]) {
            warn!(sql = %sql, error = %e, "ignoring failed drop");
        }
    }
}

fn folder_moved(old: &FolderDef, new: &FolderDef) -> bool {
    old.server_folder_path != new.server_folder_path
        || old.client_folder_path != new.client_folder_path
        || old.file_path_starts_with != new.file_path_starts_with
        || old.file_name_ends_with != new.file_name_ends_with
}

fn refresh_folder_defs(ctx: &mut SessionContext<'_>, defs: Vec<FolderDef>) -> SyncResult<()> {
    if defs.is_empty() {
        return Ok(());
    }
    ctx.summary.has_def_changes = true;
    let catalog = Catalog::new(ctx.admin.as_ref());

    for def in &defs {
        let existing = ctx.folders.iter().find(|f| f.def.id == def.id);
        if is_deleted(def.def_ct) {
            catalog.delete_folder(def.id)?;
            info!(folder = %def.name, "folder removed");
            continue;
        }
        let file_cn = match existing {
            Some(old) if folder_moved(&old.def, def) => {
                info!(folder = %def.name, "folder path or filter changed, dropping file state");
                catalog.delete_files(def.id)?;
                -1
            }
            Some(old) => old.sub.file_cn,
            None => -1,
        };
        catalog.upsert_folder(def, file_cn, ctx.props.client_id)?;
        debug!(folder = %def.name, file_cn, "folder definition applied");
    }

    ctx.reload_definitions()
}

fn refresh_data(ctx: &mut SessionContext<'_>, transport: &mut ChunkedTransport<'_>) -> SyncResult<()> {
    let catalog = Catalog::new(ctx.admin.as_ref());
    loop {
        let sub = match transport.read()? {
            Command::EndRefreshData => return Ok(()),
            Command::SyncSummary(server) => return ctx.summary.merge_server(server),
            Command::Schema(sub) => sub,
            other => {
                return Err(SyncError::unexpected(
                    "SCHEMA, SYNC_SUMMARY or END_REFRESH_DATA",
                    other.name(),
                ))
            }
        };
        let Some(schema) = ctx.schemas.iter_mut().find(|s| s.def.id == sub.sync_schema_id) else {
            return Err(SyncError::Catalog(format!(
                "no definition for schema {} while refreshing data",
                sub.sync_schema_id
            )));
        };
        let store = ctx.stores.get(schema.store_name())?;
        provision_schema_store(store.as_ref())?;

        set_capture_enabled(store.as_ref(), false)?;
        let applied = receive_schema(
            store.as_ref(),
            &schema.tables,
            transport,
            &mut ctx.summary,
        );
        set_capture_enabled(store.as_ref(), true)?;
        if !applied? {
            return Err(SyncError::Rejected(format!(
                "server ended the data of schema {} early",
                schema.def.name
            )));
        }

        catalog.set_data_cn(sub.sync_schema_id, sub.data_cn)?;
        catalog.clear_new_tables(&schema.sub.new_tables)?;
        schema.sub.new_tables.clear();
        schema.sub.data_cn = sub.data_cn;
        info!(schema = %schema.def.name, data_cn = sub.data_cn, "schema data refreshed");
        ctx.summary.refresh_schema_names.push(schema.def.name.clone());
    }
}

/// Returns `false` if a `SYNC_SUMMARY` cut the schema short.
fn receive_schema(
    store: &dyn SqlStore,
    tables: &[TableLayout],
    transport: &mut ChunkedTransport<'_>,
    summary: &mut SyncSummary,
) -> SyncResult<bool> {
    loop {
        match transport.read()? {
            Command::EndSchema => return Ok(true),
            Command::SyncSummary(server) => {
                summary.merge_server(server)?;
                return Ok(false);
            }
            Command::Dml { op, table_id } => {
                let table = tables.iter().find(|t| t.id() == table_id).ok_or_else(|| {
                    SyncError::Catalog(format!("no definition for table {table_id} while refreshing data"))
                })?;
                if !receive_dml(store, table, op, transport, summary)? {
                    return Ok(false);
                }
            }
            other => {
                return Err(SyncError::unexpected(
                    "END_SCHEMA, SYNC_SUMMARY, DELETE, INSERT or UPDATE",
                    other.name(),
                ))
            }
        }
    }
}

fn receive_dml(
    store: &dyn SqlStore,
    table: &TableLayout,
    op: DmlOp,
    transport: &mut ChunkedTransport<'_>,
    summary: &mut SyncSummary,
) -> SyncResult<bool> {
    let journal = ChangeJournal::new(store);
    let mut count = 0u64;
    loop {
        match transport.read()? {
            Command::EndDml(end) if end == op => break,
            Command::SyncSummary(server) => {
                summary.merge_server(server)?;
                return Ok(false);
            }
            Command::Row(values) => {
                summary.refresh_requested.add(op, 1);
                apply_row(store, &journal, table, op, values, transport)?;
                summary.refresh_done.add(op, 1);
                count += 1;
            }
            other => {
                return Err(SyncError::unexpected(
                    format!("{}, SYNC_SUMMARY or ROW", op.end_command_name()),
                    other.name(),
                ))
            }
        }
    }
    debug!(table = table.name(), op = op.command_name(), count, "refreshed");
    Ok(true)
}

fn apply_row(
    store: &dyn SqlStore,
    journal: &ChangeJournal<'_>,
    table: &TableLayout,
    op: DmlOp,
    values: Vec<Option<String>>,
    transport: &mut ChunkedTransport<'_>,
) -> SyncResult<()> {
    let params: Vec<SqlValue> = values.into_iter().map(SqlValue::from).collect();
    if op == DmlOp::Delete {
        // Server deletes carry the key only.
        let key = params.get(..table.pk.len()).ok_or_else(|| short_row(table, op, params.len()))?;
        store.execute(&table.delete_sql(), key)?;
        journal.remove(table, key)?;
        return Ok(());
    }

    let width = table.row_width();
    if params.len() < width + 1 {
        return Err(short_row(table, op, params.len()));
    }
    let version = params[0].as_i64().unwrap_or(0);
    let columns = &params[1..=width];
    let key = &columns[..table.pk.len()];
    store.execute(&table.upsert_sql(), columns)?;
    journal.upsert_server_version(table, key, version)?;

    if let Some(sql) = table.lob_update_sql() {
        let mut lob_params = Vec::with_capacity(table.lobs.len() + key.len());
        for _ in &table.lobs {
            lob_params.push(match read_lob(transport)? {
                Some(LobPayload::Text(text)) => SqlValue::Text(text),
                Some(LobPayload::Binary(bytes)) => SqlValue::Blob(bytes),
                None => SqlValue::Null,
            });
        }
        lob_params.extend_from_slice(key);
        store.execute(&sql, &lob_params)?;
    }
    Ok(())
}

fn short_row(table: &TableLayout, op: DmlOp, len: usize) -> SyncError {
    SyncError::Catalog(format!(
        "{} row for table {} has {len} values",
        op.command_name(),
        table.name()
    ))
}

/// Reads LOB frames until one payload is complete.
fn read_lob(transport: &mut ChunkedTransport<'_>) -> SyncResult<Option<LobPayload>> {
    let mut assembler = LobAssembler::new();
    let mut started = false;
    loop {
        match transport.read()? {
            Command::Lob(frame) => {
                started = true;
                if let LobProgress::Complete(payload) = assembler.push(frame)? {
                    return Ok(payload);
                }
            }
            other if started => {
                debug!(next = other.name(), "LOB stream ended early");
                return Err(assembler.truncated().into());
            }
            other => return Err(SyncError::unexpected("LOB", other.name())),
        }
    }
}

fn refresh_files(ctx: &mut SessionContext<'_>, transport: &mut ChunkedTransport<'_>) -> SyncResult<()> {
    let catalog = Catalog::new(ctx.admin.as_ref());
    loop {
        let sub = match transport.read()? {
            Command::EndRefreshFiles => return Ok(()),
            Command::SyncSummary(server) => return ctx.summary.merge_server(server),
            Command::Folder(sub) => sub,
            other => {
                return Err(SyncError::unexpected(
                    "FOLDER, SYNC_SUMMARY or END_REFRESH_FILES",
                    other.name(),
                ))
            }
        };
        let Some(index) = ctx.folders.iter().position(|f| f.def.id == sub.sync_folder_id) else {
            return Err(SyncError::Catalog(format!(
                "no definition for folder {} while refreshing files",
                sub.sync_folder_id
            )));
        };
        let root = ctx.folder_root(&ctx.folders[index])?;
        let folder_id = sub.sync_folder_id;
        if !receive_folder(ctx.fs, &catalog, folder_id, &root, transport, &mut ctx.summary)? {
            return Ok(());
        }

        catalog.set_file_cn(folder_id, sub.file_cn)?;
        let folder = &mut ctx.folders[index];
        folder.sub.file_cn = sub.file_cn;
        info!(folder = %folder.def.name, file_cn = sub.file_cn, "folder files refreshed");
        ctx.summary.refresh_folder_names.push(folder.def.name.clone());
    }
}

fn receive_folder(
    fs: &dyn FileSystem,
    catalog: &Catalog<'_>,
    folder_id: i64,
    root: &Path,
    transport: &mut ChunkedTransport<'_>,
    summary: &mut SyncSummary,
) -> SyncResult<bool> {
    if !fs.exists(root) {
        fs.mkdirs(root)?;
    }
    loop {
        match transport.read()? {
            Command::EndFolder => return Ok(true),
            Command::SyncSummary(server) => {
                summary.merge_server(server)?;
                return Ok(false);
            }
            Command::File(record) => apply_file(fs, catalog, folder_id, root, record, transport, summary)?,
            other => {
                return Err(SyncError::unexpected(
                    "FILE, SYNC_SUMMARY or END_FOLDER",
                    other.name(),
                ))
            }
        }
    }
}

fn apply_file(
    fs: &dyn FileSystem,
    catalog: &Catalog<'_>,
    folder_id: i64,
    root: &Path,
    mut record: FileRecord,
    transport: &mut ChunkedTransport<'_>,
    summary: &mut SyncSummary,
) -> SyncResult<()> {
    let path = resolve_relative(root, &record.file_name)?;
    let exists = fs.exists(&path);

    if record.is_directory {
        match record.file_ct {
            ChangeType::Delete => {
                if exists && fs.ls(&path)?.is_empty() {
                    debug!(path = %path.display(), "removing empty directory");
                    fs.remove(&path)?;
                }
                catalog.delete_file(folder_id, &record.file_name)?;
            }
            ChangeType::Insert | ChangeType::Update => {
                if !exists {
                    fs.mkdirs(&path)?;
                }
                record.file_ct = ChangeType::Synced;
                catalog.put_file(folder_id, &record)?;
            }
            ChangeType::Synced => {}
        }
        return Ok(());
    }

    match record.file_ct {
        ChangeType::Delete => {
            summary.refresh_requested.add(DmlOp::Delete, 1);
            if exists {
                debug!(path = %path.display(), "deleting file");
                fs.remove(&path)?;
                summary.refresh_done.add(DmlOp::Delete, 1);
            }
            catalog.delete_file(folder_id, &record.file_name)?;
        }
        ChangeType::Insert | ChangeType::Update => {
            let requested = if record.file_ct == ChangeType::Insert {
                DmlOp::Insert
            } else {
                DmlOp::Update
            };
            summary.refresh_requested.add(requested, 1);
            if let Some(parent) = path.parent() {
                if !fs.exists(parent) {
                    fs.mkdirs(parent)?;
                }
            }
            if !exists {
                fs.create_file(&path)?;
            }
            let bytes = match read_lob(transport)? {
                Some(LobPayload::Binary(bytes)) => bytes,
                Some(LobPayload::Text(text)) => text.into_bytes(),
                None => Vec::new(),
            };
            fs.write_bytes(&path, &bytes)?;
            summary
                .refresh_done
                .add(if exists { DmlOp::Update } else { DmlOp::Insert }, 1);

            // Metadata follows the file as written, not the wire.
            let stat = fs.stat(&path)?;
            record.length = stat.len;
            record.last_modified = stat.modified_ms;
            record.file_ct = ChangeType::Synced;
            catalog.put_file(folder_id, &record)?;
            debug!(path = %path.display(), bytes = stat.len, "file written");
        }
        ChangeType::Synced => {
            return Err(SyncError::unexpected(
                "file change type I, U or D",
                format!("S for {}", record.file_name),
            ))
        }
    }
    Ok(())
}
