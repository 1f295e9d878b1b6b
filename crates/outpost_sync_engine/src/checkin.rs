//! Composition of the outbound sync request.
//!
//! The request opens with `SYNC_REQUEST` and the subscription state of
//! every known schema and folder, then carries the check-in streams:
//!
//! ```text
//! CHECK_IN_DATA
//!   SCHEMA
//!     UPDATE / INSERT groups, tables in rank order
//!     DELETE groups, tables in reverse rank order
//!   END_SCHEMA
//! END_CHECK_IN_DATA
//! CHECK_IN_FILES
//!   FOLDER  FILE [LOB...]...  END_FOLDER
//! END_CHECK_IN_FILES
//! END_SYNC_REQUEST
//! ```
//!
//! Parents precede children for inserts and updates and follow them for
//! deletes, so the server can apply each group without violating foreign
//! keys.

use crate::catalog::Catalog;
use crate::context::{may_check_in, SessionContext};
use crate::error::SyncResult;
use crate::files::{resolve_relative, scan_folder, FileFilter};
use crate::journal::ChangeJournal;
use crate::layout::TableLayout;
use crate::summary::OpCounts;
use crate::transport::ChunkedTransport;
use outpost_storage::SqlValue;
use outpost_sync_protocol::{
    lob_frames, ChangeType, Command, DmlOp, LobPayload, SyncRequest,
};
use tracing::{debug, info};

/// Writes the whole request for one pass.
pub(crate) fn compose(ctx: &mut SessionContext<'_>, transport: &mut ChunkedTransport<'_>) -> SyncResult<()> {
    let request = SyncRequest {
        client_version: ctx.config.client_version.clone(),
        user: ctx.config.user.clone(),
        device: ctx.device_name().to_string(),
        password: ctx.config.password.clone(),
        server_id: ctx.props.server_id,
        client_id: ctx.props.client_id,
        sync_direction: ctx.scope.direction,
        sync_schema_names: ctx.scope.schemas.clone(),
        sync_folder_names: ctx.scope.folders.clone(),
    };
    transport.write(&Command::SyncRequest(request))?;
    transport.write(&Command::SchemaSubState(
        ctx.schemas.iter().map(|s| s.sub.clone()).collect(),
    ))?;
    transport.write(&Command::FolderSubState(
        ctx.folders.iter().map(|f| f.sub.clone()).collect(),
    ))?;

    if ctx.scope.direction.checks_in() {
        info!(txn = ctx.props.transaction_id, "checking in local changes");
        check_in_data(ctx, transport)?;
        check_in_files(ctx, transport)?;
    } else {
        info!("refresh-only session, check-in skipped");
    }

    transport.write(&Command::EndSyncRequest)
}

fn check_in_data(ctx: &mut SessionContext<'_>, transport: &mut ChunkedTransport<'_>) -> SyncResult<()> {
    transport.write(&Command::CheckInData)?;
    let txn = ctx.props.transaction_id;
    let user = ctx.config.user.as_str();
    let chunk = ctx.config.lob_buffer_size;

    for schema in &ctx.schemas {
        if !ctx.scope.includes_schema(&schema.def.name) {
            debug!(schema = %schema.def.name, "schema not selected");
            continue;
        }
        let store = ctx.stores.get(schema.store_name())?;
        let journal = ChangeJournal::new(store.as_ref());

        let tables: Vec<&TableLayout> = schema
            .tables
            .iter()
            .filter(|t| may_check_in(t.def.allow_check_in, &t.def.check_in_super_users, user))
            .collect();
        for table in &tables {
            let stamped = journal.stamp(table, txn)?;
            debug!(table = table.name(), stamped, txn, "stamped pending changes");
        }

        transport.write(&Command::Schema(schema.sub.clone()))?;
        for table in &tables {
            for op in [DmlOp::Update, DmlOp::Insert] {
                write_group(transport, &journal, table, op, txn, chunk, &mut ctx.summary.check_in_requested)?;
            }
        }
        for table in tables.iter().rev() {
            write_group(
                transport,
                &journal,
                table,
                DmlOp::Delete,
                txn,
                chunk,
                &mut ctx.summary.check_in_requested,
            )?;
        }
        transport.write(&Command::EndSchema)?;
    }

    transport.write(&Command::EndCheckInData)
}

/// Writes one `INSERT`/`UPDATE`/`DELETE` group; nothing if no row is pending.
fn write_group(
    transport: &mut ChunkedTransport<'_>,
    journal: &ChangeJournal<'_>,
    table: &TableLayout,
    op: DmlOp,
    txn: i64,
    chunk: usize,
    counts: &mut OpCounts,
) -> SyncResult<()> {
    let rows = match op {
        DmlOp::Delete => journal.pending_deletes(table, txn)?,
        _ => journal.pending_rows(table, op, txn)?,
    };
    if rows.is_empty() {
        return Ok(());
    }

    transport.write(&Command::Dml {
        op,
        table_id: table.id(),
    })?;
    let width = 1 + match op {
        DmlOp::Delete => table.pk.len(),
        _ => table.row_width(),
    };
    let count = rows.len();
    for row in rows {
        let values = row.into_values();
        let (head, lobs) = values.split_at(width.min(values.len()));
        transport.write(&Command::Row(
            head.iter().map(SqlValue::to_canonical_string).collect(),
        ))?;
        if op != DmlOp::Delete {
            for (lob, value) in table.lobs.iter().zip(lobs) {
                let payload = lob_payload(value, lob.is_binary);
                for frame in lob_frames(payload.as_ref(), lob.is_binary, chunk) {
                    transport.write(&Command::Lob(frame))?;
                }
            }
        }
        counts.add(op, 1);
    }
    transport.write(&Command::EndDml(op))?;
    debug!(table = table.name(), op = op.command_name(), count, "checked in");
    Ok(())
}

fn lob_payload(value: &SqlValue, is_binary: bool) -> Option<LobPayload> {
    match value {
        SqlValue::Null => None,
        SqlValue::Blob(bytes) => Some(LobPayload::Binary(bytes.clone())),
        other => {
            let text = other.to_canonical_string()?;
            Some(if is_binary {
                LobPayload::Binary(text.into_bytes())
            } else {
                LobPayload::Text(text)
            })
        }
    }
}

fn check_in_files(ctx: &mut SessionContext<'_>, transport: &mut ChunkedTransport<'_>) -> SyncResult<()> {
    if ctx.folders.is_empty() {
        return Ok(());
    }
    transport.write(&Command::CheckInFiles)?;
    let catalog = Catalog::new(ctx.admin.as_ref());
    let user = ctx.config.user.as_str();

    for folder in &ctx.folders {
        let name = folder.def.name.as_str();
        if !ctx.scope.includes_folder(name) {
            debug!(folder = name, "folder not selected");
            continue;
        }
        if folder.def.allow_refresh && folder.sub.file_cn < 0 {
            info!(folder = name, "no check-in until the folder is first refreshed");
            continue;
        }
        if !may_check_in(folder.def.allow_check_in, &folder.def.check_in_super_users, user) {
            continue;
        }

        transport.write(&Command::Folder(folder.sub.clone()))?;
        let root = ctx.folder_root(folder)?;
        let records = scan_folder(ctx.fs, &catalog, folder, &root)?;
        let filter = FileFilter::for_folder(&folder.def);

        for record in records.values() {
            if record.file_ct == ChangeType::Synced || !filter.matches(&record.file_name) {
                continue;
            }
            transport.write(&Command::File(record.clone()))?;
            if record.is_directory {
                continue;
            }
            let op = match record.file_ct {
                ChangeType::Delete => DmlOp::Delete,
                ChangeType::Insert => DmlOp::Insert,
                _ => DmlOp::Update,
            };
            ctx.summary.check_in_requested.add(op, 1);
            debug!(folder = name, file = %record.file_name, op = op.command_name(), "checking in file");
            if op == DmlOp::Delete {
                continue;
            }
            let bytes = ctx.fs.read_bytes(&resolve_relative(&root, &record.file_name)?)?;
            let payload = LobPayload::Binary(bytes);
            for frame in lob_frames(Some(&payload), true, ctx.config.lob_buffer_size) {
                transport.write(&Command::Lob(frame))?;
            }
        }
        transport.write(&Command::EndFolder)?;
    }

    transport.write(&Command::EndCheckInFiles)
}
