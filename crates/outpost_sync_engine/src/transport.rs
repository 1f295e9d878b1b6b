//! Chunked, staged transport over HTTP.
//!
//! Outbound commands are packed into message bodies no larger than
//! `max_message_size`. When a command does not fit, a `MORE` frame closes
//! the current body, which is staged under the next outbound id. Sending
//! posts the staged bodies in id order; every reply is staged under the
//! next inbound id before any of it is decoded. A reply ending in the
//! configured sentinel means the server has more queued, and the client
//! pulls it by posting the sentinel itself.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, HttpRequest};
use outpost_codec::{FrameCursor, MORE_FRAME};
use outpost_storage::{PayloadStage, StageSequence};
use outpost_sync_protocol::{encode_command, Command};
use tracing::{debug, trace};

/// Request header carrying the session id.
pub const HEADER_SESSION_ID: &str = "session-id";
/// Request header carrying the message sequence number.
pub const HEADER_MESSAGE_ID: &str = "message-id";

/// Frame-at-a-time access to a sync exchange.
pub struct ChunkedTransport<'a> {
    config: &'a SyncConfig,
    client: &'a dyn HttpClient,
    stage: &'a dyn PayloadStage,
    session_id: String,
    message_id: i64,
    buffer: String,
    out_slots: u64,
    in_next: u64,
    current: String,
    offset: usize,
    posts: usize,
}

impl<'a> ChunkedTransport<'a> {
    /// Creates a transport; call [`ChunkedTransport::open_output`] before writing.
    pub fn new(config: &'a SyncConfig, client: &'a dyn HttpClient, stage: &'a dyn PayloadStage) -> Self {
        Self {
            config,
            client,
            stage,
            session_id: String::new(),
            message_id: -1,
            buffer: String::new(),
            out_slots: 0,
            in_next: 0,
            current: String::new(),
            offset: 0,
            posts: 0,
        }
    }

    /// Starts a new exchange, purging both staging sequences.
    pub fn open_output(&mut self, session_id: impl Into<String>) -> SyncResult<()> {
        self.stage.purge()?;
        self.session_id = session_id.into();
        self.message_id = -1;
        self.buffer.clear();
        self.out_slots = 0;
        self.in_next = 0;
        self.current.clear();
        self.offset = 0;
        self.posts = 0;
        Ok(())
    }

    /// Session id, as last echoed by the server.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Message id of the last POST, as last echoed by the server.
    pub fn message_id(&self) -> i64 {
        self.message_id
    }

    /// Number of POSTs made by the last [`ChunkedTransport::send`].
    pub fn posts(&self) -> usize {
        self.posts
    }

    /// Appends a command to the outbound buffer.
    ///
    /// # Errors
    ///
    /// Fails if the command alone is larger than `max_message_size`.
    pub fn write(&mut self, command: &Command) -> SyncResult<()> {
        let frame = encode_command(command)?;
        let max = self.config.max_message_size;
        if frame.len() > max {
            return Err(SyncError::transport(
                "message size limit reached with a single command",
            ));
        }
        if !self.buffer.is_empty() && self.buffer.len() + frame.len() > max {
            self.buffer.push_str(MORE_FRAME);
            self.flush()?;
        }
        trace!(command = command.name(), bytes = frame.len(), "buffered");
        self.buffer.push_str(&frame);
        Ok(())
    }

    fn flush(&mut self) -> SyncResult<()> {
        self.stage
            .put(StageSequence::Outbound, self.out_slots, &self.buffer)?;
        debug!(slot = self.out_slots, bytes = self.buffer.len(), "staged outbound message");
        self.out_slots += 1;
        self.buffer.clear();
        Ok(())
    }

    /// Flushes the buffer and exchanges every staged message with the
    /// server, staging each reply.
    pub fn send(&mut self) -> SyncResult<()> {
        if !self.buffer.is_empty() {
            self.flush()?;
        }
        let sentinel = self.config.more_sentinel.as_str();
        let mut next_out = 0;
        let mut server_more = false;
        self.message_id = -1;
        self.posts = 0;
        self.in_next = 0;
        self.current.clear();
        self.offset = 0;
        let mut in_slot = 0;

        loop {
            let body = if next_out < self.out_slots {
                let body = self
                    .stage
                    .get(StageSequence::Outbound, next_out)?
                    .ok_or_else(|| {
                        SyncError::transport(format!("outbound message {next_out} is missing"))
                    })?;
                next_out += 1;
                body
            } else if server_more {
                sentinel.to_string()
            } else {
                return Err(SyncError::transport("no more request to send"));
            };

            self.message_id += 1;
            let request = self.request(body);
            debug!(
                session = %self.session_id,
                message = self.message_id,
                bytes = request.body.len(),
                "posting message"
            );
            let response = self
                .client
                .post(&request)
                .map_err(|e| SyncError::transport(format!("HTTP request failed: {e}")))?;
            self.posts += 1;
            if response.status != 200 {
                return Err(SyncError::transport(format!(
                    "got non-OK response: {}",
                    response.status
                )));
            }
            if let Some(session) = response.header(HEADER_SESSION_ID) {
                self.session_id = session.to_string();
            }
            if let Some(id) = response
                .header(HEADER_MESSAGE_ID)
                .and_then(|v| v.trim().parse().ok())
            {
                self.message_id = id;
            }

            self.stage
                .put(StageSequence::Inbound, in_slot, &response.body)?;
            in_slot += 1;
            server_more = response.body.ends_with(sentinel);
            debug!(bytes = response.body.len(), server_more, "staged reply");

            if !server_more && next_out >= self.out_slots {
                return Ok(());
            }
        }
    }

    fn request(&self, body: String) -> HttpRequest {
        HttpRequest {
            url: self.config.server_url.clone(),
            headers: vec![
                ("Content-Type".into(), "application/octet-stream".into()),
                ("transport-serialization".into(), "Json".into()),
                ("session-type".into(), "SYNC".into()),
                (
                    "max-message-size".into(),
                    self.config.max_message_size.to_string(),
                ),
                (HEADER_SESSION_ID.into(), self.session_id.clone()),
                (HEADER_MESSAGE_ID.into(), self.message_id.to_string()),
            ],
            body,
        }
    }

    /// Decodes the next command of the staged replies.
    ///
    /// # Errors
    ///
    /// Fails on a malformed frame or when every staged reply is consumed.
    pub fn read(&mut self) -> SyncResult<Command> {
        loop {
            if self.offset < self.current.len() {
                let mut cursor = FrameCursor::at(&self.current, self.offset);
                let next = cursor.next_command()?;
                self.offset = cursor.position();
                if let Some(raw) = next {
                    let command = Command::from_raw(raw)?;
                    trace!(command = command.name(), "read");
                    return Ok(command);
                }
            }
            match self.stage.get(StageSequence::Inbound, self.in_next)? {
                Some(payload) => {
                    self.current = payload;
                    self.offset = 0;
                    self.in_next += 1;
                }
                None => return Err(SyncError::transport("no response data to read")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use outpost_codec::decode_all;
    use outpost_storage::MemoryPayloadStage;
    use outpost_sync_protocol::{DmlOp, SyncResponse};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Canned {
        replies: Mutex<VecDeque<HttpResponse>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Canned {
        fn with(replies: Vec<HttpResponse>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpClient for Canned {
        fn post(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
            self.seen.lock().push(request.clone());
            self.replies
                .lock()
                .pop_front()
                .ok_or_else(|| "connection refused".to_string())
        }
    }

    fn frames(commands: &[Command]) -> String {
        commands.iter().map(|c| encode_command(c).unwrap()).collect()
    }

    fn config(max: usize) -> SyncConfig {
        SyncConfig::new("http://srv/sync", "u").with_max_message_size(max)
    }

    #[test]
    fn single_message_exchange() {
        let config = config(10_000);
        let reply = frames(&[
            Command::SyncResponse(SyncResponse {
                server_id: 1,
                client_id: 2,
                ..SyncResponse::default()
            }),
            Command::EndSyncResponse,
        ]);
        let client = Canned::with(vec![HttpResponse::ok(reply)
            .with_header("session-id", "srv-1")
            .with_header("message-id", "0")]);
        let stage = MemoryPayloadStage::new();
        let mut transport = ChunkedTransport::new(&config, &client, &stage);
        transport.open_output("u-d-1").unwrap();
        transport.write(&Command::CheckInData).unwrap();
        transport.write(&Command::EndCheckInData).unwrap();
        transport.send().unwrap();

        let seen = client.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].header("session-id"), Some("u-d-1"));
        assert_eq!(seen[0].header("message-id"), Some("0"));
        assert_eq!(seen[0].header("session-type"), Some("SYNC"));
        assert_eq!(seen[0].header("max-message-size"), Some("10000"));
        drop(seen);

        assert_eq!(transport.session_id(), "srv-1");
        assert!(matches!(transport.read().unwrap(), Command::SyncResponse(_)));
        assert_eq!(transport.read().unwrap(), Command::EndSyncResponse);
        assert!(transport.read().unwrap_err().is_transport());
    }

    #[test]
    fn oversized_command_is_rejected() {
        let config = config(1024);
        let client = Canned::default();
        let stage = MemoryPayloadStage::new();
        let mut transport = ChunkedTransport::new(&config, &client, &stage);
        transport.open_output("s").unwrap();
        let row = Command::Row(vec![Some("x".repeat(2000))]);
        let err = transport.write(&row).unwrap_err();
        assert!(err.to_string().contains("single command"));
    }

    #[test]
    fn splits_and_pulls_server_continuations() {
        let config = config(1024);
        let row = Command::Row(vec![Some("v".repeat(400))]);
        let client = Canned::with(vec![
            // Reply to the first part: the server wants the rest.
            HttpResponse::ok(MORE_FRAME),
            // Reply to the second part: first half of the response.
            HttpResponse::ok(format!("{}{MORE_FRAME}", frames(&[Command::RefreshData]))),
            HttpResponse::ok(frames(&[Command::EndRefreshData, Command::EndSyncResponse])),
        ]);
        let stage = MemoryPayloadStage::new();
        let mut transport = ChunkedTransport::new(&config, &client, &stage);
        transport.open_output("s").unwrap();
        transport.write(&Command::Dml { op: DmlOp::Insert, table_id: 1 }).unwrap();
        for _ in 0..3 {
            transport.write(&row).unwrap();
        }
        transport.send().unwrap();
        assert_eq!(transport.posts(), 3);
        assert_eq!(stage.count(StageSequence::Outbound).unwrap(), 2);
        assert_eq!(stage.count(StageSequence::Inbound).unwrap(), 3);

        let seen = client.seen.lock();
        assert!(seen[0].body.ends_with(MORE_FRAME));
        assert_eq!(seen[2].body, MORE_FRAME);
        let ids: Vec<_> = seen.iter().map(|r| r.header("message-id").unwrap().to_string()).collect();
        assert_eq!(ids, ["0", "1", "2"]);
        drop(seen);

        assert_eq!(transport.read().unwrap(), Command::RefreshData);
        assert_eq!(transport.read().unwrap(), Command::EndRefreshData);
        assert_eq!(transport.read().unwrap(), Command::EndSyncResponse);
    }

    #[test]
    fn non_ok_status_fails() {
        let config = config(4096);
        let client = Canned::with(vec![HttpResponse {
            status: 503,
            headers: Vec::new(),
            body: String::new(),
        }]);
        let stage = MemoryPayloadStage::new();
        let mut transport = ChunkedTransport::new(&config, &client, &stage);
        transport.open_output("s").unwrap();
        transport.write(&Command::EndSyncRequest).unwrap();
        let err = transport.send().unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn nothing_to_send_fails() {
        let config = config(4096);
        let client = Canned::default();
        let stage = MemoryPayloadStage::new();
        let mut transport = ChunkedTransport::new(&config, &client, &stage);
        transport.open_output("s").unwrap();
        assert!(transport.send().is_err());
        assert!(client.seen.lock().is_empty());
    }

    proptest! {
        #[test]
        fn staged_slots_rebuild_the_command_stream(sizes in prop::collection::vec(0usize..600, 1..40)) {
            let max = 1024;
            let config = config(max);
            let client = Canned::default();
            let stage = MemoryPayloadStage::new();
            let mut transport = ChunkedTransport::new(&config, &client, &stage);
            transport.open_output("s").unwrap();

            let commands: Vec<Command> = sizes
                .iter()
                .map(|n| Command::Row(vec![Some("r".repeat(*n))]))
                .collect();
            for c in &commands {
                transport.write(c).unwrap();
            }
            transport.flush().unwrap();

            let slots = stage.count(StageSequence::Outbound).unwrap() as u64;
            let mut joined = String::new();
            for id in 0..slots {
                let body = stage.get(StageSequence::Outbound, id).unwrap().unwrap();
                let more_count = body.matches(MORE_FRAME).count();
                if id + 1 < slots {
                    prop_assert!(body.ends_with(MORE_FRAME));
                    prop_assert_eq!(more_count, 1);
                    prop_assert!(body.len() <= max + MORE_FRAME.len());
                } else {
                    prop_assert_eq!(more_count, 0);
                    prop_assert!(body.len() <= max);
                }
                joined.push_str(&body);
            }
            let decoded: Vec<Command> = decode_all(&joined)
                .unwrap()
                .into_iter()
                .map(|raw| Command::from_raw(raw).unwrap())
                .collect();
            prop_assert_eq!(decoded, commands);
        }
    }
}
