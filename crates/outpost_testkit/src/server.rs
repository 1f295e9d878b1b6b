//! A scripted sync server.
//!
//! [`ScriptedServer`] plugs into the engine's HTTP seam. Each client post
//! that carries the end of a request pops the next scripted reply; posts
//! that end in a client continuation marker are acknowledged with an
//! empty body, the way a real server buffers a multi-message request.

use outpost_codec::{decode_all, MORE_FRAME};
use outpost_sync_engine::{HttpClient, HttpRequest, HttpResponse, HEADER_MESSAGE_ID, HEADER_SESSION_ID};
use outpost_sync_protocol::{encode_command, Command};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Default)]
struct Script {
    replies: VecDeque<HttpResponse>,
    requests: Vec<HttpRequest>,
}

/// Replays queued responses and records every request.
///
/// Clones share one script, so a test can keep a handle after moving a
/// clone into the agent.
#[derive(Clone, Default)]
pub struct ScriptedServer {
    script: Arc<Mutex<Script>>,
}

/// Encodes commands into one response body.
pub fn encode_body(commands: &[Command]) -> String {
    commands
        .iter()
        .map(|c| encode_command(c).expect("Failed to encode command"))
        .collect()
}

impl ScriptedServer {
    /// Creates a server with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw response.
    pub fn reply(&self, response: HttpResponse) {
        self.script.lock().replies.push_back(response);
    }

    /// Queues a 200 response carrying `commands`.
    pub fn reply_commands(&self, commands: &[Command]) {
        self.reply(HttpResponse::ok(encode_body(commands)));
    }

    /// Queues one response split into parts: every part but the last ends
    /// with the continuation sentinel, so the client pulls the next one.
    pub fn reply_in_parts(&self, parts: &[Vec<Command>]) {
        for (i, part) in parts.iter().enumerate() {
            let mut body = encode_body(part);
            if i + 1 < parts.len() {
                body.push_str(MORE_FRAME);
            }
            self.reply(HttpResponse::ok(body));
        }
    }

    /// Queues an error status.
    pub fn reply_status(&self, status: u16) {
        self.reply(HttpResponse {
            status,
            headers: Vec::new(),
            body: String::new(),
        });
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().requests.clone()
    }

    /// Number of scripted replies not yet consumed.
    pub fn pending_replies(&self) -> usize {
        self.script.lock().replies.len()
    }

    /// Forgets the recorded requests.
    pub fn clear_requests(&self) {
        self.script.lock().requests.clear();
    }

    /// Commands of every recorded request, in order, continuation markers
    /// and sentinel pulls dropped.
    pub fn received_commands(&self) -> Vec<Command> {
        self.requests()
            .iter()
            .filter(|r| r.body != MORE_FRAME)
            .flat_map(|r| decode_all(&r.body).expect("Failed to decode request body"))
            .map(|raw| Command::from_raw(raw).expect("Failed to map request command"))
            .collect()
    }

    /// Names of [`ScriptedServer::received_commands`].
    pub fn received_names(&self) -> Vec<&'static str> {
        self.received_commands().iter().map(Command::name).collect()
    }
}

impl HttpClient for ScriptedServer {
    fn post(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        let mut script = self.script.lock();
        script.requests.push(request.clone());

        let client_has_more = request.body.len() > MORE_FRAME.len() && request.body.ends_with(MORE_FRAME);
        let mut response = if client_has_more {
            HttpResponse::ok("")
        } else {
            script
                .replies
                .pop_front()
                .ok_or_else(|| "scripted server has no reply left".to_string())?
        };

        // Echo the session headers like the real server.
        for name in [HEADER_SESSION_ID, HEADER_MESSAGE_ID] {
            if response.header(name).is_none() {
                if let Some(value) = request.header(name) {
                    response = response.with_header(name, value);
                }
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(server: &ScriptedServer, body: &str) -> Result<HttpResponse, String> {
        server.post(&HttpRequest {
            url: "http://scripted.test".into(),
            headers: vec![(HEADER_SESSION_ID.into(), "s-1".into())],
            body: body.into(),
        })
    }

    #[test]
    fn replies_in_order_and_echoes_session() {
        let server = ScriptedServer::new();
        server.reply_commands(&[Command::EndSyncResponse]);
        server.reply_status(500);

        let first = post(&server, &encode_body(&[Command::EndSyncRequest])).unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(first.header(HEADER_SESSION_ID), Some("s-1"));
        assert_eq!(post(&server, "x").unwrap().status, 500);
        assert!(post(&server, "x").is_err());
    }

    #[test]
    fn continued_requests_are_acknowledged() {
        let server = ScriptedServer::new();
        server.reply_commands(&[Command::EndSyncResponse]);

        let mut head = encode_body(&[Command::CheckInData]);
        head.push_str(MORE_FRAME);
        assert_eq!(post(&server, &head).unwrap().body, "");
        assert_eq!(server.pending_replies(), 1);
        post(&server, &encode_body(&[Command::EndCheckInData])).unwrap();
        assert_eq!(server.pending_replies(), 0);
        assert_eq!(server.received_names(), vec!["CHECK_IN_DATA", "END_CHECK_IN_DATA"]);
    }

    #[test]
    fn parts_end_with_sentinel() {
        let server = ScriptedServer::new();
        server.reply_in_parts(&[vec![Command::RefreshData], vec![Command::EndRefreshData]]);
        let first = post(&server, MORE_FRAME).unwrap();
        assert!(first.body.ends_with(MORE_FRAME));
        let last = post(&server, MORE_FRAME).unwrap();
        assert!(!last.body.ends_with(MORE_FRAME));
    }
}
