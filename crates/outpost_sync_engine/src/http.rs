//! HTTP client seam.
//!
//! The transport builds requests and interprets responses; an
//! [`HttpClient`] only moves bytes. The default `http` feature provides
//! [`BlockingHttpClient`] on top of reqwest; tests plug in a scripted
//! server instead.

/// An outgoing POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Endpoint URL.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Framed command buffer.
    pub body: String,
}

impl HttpRequest {
    /// Value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// A 200 response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// HTTP client abstraction.
///
/// Implement this trait to carry sync messages over a different HTTP
/// library or a non-HTTP channel.
pub trait HttpClient: Send + Sync {
    /// Sends a POST and returns the reply, whatever its status.
    ///
    /// Errors are connection-level failures such as timeouts.
    fn post(&self, request: &HttpRequest) -> Result<HttpResponse, String>;
}

#[cfg(feature = "http")]
mod blocking {
    use super::{HttpClient, HttpRequest, HttpResponse};
    use crate::error::{SyncError, SyncResult};
    use std::time::Duration;
    use tracing::debug;

    /// [`HttpClient`] over a blocking reqwest client.
    #[derive(Debug, Clone)]
    pub struct BlockingHttpClient {
        client: reqwest::blocking::Client,
    }

    impl BlockingHttpClient {
        /// Creates a client whose requests time out after `timeout`.
        pub fn new(timeout: Duration) -> SyncResult<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| SyncError::transport(format!("cannot build HTTP client: {e}")))?;
            Ok(Self { client })
        }
    }

    impl HttpClient for BlockingHttpClient {
        fn post(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
            let mut builder = self.client.post(&request.url).body(request.body.clone());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            let response = builder.send().map_err(|e| e.to_string())?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| {
                    v.to_str()
                        .ok()
                        .map(|v| (k.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response.text().map_err(|e| e.to_string())?;
            debug!(status, bytes = body.len(), "received HTTP response");
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

#[cfg(feature = "http")]
pub use blocking::BlockingHttpClient;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_ignore_case() {
        let response = HttpResponse::ok("x").with_header("Session-Id", "s-1");
        assert_eq!(response.header("session-id"), Some("s-1"));
        assert_eq!(response.header("message-id"), None);

        let request = HttpRequest {
            url: "http://h".into(),
            headers: vec![("message-id".into(), "3".into())],
            body: String::new(),
        };
        assert_eq!(request.header("MESSAGE-ID"), Some("3"));
    }

    #[cfg(feature = "http")]
    #[test]
    fn blocking_client_builds() {
        assert!(BlockingHttpClient::new(std::time::Duration::from_secs(1)).is_ok());
    }
}
