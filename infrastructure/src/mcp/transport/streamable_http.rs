//! Streamable HTTP transport.
//!
//! Every client message is POSTed to the endpoint. The server answers with
//! `202 Accepted` (notifications, responses), a JSON body, or an event
//! stream carrying the response plus any requests it wants to make first.

use super::{HttpOptions, Transport, pump_events, split_batch};
use crate::mcp::error::{McpError, Result};
use crate::mcp::protocol::PROTOCOL_VERSION;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Header carrying the server-issued session id.
pub const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const ACCEPT_POST: &str = "application/json, text/event-stream";
const ACCEPT_STREAM: &str = "text/event-stream";
/// Session termination is best effort and must not hold up shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq, Eq)]
enum ReplyKind {
    Empty,
    Json,
    EventStream,
}

fn reply_kind(status: StatusCode, content_type: Option<&str>) -> ReplyKind {
    if status == StatusCode::ACCEPTED || status == StatusCode::NO_CONTENT {
        return ReplyKind::Empty;
    }
    match content_type.map(|c| c.to_ascii_lowercase()) {
        Some(c) if c.starts_with("text/event-stream") => ReplyKind::EventStream,
        Some(c) if c.starts_with("application/json") => ReplyKind::Json,
        _ => ReplyKind::Empty,
    }
}

pub struct StreamableHttpTransport {
    endpoint: Url,
    options: HttpOptions,
    session_id: RwLock<Option<String>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl StreamableHttpTransport {
    /// `session_id` resumes a session issued on an earlier connection.
    pub fn new(endpoint: &str, options: HttpOptions, session_id: Option<String>) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| McpError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        Ok(Self {
            endpoint,
            options,
            session_id: RwLock::new(session_id),
            inbound: Mutex::new(None),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    fn current_session(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn inbound_sender(&self) -> Result<mpsc::UnboundedSender<Value>> {
        self.inbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(McpError::TransportClosed)
    }

    /// Record the session id from the first response that carries one.
    fn capture_session(&self, response: &reqwest::Response) {
        let Some(issued) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };

        let mut session = self.session_id.write().unwrap_or_else(|e| e.into_inner());
        match session.as_deref() {
            None => {
                debug!(session = issued, "Session established");
                *session = Some(issued.to_string());
            }
            Some(current) if current != issued => {
                warn!(
                    current = current,
                    issued = issued,
                    "Server issued a different session id mid-session, keeping the original"
                );
            }
            Some(_) => {}
        }
    }

    fn spawn_pump(&self, response: reqwest::Response, inbound: mpsc::UnboundedSender<Value>) {
        tokio::spawn(pump_events(response, inbound, self.cancel.child_token()));
    }

    fn with_session(
        &self,
        request: reqwest::RequestBuilder,
        session: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let request = request.header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION);
        match session {
            Some(id) => request.header(SESSION_HEADER, id),
            None => request,
        }
    }
}

/// Stops any event stream still running when the transport is dropped unclosed.
impl Drop for StreamableHttpTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn start(&self) -> Result<mpsc::UnboundedReceiver<Value>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::TransportClosed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        Ok(rx)
    }

    async fn send(&self, message: &Value) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::TransportClosed);
        }
        let inbound = self.inbound_sender()?;
        let session = self.current_session();

        let response = self
            .options
            .execute(|| {
                let request = self
                    .options
                    .client
                    .post(self.endpoint.clone())
                    .header(ACCEPT, ACCEPT_POST)
                    .json(message);
                self.with_session(request, session.as_deref())
            })
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND && session.is_some() {
            return Err(McpError::SessionExpired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        self.capture_session(&response);

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        match reply_kind(status, content_type.as_deref()) {
            ReplyKind::Empty => Ok(()),
            ReplyKind::EventStream => {
                self.spawn_pump(response, inbound);
                Ok(())
            }
            ReplyKind::Json => {
                let bytes = response.bytes().await?;
                if bytes.is_empty() {
                    return Ok(());
                }
                let value: Value = serde_json::from_slice(&bytes)?;
                for message in split_batch(value) {
                    inbound
                        .send(message)
                        .map_err(|_| McpError::TransportClosed)?;
                }
                Ok(())
            }
        }
    }

    fn session_id(&self) -> Option<String> {
        self.current_session()
    }

    /// Open the optional server-push stream. Servers that don't offer one
    /// answer 405; any failure here only costs server-initiated messages.
    async fn on_initialized(&self) -> Result<()> {
        let inbound = self.inbound_sender()?;
        let session = self.current_session();

        let result = self
            .options
            .execute(|| {
                let request = self
                    .options
                    .client
                    .get(self.endpoint.clone())
                    .header(ACCEPT, ACCEPT_STREAM);
                self.with_session(request, session.as_deref())
            })
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(endpoint = %self.endpoint, "Server push stream opened");
                self.spawn_pump(response, inbound);
            }
            Ok(response) if response.status() == StatusCode::METHOD_NOT_ALLOWED => {
                debug!(endpoint = %self.endpoint, "Server push stream not offered");
            }
            Ok(response) => {
                warn!(
                    endpoint = %self.endpoint,
                    status = response.status().as_u16(),
                    "Could not open server push stream"
                );
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Could not open server push stream");
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();
        self.inbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let Some(session) = self.current_session() else {
            return Ok(());
        };
        let result = self
            .options
            .execute(|| {
                let request = self
                    .options
                    .client
                    .delete(self.endpoint.clone())
                    .timeout(CLOSE_TIMEOUT);
                self.with_session(request, Some(&session))
            })
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                info!(session = %session, "Session terminated");
            }
            Ok(response) => {
                debug!(
                    session = %session,
                    status = response.status().as_u16(),
                    "Server did not accept session termination"
                );
            }
            Err(e) => debug!(session = %session, error = %e, "Session termination failed"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::collections::HashMap;

    fn transport(session: Option<&str>) -> StreamableHttpTransport {
        StreamableHttpTransport::new(
            "https://tools.example.com/mcp",
            HttpOptions::new(reqwest::Client::new()),
            session.map(str::to_string),
        )
        .unwrap()
    }

    #[test]
    fn test_reply_kind() {
        assert_eq!(reply_kind(StatusCode::ACCEPTED, None), ReplyKind::Empty);
        assert_eq!(
            reply_kind(StatusCode::OK, Some("application/json; charset=utf-8")),
            ReplyKind::Json
        );
        assert_eq!(
            reply_kind(StatusCode::OK, Some("text/event-stream")),
            ReplyKind::EventStream
        );
        assert_eq!(reply_kind(StatusCode::OK, Some("text/plain")), ReplyKind::Empty);
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = StreamableHttpTransport::new(
            "not a url",
            HttpOptions::new(reqwest::Client::new()),
            None,
        );
        assert!(matches!(result, Err(McpError::InvalidUrl(_))));
    }

    #[test]
    fn test_existing_session_is_kept() {
        assert_eq!(transport(Some("s-1")).session_id().as_deref(), Some("s-1"));
        assert_eq!(transport(None).session_id(), None);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let transport = transport(None);
        let _rx = transport.start().await.unwrap();
        transport.close().await.unwrap();
        // second close is a no-op
        transport.close().await.unwrap();

        let err = transport
            .send(&serde_json::json!({"jsonrpc": "2.0", "method": "ping", "id": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::TransportClosed));
    }

    #[tokio::test]
    async fn test_close_ends_inbound_stream() {
        let transport = transport(None);
        let mut rx = transport.start().await.unwrap();
        transport.close().await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    // ==================== Against a live HTTP server ====================

    fn served(server: &mockito::Server, session: Option<&str>) -> StreamableHttpTransport {
        let mut headers = HashMap::new();
        headers.insert("X-Api-Key".to_string(), "secret".to_string());
        let options = HttpOptions::new(reqwest::Client::new())
            .with_headers(&headers)
            .unwrap();
        StreamableHttpTransport::new(
            &format!("{}/mcp", server.url()),
            options,
            session.map(str::to_string),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_session_is_captured_once_and_sent_back() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/mcp")
            .match_header("x-api-key", "secret")
            .match_header("accept", ACCEPT_POST)
            .match_header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .match_header(SESSION_HEADER, Matcher::Missing)
            .with_header("content-type", "application/json")
            .with_header(SESSION_HEADER, "s-1")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#)
            .expect(1)
            .create_async()
            .await;
        let later = server
            .mock("POST", "/mcp")
            .match_header("x-api-key", "secret")
            .match_header(SESSION_HEADER, "s-1")
            .with_status(202)
            .with_header(SESSION_HEADER, "s-2")
            .expect(2)
            .create_async()
            .await;

        let transport = served(&server, None);
        let mut rx = transport.start().await.unwrap();

        transport
            .send(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap()["result"]["ok"], true);
        assert_eq!(transport.session_id().as_deref(), Some("s-1"));

        for _ in 0..2 {
            transport
                .send(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .await
                .unwrap();
        }
        // a differing id from the server does not replace the first one
        assert_eq!(transport.session_id().as_deref(), Some("s-1"));

        first.assert_async().await;
        later.assert_async().await;
    }

    #[tokio::test]
    async fn test_event_stream_reply_is_forwarded() {
        let mut server = mockito::Server::new_async().await;
        let _reply = server
            .mock("POST", "/mcp")
            .with_header("content-type", "text/event-stream")
            .with_body(
                "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":\"srv\",\"method\":\"ping\"}\n\n\
                 data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{}}\n\n",
            )
            .create_async()
            .await;

        let transport = served(&server, None);
        let mut rx = transport.start().await.unwrap();
        transport
            .send(&json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap()["method"], "ping");
        assert_eq!(rx.recv().await.unwrap()["id"], 7);
    }

    #[tokio::test]
    async fn test_not_found_with_session_is_session_expired() {
        let mut server = mockito::Server::new_async().await;
        let _stale = server
            .mock("POST", "/mcp")
            .match_header(SESSION_HEADER, "gone")
            .with_status(404)
            .create_async()
            .await;
        let _missing = server
            .mock("POST", "/mcp")
            .match_header(SESSION_HEADER, Matcher::Missing)
            .with_status(404)
            .with_body("no such endpoint")
            .create_async()
            .await;
        let message = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});

        let resumed = served(&server, Some("gone"));
        let _rx = resumed.start().await.unwrap();
        assert!(matches!(
            resumed.send(&message).await,
            Err(McpError::SessionExpired)
        ));

        let fresh = served(&server, None);
        let _rx = fresh.start().await.unwrap();
        assert!(matches!(
            fresh.send(&message).await,
            Err(McpError::HttpStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_push_stream_not_offered_is_tolerated() {
        let mut server = mockito::Server::new_async().await;
        let push = server
            .mock("GET", "/mcp")
            .match_header("accept", ACCEPT_STREAM)
            .match_header(SESSION_HEADER, "s-1")
            .with_status(405)
            .expect(1)
            .create_async()
            .await;

        let transport = served(&server, Some("s-1"));
        let _rx = transport.start().await.unwrap();
        transport.on_initialized().await.unwrap();

        push.assert_async().await;
    }

    #[tokio::test]
    async fn test_push_stream_messages_are_forwarded() {
        let mut server = mockito::Server::new_async().await;
        let _push = server
            .mock("GET", "/mcp")
            .with_header("content-type", "text/event-stream")
            .with_body(
                "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/tools/list_changed\"}\n\n",
            )
            .create_async()
            .await;

        let transport = served(&server, None);
        let mut rx = transport.start().await.unwrap();
        transport.on_initialized().await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap()["method"],
            "notifications/tools/list_changed"
        );
    }

    #[tokio::test]
    async fn test_close_deletes_the_session() {
        let mut server = mockito::Server::new_async().await;
        let delete = server
            .mock("DELETE", "/mcp")
            .match_header("x-api-key", "secret")
            .match_header(SESSION_HEADER, "s-1")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let transport = served(&server, Some("s-1"));
        let _rx = transport.start().await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_close_without_session_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let delete = server
            .mock("DELETE", "/mcp")
            .expect(0)
            .create_async()
            .await;

        let transport = served(&server, None);
        let _rx = transport.start().await.unwrap();
        transport.close().await.unwrap();

        delete.assert_async().await;
    }
}
