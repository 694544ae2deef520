//! Server-sent events transport.
//!
//! The client keeps one GET event stream open. The first `endpoint` event
//! names the URL to POST messages to; responses and server requests arrive
//! as `message` events on the stream.

use super::{HttpOptions, Transport, parse_message_event};
use crate::mcp::error::{McpError, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Url;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const ENDPOINT_EVENT: &str = "endpoint";

/// How long to wait for the `endpoint` event after the stream opens.
pub const DEFAULT_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SseTransport {
    endpoint: Url,
    options: HttpOptions,
    endpoint_timeout: Duration,
    post_url: RwLock<Option<Url>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl SseTransport {
    pub fn new(endpoint: &str, options: HttpOptions) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| McpError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        Ok(Self {
            endpoint,
            options,
            endpoint_timeout: DEFAULT_ENDPOINT_TIMEOUT,
            post_url: RwLock::new(None),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn with_endpoint_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint_timeout = timeout;
        self
    }

    fn post_url(&self) -> Option<Url> {
        self.post_url
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Resolve the `endpoint` event data against the stream URL.
fn resolve_endpoint(base: &Url, data: &str) -> Result<Url> {
    base.join(data.trim())
        .map_err(|e| McpError::InvalidUrl(format!("{}: {}", data.trim(), e)))
}

/// SSE servers key sessions by a query parameter on the POST URL.
fn session_from_url(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "sessionId" || key == "session_id")
        .map(|(_, value)| value.into_owned())
}

async fn run_stream(
    response: reqwest::Response,
    base: Url,
    inbound: mpsc::UnboundedSender<Value>,
    endpoint_tx: oneshot::Sender<Result<Url>>,
    cancel: CancellationToken,
) {
    let stream = response.bytes_stream().eventsource();
    tokio::pin!(stream);
    let mut endpoint_tx = Some(endpoint_tx);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(url = %base, "Event stream cancelled");
                return;
            }
            next = stream.next() => next,
        };
        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                warn!(url = %base, "Event stream error: {}", e);
                break;
            }
            None => break,
        };
        trace!(event = %event.event, "Event stream data: {}", event.data);

        if event.event == ENDPOINT_EVENT {
            match endpoint_tx.take() {
                Some(tx) => {
                    let _ = tx.send(resolve_endpoint(&base, &event.data));
                }
                None => debug!("Ignoring repeated endpoint event"),
            }
            continue;
        }

        let Some(messages) = parse_message_event(&event.event, &event.data) else {
            continue;
        };
        for message in messages {
            if inbound.send(message).is_err() {
                return;
            }
        }
    }

    // Dropping `inbound` here lets the client see the close.
    info!(url = %base, "Event stream closed by server");
}

/// Stops any event stream still running when the transport is dropped unclosed.
impl Drop for SseTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn start(&self) -> Result<mpsc::UnboundedReceiver<Value>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::TransportClosed);
        }

        let response = self
            .options
            .execute(|| {
                self.options
                    .client
                    .get(self.endpoint.clone())
                    .header(ACCEPT, "text/event-stream")
            })
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        tokio::spawn(run_stream(
            response,
            self.endpoint.clone(),
            tx,
            endpoint_tx,
            self.cancel.child_token(),
        ));

        let post_url = match tokio::time::timeout(self.endpoint_timeout, endpoint_rx).await {
            Ok(Ok(url)) => url?,
            Ok(Err(_)) => return Err(McpError::TransportClosed),
            Err(_) => {
                self.cancel.cancel();
                return Err(McpError::Timeout(
                    "event stream did not announce an endpoint".into(),
                ));
            }
        };
        debug!(url = %post_url, "Event stream endpoint received");
        *self.post_url.write().unwrap_or_else(|e| e.into_inner()) = Some(post_url);
        Ok(rx)
    }

    async fn send(&self, message: &Value) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::TransportClosed);
        }
        let post_url = self.post_url().ok_or(McpError::TransportClosed)?;

        let response = self
            .options
            .execute(|| self.options.client.post(post_url.clone()).json(message))
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.post_url().as_ref().and_then(session_from_url)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cancel.cancel();
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

    fn served(server: &mockito::Server) -> SseTransport {
        let mut headers = HashMap::new();
        headers.insert("X-Api-Key".to_string(), "secret".to_string());
        let options = HttpOptions::new(reqwest::Client::new())
            .with_headers(&headers)
            .unwrap();
        SseTransport::new(&format!("{}/v1/sse", server.url()), options)
            .unwrap()
            .with_endpoint_timeout(Duration::from_secs(2))
    }

    #[test]
    fn test_resolve_relative_endpoint() {
        let base = Url::parse("https://tools.example.com/v1/sse").unwrap();
        let url = resolve_endpoint(&base, "/messages?sessionId=abc\n").unwrap();
        assert_eq!(url.as_str(), "https://tools.example.com/messages?sessionId=abc");

        let sibling = resolve_endpoint(&base, "messages").unwrap();
        assert_eq!(sibling.as_str(), "https://tools.example.com/v1/messages");
    }

    #[test]
    fn test_resolve_absolute_endpoint() {
        let base = Url::parse("https://tools.example.com/sse").unwrap();
        let url = resolve_endpoint(&base, "https://other.example.com/post").unwrap();
        assert_eq!(url.host_str(), Some("other.example.com"));
    }

    #[test]
    fn test_session_from_url() {
        let url = Url::parse("https://x/messages?sessionId=s-42").unwrap();
        assert_eq!(session_from_url(&url).as_deref(), Some("s-42"));

        let snake = Url::parse("https://x/messages?session_id=s-7&x=1").unwrap();
        assert_eq!(session_from_url(&snake).as_deref(), Some("s-7"));

        let none = Url::parse("https://x/messages").unwrap();
        assert_eq!(session_from_url(&none), None);
    }

    #[tokio::test]
    async fn test_send_before_start_fails() {
        let transport =
            SseTransport::new("https://x/sse", HttpOptions::new(reqwest::Client::new())).unwrap();
        let err = transport
            .send(&serde_json::json!({"jsonrpc": "2.0", "method": "ping"}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::TransportClosed));
        assert!(transport.session_id().is_none());
    }

    #[tokio::test]
    async fn test_endpoint_event_then_post_to_resolved_url() {
        let mut server = mockito::Server::new_async().await;
        let stream = server
            .mock("GET", "/v1/sse")
            .match_header("x-api-key", "secret")
            .match_header("accept", "text/event-stream")
            .with_header("content-type", "text/event-stream")
            .with_body(
                "event: endpoint\ndata: /messages?sessionId=abc\n\n\
                 event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/tools/list_changed\"}\n\n",
            )
            .expect(1)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/messages")
            .match_query(Matcher::UrlEncoded("sessionId".into(), "abc".into()))
            .match_header("x-api-key", "secret")
            .match_body(Matcher::PartialJson(json!({"method": "ping"})))
            .with_status(202)
            .expect(1)
            .create_async()
            .await;

        let transport = served(&server);
        let mut rx = transport.start().await.unwrap();
        assert_eq!(transport.session_id().as_deref(), Some("abc"));

        assert_eq!(
            rx.recv().await.unwrap()["method"],
            "notifications/tools/list_changed"
        );
        transport
            .send(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
            .await
            .unwrap();
        // the server ended the stream: inbound closes
        assert!(rx.recv().await.is_none());

        stream.assert_async().await;
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_stream_without_endpoint_fails_start() {
        let mut server = mockito::Server::new_async().await;
        let _stream = server
            .mock("GET", "/v1/sse")
            .with_header("content-type", "text/event-stream")
            .with_body(": keep-alive\n\n")
            .create_async()
            .await;

        let transport = served(&server);
        assert!(matches!(
            transport.start().await,
            Err(McpError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn test_stream_refused() {
        let mut server = mockito::Server::new_async().await;
        let _stream = server
            .mock("GET", "/v1/sse")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let transport = served(&server);
        assert!(matches!(
            transport.start().await,
            Err(McpError::HttpStatus { status: 403, .. })
        ));
    }
}
