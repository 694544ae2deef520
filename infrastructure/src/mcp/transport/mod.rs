//! Wire transports for the tool protocol.
//!
//! A transport moves raw JSON-RPC messages; correlation, the handshake and
//! inbound dispatch live in [`McpClient`](super::client::McpClient).
//!
//! - [`StreamableHttpTransport`]: POST per message, replies as JSON or an
//!   event stream, optional `mcp-session-id` affinity
//! - [`SseTransport`]: one long-lived event stream, messages POSTed to the
//!   endpoint the stream announces

pub mod sse;
pub mod streamable_http;

pub use sse::SseTransport;
pub use streamable_http::StreamableHttpTransport;

use super::auth::AuthProvider;
use super::error::{McpError, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Bidirectional message channel to one tool server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the transport and hand over the inbound message stream.
    ///
    /// The receiver yields `None` once the server closes the stream or
    /// [`close`](Self::close) is called.
    async fn start(&self) -> Result<mpsc::UnboundedReceiver<Value>>;

    /// Send one JSON-RPC message (request, response or notification).
    async fn send(&self, message: &Value) -> Result<()>;

    /// Session id assigned by the server, if any.
    fn session_id(&self) -> Option<String>;

    /// Called once the handshake completed.
    async fn on_initialized(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()>;
}

/// HTTP settings shared by both transports.
#[derive(Clone)]
pub struct HttpOptions {
    pub client: reqwest::Client,
    pub headers: HeaderMap,
    pub auth: Option<Arc<dyn AuthProvider>>,
}

impl HttpOptions {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            headers: HeaderMap::new(),
            auth: None,
        }
    }

    pub fn with_headers(mut self, headers: &HashMap<String, String>) -> Result<Self> {
        self.headers = build_header_map(headers)?;
        Ok(self)
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Send a request built by `build`, attaching custom headers and the
    /// bearer token. A 401 triggers one refresh and one retry.
    pub(crate) async fn execute<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let response = self.execute_once(&build).await?;
        if response.status() == StatusCode::UNAUTHORIZED
            && let Some(auth) = &self.auth
        {
            debug!("Server answered 401, refreshing credentials");
            auth.refresh().await?;
            return self.execute_once(&build).await;
        }
        Ok(response)
    }

    async fn execute_once<F>(&self, build: &F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut request = build().headers(self.headers.clone());
        if let Some(auth) = &self.auth {
            request = request.bearer_auth(auth.access_token().await?);
        }
        Ok(request.send().await?)
    }
}

impl std::fmt::Debug for HttpOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOptions")
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("auth", &self.auth.is_some())
            .finish()
    }
}

/// Convert configured custom headers, rejecting names or values HTTP can't carry.
pub fn build_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| McpError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| McpError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Turn a JSON body into individual messages (a batch is flattened).
pub(crate) fn split_batch(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Parse the data of one `message` event. Other event types return `None`.
pub(crate) fn parse_message_event(event_type: &str, data: &str) -> Option<Vec<Value>> {
    if !(event_type.is_empty() || event_type == "message") || data.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(value) => Some(split_batch(value)),
        Err(e) => {
            warn!("Dropping malformed event data: {}", e);
            None
        }
    }
}

/// Forward `message` events from an HTTP event-stream body until it ends,
/// the receiver is gone, or `cancel` fires.
pub(crate) async fn pump_events(
    response: reqwest::Response,
    inbound: mpsc::UnboundedSender<Value>,
    cancel: CancellationToken,
) {
    let stream = response.bytes_stream().eventsource();
    tokio::pin!(stream);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(event)) => {
                trace!(event = %event.event, "Event stream data: {}", event.data);
                let Some(messages) = parse_message_event(&event.event, &event.data) else {
                    continue;
                };
                for message in messages {
                    if inbound.send(message).is_err() {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                warn!("Event stream error: {}", e);
                break;
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out `at-<n>` where `n` counts refreshes so far.
    #[derive(Default)]
    struct CountingAuth {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl AuthProvider for CountingAuth {
        async fn access_token(&self) -> Result<String> {
            Ok(format!("at-{}", self.refreshes.load(Ordering::SeqCst)))
        }

        async fn refresh(&self) -> Result<()> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn options_with(auth: &Arc<CountingAuth>) -> HttpOptions {
        let mut headers = HashMap::new();
        headers.insert("X-Tenant".to_string(), "acme".to_string());
        HttpOptions::new(reqwest::Client::new())
            .with_headers(&headers)
            .unwrap()
            .with_auth(Arc::clone(auth) as Arc<dyn AuthProvider>)
    }

    #[test]
    fn test_build_header_map() {
        let mut headers = HashMap::new();
        headers.insert("X-Api-Key".to_string(), "secret".to_string());
        let map = build_header_map(&headers).unwrap();
        assert_eq!(map.get("x-api-key").unwrap(), "secret");
    }

    #[test]
    fn test_build_header_map_rejects_bad_name() {
        let mut headers = HashMap::new();
        headers.insert("bad header".to_string(), "v".to_string());
        let err = build_header_map(&headers).unwrap_err();
        assert!(matches!(err, McpError::InvalidHeader { name, .. } if name == "bad header"));
    }

    #[test]
    fn test_split_batch() {
        assert_eq!(split_batch(json!({"id": 1})).len(), 1);
        assert_eq!(split_batch(json!([{"id": 1}, {"id": 2}])).len(), 2);
    }

    #[test]
    fn test_parse_message_event() {
        let parsed = parse_message_event("message", r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
        assert_eq!(parsed.unwrap()[0]["id"], 1);

        assert!(parse_message_event("", r#"{"id":2}"#).is_some());
        assert!(parse_message_event("endpoint", "/messages?sessionId=1").is_none());
        assert!(parse_message_event("message", "  ").is_none());
        assert!(parse_message_event("message", "not json").is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once_and_retries() {
        let mut server = mockito::Server::new_async().await;
        let rejected = server
            .mock("GET", "/tools")
            .match_header("x-tenant", "acme")
            .match_header("authorization", "Bearer at-0")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("GET", "/tools")
            .match_header("x-tenant", "acme")
            .match_header("authorization", "Bearer at-1")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let auth = Arc::new(CountingAuth::default());
        let options = options_with(&auth);
        let url = format!("{}/tools", server.url());
        let response = options.execute(|| options.client.get(&url)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
        rejected.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_returned() {
        let mut server = mockito::Server::new_async().await;
        let always = server
            .mock("GET", "/tools")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let auth = Arc::new(CountingAuth::default());
        let options = options_with(&auth);
        let url = format!("{}/tools", server.url());
        let response = options.execute(|| options.client.get(&url)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
        always.assert_async().await;
    }
}
