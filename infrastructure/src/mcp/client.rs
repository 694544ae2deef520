//! Tool protocol client: one connection to one tool server.
//!
//! [`McpClient`] owns a [`Transport`] and runs a single background reader
//! task that takes the transport's inbound stream and routes every message:
//!
//! - **Response** → the `pending` oneshot registered by [`McpClient::request`]
//! - **Incoming request** → `ping` is answered directly, capability requests
//!   go to the registered [`InboundHandler`](super::handlers::InboundHandler),
//!   everything else gets "method not found"
//! - **Notification** → logged
//!
//! The transport is never exposed to callers.

use super::error::{McpError, Result};
use super::handlers::{Capability, HandlerChange, HandlerRegistry, InboundHandlers, SharedHandler};
use super::protocol::{
    CLIENT_NAME, CallToolParams, IncomingJsonRpcRequest, Implementation, InitializeParams,
    InitializeResult, JsonRpcNotification, JsonRpcNotificationOut, JsonRpcRequest,
    JsonRpcResponse, JsonRpcResponseOut, ListToolsParams, ListToolsResult, MessageKind,
    PROTOCOL_VERSION, RemoteTool, classify_message, error_codes, methods,
};
use super::transport::Transport;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolgate_application::{ClientError, ToolClient};
use toolgate_domain::{DiscoveredTool, ToolCallOutcome};
use tracing::{debug, info, trace, warn};

/// Default timeout for a single JSON-RPC request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type PendingResponses = Arc<RwLock<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;
type SharedRegistry = Arc<std::sync::RwLock<HandlerRegistry>>;

/// Options for [`McpClient::connect`].
#[derive(Debug, Clone)]
pub struct McpClientOptions {
    pub request_timeout: Duration,
    /// Inbound handlers; only these capabilities are advertised.
    pub handlers: InboundHandlers,
}

impl Default for McpClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handlers: InboundHandlers::default(),
        }
    }
}

impl McpClientOptions {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_handlers(mut self, handlers: InboundHandlers) -> Self {
        self.handlers = handlers;
        self
    }
}

pub struct McpClient {
    provider_id: String,
    transport: Arc<dyn Transport>,
    pending: PendingResponses,
    handlers: SharedRegistry,
    server: OnceLock<InitializeResult>,
    session_id: OnceLock<String>,
    request_timeout: Duration,
    cancel: CancellationToken,
    closed: AtomicBool,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl McpClient {
    /// Start the transport, perform the handshake and return a ready client.
    ///
    /// Fails as a whole when the handshake fails; the transport is closed
    /// before the error is returned.
    pub async fn connect(
        provider_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        options: McpClientOptions,
    ) -> Result<Self> {
        let provider_id = provider_id.into();
        let inbound = transport.start().await?;

        let client = Self {
            provider_id,
            transport,
            pending: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(std::sync::RwLock::new(HandlerRegistry::new(options.handlers))),
            server: OnceLock::new(),
            session_id: OnceLock::new(),
            request_timeout: options.request_timeout,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            reader: std::sync::Mutex::new(None),
        };
        client.spawn_reader(inbound);

        if let Err(e) = client.handshake().await {
            warn!(provider = %client.provider_id, error = %e, "Handshake failed");
            if let Err(close_err) = client.close().await {
                debug!(provider = %client.provider_id, error = %close_err, "Close after failed handshake");
            }
            return Err(e);
        }
        Ok(client)
    }

    fn spawn_reader(&self, inbound: mpsc::UnboundedReceiver<Value>) {
        let handle = tokio::spawn(reader_loop(
            self.provider_id.clone(),
            inbound,
            Arc::clone(&self.transport),
            Arc::clone(&self.pending),
            Arc::clone(&self.handlers),
            self.cancel.clone(),
        ));
        *self.reader.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    async fn handshake(&self) -> Result<()> {
        let capabilities = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .client_capabilities();
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities,
            client_info: Implementation {
                name: CLIENT_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let result: InitializeResult = serde_json::from_value(
            self.request(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
                .await?,
        )?;
        if result.protocol_version != PROTOCOL_VERSION {
            debug!(
                provider = %self.provider_id,
                requested = PROTOCOL_VERSION,
                negotiated = %result.protocol_version,
                "Server negotiated a different protocol version"
            );
        }

        self.notify(methods::INITIALIZED, None).await?;

        if let Some(session_id) = self.transport.session_id() {
            debug!(provider = %self.provider_id, session = %session_id, "Session assigned");
            let _ = self.session_id.set(session_id);
        }
        info!(
            provider = %self.provider_id,
            server = result.server_info.as_ref().map(|s| s.name.as_str()).unwrap_or("unknown"),
            "Connected to tool server"
        );
        let _ = self.server.set(result);

        match tokio::time::timeout(self.request_timeout, self.transport.on_initialized()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(provider = %self.provider_id, "Post-handshake transport setup timed out");
                Ok(())
            }
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Session id recorded at handshake, if the transport was assigned one.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.get().map(String::as_str)
    }

    pub fn server_info(&self) -> Option<&Implementation> {
        self.server.get().and_then(|s| s.server_info.as_ref())
    }

    pub fn server_capabilities(&self) -> Option<&Value> {
        self.server.get().map(|s| &s.capabilities)
    }

    pub fn instructions(&self) -> Option<&str> {
        self.server.get().and_then(|s| s.instructions.as_deref())
    }

    /// Send a request and wait for the correlated response.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::TransportClosed);
        }

        let request = JsonRpcRequest::new(method, params);
        let request_id = request.id;
        let message = serde_json::to_value(&request)?;
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.write().await;
            pending.insert(request_id, tx);
        }

        trace!(provider = %self.provider_id, "Sending: {}", message);
        // One deadline covers the send (an HTTP POST may carry the reply) and the wait
        let exchange = async {
            self.transport.send(&message).await?;
            rx.await.map_err(|_| McpError::TransportClosed)
        };
        let response = match tokio::time::timeout(self.request_timeout, exchange).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.forget(request_id).await;
                return Err(e);
            }
            Err(_) => {
                self.forget(request_id).await;
                return Err(McpError::Timeout(format!(
                    "{} got no response within {:?}",
                    method, self.request_timeout
                )));
            }
        };

        if let Some(error) = response.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response.result.ok_or_else(|| {
            McpError::UnexpectedResponse(format!("{} response has neither result nor error", method))
        })
    }

    async fn forget(&self, request_id: u64) {
        let mut pending = self.pending.write().await;
        pending.remove(&request_id);
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let message = serde_json::to_value(JsonRpcNotificationOut::new(method, params))?;
        trace!(provider = %self.provider_id, "Sending: {}", message);
        tokio::time::timeout(self.request_timeout, self.transport.send(&message))
            .await
            .map_err(|_| {
                McpError::Timeout(format!("{} not accepted within {:?}", method, self.request_timeout))
            })?
    }

    /// List every tool the server offers, following `nextCursor` page by page.
    pub async fn list_tools(&self) -> Result<Vec<DiscoveredTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let params = serde_json::to_value(ListToolsParams {
                cursor: cursor.take(),
            })?;
            let page: ListToolsResult =
                serde_json::from_value(self.request(methods::TOOLS_LIST, Some(params)).await?)?;
            pages += 1;

            for tool in page.tools {
                tools.push(into_discovered(tool)?);
            }

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(
            provider = %self.provider_id,
            tools = tools.len(),
            pages = pages,
            "Listed tools"
        );
        Ok(tools)
    }

    /// Invoke a tool. The result is returned as the server sent it.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        meta: Option<Value>,
    ) -> Result<ToolCallOutcome> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
            meta,
        })?;
        let result = self.request(methods::TOOLS_CALL, Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub fn update_elicitation_handler(
        &self,
        handler: Option<SharedHandler>,
    ) -> Result<HandlerChange> {
        self.update_handler(Capability::Elicitation, handler)
    }

    pub fn update_sampling_handler(&self, handler: Option<SharedHandler>) -> Result<HandlerChange> {
        self.update_handler(Capability::Sampling, handler)
    }

    fn update_handler(
        &self,
        capability: Capability,
        handler: Option<SharedHandler>,
    ) -> Result<HandlerChange> {
        let change = self
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .update(capability, handler)?;
        if change != HandlerChange::Unchanged {
            debug!(
                provider = %self.provider_id,
                capability = %capability,
                change = ?change,
                "Inbound handler updated"
            );
        }
        Ok(change)
    }

    /// Close the transport, then stop the reader and fail pending requests.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = self.transport.close().await;
        self.cancel.cancel();
        let reader = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = reader
            && let Err(e) = handle.await
        {
            debug!(provider = %self.provider_id, "Reader task ended abnormally: {}", e);
        }
        {
            let mut pending = self.pending.write().await;
            pending.clear();
        }
        debug!(provider = %self.provider_id, "Client closed");
        result
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("provider_id", &self.provider_id)
            .field("session_id", &self.session_id.get())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Check the root schema type; a missing type counts as a violation.
fn into_discovered(tool: RemoteTool) -> Result<DiscoveredTool> {
    match tool.input_schema.get("type").and_then(Value::as_str) {
        Some("object") => {}
        other => {
            return Err(McpError::InvalidToolSchema {
                tool: tool.name,
                found: other.unwrap_or("missing").to_string(),
            });
        }
    }
    Ok(DiscoveredTool {
        name: tool.name,
        description: tool.description,
        input_schema: tool.input_schema,
    })
}

async fn reader_loop(
    provider_id: String,
    mut inbound: mpsc::UnboundedReceiver<Value>,
    transport: Arc<dyn Transport>,
    pending: PendingResponses,
    handlers: SharedRegistry,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = inbound.recv() => match message {
                Some(message) => message,
                None => {
                    debug!(provider = %provider_id, "Inbound stream ended");
                    break;
                }
            },
        };
        trace!(provider = %provider_id, "Received: {}", message);

        match classify_message(&message) {
            MessageKind::Response => route_response(&provider_id, &pending, message).await,
            MessageKind::IncomingRequest { .. } => {
                handle_incoming_request(&provider_id, &transport, &handlers, message)
            }
            MessageKind::Notification => log_notification(&provider_id, message),
            MessageKind::Invalid => {
                warn!(provider = %provider_id, "Dropping message without id or method");
            }
        }
    }

    // Reader ended: drop all senders so waiting requests fail fast
    let mut pending = pending.write().await;
    pending.clear();
}

async fn route_response(provider_id: &str, pending: &PendingResponses, message: Value) {
    let response: JsonRpcResponse = match serde_json::from_value(message) {
        Ok(response) => response,
        Err(e) => {
            warn!(provider = provider_id, "Failed to parse response: {}", e);
            return;
        }
    };
    let Some(id) = response.id.as_ref().and_then(Value::as_u64) else {
        debug!(provider = provider_id, id = ?response.id, "Response id is not ours");
        return;
    };

    let sender = {
        let mut pending = pending.write().await;
        pending.remove(&id)
    };
    match sender {
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => debug!(provider = provider_id, id = id, "No pending request for response"),
    }
}

fn handle_incoming_request(
    provider_id: &str,
    transport: &Arc<dyn Transport>,
    handlers: &SharedRegistry,
    message: Value,
) {
    let request: IncomingJsonRpcRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(e) => {
            warn!(provider = provider_id, "Failed to parse incoming request: {}", e);
            return;
        }
    };
    debug!(provider = provider_id, method = %request.method, "Incoming request");

    let handler = handlers
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .handler_for_method(&request.method);
    let transport = Arc::clone(transport);
    let provider_id = provider_id.to_string();

    tokio::spawn(async move {
        let reply = if request.method == methods::PING {
            JsonRpcResponseOut::success(request.id, json!({}))
        } else if let Some(handler) = handler {
            match handler.handle(request.params.unwrap_or_else(|| json!({}))).await {
                Ok(result) => JsonRpcResponseOut::success(request.id, result),
                Err(message) => {
                    warn!(provider = %provider_id, method = %request.method, error = %message, "Inbound handler failed");
                    JsonRpcResponseOut::error(request.id, error_codes::INTERNAL_ERROR, message)
                }
            }
        } else {
            JsonRpcResponseOut::error(
                request.id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )
        };

        let message = match serde_json::to_value(&reply) {
            Ok(message) => message,
            Err(e) => {
                warn!(provider = %provider_id, "Failed to serialize reply: {}", e);
                return;
            }
        };
        trace!(provider = %provider_id, "Sending: {}", message);
        if let Err(e) = transport.send(&message).await {
            warn!(provider = %provider_id, error = %e, "Failed to send reply");
        }
    });
}

fn log_notification(provider_id: &str, message: Value) {
    let notification: JsonRpcNotification = match serde_json::from_value(message) {
        Ok(notification) => notification,
        Err(e) => {
            warn!(provider = provider_id, "Failed to parse notification: {}", e);
            return;
        }
    };
    match notification.method.as_str() {
        methods::TOOLS_LIST_CHANGED => {
            debug!(provider = provider_id, "Server reports its tool list changed");
        }
        method => debug!(provider = provider_id, method = method, "Notification"),
    }
}

#[async_trait]
impl ToolClient for McpClient {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn list_tools(&self) -> std::result::Result<Vec<DiscoveredTool>, ClientError> {
        Ok(McpClient::list_tools(self).await?)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        meta: Option<Value>,
    ) -> std::result::Result<ToolCallOutcome, ClientError> {
        Ok(McpClient::call_tool(self, name, arguments, meta).await?)
    }

    async fn close(&self) -> std::result::Result<(), ClientError> {
        Ok(McpClient::close(self).await?)
    }
}
