//! Tool client port
//!
//! A [`ToolClient`] is a live connection to one self-hosted tool server.
//! Clients are produced by a [`ToolClientFactory`], one per provider per
//! aggregation, and are never shared between providers.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use toolgate_domain::{AuthContext, DiscoveredTool, ProviderConfig, ToolCallOutcome};

/// Errors that can occur while talking to a tool server
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool '{tool}' has an unsupported input schema: {reason}")]
    InvalidToolSchema { tool: String, reason: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Timeout")]
    Timeout,

    #[error("Cancelled")]
    Cancelled,

    #[error("Transport closed")]
    TransportClosed,

    #[error("Other error: {0}")]
    Other(String),
}

/// Connection to one remote tool server
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Id of the provider this client was built for
    fn provider_id(&self) -> &str;

    /// Fully drain the server's paginated tool list
    async fn list_tools(&self) -> Result<Vec<DiscoveredTool>, ClientError>;

    /// Forward one call and return the server's result as-is
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        meta: Option<Value>,
    ) -> Result<ToolCallOutcome, ClientError>;

    /// Close the connection. Calling it twice is harmless.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Builds connected [`ToolClient`]s from provider configuration
#[async_trait]
pub trait ToolClientFactory: Send + Sync {
    /// Connect and complete the handshake; no partially constructed client
    /// is ever returned.
    async fn connect(
        &self,
        provider: &ProviderConfig,
        auth: Option<&AuthContext>,
    ) -> Result<Arc<dyn ToolClient>, ClientError>;
}
