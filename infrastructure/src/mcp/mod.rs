//! Tool protocol client
//!
//! Speaks the JSON-RPC tool protocol to remote tool servers over
//! streamable HTTP or server-sent events.
//!
//! # Components
//!
//! - [`protocol`]: envelope and payload types, [`classify_message`](protocol::classify_message)
//! - [`transport`]: the two wire transports behind the [`Transport`] trait
//! - [`auth`]: bearer credentials from stored refresh tokens
//! - [`handlers`]: inbound capability handlers and their state machine
//! - [`client`]: [`McpClient`], handshake, pagination, invocation
//! - [`factory`]: [`McpClientFactory`], the application's `ToolClientFactory`

pub mod auth;
pub mod client;
pub mod error;
pub mod factory;
pub mod handlers;
pub mod protocol;
pub mod transport;

pub use auth::{AuthProvider, StoredTokenAuthProvider};
pub use client::{McpClient, McpClientOptions};
pub use error::{McpError, Result};
pub use factory::{McpClientFactory, http_client};
pub use handlers::{Capability, HandlerChange, InboundHandler, InboundHandlers, handler_fn};
pub use transport::{HttpOptions, SseTransport, StreamableHttpTransport, Transport};
