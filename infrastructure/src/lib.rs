//! Infrastructure layer for toolgate
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: the tool protocol client and its factory,
//! configuration file loading and the file-backed project store.

pub mod config;
pub mod mcp;

// Re-export commonly used types
pub use config::{
    ConfigError, ConfigIssue, ConfigLoader, FileConfig, FileProjectStore, Severity,
};
pub use mcp::{
    McpClient, McpClientFactory, McpClientOptions, McpError, Result, http_client,
    handlers::{InboundHandlers, handler_fn},
};
