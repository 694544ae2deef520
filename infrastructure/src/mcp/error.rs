//! Error types for the tool protocol client

use super::handlers::Capability;
use thiserror::Error;
use toolgate_application::ClientError;

/// Result type alias for tool protocol operations
pub type Result<T> = std::result::Result<T, McpError>;

/// Errors that can occur when talking to a tool server
#[derive(Error, Debug)]
pub enum McpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Server returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("JSON-RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Tool '{tool}' declares a '{found}' input schema; only 'object' is supported")]
    InvalidToolSchema { tool: String, found: String },

    #[error("Capability '{0}' was not negotiated at handshake and cannot be enabled later")]
    CapabilityNotNegotiated(Capability),

    #[error("Session expired")]
    SessionExpired,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Request timeout: {0}")]
    Timeout(String),
}

impl From<McpError> for ClientError {
    fn from(error: McpError) -> Self {
        match error {
            McpError::Http(e) => ClientError::Connection(e.to_string()),
            McpError::HttpStatus { status, body } => {
                ClientError::Connection(format!("HTTP {}: {}", status, body))
            }
            McpError::InvalidUrl(url) => ClientError::Connection(format!("invalid URL: {}", url)),
            McpError::InvalidToolSchema { tool, found } => ClientError::InvalidToolSchema {
                tool,
                reason: format!("root type is '{}', expected 'object'", found),
            },
            McpError::SessionExpired => ClientError::SessionExpired,
            McpError::Auth(message) => ClientError::Auth(message),
            McpError::TransportClosed => ClientError::TransportClosed,
            McpError::Timeout(_) => ClientError::Timeout,
            other @ (McpError::Serialization(_)
            | McpError::Rpc { .. }
            | McpError::UnexpectedResponse(_)) => ClientError::Protocol(other.to_string()),
            other @ (McpError::CapabilityNotNegotiated(_) | McpError::InvalidHeader { .. }) => {
                ClientError::Other(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_maps_to_client_error() {
        let error: ClientError = McpError::InvalidToolSchema {
            tool: "bad".to_string(),
            found: "array".to_string(),
        }
        .into();
        match error {
            ClientError::InvalidToolSchema { tool, reason } => {
                assert_eq!(tool, "bad");
                assert!(reason.contains("array"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rpc_error_is_protocol_error() {
        let error: ClientError = McpError::Rpc {
            code: -32601,
            message: "Method not found".to_string(),
        }
        .into();
        assert!(matches!(error, ClientError::Protocol(m) if m.contains("-32601")));
    }

    #[test]
    fn test_capability_error_message() {
        let error = McpError::CapabilityNotNegotiated(Capability::Sampling);
        assert!(error.to_string().contains("sampling"));
    }
}
