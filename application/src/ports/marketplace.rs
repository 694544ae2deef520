//! Marketplace gateway port
//!
//! The marketplace is an externally managed catalog of pre-built tools.
//! Its tools are listed per enabled app and invoked through the gateway
//! itself, never through a [`ToolClient`](super::tool_client::ToolClient).

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use toolgate_domain::{DiscoveredTool, ToolCallOutcome};

#[derive(Error, Debug)]
pub enum MarketplaceError {
    #[error("Marketplace is not configured")]
    Disabled,

    #[error("Marketplace request failed: {0}")]
    RequestFailed(String),

    #[error("Tool not found in marketplace: {0}")]
    ToolNotFound(String),
}

#[async_trait]
pub trait MarketplaceGateway: Send + Sync {
    /// Tools exposed by the given apps
    async fn list_tools(
        &self,
        project_id: &str,
        app_ids: &[String],
    ) -> Result<Vec<DiscoveredTool>, MarketplaceError>;

    async fn execute(
        &self,
        project_id: &str,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallOutcome, MarketplaceError>;
}

/// Gateway used when no marketplace integration is wired in.
pub struct DisabledMarketplace;

#[async_trait]
impl MarketplaceGateway for DisabledMarketplace {
    async fn list_tools(
        &self,
        _project_id: &str,
        _app_ids: &[String],
    ) -> Result<Vec<DiscoveredTool>, MarketplaceError> {
        Ok(Vec::new())
    }

    async fn execute(
        &self,
        _project_id: &str,
        _tool_name: &str,
        _arguments: Map<String, Value>,
    ) -> Result<ToolCallOutcome, MarketplaceError> {
        Err(MarketplaceError::Disabled)
    }
}
