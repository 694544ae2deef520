//! Project configuration store port
//!
//! Read-only access to the persisted per-project configuration: the
//! self-hosted tool servers and the enabled marketplace apps.

use async_trait::async_trait;
use thiserror::Error;
use toolgate_domain::ProviderConfig;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProjectConfigStore: Send + Sync {
    /// Configured tool servers, with their auth contexts attached
    async fn providers(&self, project_id: &str) -> Result<Vec<ProviderConfig>, StoreError>;

    /// Identifiers of the marketplace apps enabled for the project
    async fn marketplace_apps(&self, project_id: &str) -> Result<Vec<String>, StoreError>;
}
