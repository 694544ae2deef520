//! Project configuration store backed by the loaded config file.

use super::file_config::{FileConfig, FileProjectConfig};
use async_trait::async_trait;
use toolgate_application::{ProjectConfigStore, StoreError};
use toolgate_domain::ProviderConfig;

/// Serves `[[projects]]` from a [`FileConfig`].
#[derive(Debug, Clone, Default)]
pub struct FileProjectStore {
    projects: Vec<FileProjectConfig>,
}

impl FileProjectStore {
    pub fn new(projects: Vec<FileProjectConfig>) -> Self {
        Self { projects }
    }

    pub fn from_config(config: &FileConfig) -> Self {
        Self::new(config.projects.clone())
    }

    pub fn project_ids(&self) -> impl Iterator<Item = &str> {
        self.projects.iter().map(|p| p.id.as_str())
    }

    fn project(&self, project_id: &str) -> Result<&FileProjectConfig, StoreError> {
        self.projects
            .iter()
            .find(|p| p.id == project_id)
            .ok_or_else(|| StoreError::ProjectNotFound(project_id.to_string()))
    }
}

#[async_trait]
impl ProjectConfigStore for FileProjectStore {
    async fn providers(&self, project_id: &str) -> Result<Vec<ProviderConfig>, StoreError> {
        Ok(self
            .project(project_id)?
            .servers
            .iter()
            .map(|server| server.to_provider_config())
            .collect())
    }

    async fn marketplace_apps(&self, project_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.project(project_id)?.marketplace_apps.clone())
    }
}
