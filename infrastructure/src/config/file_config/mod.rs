//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and use domain types where appropriate.

mod aggregation;
mod guard;
mod projects;

pub use aggregation::FileAggregationConfig;
pub use guard::FileGuardConfig;
pub use projects::{FileAuthContextConfig, FileProjectConfig, FileServerConfig};

use super::validation::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Loop guard limits
    pub guard: FileGuardConfig,
    /// Provider and request timeouts
    pub aggregation: FileAggregationConfig,
    /// Per-project tool servers and marketplace apps
    pub projects: Vec<FileProjectConfig>,
}

impl FileConfig {
    pub fn project(&self, id: &str) -> Option<&FileProjectConfig> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Validate the entire configuration, returning all detected issues.
    ///
    /// Errors: duplicate project ids, duplicate server ids within a project,
    /// zero guard limits or timeouts. Warnings: servers that aggregation
    /// will skip or only partly use.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        for (field, value) in [
            ("guard.max_identical_tool_calls", u64::from(self.guard.max_identical_tool_calls)),
            ("guard.max_total_tool_calls", u64::from(self.guard.max_total_tool_calls)),
            ("aggregation.provider_timeout_secs", self.aggregation.provider_timeout_secs),
            ("aggregation.request_timeout_secs", self.aggregation.request_timeout_secs),
        ] {
            if value == 0 {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::ZeroLimit {
                        field: field.to_string(),
                    },
                    format!("{} must be greater than zero", field),
                ));
            }
        }

        let mut project_ids = HashSet::new();
        for project in &self.projects {
            if !project_ids.insert(project.id.as_str()) {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::DuplicateProjectId {
                        project: project.id.clone(),
                    },
                    format!("project '{}' is defined more than once", project.id),
                ));
            }
            issues.extend(validate_servers(project));
        }

        issues
    }
}

fn validate_servers(project: &FileProjectConfig) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    let mut server_ids = HashSet::new();

    for server in &project.servers {
        let project_id = project.id.clone();
        let server_id = server.id.clone();
        let label = format!("{}/{}", project.id, server.id);

        if !server_ids.insert(server.id.as_str()) {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::DuplicateServerId {
                    project: project_id.clone(),
                    server: server_id.clone(),
                },
                format!("{}: server id appears more than once", label),
            ));
        }

        if server.url.as_deref().is_none_or(|u| u.trim().is_empty()) {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::MissingEndpoint {
                    project: project_id.clone(),
                    server: server_id.clone(),
                },
                format!("{}: no url, the server will be skipped", label),
            ));
        }

        if server.requires_auth && server.contexts.is_empty() {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::MissingAuthContext {
                    project: project_id.clone(),
                    server: server_id.clone(),
                },
                format!(
                    "{}: requires auth but has no contexts, the server will be skipped",
                    label
                ),
            ));
        }

        if server.contexts.len() > 1 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::MultipleAuthContexts {
                    project: project_id,
                    server: server_id,
                },
                format!("{}: several auth contexts, only the first is used", label),
            ));
        }
    }

    issues
}
