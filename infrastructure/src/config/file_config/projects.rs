//! Project configuration from TOML (`[[projects]]` section)
//!
//! Each project lists the tool servers it uses and the marketplace apps it
//! has enabled.
//!
//! ```toml
//! [[projects]]
//! id = "support-bot"
//! marketplace_apps = ["slack", "github"]
//!
//! [[projects.servers]]
//! id = "search"
//! url = "https://search.example.com/mcp"
//! transport = "streamable_http"
//! headers = { "X-Team" = "support" }
//!
//! [[projects.servers]]
//! id = "crm"
//! url = "https://crm.example.com/sse"
//! transport = "sse"
//! requires_auth = true
//!
//! [[projects.servers.contexts]]
//! id = "ctx-1"
//! refresh_token = "..."
//! client_information = { client_id = "toolgate", token_endpoint = "https://crm.example.com/oauth/token" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use toolgate_domain::{AuthContext, OAuthClientInformation, ProviderConfig, TransportKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProjectConfig {
    pub id: String,
    pub marketplace_apps: Vec<String>,
    pub servers: Vec<FileServerConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileServerConfig {
    pub id: String,
    /// Missing or blank means the server is skipped
    pub url: Option<String>,
    pub transport: TransportKind,
    pub requires_auth: bool,
    pub headers: HashMap<String, String>,
    pub contexts: Vec<FileAuthContextConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAuthContextConfig {
    pub id: String,
    pub refresh_token: Option<String>,
    pub session_id: Option<String>,
    pub client_information: Option<OAuthClientInformation>,
}

impl FileAuthContextConfig {
    pub fn to_auth_context(&self) -> AuthContext {
        AuthContext {
            id: self.id.clone(),
            refresh_token: self.refresh_token.clone(),
            client_information: self.client_information.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

impl FileServerConfig {
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            id: self.id.clone(),
            endpoint_url: self.url.clone(),
            transport: self.transport,
            requires_auth: self.requires_auth,
            custom_headers: self.headers.clone(),
            auth_contexts: self
                .contexts
                .iter()
                .map(FileAuthContextConfig::to_auth_context)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_to_provider_config() {
        let toml_str = r#"
id = "crm"
url = "https://crm.example.com/sse"
transport = "sse"
requires_auth = true
headers = { "X-Team" = "support" }

[[contexts]]
id = "ctx-1"
refresh_token = "rt"
session_id = "s-1"
client_information = { client_id = "toolgate", token_endpoint = "https://crm.example.com/token" }
"#;
        let server: FileServerConfig = toml::from_str(toml_str).unwrap();
        let provider = server.to_provider_config();

        assert_eq!(provider.id, "crm");
        assert_eq!(provider.transport, TransportKind::Sse);
        assert!(provider.requires_auth);
        assert_eq!(provider.custom_headers["X-Team"], "support");
        assert_eq!(provider.auth_contexts.len(), 1);
        assert!(provider.auth_contexts[0].has_usable_tokens());
        assert_eq!(provider.existing_session_id(), Some("s-1"));
    }

    #[test]
    fn test_server_defaults() {
        let server: FileServerConfig = toml::from_str(r#"id = "bare""#).unwrap();
        let provider = server.to_provider_config();
        assert_eq!(provider.transport, TransportKind::StreamableHttp);
        assert!(provider.endpoint_url.is_none());
        assert!(!provider.requires_auth);
    }
}
