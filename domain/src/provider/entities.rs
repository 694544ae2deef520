//! Provider domain entities

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Wire transport used to reach a tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Long-lived server-push event stream; messages are POSTed to an
    /// endpoint announced on the stream.
    Sse,
    /// Request/response over HTTP POST with optional server push and a
    /// reusable session header.
    #[default]
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(&self) -> &str {
        match self {
            TransportKind::Sse => "sse",
            TransportKind::StreamableHttp => "streamable_http",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sse" => Ok(TransportKind::Sse),
            "streamable_http" | "streamable-http" | "http" => Ok(TransportKind::StreamableHttp),
            other => Err(format!("Unknown transport: {}", other)),
        }
    }
}

/// Client registration obtained during a previous OAuth flow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OAuthClientInformation {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Token endpoint used to exchange the refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
}

/// Previously obtained credentials for one provider, keyed by an opaque id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthContext {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_information: Option<OAuthClientInformation>,
    /// Session id issued by the server on an earlier connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AuthContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_client_information(mut self, info: OAuthClientInformation) -> Self {
        self.client_information = Some(info);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Usable means a non-empty refresh token *and* a stored client registration.
    pub fn has_usable_tokens(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.client_information.is_some()
    }
}

/// One configured remote tool server for a project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
    #[serde(default)]
    pub auth_contexts: Vec<AuthContext>,
}

/// Why a provider was left out of an aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingEndpoint,
    MissingAuthContext,
    UnusableAuthContext { context_id: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingEndpoint => write!(f, "no endpoint URL configured"),
            SkipReason::MissingAuthContext => {
                write!(f, "authentication required but no auth context exists")
            }
            SkipReason::UnusableAuthContext { context_id } => write!(
                f,
                "auth context '{}' has no refresh token or client registration",
                context_id
            ),
        }
    }
}

/// Outcome of [`ProviderConfig::eligibility`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility<'a> {
    Skip(SkipReason),
    Eligible {
        endpoint: &'a str,
        /// Credentials to use; `None` when the provider needs no auth
        auth: Option<&'a AuthContext>,
        /// Contexts present but ignored because the first one wins
        ignored_contexts: usize,
    },
}

impl ProviderConfig {
    pub fn new(id: impl Into<String>, endpoint_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint_url: Some(endpoint_url.into()),
            ..Default::default()
        }
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_auth_context(mut self, context: AuthContext) -> Self {
        self.requires_auth = true;
        self.auth_contexts.push(context);
        self
    }

    pub fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Decide whether this provider may be contacted, and with which credentials.
    ///
    /// A provider that requires auth is never partially trusted: without a
    /// usable first context it is skipped entirely.
    pub fn eligibility(&self) -> Eligibility<'_> {
        let endpoint = match self.endpoint_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url,
            _ => return Eligibility::Skip(SkipReason::MissingEndpoint),
        };

        if !self.requires_auth {
            return Eligibility::Eligible {
                endpoint,
                auth: None,
                ignored_contexts: 0,
            };
        }

        let Some(context) = self.auth_contexts.first() else {
            return Eligibility::Skip(SkipReason::MissingAuthContext);
        };
        if !context.has_usable_tokens() {
            return Eligibility::Skip(SkipReason::UnusableAuthContext {
                context_id: context.id.clone(),
            });
        }

        Eligibility::Eligible {
            endpoint,
            auth: Some(context),
            ignored_contexts: self.auth_contexts.len() - 1,
        }
    }

    /// Session id to resume, taken from the selected auth context.
    pub fn existing_session_id(&self) -> Option<&str> {
        match self.eligibility() {
            Eligibility::Eligible {
                auth: Some(context),
                ..
            } => context.session_id.as_deref(),
            _ => None,
        }
    }
}
