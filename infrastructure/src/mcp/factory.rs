//! Builds protocol clients from provider configuration.

use super::auth::{AuthProvider, StoredTokenAuthProvider};
use super::client::{DEFAULT_REQUEST_TIMEOUT, McpClient, McpClientOptions};
use super::error::{McpError, Result};
use super::handlers::InboundHandlers;
use super::transport::{HttpOptions, SseTransport, StreamableHttpTransport, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use toolgate_application::{ClientError, ToolClient, ToolClientFactory};
use toolgate_domain::{AuthContext, ProviderConfig, SkipReason, TransportKind};
use tracing::{debug, info};

/// Time allowed to open a connection to a tool server.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client shared by every transport.
///
/// Only connecting is bounded here: event streams stay open for the life of
/// a client, so request deadlines are applied by [`McpClient`] instead.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?)
}

/// [`ToolClientFactory`] that connects [`McpClient`]s over HTTP.
pub struct McpClientFactory {
    http: reqwest::Client,
    request_timeout: Duration,
    handlers: InboundHandlers,
}

impl McpClientFactory {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handlers: InboundHandlers::default(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Handlers given to every client this factory builds.
    pub fn with_handlers(mut self, handlers: InboundHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    fn http_options(
        &self,
        provider: &ProviderConfig,
        auth: Option<&AuthContext>,
    ) -> Result<HttpOptions> {
        let mut options =
            HttpOptions::new(self.http.clone()).with_headers(&provider.custom_headers)?;
        if let Some(context) = auth {
            let auth_provider: Arc<dyn AuthProvider> = Arc::new(
                StoredTokenAuthProvider::from_context(self.http.clone(), context)?,
            );
            options = options.with_auth(auth_provider);
        }
        Ok(options)
    }

    fn transport(
        &self,
        provider: &ProviderConfig,
        endpoint: &str,
        options: HttpOptions,
        session_id: Option<String>,
    ) -> Result<Arc<dyn Transport>> {
        Ok(match provider.transport {
            TransportKind::Sse => Arc::new(SseTransport::new(endpoint, options)?),
            TransportKind::StreamableHttp => {
                Arc::new(StreamableHttpTransport::new(endpoint, options, session_id)?)
            }
        })
    }

    fn client_options(&self) -> McpClientOptions {
        McpClientOptions::default()
            .with_request_timeout(self.request_timeout)
            .with_handlers(self.handlers.clone())
    }

    /// Connect, resuming `auth`'s stored session if it has one. A stored
    /// session the server no longer knows is dropped and a fresh one opened.
    pub async fn connect_provider(
        &self,
        provider: &ProviderConfig,
        auth: Option<&AuthContext>,
    ) -> Result<McpClient> {
        let endpoint = provider
            .endpoint_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| McpError::InvalidUrl(SkipReason::MissingEndpoint.to_string()))?;
        let stored_session = auth.and_then(|context| context.session_id.clone());
        let options = self.http_options(provider, auth)?;

        debug!(
            provider = %provider.id,
            transport = %provider.transport,
            resume = stored_session.is_some(),
            "Connecting to tool server"
        );
        let transport = self.transport(provider, endpoint, options.clone(), stored_session.clone())?;
        match McpClient::connect(provider.id.clone(), transport, self.client_options()).await {
            Err(McpError::SessionExpired) if stored_session.is_some() => {
                info!(provider = %provider.id, "Stored session expired, starting a new one");
                let transport = self.transport(provider, endpoint, options, None)?;
                McpClient::connect(provider.id.clone(), transport, self.client_options()).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl ToolClientFactory for McpClientFactory {
    async fn connect(
        &self,
        provider: &ProviderConfig,
        auth: Option<&AuthContext>,
    ) -> std::result::Result<Arc<dyn ToolClient>, ClientError> {
        let client = self.connect_provider(provider, auth).await?;
        Ok(Arc::new(client))
    }
}
