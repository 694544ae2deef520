//! Aggregate Tools use case
//!
//! Builds one project's [`ToolCatalog`] from every configured provider.
//!
//! Self-hosted servers are resolved concurrently, each under its own
//! timeout; the marketplace is queried alongside them. A provider that
//! fails, hangs or is ineligible simply contributes nothing; aggregation
//! itself never fails.

use crate::config::AggregationConfig;
use crate::ports::marketplace::{DisabledMarketplace, MarketplaceGateway};
use crate::ports::project_store::ProjectConfigStore;
use crate::ports::tool_client::{ClientError, ToolClient, ToolClientFactory};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use toolgate_domain::{AuthContext, Eligibility, ProviderConfig, ToolDescriptor};
use tracing::{debug, info, warn};

/// Merged tools of one project, rebuilt on every aggregation.
pub struct ToolCatalog {
    /// Every surfaced tool, self-hosted first (in provider order), then marketplace
    pub tools: Vec<ToolDescriptor>,
    /// Owning client per self-hosted tool name (last writer wins)
    pub name_to_client: HashMap<String, Arc<dyn ToolClient>>,
    /// Names of the marketplace tools that were surfaced
    pub marketplace_tool_names: Vec<String>,
}

impl ToolCatalog {
    pub fn empty() -> Self {
        Self {
            tools: Vec::new(),
            name_to_client: HashMap::new(),
            marketplace_tool_names: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptor for `name`; the last one wins if the name collides.
    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().rev().find(|tool| tool.name == name)
    }

    pub fn client_for(&self, name: &str) -> Option<&Arc<dyn ToolClient>> {
        self.name_to_client.get(name)
    }

    pub fn is_marketplace_tool(&self, name: &str) -> bool {
        self.marketplace_tool_names.iter().any(|n| n == name)
    }

    /// Function entries to hand to the model.
    pub fn function_schemas(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(ToolDescriptor::to_function_schema)
            .collect()
    }

    /// Names surfaced more than once, sorted.
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for tool in &self.tools {
            *counts.entry(tool.name.as_str()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Close every distinct client still referenced by the catalog.
    pub async fn close(&self) {
        let mut closed: Vec<&Arc<dyn ToolClient>> = Vec::new();
        for client in self.name_to_client.values() {
            if closed.iter().any(|c| Arc::ptr_eq(c, client)) {
                continue;
            }
            close_client(client).await;
            closed.push(client);
        }
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let owners: BTreeMap<&str, &str> = self
            .name_to_client
            .iter()
            .map(|(name, client)| (name.as_str(), client.provider_id()))
            .collect();
        f.debug_struct("ToolCatalog")
            .field("tools", &self.tools)
            .field("name_to_client", &owners)
            .field("marketplace_tool_names", &self.marketplace_tool_names)
            .finish()
    }
}

/// Tools resolved from one self-hosted provider
struct ProviderTools {
    client: Arc<dyn ToolClient>,
    tools: Vec<ToolDescriptor>,
}

/// Use case for aggregating a project's tools
pub struct AggregateToolsUseCase<F: ToolClientFactory + 'static, S: ProjectConfigStore + 'static> {
    factory: Arc<F>,
    store: Arc<S>,
    marketplace: Arc<dyn MarketplaceGateway>,
    config: AggregationConfig,
    cancellation_token: Option<CancellationToken>,
}

impl<F: ToolClientFactory + 'static, S: ProjectConfigStore + 'static> AggregateToolsUseCase<F, S> {
    pub fn new(factory: Arc<F>, store: Arc<S>) -> Self {
        Self {
            factory,
            store,
            marketplace: Arc::new(DisabledMarketplace),
            config: AggregationConfig::default(),
            cancellation_token: None,
        }
    }

    pub fn with_marketplace(mut self, marketplace: Arc<dyn MarketplaceGateway>) -> Self {
        self.marketplace = marketplace;
        self
    }

    pub fn with_config(mut self, config: AggregationConfig) -> Self {
        self.config = config;
        self
    }

    /// Stop waiting for outstanding providers once `token` fires; whatever
    /// was resolved by then is returned.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Load the project's configuration and aggregate its tools.
    pub async fn execute(&self, project_id: &str) -> ToolCatalog {
        let providers = match self.store.providers(project_id).await {
            Ok(providers) => providers,
            Err(e) => {
                warn!(project = project_id, error = %e, "Failed to load tool servers");
                Vec::new()
            }
        };
        let marketplace_apps = match self.store.marketplace_apps(project_id).await {
            Ok(apps) => apps,
            Err(e) => {
                warn!(project = project_id, error = %e, "Failed to load marketplace apps");
                Vec::new()
            }
        };

        self.aggregate(project_id, providers, &marketplace_apps)
            .await
    }

    /// Aggregate tools from explicitly supplied providers and marketplace apps.
    pub async fn aggregate(
        &self,
        project_id: &str,
        providers: Vec<ProviderConfig>,
        marketplace_apps: &[String],
    ) -> ToolCatalog {
        info!(
            project = project_id,
            servers = providers.len(),
            marketplace_apps = marketplace_apps.len(),
            "Aggregating tools"
        );

        let (contributions, marketplace_tools) = tokio::join!(
            self.resolve_self_hosted(project_id, providers),
            self.resolve_marketplace(project_id, marketplace_apps),
        );

        let mut catalog = ToolCatalog::empty();
        let mut contributing_clients = Vec::with_capacity(contributions.len());
        for ProviderTools { client, tools } in contributions {
            for descriptor in tools {
                catalog
                    .name_to_client
                    .insert(descriptor.name.clone(), Arc::clone(&client));
                catalog.tools.push(descriptor);
            }
            contributing_clients.push(client);
        }

        // Clients whose every tool was shadowed by a later provider
        for client in &contributing_clients {
            if !catalog
                .name_to_client
                .values()
                .any(|owner| Arc::ptr_eq(owner, client))
            {
                close_client(client).await;
            }
        }

        catalog.marketplace_tool_names = marketplace_tools.iter().map(|t| t.name.clone()).collect();
        catalog.tools.extend(marketplace_tools);

        let duplicates = catalog.duplicate_names();
        if !duplicates.is_empty() {
            warn!(
                project = project_id,
                duplicates = ?duplicates,
                "Tool names collide across providers"
            );
        }

        info!(
            project = project_id,
            tools = catalog.len(),
            "Tool aggregation complete"
        );
        catalog
    }

    async fn resolve_self_hosted(
        &self,
        project_id: &str,
        providers: Vec<ProviderConfig>,
    ) -> Vec<ProviderTools> {
        let mut join_set = JoinSet::new();
        let cancel = self.cancellation_token.clone().unwrap_or_default();

        for (index, provider) in providers.into_iter().enumerate() {
            let auth = match provider.eligibility() {
                Eligibility::Skip(reason) => {
                    info!(
                        project = project_id,
                        provider = %provider.id,
                        reason = %reason,
                        "Skipping tool server"
                    );
                    continue;
                }
                Eligibility::Eligible {
                    auth,
                    ignored_contexts,
                    ..
                } => {
                    if ignored_contexts > 0 {
                        warn!(
                            project = project_id,
                            provider = %provider.id,
                            contexts = ignored_contexts + 1,
                            "Multiple auth contexts configured, using the first"
                        );
                    }
                    auth.cloned()
                }
            };

            let factory = Arc::clone(&self.factory);
            let timeout = self.config.provider_timeout;
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let result =
                    resolve_provider(factory.as_ref(), &provider, auth.as_ref(), timeout, &cancel)
                        .await;
                (index, provider.id, result)
            });
        }

        // Tasks watch the token themselves so connected clients still get closed
        let mut resolved = Vec::new();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((index, provider_id, Ok(provider_tools))) => {
                    if provider_tools.tools.is_empty() {
                        debug!(
                            project = project_id,
                            provider = %provider_id,
                            "Tool server exposes no tools"
                        );
                        close_client(&provider_tools.client).await;
                        continue;
                    }
                    info!(
                        project = project_id,
                        provider = %provider_id,
                        tools = provider_tools.tools.len(),
                        "Discovered tools"
                    );
                    resolved.push((index, provider_tools));
                }
                Ok((_, provider_id, Err(ClientError::Cancelled))) => {
                    debug!(
                        project = project_id,
                        provider = %provider_id,
                        "Provider abandoned on cancellation"
                    );
                }
                Ok((_, provider_id, Err(e))) => {
                    warn!(
                        project = project_id,
                        provider = %provider_id,
                        error = %e,
                        "Failed to discover tools from provider"
                    );
                }
                Err(e) => {
                    warn!(project = project_id, error = %e, "Provider task join error");
                }
            }
        }

        // Completion order is arbitrary; merge in configuration order
        resolved.sort_by_key(|(index, _)| *index);
        resolved.into_iter().map(|(_, tools)| tools).collect()
    }

    async fn resolve_marketplace(&self, project_id: &str, apps: &[String]) -> Vec<ToolDescriptor> {
        if apps.is_empty() {
            return Vec::new();
        }

        let listing = tokio::time::timeout(
            self.config.provider_timeout,
            self.marketplace.list_tools(project_id, apps),
        )
        .await;

        match listing {
            Ok(Ok(tools)) => {
                debug!(
                    project = project_id,
                    tools = tools.len(),
                    "Discovered marketplace tools"
                );
                tools.iter().map(ToolDescriptor::from_marketplace).collect()
            }
            Ok(Err(e)) => {
                warn!(project = project_id, error = %e, "Failed to list marketplace tools");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    project = project_id,
                    timeout = ?self.config.provider_timeout,
                    "Marketplace tool listing timed out"
                );
                Vec::new()
            }
        }
    }
}

/// Connect to one provider and canonicalize its tools.
///
/// `timeout` bounds connect and discovery together. Once connected, a
/// timeout or cancellation still closes the client before returning.
async fn resolve_provider<F: ToolClientFactory + ?Sized>(
    factory: &F,
    provider: &ProviderConfig,
    auth: Option<&AuthContext>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ProviderTools, ClientError> {
    let deadline = Instant::now() + timeout;

    let client = tokio::select! {
        _ = cancel.cancelled() => return Err(ClientError::Cancelled),
        connected = tokio::time::timeout_at(deadline, factory.connect(provider, auth)) => {
            connected.map_err(|_| ClientError::Timeout)??
        }
    };

    let listing = tokio::select! {
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        listed = tokio::time::timeout_at(deadline, client.list_tools()) => {
            listed.unwrap_or(Err(ClientError::Timeout))
        }
    };

    match listing {
        Ok(discovered) => Ok(ProviderTools {
            tools: discovered
                .iter()
                .map(ToolDescriptor::from_discovered)
                .collect(),
            client,
        }),
        Err(e) => {
            close_client(&client).await;
            Err(e)
        }
    }
}

async fn close_client(client: &Arc<dyn ToolClient>) {
    if let Err(e) = client.close().await {
        debug!(provider = client.provider_id(), error = %e, "Failed to close tool client");
    }
}
