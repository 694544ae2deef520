//! Dispatch Tool Call use case
//!
//! Runs a proposed call through the [`LoopRateGuard`] and, if allowed,
//! routes it to the provider that owns the tool.

use super::aggregate_tools::ToolCatalog;
use crate::ports::marketplace::{DisabledMarketplace, MarketplaceGateway};
use serde_json::Value;
use std::sync::Arc;
use toolgate_domain::{
    CallCountTable, ConversationEntry, DenialReason, GuardLimits, GuardVerdict, LoopRateGuard,
    ToolCallOutcome, ToolCallRequest,
};
use tracing::{debug, info, warn};

/// Result of a dispatch attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutput {
    /// The guard refused the call; nothing was sent anywhere
    Denied {
        reason: DenialReason,
        message: String,
    },
    /// The call was routed; failures are folded into `outcome.is_error`
    Completed {
        outcome: ToolCallOutcome,
        /// Count table with this call recorded (the input table is untouched)
        counts: CallCountTable,
    },
}

impl DispatchOutput {
    /// Text to feed back to the model, whichever way the call went.
    pub fn text(&self) -> String {
        match self {
            DispatchOutput::Denied { message, .. } => message.clone(),
            DispatchOutput::Completed { outcome, .. } => outcome.text(),
        }
    }
}

/// Use case for guarded tool invocation
pub struct DispatchToolCallUseCase {
    guard: LoopRateGuard,
    marketplace: Arc<dyn MarketplaceGateway>,
    meta: Option<Value>,
}

impl DispatchToolCallUseCase {
    pub fn new(limits: GuardLimits) -> Self {
        Self {
            guard: LoopRateGuard::new(limits),
            marketplace: Arc::new(DisabledMarketplace),
            meta: None,
        }
    }

    pub fn with_marketplace(mut self, marketplace: Arc<dyn MarketplaceGateway>) -> Self {
        self.marketplace = marketplace;
        self
    }

    /// `_meta` forwarded with every self-hosted call.
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub async fn execute<M: ConversationEntry>(
        &self,
        project_id: &str,
        catalog: &ToolCatalog,
        history: &[M],
        counts: &CallCountTable,
        call: &ToolCallRequest,
    ) -> DispatchOutput {
        if let GuardVerdict::Deny { reason, message } = self.guard.validate(history, counts, call) {
            info!(
                project = project_id,
                tool = %call.tool_name,
                reason = ?reason,
                "Tool call denied by guard"
            );
            return DispatchOutput::Denied { reason, message };
        }

        let outcome = self.route(project_id, catalog, call).await;
        DispatchOutput::Completed {
            outcome,
            counts: counts.record(call),
        }
    }

    async fn route(
        &self,
        project_id: &str,
        catalog: &ToolCatalog,
        call: &ToolCallRequest,
    ) -> ToolCallOutcome {
        let name = call.tool_name.as_str();

        if let Some(client) = catalog.client_for(name) {
            debug!(
                project = project_id,
                provider = client.provider_id(),
                tool = name,
                "Calling tool"
            );
            return match client
                .call_tool(name, call.arguments(), self.meta.clone())
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        project = project_id,
                        provider = client.provider_id(),
                        tool = name,
                        error = %e,
                        "Tool call failed"
                    );
                    ToolCallOutcome::failure(format!("Tool '{}' failed: {}", name, e))
                }
            };
        }

        if catalog.is_marketplace_tool(name) {
            debug!(project = project_id, tool = name, "Calling marketplace tool");
            return match self
                .marketplace
                .execute(project_id, name, call.arguments())
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        project = project_id,
                        tool = name,
                        error = %e,
                        "Marketplace tool call failed"
                    );
                    ToolCallOutcome::failure(format!("Tool '{}' failed: {}", name, e))
                }
            };
        }

        warn!(project = project_id, tool = name, "Unknown tool requested");
        ToolCallOutcome::failure(format!("Unknown tool: {}", name))
    }
}
