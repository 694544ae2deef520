//! Application layer for toolgate
//!
//! This crate contains use cases, port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::AggregationConfig;
pub use ports::{
    marketplace::{DisabledMarketplace, MarketplaceError, MarketplaceGateway},
    project_store::{ProjectConfigStore, StoreError},
    tool_client::{ClientError, ToolClient, ToolClientFactory},
};
pub use use_cases::aggregate_tools::{AggregateToolsUseCase, ToolCatalog};
pub use use_cases::dispatch_tool_call::{DispatchOutput, DispatchToolCallUseCase};
