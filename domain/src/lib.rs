//! Domain layer for toolgate
//!
//! This crate contains the core business logic, entities, and value objects.
//! It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Tool catalog
//!
//! Tool servers describe their tools in their own dialect. The domain turns
//! each native description into one canonical [`ToolDescriptor`] so the model
//! layer never sees provider-specific shapes.
//!
//! ## Loop guard
//!
//! Before a proposed tool call is dispatched, the [`LoopRateGuard`] checks it
//! against the conversation history and the running [`CallCountTable`],
//! using an order-independent [`CallSignature`] of the call.

pub mod core;
pub mod guard;
pub mod provider;
pub mod tool;

// Re-export commonly used types
pub use core::error::DomainError;
pub use guard::{
    conversation::{ConversationEntry, ConversationMessage, MessageRole},
    count_table::CallCountTable,
    loop_guard::{
        DenialReason, GuardLimits, GuardVerdict, LoopRateGuard, MAX_IDENTICAL_TOOL_CALLS,
        MAX_TOTAL_TOOL_CALLS,
    },
};
pub use provider::entities::{
    AuthContext, Eligibility, OAuthClientInformation, ProviderConfig, SkipReason, TransportKind,
};
pub use tool::{
    entities::{DiscoveredTool, ToolCallRequest, ToolDescriptor},
    schema::ParameterSchema,
    signature::CallSignature,
    value_objects::ToolCallOutcome,
};
