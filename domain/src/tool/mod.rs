//! Tool domain module
//!
//! This module defines how tools are described, called, and identified,
//! independent of which provider exposes them.
//!
//! # Overview
//!
//! ```text
//! ┌────────────────┐    ┌────────────────┐    ┌─────────────────┐
//! │ DiscoveredTool │───▶│ ToolDescriptor │───▶│ function schema │
//! │ (native shape) │    │  (canonical)   │    │  (model layer)  │
//! └────────────────┘    └────────────────┘    └─────────────────┘
//!
//! ┌─────────────────┐    ┌───────────────┐    ┌─────────────────┐
//! │ ToolCallRequest │───▶│ CallSignature │───▶│ CallCountTable  │
//! │ (model proposal)│    │ (sorted key)  │    │ / LoopRateGuard │
//! └─────────────────┘    └───────────────┘    └─────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`DiscoveredTool`]: a tool exactly as a provider described it
//! - [`ToolDescriptor`]: the canonical, provider-agnostic description
//! - [`ParameterSchema`]: canonical `{type: object, properties, required,
//!   additionalProperties: false}` parameter shape
//! - [`ToolCallRequest`]: a proposed call with ordered `(name, value)` pairs
//! - [`CallSignature`]: order-independent key for a call
//! - [`ToolCallOutcome`]: opaque invocation result (content blocks + error flag)

pub mod entities;
pub mod schema;
pub mod signature;
pub mod value_objects;

pub use entities::{DiscoveredTool, ToolCallRequest, ToolDescriptor};
pub use schema::ParameterSchema;
pub use signature::CallSignature;
pub use value_objects::ToolCallOutcome;
