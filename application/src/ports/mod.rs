//! Port definitions (interfaces for external systems)
//!
//! Ports define the boundaries between the application and infrastructure layers.
//! Infrastructure adapters implement these traits.

pub mod marketplace;
pub mod project_store;
pub mod tool_client;
