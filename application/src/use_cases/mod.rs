//! Use cases (application services)

pub mod aggregate_tools;
pub mod dispatch_tool_call;
