//! Tool domain value objects: the invocation result.
//!
//! Tool payloads are opaque at this layer: a provider answers with a list of
//! content blocks and an optional error flag, and the caller feeds that back
//! to the model as-is. Failures to reach a provider are folded into the same
//! shape (`is_error: true`) instead of being raised.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a tool invocation: `{content: [...], isError?}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallOutcome {
    pub fn success(content: Vec<Value>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// A failed call carrying a single text block with `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: vec![text_block(message)],
            is_error: true,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.is_error
    }

    /// Concatenated text of every `{"type": "text"}` block.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Build a `{"type": "text", "text": ...}` content block.
pub fn text_block(text: impl Into<String>) -> Value {
    serde_json::json!({ "type": "text", "text": text.into() })
}
