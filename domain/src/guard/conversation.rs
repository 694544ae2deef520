//! Read-only view of conversation messages.
//!
//! The guard only needs three things from a message: its role, the tool
//! call it carries (if any) and the tool call id. Agent layers with their
//! own message types implement [`ConversationEntry`]; [`ConversationMessage`]
//! is a plain implementation for callers that have none.

use crate::tool::entities::ToolCallRequest;
use serde::{Deserialize, Serialize};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

pub trait ConversationEntry {
    fn role(&self) -> MessageRole;

    fn tool_call_request(&self) -> Option<&ToolCallRequest>;

    fn tool_call_id(&self) -> Option<&str>;

    /// An assistant message that carries both a call id and a call request.
    fn is_assistant_tool_call(&self) -> bool {
        self.role() == MessageRole::Assistant
            && self.tool_call_id().is_some()
            && self.tool_call_request().is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_request: Option<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ConversationMessage {
    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_request: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, content)
    }

    /// Assistant message requesting a tool call.
    pub fn assistant_tool_call(call_id: impl Into<String>, call: ToolCallRequest) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: String::new(),
            tool_call_request: Some(call),
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Tool result answering `call_id`.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_request: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

impl ConversationEntry for ConversationMessage {
    fn role(&self) -> MessageRole {
        self.role
    }

    fn tool_call_request(&self) -> Option<&ToolCallRequest> {
        self.tool_call_request.as_ref()
    }

    fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref()
    }
}
