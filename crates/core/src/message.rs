//! Message domain types.
//!
//! These are the value objects that flow through a run:
//! task input → user message → backend reply → tool calls → tool results → answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (or the task input)
    User,
    /// The reasoning backend
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// Message payload: plain text or a structured JSON value.
///
/// Serialized untagged, so a JSON string always reads back as `Text`. Build
/// structured content with [`Content::structured`], which keeps bare strings
/// as `Text` and round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Structured(serde_json::Value),
}

impl Content {
    pub fn structured(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => Self::Text(text),
            other => Self::Structured(other),
        }
    }

    /// Render the content as text. Structured values are JSON-encoded.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        Self::structured(value)
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// A tool invocation requested by the reasoning backend.
///
/// Consumed exactly once by the tool dispatch layer; its `id` links the
/// request to the single tool message carrying the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the backend's tool_call.id)
    pub id: String,

    /// Name of the tool to invoke
    pub tool_name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// A single message in a run's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The content, absent for assistant messages that only carry tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (error flags, backend info, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: Option<Content>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<Content>) -> Self {
        Self::with_role(Role::User, Some(content.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::with_role(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_tool_calls(content: Option<Content>, tool_calls: Vec<ToolCallRequest>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<Content>) -> Self {
        Self::with_role(Role::System, Some(content.into()))
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<Content>) -> Self {
        let mut msg = Self::with_role(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Create a tool result message describing a failure.
    pub fn tool_error(tool_call_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        let mut msg = Self::tool_result(tool_call_id, format!("Error: {error}"));
        msg.metadata
            .insert("is_error".into(), serde_json::Value::Bool(true));
        msg
    }

    /// Text of the message, empty when there is no content.
    pub fn text(&self) -> String {
        self.content.as_ref().map(Content::as_text).unwrap_or_default()
    }

    /// Whether this message was produced from a failed tool call.
    pub fn is_error(&self) -> bool {
        self.metadata
            .get("is_error")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
