//! Reasoning backend trait: the abstraction over LLM services.
//!
//! A backend receives the accumulated conversation plus the descriptors of
//! the tools it may call, and answers with either final content or one or
//! more tool call requests.
//!
//! Implementations: OpenAI-compatible endpoints, scripted replay for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::message::Message;

/// A request sent to a reasoning backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningRequest {
    /// The conversation messages
    pub messages: Vec<Message>,

    /// Available tools the backend can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,

    /// Temperature override (backend default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ReasoningRequest {
    pub fn new(messages: Vec<Message>, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            messages,
            tools,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// A tool descriptor sent to the backend so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete response from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningResponse {
    /// The generated assistant message (content and/or tool calls)
    pub message: Message,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Field-wise sum.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// The core reasoning backend trait.
///
/// The agent loop calls `complete()` without knowing which service is behind
/// it. Implementations must be safe to retry on transient failures.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ReasoningRequest) -> Result<ReasoningResponse, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total.add(&Usage::new(10, 5));
        total.add(&Usage::new(3, 2));
        assert_eq!(total, Usage { prompt_tokens: 13, completion_tokens: 7, total_tokens: 20 });
    }

    #[test]
    fn request_omits_empty_tools() {
        let req = ReasoningRequest::new(vec![Message::user("hi")], vec![]);
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("tools"));
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn tool_descriptor_serialization() {
        let tool = ToolDescriptor {
            name: "echo".into(),
            description: "Echo text back".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("echo"));
        assert!(json.contains("required"));
    }
}
