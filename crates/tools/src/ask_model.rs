//! Ask-model tool: forwards a prompt to another reasoning backend.
//!
//! Lets an agent consult a second model (a cheaper summariser, a specialist)
//! as if it were any other tool.

use agentry_core::error::ToolError;
use agentry_core::message::Message;
use agentry_core::provider::{ReasoningBackend, ReasoningRequest};
use agentry_core::tool::Tool;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct AskModelTool {
    name: String,
    backend: Arc<dyn ReasoningBackend>,
    system_prompt: Option<String>,
}

impl AskModelTool {
    pub fn new(name: impl Into<String>, backend: Arc<dyn ReasoningBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

#[async_trait]
impl Tool for AskModelTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Ask another language model a question and return its answer as text."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The question or instruction for the model"
                }
            },
            "required": ["prompt"]
        })
    }

    fn output_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "type": "string" }))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let prompt = arguments["prompt"]
            .as_str()
            .ok_or_else(|| ToolError::failed(&self.name, "missing 'prompt' argument"))?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system.as_str()));
        }
        messages.push(Message::user(prompt));

        debug!(tool = %self.name, backend = self.backend.name(), "Forwarding prompt to backend");
        let response = self
            .backend
            .complete(ReasoningRequest::new(messages, Vec::new()))
            .await
            .map_err(|e| ToolError::failed(&self.name, e.to_string()))?;

        Ok(serde_json::Value::String(response.message.text()))
    }
}
