//! Echo tool: returns its `text` argument unchanged.

use agentry_core::error::ToolError;
use agentry_core::tool::Tool;
use async_trait::async_trait;

pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new("echo")
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Return the given text unchanged."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to echo back"
                }
            },
            "required": ["text"]
        })
    }

    fn output_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "type": "string" }))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        arguments
            .get("text")
            .cloned()
            .ok_or_else(|| ToolError::failed(&self.name, "missing 'text' argument"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ToolDispatcher;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn echoes_text() {
        let out = EchoTool::default().execute(json!({"text": "hello"})).await.unwrap();
        assert_eq!(out, json!("hello"));
    }

    #[tokio::test]
    async fn dispatcher_rejects_non_string_text() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register(Arc::new(EchoTool::default())).unwrap();
        let err = dispatcher.invoke("echo", json!({"text": ["a"]})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn custom_name() {
        assert_eq!(EchoTool::new("repeat").descriptor().name, "repeat");
    }
}
