//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act: echo text, evaluate
//! arithmetic, ask another model, call a service. Each tool declares JSON
//! schemas for its input and (optionally) its output; the dispatch layer
//! validates both around every call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::provider::ToolDescriptor;

/// The validated result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The tool that produced this output
    pub tool_name: String,

    /// The output value, conforming to the tool's output schema
    pub value: serde_json::Value,
}

impl ToolOutput {
    /// Render the output for a tool message: strings verbatim, anything else as JSON.
    pub fn to_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// The core Tool trait.
///
/// Tools are registered with the dispatch layer and made available to the
/// agent loop through their [`ToolDescriptor`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "echo", "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the backend).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// JSON Schema the tool's output must satisfy. `None` accepts anything.
    fn output_schema(&self) -> Option<serde_json::Value> {
        None
    }

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError>;

    /// Convert this tool into a descriptor for the backend.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.input_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Ok(arguments["text"].clone())
        }
    }

    #[test]
    fn descriptor_mirrors_tool() {
        let desc = EchoTool.descriptor();
        assert_eq!(desc.name, "echo");
        assert_eq!(desc.parameters["required"][0], "text");
    }

    #[tokio::test]
    async fn execute_returns_value() {
        let out = EchoTool.execute(serde_json::json!({"text": "hello world"})).await.unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn output_text_rendering() {
        let s = ToolOutput { tool_name: "echo".into(), value: serde_json::json!("hi") };
        assert_eq!(s.to_text(), "hi");
        let n = ToolOutput { tool_name: "calc".into(), value: serde_json::json!({"result": 4}) };
        assert_eq!(n.to_text(), r#"{"result":4}"#);
    }
}
