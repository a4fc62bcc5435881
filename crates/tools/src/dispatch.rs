//! Tool dispatch: validated, time-boxed invocation of registered tools.
//!
//! Every call goes through the same pipeline:
//! 1. look the tool up by name
//! 2. validate the arguments against its input schema
//! 3. run the handler under the per-call timeout, catching panics
//! 4. validate the result against its output schema (if it has one)
//!
//! Any step can fail with a [`ToolError`]; none of them panic.

use agentry_core::error::ToolError;
use agentry_core::provider::ToolDescriptor;
use agentry_core::tool::{Tool, ToolOutput};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-call budget for a tool handler.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

type Handler = dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync;

/// A tool backed by a closure.
pub struct FnTool {
    name: String,
    description: String,
    input_schema: Value,
    output_schema: Option<Value>,
    handler: Box<Handler>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        input_schema: Value,
        output_schema: Option<Value>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            input_schema,
            output_schema,
            handler: Box::new(move |args| handler(args).boxed()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    fn output_schema(&self) -> Option<Value> {
        self.output_schema.clone()
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        (self.handler)(arguments).await
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    input: Validator,
    output: Option<Validator>,
}

/// Name-indexed set of tools with schema validation around every call.
pub struct ToolDispatcher {
    tools: HashMap<String, RegisteredTool>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a tool. Its schemas are compiled once, here.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }

        let input = compile(&name, &tool.input_schema())?;
        let output = tool
            .output_schema()
            .map(|schema| compile(&name, &schema))
            .transpose()?;

        debug!(tool = %name, "Registered tool");
        self.tools.insert(name, RegisteredTool { tool, input, output });
        Ok(())
    }

    /// Register a closure as a tool.
    pub fn register_tool<F, Fut>(
        &mut self,
        name: impl Into<String>,
        input_schema: Value,
        output_schema: Option<Value>,
        handler: F,
    ) -> Result<(), ToolError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register(Arc::new(FnTool::new(name, input_schema, output_schema, handler)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Descriptors for the reasoning backend, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> =
            self.tools.values().map(|t| t.tool.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Validate `arguments`, run the tool, and validate what it returns.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        if !entry.input.is_valid(&arguments) {
            let violations = violations(&entry.input, &arguments);
            debug!(tool = %name, ?violations, "Rejected tool arguments");
            return Err(ToolError::InvalidArguments {
                tool_name: name.to_string(),
                violations,
            });
        }

        let call = AssertUnwindSafe(entry.tool.execute(arguments)).catch_unwind();
        let value = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                warn!(tool = %name, timeout_secs = self.timeout.as_secs(), "Tool call timed out");
                return Err(ToolError::Timeout {
                    tool_name: name.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
            Ok(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                warn!(tool = %name, %message, "Tool handler panicked");
                return Err(ToolError::failed(name, format!("handler panicked: {message}")));
            }
            Ok(Ok(Err(e))) => return Err(normalize(name, e)),
            Ok(Ok(Ok(value))) => value,
        };

        if let Some(output) = &entry.output {
            if !output.is_valid(&value) {
                let violations = violations(output, &value);
                warn!(tool = %name, ?violations, "Tool returned invalid output");
                return Err(ToolError::InvalidOutput {
                    tool_name: name.to_string(),
                    violations,
                });
            }
        }

        Ok(ToolOutput {
            tool_name: name.to_string(),
            value,
        })
    }
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(tool_name: &str, schema: &Value) -> Result<Validator, ToolError> {
    Validator::new(schema).map_err(|e| ToolError::InvalidSchema {
        tool_name: tool_name.to_string(),
        reason: e.to_string(),
    })
}

fn violations(validator: &Validator, instance: &Value) -> Vec<String> {
    validator.iter_errors(instance).map(|e| e.to_string()).collect()
}

/// Handlers may report failures in any shape; the caller sees one.
fn normalize(tool_name: &str, error: ToolError) -> ToolError {
    match error {
        e @ (ToolError::ExecutionFailed { .. }
        | ToolError::Timeout { .. }
        | ToolError::InvalidArguments { .. }) => e,
        other => ToolError::failed(tool_name, other.to_string()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn text_schema() -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"],
            "additionalProperties": false
        })
    }

    fn echo_dispatcher() -> ToolDispatcher {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher
            .register_tool("echo", text_schema(), Some(json!({"type": "string"})), |args| async move {
                Ok(args["text"].clone())
            })
            .unwrap();
        dispatcher
    }

    #[tokio::test]
    async fn invokes_registered_tool() {
        let out = echo_dispatcher().invoke("echo", json!({"text": "hello"})).await.unwrap();
        assert_eq!(out.tool_name, "echo");
        assert_eq!(out.value, json!("hello"));
    }

    #[tokio::test]
    async fn pure_handler_gives_identical_outputs() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register(Arc::new(crate::CalculatorTool::default())).unwrap();

        let args = json!({"expression": "(2 + 3) * 4 ^ 2"});
        let first = dispatcher.invoke("calculator", args.clone()).await.unwrap();
        let second = dispatcher.invoke("calculator", args).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.value["result"], json!(80));
    }

    #[tokio::test]
    async fn deeply_nested_expression_fails_without_aborting() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register(Arc::new(crate::CalculatorTool::default())).unwrap();

        let expression = format!("{}1", "-".repeat(200_000));
        let err = dispatcher
            .invoke("calculator", json!({ "expression": expression }))
            .await
            .unwrap_err();
        match err {
            ToolError::ExecutionFailed { message, .. } => assert!(message.contains("nested too deeply")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool() {
        let err = echo_dispatcher().invoke("shell", json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::NotFound("shell".into()));
    }

    #[tokio::test]
    async fn reports_every_argument_violation() {
        let err = echo_dispatcher()
            .invoke("echo", json!({"text": 5, "extra": true}))
            .await
            .unwrap_err();
        match err {
            ToolError::InvalidArguments { tool_name, violations } => {
                assert_eq!(tool_name, "echo");
                assert_eq!(violations.len(), 2, "{violations:?}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn handler_is_not_called_with_invalid_arguments() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut dispatcher = ToolDispatcher::new();
        dispatcher
            .register_tool("count", text_schema(), None, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(Value::Null) }
            })
            .unwrap();

        assert!(dispatcher.invoke("count", json!({})).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_error_becomes_execution_failure() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher
            .register_tool("flaky", json!({"type": "object"}), None, |_| async {
                Err(ToolError::NotFound("backing service".into()))
            })
            .unwrap();

        let err = dispatcher.invoke("flaky", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { ref tool_name, .. } if tool_name == "flaky"));
    }

    #[tokio::test]
    async fn handler_panic_is_caught() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher
            .register_tool("boom", json!({"type": "object"}), None, |_| async {
                if true {
                    panic!("disk on fire");
                }
                Ok(Value::Null)
            })
            .unwrap();

        match dispatcher.invoke("boom", json!({})).await.unwrap_err() {
            ToolError::ExecutionFailed { message, .. } => assert!(message.contains("disk on fire")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let mut dispatcher = ToolDispatcher::new().with_timeout(Duration::from_secs(2));
        dispatcher
            .register_tool("sleepy", json!({"type": "object"}), None, |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Value::Null)
            })
            .unwrap();

        let err = dispatcher.invoke("sleepy", json!({})).await.unwrap_err();
        assert_eq!(
            err,
            ToolError::Timeout {
                tool_name: "sleepy".into(),
                timeout_secs: 2
            }
        );
    }

    #[tokio::test]
    async fn output_is_validated() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher
            .register_tool("liar", json!({"type": "object"}), Some(json!({"type": "string"})), |_| async {
                Ok(json!(42))
            })
            .unwrap();

        let err = dispatcher.invoke("liar", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidOutput { .. }));
    }

    #[test]
    fn duplicate_and_malformed_registrations() {
        let mut dispatcher = echo_dispatcher();
        let err = dispatcher
            .register_tool("echo", text_schema(), None, |_| async { Ok(Value::Null) })
            .unwrap_err();
        assert_eq!(err, ToolError::DuplicateTool("echo".into()));

        let err = dispatcher
            .register_tool("bad", json!({"type": "no-such-type"}), None, |_| async { Ok(Value::Null) })
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidSchema { .. }));
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn descriptors_are_sorted() {
        let mut dispatcher = echo_dispatcher();
        dispatcher
            .register_tool("add", json!({"type": "object"}), None, |_| async { Ok(Value::Null) })
            .unwrap();
        let names: Vec<String> = dispatcher.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["add", "echo"]);
        assert_eq!(dispatcher.names(), vec!["add", "echo"]);
    }
}
