//! Scripted backend: replays a fixed list of responses.
//!
//! Used for tests, demos and offline runs. Each `complete()` call consumes the
//! next step; once the script runs out every call fails with
//! [`BackendError::Exhausted`].

use agentry_core::error::BackendError;
use agentry_core::message::{Content, Message, ToolCallRequest};
use agentry_core::provider::{ReasoningBackend, ReasoningRequest, ReasoningResponse, Usage};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// One step of a script, as written in component params.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptStep {
    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub tool_calls: Vec<ScriptedCall>,

    /// Fail this call instead of answering.
    #[serde(default)]
    pub error: Option<ScriptedError>,

    /// Wait this long before answering.
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedError {
    Network { message: String },
    Timeout,
    RateLimited,
    Authentication,
    Api { status_code: u16, message: String },
}

impl From<ScriptedError> for BackendError {
    fn from(e: ScriptedError) -> Self {
        match e {
            ScriptedError::Network { message } => BackendError::Network(message),
            ScriptedError::Timeout => BackendError::Timeout(0),
            ScriptedError::RateLimited => BackendError::RateLimited { retry_after_secs: 0 },
            ScriptedError::Authentication => BackendError::Authentication("scripted".into()),
            ScriptedError::Api { status_code, message } => BackendError::Api { status_code, message },
        }
    }
}

/// Params of the `llm/scripted` kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedSettings {
    #[serde(default)]
    pub responses: Vec<ScriptStep>,
}

struct Step {
    result: Result<ReasoningResponse, BackendError>,
    delay: Duration,
}

/// A backend that answers from a queue.
pub struct ScriptedBackend {
    name: String,
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Build a backend from param-style steps. Calls without an `id` are
    /// numbered `call_<step>_<index>`.
    pub fn from_script(name: impl Into<String>, script: Vec<ScriptStep>) -> Self {
        let backend = Self::new(name);
        for (n, step) in script.into_iter().enumerate() {
            let delay = Duration::from_millis(step.delay_ms);
            let result = match step.error {
                Some(e) => Err(e.into()),
                None if step.tool_calls.is_empty() => {
                    Ok(response(Message::assistant(step.content.unwrap_or_default())))
                }
                None => {
                    let calls = step
                        .tool_calls
                        .into_iter()
                        .enumerate()
                        .map(|(i, c)| {
                            let id = c.id.unwrap_or_else(|| format!("call_{n}_{i}"));
                            ToolCallRequest::new(id, c.name, c.arguments)
                        })
                        .collect();
                    Ok(response(Message::assistant_tool_calls(
                        step.content.map(Content::from),
                        calls,
                    )))
                }
            };
            backend.push(result, delay);
        }
        backend
    }

    fn push(&self, result: Result<ReasoningResponse, BackendError>, delay: Duration) {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Step { result, delay });
    }

    /// Queue a final text answer.
    pub fn then_answer(self, text: impl Into<String>) -> Self {
        self.push(Ok(response(Message::assistant(text.into()))), Duration::ZERO);
        self
    }

    /// Queue a response requesting the given tool calls.
    pub fn then_call(self, calls: Vec<ToolCallRequest>) -> Self {
        self.push(Ok(response(Message::assistant_tool_calls(None, calls))), Duration::ZERO);
        self
    }

    /// Queue a failure.
    pub fn then_fail(self, error: BackendError) -> Self {
        self.push(Err(error), Duration::ZERO);
        self
    }

    /// Queue a delayed answer (for timeout and cancellation tests).
    pub fn then_answer_after(self, delay: Duration, text: impl Into<String>) -> Self {
        self.push(Ok(response(Message::assistant(text.into()))), delay);
        self
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of `complete()` calls so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

fn response(message: Message) -> ReasoningResponse {
    ReasoningResponse {
        message,
        usage: Some(Usage::new(10, 5)),
        model: "scripted".into(),
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ReasoningRequest) -> Result<ReasoningResponse, BackendError> {
        let call = {
            let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
            requests.push(request);
            requests.len()
        };
        let step = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        let Some(step) = step else {
            return Err(BackendError::Exhausted(format!(
                "{} has no response for call #{call}",
                self.name
            )));
        };

        debug!(backend = %self.name, call, "Replaying scripted response");
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.result
    }
}
