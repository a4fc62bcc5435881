//! The agent reasoning loop implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use agentry_core::error::{BackendError, RunError, ToolError};
use agentry_core::event::{StepEvent, StepKind, TraceEmitter};
use agentry_core::message::{Message, ToolCallRequest};
use agentry_core::provider::{ReasoningBackend, ReasoningRequest, ReasoningResponse};
use agentry_core::session::{Observer, RunOutcome, RunSession, SessionStore};
use agentry_core::tool::ToolOutput;
use agentry_core::workflow::{RunContext, Workflow};
use agentry_tools::ToolDispatcher;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::settings::LoopSettings;
use crate::stream_event::{self, RunStream};

/// Where the loop is between transitions.
enum State {
    Observing,
    Reasoning,
    Acting(Vec<ToolCallRequest>),
    Done(RunOutcome),
}

/// Why a reasoning step did not produce a response.
enum Interrupted {
    Cancelled,
    Failed(RunError),
}

/// The tool-calling agent: observe, ask the backend, run the tools it asks
/// for, repeat until it answers.
pub struct AgentLoop {
    name: String,

    backend: Arc<dyn ReasoningBackend>,

    tools: Arc<ToolDispatcher>,

    settings: LoopSettings,

    /// Prepended once when the session has no history yet
    system_prompt: Option<String>,

    observer: Option<Arc<dyn Observer>>,

    /// Receives the session at the end of every run
    store: Option<Arc<dyn SessionStore>>,

    emitter: Arc<TraceEmitter>,
}

impl AgentLoop {
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn ReasoningBackend>,
        tools: Arc<ToolDispatcher>,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            tools,
            settings: LoopSettings::default(),
            system_prompt: None,
            observer: None,
            store: None,
            emitter: Arc::new(TraceEmitter::new()),
        }
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the maximum number of reasoning→acting cycles.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.settings.max_iterations = max;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an emitter with the rest of the graph.
    pub fn with_emitter(mut self, emitter: Arc<TraceEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn tools(&self) -> &Arc<ToolDispatcher> {
        &self.tools
    }

    pub fn emitter(&self) -> &Arc<TraceEmitter> {
        &self.emitter
    }

    /// Run on a spawned task and receive progress over a channel.
    pub fn stream(
        self: Arc<Self>,
        session: RunSession,
        input: impl Into<String>,
        ctx: RunContext,
    ) -> RunStream {
        stream_event::spawn_run(self, session, input.into(), ctx)
    }

    fn emit(&self, session: &mut RunSession, ctx: &RunContext, event: StepEvent) {
        let recorded = session.record(event);
        self.emitter.publish(recorded);
        ctx.notify_step(recorded);
    }

    fn append(&self, session: &mut RunSession, ctx: &RunContext, message: Message) {
        ctx.notify_message(&message);
        session.push_message(message);
    }

    async fn observe(&self, session: &mut RunSession, ctx: &RunContext, input: &str, first: bool) {
        self.emit(session, ctx, StepEvent::start(StepKind::Observing, "observing"));
        let mut appended = 0;

        if first {
            if session.messages.is_empty() {
                if let Some(prompt) = &self.system_prompt {
                    self.append(session, ctx, Message::system(prompt.as_str()));
                    appended += 1;
                }
            }
            self.append(session, ctx, Message::user(input));
            appended += 1;
        }

        if let Some(observer) = &self.observer {
            match observer.observe(session).await {
                Ok(Some(snapshot)) => {
                    self.append(session, ctx, snapshot);
                    appended += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(observer = observer.name(), error = %e, "Observer failed, continuing without snapshot"),
            }
        }

        self.emit(
            session,
            ctx,
            StepEvent::end(StepKind::Observing, "observing").with_output(json!({ "appended": appended })),
        );
    }

    async fn reason(
        &self,
        session: &mut RunSession,
        ctx: &RunContext,
        iteration: u32,
    ) -> Result<ReasoningResponse, Interrupted> {
        let start = StepEvent::start(StepKind::Reasoning, self.backend.name()).with_input(json!({
            "iteration": iteration,
            "messages": session.messages.len(),
            "tools": self.tools.len(),
        }));
        self.emit(session, ctx, start);

        let request = ReasoningRequest::new(session.messages.clone(), self.tools.descriptors());
        let result = self.complete_with_retry(&session.session_id, ctx, request).await;

        let end = StepEvent::end(StepKind::Reasoning, self.backend.name());
        let end = match &result {
            Ok(response) => end
                .with_output(json!({
                    "model": response.model,
                    "tool_calls": response.message.tool_calls.len(),
                }))
                .with_usage(response.usage),
            Err(Interrupted::Failed(error)) => end.with_output(json!({ "error": error.to_string() })),
            Err(Interrupted::Cancelled) => end.with_output(json!({ "cancelled": true })),
        };
        self.emit(session, ctx, end);
        result
    }

    async fn complete_with_retry(
        &self,
        session_id: &str,
        ctx: &RunContext,
        request: ReasoningRequest,
    ) -> Result<ReasoningResponse, Interrupted> {
        let policy = self.settings.retry_policy();
        let timeout = self.settings.backend_timeout();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let call = tokio::time::timeout(timeout, self.backend.complete(request.clone()));
            let result = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(Interrupted::Cancelled),
                result = call => result.unwrap_or(Err(BackendError::Timeout(timeout.as_secs()))),
            };

            let error = match result {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= policy.max_attempts {
                warn!(session_id, backend = self.backend.name(), attempt, error = %error, "Backend call failed");
                return Err(Interrupted::Failed(RunError::Backend {
                    message: error.to_string(),
                    attempts: attempt,
                }));
            }

            let mut delay = policy.backoff(attempt - 1);
            if let BackendError::RateLimited { retry_after_secs } = &error {
                delay = delay.max(Duration::from_secs(*retry_after_secs)).min(policy.max_backoff);
            }
            warn!(
                session_id,
                backend = self.backend.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable backend failure, backing off"
            );

            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(Interrupted::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn act(
        &self,
        session: &mut RunSession,
        ctx: &RunContext,
        requested: Vec<ToolCallRequest>,
        failures: &mut HashMap<String, u32>,
    ) -> Option<RunError> {
        let names: Vec<&str> = requested.iter().map(|c| c.tool_name.as_str()).collect();
        self.emit(
            session,
            ctx,
            StepEvent::start(StepKind::Acting, "acting").with_input(json!({ "calls": names })),
        );

        // A repeated id is never executed: each id gets exactly one tool message.
        let mut seen = HashSet::new();
        let mut calls = Vec::with_capacity(requested.len());
        let mut skipped = 0;
        for call in requested {
            if seen.insert(call.id.clone()) {
                calls.push(call);
            } else {
                skipped += 1;
                warn!(session_id = %session.session_id, tool = %call.tool_name, id = %call.id, "Skipping repeated tool call id");
                self.emit(
                    session,
                    ctx,
                    StepEvent::point(StepKind::Tool, &call.tool_name)
                        .with_input(json!({ "id": call.id, "skipped": "repeated call id" })),
                );
            }
        }

        let results = if self.settings.parallel_tool_calls {
            for call in &calls {
                self.emit(session, ctx, tool_start(call));
            }
            // join_all keeps input order, so results line up with `calls`.
            let results = futures::future::join_all(
                calls.iter().map(|call| self.tools.invoke(&call.tool_name, call.arguments.clone())),
            )
            .await;
            for (call, result) in calls.iter().zip(&results) {
                self.emit(session, ctx, tool_end(call, result));
            }
            results
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                self.emit(session, ctx, tool_start(call));
                let result = self.tools.invoke(&call.tool_name, call.arguments.clone()).await;
                self.emit(session, ctx, tool_end(call, &result));
                results.push(result);
            }
            results
        };

        let mut tripped = None;
        let mut failed = 0;
        for (call, result) in calls.iter().zip(results) {
            let message = match result {
                Ok(output) => {
                    failures.remove(&call.tool_name);
                    Message::tool_result(&call.id, output.to_text())
                }
                Err(e) => {
                    failed += 1;
                    warn!(session_id = %session.session_id, tool = %call.tool_name, error = %e, "Tool call failed");
                    // Lookup and argument errors are the backend's to correct; only
                    // failures of the tool itself count toward the threshold.
                    if counts_as_tool_failure(&e) {
                        let count = failures.entry(call.tool_name.clone()).or_insert(0);
                        *count += 1;
                        let limit = self.settings.max_consecutive_tool_failures;
                        if limit > 0 && *count > limit && tripped.is_none() {
                            tripped = Some(RunError::ToolFailureThreshold {
                                tool_name: call.tool_name.clone(),
                                failures: *count,
                            });
                        }
                    }
                    Message::tool_error(&call.id, e)
                }
            };
            self.append(session, ctx, message);
        }

        self.emit(
            session,
            ctx,
            StepEvent::end(StepKind::Acting, "acting")
                .with_output(json!({ "calls": calls.len(), "failed": failed, "skipped": skipped })),
        );
        tripped
    }

    async fn persist(&self, session: &RunSession) {
        let Some(store) = &self.store else { return };
        match store.save(session).await {
            Ok(()) => debug!(session_id = %session.session_id, store = store.name(), "Saved session"),
            Err(e) => warn!(session_id = %session.session_id, store = store.name(), error = %e, "Failed to save session"),
        }
    }
}

fn counts_as_tool_failure(error: &ToolError) -> bool {
    matches!(
        error,
        ToolError::ExecutionFailed { .. } | ToolError::Timeout { .. } | ToolError::InvalidOutput { .. }
    )
}

fn tool_start(call: &ToolCallRequest) -> StepEvent {
    StepEvent::start(StepKind::Tool, &call.tool_name)
        .with_input(json!({ "id": call.id, "arguments": call.arguments }))
}

fn tool_end(call: &ToolCallRequest, result: &Result<ToolOutput, ToolError>) -> StepEvent {
    let output = match result {
        Ok(output) => json!({ "id": call.id, "output": output.value }),
        Err(e) => json!({ "id": call.id, "error": e.to_string() }),
    };
    StepEvent::end(StepKind::Tool, &call.tool_name).with_output(output)
}

#[async_trait]
impl Workflow for AgentLoop {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, session: &mut RunSession, input: &str, ctx: &RunContext) -> RunOutcome {
        info!(
            session_id = %session.session_id,
            agent = %self.name,
            backend = self.backend.name(),
            tools = self.tools.len(),
            "Starting run"
        );
        self.emit(
            session,
            ctx,
            StepEvent::start(StepKind::Run, &self.name).with_input(json!({ "input": input })),
        );

        let mut state = State::Observing;
        let mut first_pass = true;
        let mut iterations = 0u32;
        let mut failures: HashMap<String, u32> = HashMap::new();

        let outcome = loop {
            state = match state {
                State::Done(outcome) => break outcome,
                _ if ctx.is_cancelled() => State::Done(RunOutcome::Cancelled),
                State::Observing => {
                    self.observe(session, ctx, input, first_pass).await;
                    first_pass = false;
                    State::Reasoning
                }
                State::Reasoning => match self.reason(session, ctx, iterations + 1).await {
                    Err(Interrupted::Cancelled) => State::Done(RunOutcome::Cancelled),
                    Err(Interrupted::Failed(error)) => State::Done(RunOutcome::Failed { error }),
                    Ok(response) => {
                        let message = response.message;
                        if message.has_tool_calls() {
                            let calls = message.tool_calls.clone();
                            self.append(session, ctx, message);
                            State::Acting(calls)
                        } else {
                            let content = message.text();
                            self.append(session, ctx, message);
                            State::Done(RunOutcome::Answered { content })
                        }
                    }
                },
                State::Acting(calls) => {
                    let tripped = self.act(session, ctx, calls, &mut failures).await;
                    iterations += 1;
                    if let Some(error) = tripped {
                        State::Done(RunOutcome::Failed { error })
                    } else if iterations >= self.settings.max_iterations {
                        State::Done(RunOutcome::MaxIterationsReached { iterations })
                    } else {
                        State::Observing
                    }
                }
            };
        };

        self.emit(
            session,
            ctx,
            StepEvent::end(StepKind::Run, &self.name)
                .with_output(serde_json::to_value(&outcome).unwrap_or_default()),
        );
        info!(session_id = %session.session_id, iterations, ?outcome, "Run finished");

        self.persist(session).await;
        outcome
    }
}
