//! The runnable entry point of a built graph.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::event::StepEvent;
use crate::message::Message;
use crate::session::{RunOutcome, RunSession};

/// Receives a run's progress as it happens (for streaming front-ends).
///
/// Called synchronously from the run; implementations should only enqueue.
pub trait RunListener: Send + Sync {
    fn on_step(&self, event: &StepEvent);
    fn on_message(&self, message: &Message);
}

/// Per-run control: cancellation plus an optional progress listener.
#[derive(Clone, Default)]
pub struct RunContext {
    pub cancel: CancellationToken,
    pub listener: Option<Arc<dyn RunListener>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn RunListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn notify_step(&self, event: &StepEvent) {
        if let Some(listener) = &self.listener {
            listener.on_step(event);
        }
    }

    pub fn notify_message(&self, message: &Message) {
        if let Some(listener) = &self.listener {
            listener.on_message(message);
        }
    }
}

/// A top-level agent or workflow that can execute a task.
#[async_trait]
pub trait Workflow: Send + Sync {
    fn name(&self) -> &str;

    /// Run `input` to completion against `session`.
    ///
    /// Never returns an error: fatal conditions are reported through
    /// [`RunOutcome::Failed`].
    async fn run(&self, session: &mut RunSession, input: &str, ctx: &RunContext) -> RunOutcome;
}
