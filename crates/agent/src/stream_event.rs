//! Agent-level streaming events.
//!
//! A streamed run executes on its own task and forwards its progress over an
//! unbounded channel as [`AgentStreamEvent`]s, so front-ends can relay them
//! over SSE or WebSocket. The channel always ends with exactly one `done`
//! event carrying the outcome.

use std::sync::Arc;

use agentry_core::error::Error;
use agentry_core::event::StepEvent;
use agentry_core::message::Message;
use agentry_core::session::{RunOutcome, RunSession};
use agentry_core::workflow::{RunContext, RunListener, Workflow};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Events emitted by a run during streaming execution.
///
/// - `step`: a trace event was recorded
/// - `message`: a message was appended to the history
/// - `done`: the run is over; always the last event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Step { event: StepEvent },

    Message { message: Message },

    Done { outcome: RunOutcome },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Step { .. } => "step",
            Self::Message { .. } => "message",
            Self::Done { .. } => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Forwards listener callbacks into the stream channel, then to any listener
/// the caller had already installed.
struct ChannelListener {
    tx: mpsc::UnboundedSender<AgentStreamEvent>,
    inner: Option<Arc<dyn RunListener>>,
}

impl RunListener for ChannelListener {
    fn on_step(&self, event: &StepEvent) {
        // A dropped receiver only means nobody is watching.
        let _ = self.tx.send(AgentStreamEvent::Step { event: event.clone() });
        if let Some(inner) = &self.inner {
            inner.on_step(event);
        }
    }

    fn on_message(&self, message: &Message) {
        let _ = self.tx.send(AgentStreamEvent::Message { message: message.clone() });
        if let Some(inner) = &self.inner {
            inner.on_message(message);
        }
    }
}

/// A run in progress on another task.
pub struct RunStream {
    session_id: String,
    receiver: mpsc::UnboundedReceiver<AgentStreamEvent>,
    handle: JoinHandle<RunSession>,
}

impl RunStream {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The next event, or `None` once the run's task has finished and the
    /// channel is drained.
    pub async fn recv(&mut self) -> Option<AgentStreamEvent> {
        self.receiver.recv().await
    }

    /// Adapt the channel to a `futures::Stream`. The run keeps going on its
    /// task; the session is not returned.
    pub fn into_stream(self) -> UnboundedReceiverStream<AgentStreamEvent> {
        UnboundedReceiverStream::new(self.receiver)
    }

    /// Wait for the run to end and take back its session. Undelivered events
    /// are discarded.
    pub async fn finish(self) -> agentry_core::Result<RunSession> {
        drop(self.receiver);
        self.handle
            .await
            .map_err(|e| Error::Internal(format!("run task failed: {e}")))
    }

    /// Drain every event up to and including `done`, then return them with
    /// the session.
    pub async fn collect(mut self) -> agentry_core::Result<(Vec<AgentStreamEvent>, RunSession)> {
        let mut events = Vec::new();
        while let Some(event) = self.receiver.recv().await {
            let done = event.is_done();
            events.push(event);
            if done {
                break;
            }
        }
        let session = self.finish().await?;
        Ok((events, session))
    }
}

/// Spawn `workflow` on `session` and stream its progress.
pub fn spawn_run<W>(workflow: Arc<W>, mut session: RunSession, input: String, ctx: RunContext) -> RunStream
where
    W: Workflow + ?Sized + 'static,
{
    let (tx, receiver) = mpsc::unbounded_channel();
    let session_id = session.session_id.clone();

    let listener = Arc::new(ChannelListener {
        tx: tx.clone(),
        inner: ctx.listener.clone(),
    });
    let ctx = ctx.with_listener(listener);

    let handle = tokio::spawn(async move {
        let outcome = workflow.run(&mut session, &input, &ctx).await;
        debug!(session_id = %session.session_id, "Streamed run finished");
        let _ = tx.send(AgentStreamEvent::Done { outcome });
        session
    });

    RunStream {
        session_id,
        receiver,
        handle,
    }
}
