//! Run sessions, terminal outcomes, and the collaborator traits a run uses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RunError, StoreError};
use crate::event::StepEvent;
use crate::message::Message;

/// The mutable state of one execution of the agent loop.
///
/// Messages and trace events are append-only. A session is owned by exactly
/// one run at a time; concurrent runs each hold their own session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSession {
    pub session_id: String,

    /// Ordered conversation history
    pub messages: Vec<Message>,

    /// Ordered step events
    #[serde(default)]
    pub trace: Vec<StepEvent>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl RunSession {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            trace: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message to the history.
    pub fn push_message(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Append an event to the trace, stamping it with this session's id and
    /// the next sequence number. Returns the recorded event.
    pub fn record(&mut self, mut event: StepEvent) -> &StepEvent {
        event.seq = self.trace.last().map(|e| e.seq + 1).unwrap_or(0);
        event.session_id = self.session_id.clone();
        self.updated_at = Utc::now();
        self.trace.push(event);
        &self.trace[self.trace.len() - 1]
    }

    /// The most recent assistant message, if any.
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message::Role::Assistant)
    }

    /// Serialize only the conversation history.
    pub fn messages_to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.messages)
    }

    /// Reload a conversation history produced by [`RunSession::messages_to_json`].
    pub fn messages_from_json(json: &str) -> Result<Vec<Message>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for RunSession {
    fn default() -> Self {
        Self::new()
    }
}

/// How a run ended.
///
/// Callers can tell apart "answered", "gave up after max iterations",
/// "failed" and "cancelled" without inspecting errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The backend produced a final answer.
    Answered { content: String },

    /// The iteration limit was hit before a final answer.
    MaxIterationsReached { iterations: u32 },

    /// A fatal error ended the run.
    Failed { error: RunError },

    /// The run was cancelled from outside.
    Cancelled,
}

impl RunOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered { .. })
    }

    /// The final answer, if the run produced one.
    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Answered { content } => Some(content),
            _ => None,
        }
    }
}

/// Persistence for finished (or in-progress) sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// A human-readable name for this store (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Insert or replace a session.
    async fn save(&self, session: &RunSession) -> Result<(), StoreError>;

    /// Load a session by id.
    async fn load(&self, session_id: &str) -> Result<RunSession, StoreError>;

    /// List stored session ids.
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Delete a session. Returns false if it did not exist.
    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;
}

/// Supplies a fresh environment snapshot at the start of each observing phase
/// (screen capture, document search results, sensor readings, ...).
#[async_trait]
pub trait Observer: Send + Sync {
    fn name(&self) -> &str;

    /// Returns a message to append to the history, or `None` when there is
    /// nothing new to report.
    async fn observe(&self, session: &RunSession) -> crate::Result<Option<Message>>;
}
