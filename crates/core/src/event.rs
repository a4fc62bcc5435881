//! Step events and the trace emitter.
//!
//! Every significant operation of a run (state transitions, tool calls)
//! produces a [`StepEvent`]. Events are appended to the run's own trace and
//! published to any number of subscribers (profilers, UI streamers, log
//! bridges) through a [`TraceEmitter`].

use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

use crate::provider::Usage;

/// Whether an event opens, closes, or marks an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEventType {
    Start,
    End,
    Point,
}

/// What kind of operation an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// The whole run.
    Run,
    Observing,
    Reasoning,
    Acting,
    /// A single tool invocation inside an acting phase.
    Tool,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::Observing => write!(f, "observing"),
            Self::Reasoning => write!(f, "reasoning"),
            Self::Acting => write!(f, "acting"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Input/output payload attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

/// A single structured trace event. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    /// Monotonic sequence number within the run.
    pub seq: u64,

    /// The run this event belongs to.
    pub session_id: String,

    pub event_type: StepEventType,

    pub kind: StepKind,

    /// Operation name; START and END of one operation share it.
    pub name: String,

    /// Unix time in seconds with microsecond precision.
    pub timestamp: f64,

    #[serde(default)]
    pub data: StepData,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StepEvent {
    /// Create an unsequenced event. `RunSession::record` assigns `seq` and `session_id`.
    pub fn new(event_type: StepEventType, kind: StepKind, name: impl Into<String>) -> Self {
        Self {
            seq: 0,
            session_id: String::new(),
            event_type,
            kind,
            name: name.into(),
            timestamp: now_seconds(),
            data: StepData::default(),
            usage: None,
        }
    }

    pub fn start(kind: StepKind, name: impl Into<String>) -> Self {
        Self::new(StepEventType::Start, kind, name)
    }

    pub fn end(kind: StepKind, name: impl Into<String>) -> Self {
        Self::new(StepEventType::End, kind, name)
    }

    /// An instantaneous marker with no matching END.
    pub fn point(kind: StepKind, name: impl Into<String>) -> Self {
        Self::new(StepEventType::Point, kind, name)
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.data.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.data.output = Some(output);
        self
    }

    pub fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage;
        self
    }
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A consumer of published step events.
///
/// Subscribers are called synchronously on the publishing task and must not
/// block indefinitely; heavy work should be handed off to another task.
pub trait TraceSubscriber: Send + Sync {
    fn on_event(&self, event: &StepEvent) -> Result<(), String>;
}

struct FnSubscriber<F>(F);

impl<F> TraceSubscriber for FnSubscriber<F>
where
    F: Fn(&StepEvent) -> Result<(), String> + Send + Sync,
{
    fn on_event(&self, event: &StepEvent) -> Result<(), String> {
        (self.0)(event)
    }
}

/// Handle returned by [`TraceEmitter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publishes step events to subscribers in registration order.
///
/// A failing or panicking subscriber is logged and skipped; it never blocks
/// delivery to the others and never aborts the run.
pub struct TraceEmitter {
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn TraceSubscriber>)>>,
    next_id: AtomicU64,
}

impl TraceEmitter {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn TraceSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, subscriber));
        id
    }

    /// Register a closure as a subscriber.
    pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&StepEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnSubscriber(f)))
    }

    /// Remove a subscriber. Returns false if the handle was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() < before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: &StepEvent) {
        // Snapshot so subscribers may (un)subscribe from inside a callback.
        let snapshot: Vec<(SubscriptionId, Arc<dyn TraceSubscriber>)> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for (id, subscriber) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => {
                    warn!(subscriber = id.0, seq = event.seq, %reason, "Trace subscriber failed");
                }
                Err(_) => {
                    warn!(subscriber = id.0, seq = event.seq, "Trace subscriber panicked");
                }
            }
        }
    }
}

impl Default for TraceEmitter {
    fn default() -> Self {
        Self::new()
    }
}
