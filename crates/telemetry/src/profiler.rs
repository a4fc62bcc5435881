//! Profiler: pairs START/END events into spans, per session.

use agentry_core::event::{StepEvent, StepEventType, TraceSubscriber};
use agentry_core::provider::Usage;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::TelemetryError;
use crate::model::{SessionProfile, Span};

#[derive(Default)]
struct SessionState {
    profile: SessionProfile,
    /// Indices into `profile.spans` of spans still open, innermost last.
    open: Vec<usize>,
}

/// A trace subscriber that turns event streams into [`SessionProfile`]s.
///
/// Thread-safe; one profiler can watch any number of concurrent sessions.
#[derive(Default)]
pub struct Profiler {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into its session's profile.
    pub fn record(&self, event: &StepEvent) -> Result<(), TelemetryError> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let state = sessions
            .entry(event.session_id.clone())
            .or_insert_with(|| SessionState {
                profile: SessionProfile::new(event.session_id.clone()),
                open: Vec::new(),
            });

        match event.event_type {
            StepEventType::Start => {
                state.open.push(state.profile.spans.len());
                state.profile.spans.push(Span {
                    kind: event.kind,
                    name: event.name.clone(),
                    start_seq: event.seq,
                    started_at: event.timestamp,
                    ended_at: None,
                    usage: None,
                    input: event.data.input.clone(),
                    output: None,
                    depth: state.open.len() - 1,
                });
            }
            StepEventType::End => {
                // Innermost open span with the same kind, name and call id.
                let end_id = call_id(event.data.output.as_ref());
                let pos = state
                    .open
                    .iter()
                    .rposition(|&i| {
                        let s = &state.profile.spans[i];
                        s.kind == event.kind
                            && s.name == event.name
                            && (end_id.is_none() || end_id == call_id(s.input.as_ref()))
                    })
                    .ok_or_else(|| TelemetryError::UnmatchedEnd {
                        session_id: event.session_id.clone(),
                        kind: event.kind.to_string(),
                        name: event.name.clone(),
                    })?;
                let idx = state.open.remove(pos);
                let span = &mut state.profile.spans[idx];
                span.ended_at = Some(event.timestamp);
                span.output = event.data.output.clone();
                span.usage = event.usage;
                if let Some(usage) = &event.usage {
                    state.profile.usage.add(usage);
                }
            }
            StepEventType::Point => {
                state.profile.spans.push(Span {
                    kind: event.kind,
                    name: event.name.clone(),
                    start_seq: event.seq,
                    started_at: event.timestamp,
                    ended_at: Some(event.timestamp),
                    usage: event.usage,
                    input: event.data.input.clone(),
                    output: event.data.output.clone(),
                    depth: state.open.len(),
                });
                if let Some(usage) = &event.usage {
                    state.profile.usage.add(usage);
                }
            }
        }
        Ok(())
    }

    /// Snapshot of one session's profile.
    pub fn profile(&self, session_id: &str) -> Option<SessionProfile> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .map(|s| s.profile.clone())
    }

    /// Ids of every session seen so far, sorted.
    pub fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Usage summed over every session.
    pub fn total_usage(&self) -> Usage {
        let mut total = Usage::default();
        for state in self.sessions.read().unwrap_or_else(|e| e.into_inner()).values() {
            total.add(&state.profile.usage);
        }
        total
    }

    /// Drop a session's profile. Returns it if it existed.
    pub fn remove(&self, session_id: &str) -> Option<SessionProfile> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id)
            .map(|s| s.profile)
    }
}

/// The `id` a tool event carries, so concurrent calls to one tool pair up.
fn call_id(payload: Option<&serde_json::Value>) -> Option<&str> {
    payload?.get("id")?.as_str()
}

impl TraceSubscriber for Profiler {
    fn on_event(&self, event: &StepEvent) -> Result<(), String> {
        self.record(event).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_core::event::{StepKind, TraceEmitter};
    use agentry_core::session::RunSession;
    use std::sync::Arc;

    fn feed(profiler: &Profiler, session: &mut RunSession, event: StepEvent) {
        let recorded = session.record(event).clone();
        profiler.record(&recorded).unwrap();
    }

    #[test]
    fn nested_spans_are_paired() {
        let profiler = Profiler::new();
        let mut session = RunSession::with_id("s1");

        feed(&profiler, &mut session, StepEvent::start(StepKind::Run, "agent"));
        feed(&profiler, &mut session, StepEvent::start(StepKind::Reasoning, "reasoning"));
        feed(
            &profiler,
            &mut session,
            StepEvent::end(StepKind::Reasoning, "reasoning").with_usage(Some(Usage::new(10, 5))),
        );
        feed(&profiler, &mut session, StepEvent::start(StepKind::Acting, "acting"));
        feed(&profiler, &mut session, StepEvent::start(StepKind::Tool, "echo"));
        feed(
            &profiler,
            &mut session,
            StepEvent::end(StepKind::Tool, "echo").with_output(serde_json::json!("hi")),
        );
        feed(&profiler, &mut session, StepEvent::end(StepKind::Acting, "acting"));

        let profile = profiler.profile("s1").unwrap();
        assert_eq!(profile.spans.len(), 4);
        assert_eq!(profile.usage.total_tokens, 15);
        assert_eq!(profile.open_spans().count(), 1);
        assert_eq!(profile.run_span().unwrap().depth, 0);

        let tool = profile.spans.iter().find(|s| s.kind == StepKind::Tool).unwrap();
        assert_eq!(tool.depth, 2);
        assert_eq!(tool.output, Some(serde_json::json!("hi")));
    }

    #[test]
    fn interleaved_tool_calls_pair_by_id() {
        let profiler = Profiler::new();
        let mut session = RunSession::with_id("s1");
        let start = |id: &str| StepEvent::start(StepKind::Tool, "echo").with_input(serde_json::json!({ "id": id }));
        let end = |id: &str| {
            StepEvent::end(StepKind::Tool, "echo").with_output(serde_json::json!({ "id": id, "output": id }))
        };

        feed(&profiler, &mut session, start("first"));
        feed(&profiler, &mut session, start("second"));
        feed(&profiler, &mut session, end("first"));
        feed(&profiler, &mut session, end("second"));

        let profile = profiler.profile("s1").unwrap();
        assert_eq!(profile.open_spans().count(), 0);
        for span in &profile.spans {
            let input = span.input.as_ref().unwrap();
            let output = span.output.as_ref().unwrap();
            assert_eq!(input["id"], output["id"]);
        }
    }

    #[test]
    fn unmatched_end_is_reported() {
        let profiler = Profiler::new();
        let mut session = RunSession::with_id("s1");
        let event = session.record(StepEvent::end(StepKind::Tool, "ghost")).clone();
        let err = profiler.record(&event).unwrap_err();
        assert!(matches!(err, TelemetryError::UnmatchedEnd { .. }));
    }

    #[test]
    fn sessions_are_kept_apart() {
        let profiler = Arc::new(Profiler::new());
        let emitter = TraceEmitter::new();
        emitter.subscribe(profiler.clone());

        for id in ["a", "b"] {
            let mut session = RunSession::with_id(id);
            let start = session.record(StepEvent::start(StepKind::Run, "agent")).clone();
            emitter.publish(&start);
            let end = session
                .record(StepEvent::end(StepKind::Run, "agent").with_usage(Some(Usage::new(1, 1))))
                .clone();
            emitter.publish(&end);
        }

        assert_eq!(profiler.sessions(), vec!["a", "b"]);
        assert_eq!(profiler.profile("a").unwrap().spans.len(), 1);
        assert_eq!(profiler.total_usage().total_tokens, 4);
        assert!(profiler.remove("a").is_some());
        assert_eq!(profiler.sessions(), vec!["b"]);
    }
}
