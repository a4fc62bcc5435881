//! Spans and per-session profiles built from step events.

use agentry_core::event::StepKind;
use agentry_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// One operation of a run, from its START event to its END event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub kind: StepKind,
    pub name: String,
    /// Sequence number of the START event.
    pub start_seq: u64,
    /// Unix seconds.
    pub started_at: f64,
    pub ended_at: Option<f64>,
    /// Backend usage reported on the END event.
    pub usage: Option<Usage>,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    /// Spans open when this one started (0 for the run itself).
    pub depth: usize,
}

impl Span {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Wall time in milliseconds, `None` while the span is open.
    pub fn duration_ms(&self) -> Option<f64> {
        self.ended_at.map(|end| ((end - self.started_at) * 1000.0).max(0.0))
    }
}

/// Everything the profiler knows about one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub session_id: String,
    /// Spans in START order.
    pub spans: Vec<Span>,
    /// Sum of the usage reported by every closed span.
    pub usage: Usage,
}

impl SessionProfile {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn count(&self, kind: StepKind) -> usize {
        self.spans.iter().filter(|s| s.kind == kind).count()
    }

    /// Total time spent in spans of `kind`, in milliseconds.
    pub fn time_in(&self, kind: StepKind) -> f64 {
        self.spans
            .iter()
            .filter(|s| s.kind == kind)
            .filter_map(Span::duration_ms)
            .sum()
    }

    /// Spans still waiting for their END event.
    pub fn open_spans(&self) -> impl Iterator<Item = &Span> {
        self.spans.iter().filter(|s| s.is_open())
    }

    /// The run span, if the run has started.
    pub fn run_span(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.kind == StepKind::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(kind: StepKind, start: f64, end: Option<f64>) -> Span {
        Span {
            kind,
            name: kind.to_string(),
            start_seq: 0,
            started_at: start,
            ended_at: end,
            usage: None,
            input: None,
            output: None,
            depth: 1,
        }
    }

    #[test]
    fn duration_is_in_milliseconds() {
        let s = span(StepKind::Tool, 10.0, Some(10.25));
        assert_eq!(s.duration_ms(), Some(250.0));
        assert_eq!(span(StepKind::Tool, 10.0, None).duration_ms(), None);
    }

    #[test]
    fn profile_aggregates_by_kind() {
        let mut profile = SessionProfile::new("s");
        profile.spans.push(span(StepKind::Reasoning, 0.0, Some(0.5)));
        profile.spans.push(span(StepKind::Reasoning, 1.0, Some(1.5)));
        profile.spans.push(span(StepKind::Acting, 0.5, None));

        assert_eq!(profile.count(StepKind::Reasoning), 2);
        assert_eq!(profile.time_in(StepKind::Reasoning), 1000.0);
        assert_eq!(profile.open_spans().count(), 1);
        assert!(profile.run_span().is_none());
    }
}
