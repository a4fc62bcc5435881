//! Bridges step events into `tracing`.

use agentry_core::event::{StepEvent, StepEventType, TraceSubscriber};
use tracing::{debug, trace};

/// Logs every step event at debug level (payloads at trace level).
///
/// Install a `tracing` subscriber in the host application to see the output.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSubscriber {
    include_payloads: bool,
}

impl LogSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log event inputs and outputs.
    pub fn with_payloads(mut self) -> Self {
        self.include_payloads = true;
        self
    }
}

impl TraceSubscriber for LogSubscriber {
    fn on_event(&self, event: &StepEvent) -> Result<(), String> {
        let phase = match event.event_type {
            StepEventType::Start => "start",
            StepEventType::End => "end",
            StepEventType::Point => "point",
        };
        debug!(
            session_id = %event.session_id,
            seq = event.seq,
            kind = %event.kind,
            name = %event.name,
            phase,
            tokens = event.usage.map(|u| u.total_tokens),
            "Step event"
        );
        if self.include_payloads {
            trace!(
                session_id = %event.session_id,
                seq = event.seq,
                input = ?event.data.input,
                output = ?event.data.output,
                "Step payload"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_core::event::StepKind;

    #[test]
    fn never_fails() {
        let event = StepEvent::start(StepKind::Tool, "echo").with_input(serde_json::json!({"text": "hi"}));
        assert!(LogSubscriber::new().with_payloads().on_event(&event).is_ok());
    }
}
