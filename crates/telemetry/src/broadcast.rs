//! Fan-out of step events to async consumers over a broadcast channel.

use agentry_core::event::{StepEvent, TraceSubscriber};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A trace subscriber that re-publishes events on a `tokio` broadcast
/// channel, for UIs and other consumers living on their own tasks.
///
/// Slow receivers miss the oldest events (`RecvError::Lagged`) rather than
/// blocking the run.
pub struct BroadcastSubscriber {
    sender: broadcast::Sender<Arc<StepEvent>>,
}

impl BroadcastSubscriber {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StepEvent>> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastSubscriber {
    fn default() -> Self {
        Self::new(256)
    }
}

impl TraceSubscriber for BroadcastSubscriber {
    fn on_event(&self, event: &StepEvent) -> Result<(), String> {
        // No receivers is not an error: nobody is listening right now.
        let _ = self.sender.send(Arc::new(event.clone()));
        Ok(())
    }
}
