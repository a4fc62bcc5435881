//! Trace subscribers for Agentry.
//!
//! - [`Profiler`] pairs START/END step events into spans and sums backend
//!   usage per session.
//! - [`LogSubscriber`] bridges step events into `tracing`.
//! - [`BroadcastSubscriber`] fans events out to async consumers.
//!
//! Attach any of them with `TraceEmitter::subscribe`.

pub mod broadcast;
pub mod log;
pub mod model;
pub mod profiler;

pub use broadcast::BroadcastSubscriber;
pub use log::LogSubscriber;
pub use model::{SessionProfile, Span};
pub use profiler::Profiler;

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("END event for {kind} '{name}' in session {session_id} has no matching START")]
    UnmatchedEnd {
        session_id: String,
        kind: String,
        name: String,
    },

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Render a profile as pretty JSON, e.g. for dumping after a run.
pub fn profile_to_json(profile: &SessionProfile) -> Result<String, TelemetryError> {
    Ok(serde_json::to_string_pretty(profile)?)
}
