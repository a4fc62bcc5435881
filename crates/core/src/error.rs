//! Error types for the Agentry domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] unifies them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all Agentry operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Build-time (configuration) errors ---
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    // --- Reasoning backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Session store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors raised while registering kinds or building the component graph.
///
/// All of these are fatal: a run never starts when the graph fails to build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Unknown component kind: {0}")]
    UnknownKind(String),

    #[error("Component kind already registered: {0}")]
    DuplicateKind(String),

    #[error("Component name declared twice: {0}")]
    DuplicateComponent(String),

    #[error("Component '{component}' depends on undeclared component '{dependency}'")]
    UnresolvedDependency {
        component: String,
        dependency: String,
    },

    #[error("Cyclic dependency between components: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("No entry component was set")]
    MissingEntry,

    #[error("Entry component already set to '{0}'")]
    EntryAlreadySet(String),

    #[error("Invalid params for component '{component}': {reason}")]
    InvalidParams { component: String, reason: String },

    #[error("Component '{name}' is not a {expected}")]
    WrongComponentType { name: String, expected: String },

    #[error("Factory for '{component}' failed: {reason}")]
    Factory { component: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend has no more responses: {0}")]
    Exhausted(String),
}

impl BackendError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transient transport failures, rate limits and server-side (5xx) errors
    /// are retryable. Authentication, unknown models and client (4xx) errors
    /// are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::RateLimited { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            Self::Authentication(_) | Self::ModelNotFound(_) | Self::Exhausted(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {tool_name}: {}", violations.join("; "))]
    InvalidArguments {
        tool_name: String,
        violations: Vec<String>,
    },

    #[error("Tool execution failed: {tool_name}: {message}")]
    ExecutionFailed { tool_name: String, message: String },

    #[error("Invalid output from {tool_name}: {}", violations.join("; "))]
    InvalidOutput {
        tool_name: String,
        violations: Vec<String>,
    },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Invalid schema for {tool_name}: {reason}")]
    InvalidSchema { tool_name: String, reason: String },
}

impl ToolError {
    /// Shorthand used by tool handlers for execution failures.
    pub fn failed(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// A fatal error that ended a run.
///
/// Unlike the other error types this one is part of the run's terminal
/// result, so it is serialisable and cloneable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum RunError {
    #[error("reasoning backend failed after {attempts} attempt(s): {message}")]
    Backend { message: String, attempts: u32 },

    #[error("tool '{tool_name}' failed {failures} times in a row")]
    ToolFailureThreshold { tool_name: String, failures: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_displays_correctly() {
        let err = Error::Backend(BackendError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn unresolved_dependency_names_both_sides() {
        let err = BuildError::UnresolvedDependency {
            component: "B".into(),
            dependency: "Z".into(),
        };
        let text = err.to_string();
        assert!(text.contains("'B'"));
        assert!(text.contains("'Z'"));
    }

    #[test]
    fn cycle_is_rendered_as_path() {
        let err = BuildError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn invalid_arguments_lists_every_violation() {
        let err = ToolError::InvalidArguments {
            tool_name: "echo".into(),
            violations: vec!["missing text".into(), "extra field".into()],
        };
        assert!(err.to_string().contains("missing text; extra field"));
    }

    #[test]
    fn retryable_classification() {
        assert!(BackendError::Timeout(5).is_retryable());
        assert!(BackendError::Network("reset".into()).is_retryable());
        assert!(BackendError::RateLimited { retry_after_secs: 1 }.is_retryable());
        assert!(BackendError::Api { status_code: 503, message: String::new() }.is_retryable());
        assert!(!BackendError::Api { status_code: 400, message: String::new() }.is_retryable());
        assert!(!BackendError::Authentication("bad key".into()).is_retryable());
    }

    #[test]
    fn run_error_serializes_with_category() {
        let err = RunError::ToolFailureThreshold {
            tool_name: "shell".into(),
            failures: 3,
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains(r#""category":"tool_failure_threshold""#));
    }
}
