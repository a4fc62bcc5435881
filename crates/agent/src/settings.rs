//! Loop and retry settings, deserialised from an agent component's params.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of one agent loop. Every field has a default, so an empty params
/// map is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSettings {
    /// Reasoning→acting cycles before the run gives up.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Backend attempts per reasoning step, first try included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Consecutive failures of one tool that end the run. 0 disables the check.
    #[serde(default = "default_max_consecutive_tool_failures")]
    pub max_consecutive_tool_failures: u32,

    /// Run the calls of one reasoning step concurrently.
    #[serde(default)]
    pub parallel_tool_calls: bool,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8_000
}
fn default_backend_timeout_secs() -> u64 {
    60
}
fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_max_consecutive_tool_failures() -> u32 {
    3
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backend_timeout_secs: default_backend_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_consecutive_tool_failures: default_max_consecutive_tool_failures(),
            parallel_tool_calls: false,
        }
    }
}

impl LoopSettings {
    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("max_iterations must be at least 1".into());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.backend_timeout_secs == 0 || self.tool_timeout_secs == 0 {
            return Err("timeouts must be at least 1 second".into());
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err("initial_backoff_ms must not exceed max_backoff_ms".into());
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// Params of the `agent/tool_calling` kind.
///
/// The `*_name(s)` fields name other components; the loop tunables sit
/// alongside them at the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub llm_name: String,

    #[serde(default)]
    pub tool_names: Vec<String>,

    #[serde(default)]
    pub store_name: Option<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(flatten)]
    pub loop_settings: LoopSettings,
}

/// Exponential backoff: the wait before retry `n` (0-based) is
/// `initial_backoff * 2^n`, capped at `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        LoopSettings::default().retry_policy()
    }
}
