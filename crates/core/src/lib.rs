//! # Agentry Core
//!
//! Domain types, traits, and error definitions for the Agentry agent runtime.
//! This crate defines the model every other crate implements against:
//! messages and tool call requests, step events and the trace emitter,
//! run sessions and outcomes, component configs and instances.
//!
//! ## Design Philosophy
//!
//! Every pluggable subsystem is a trait here (`ReasoningBackend`, `Tool`,
//! `SessionStore`, `Observer`, `Workflow`). Implementations live in their
//! respective crates and are wired together by the builder from
//! configuration.

pub mod component;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;
pub mod workflow;

// Re-export key types at crate root for ergonomics
pub use component::{ComponentConfig, ComponentInstance};
pub use error::{BackendError, BuildError, Error, Result, RunError, StoreError, ToolError};
pub use event::{StepData, StepEvent, StepEventType, StepKind, SubscriptionId, TraceEmitter, TraceSubscriber};
pub use message::{Content, Message, Role, ToolCallRequest};
pub use provider::{ReasoningBackend, ReasoningRequest, ReasoningResponse, ToolDescriptor, Usage};
pub use session::{Observer, RunOutcome, RunSession, SessionStore};
pub use tool::{Tool, ToolOutput};
pub use workflow::{RunContext, RunListener, Workflow};
