//! # Agentry Builder
//!
//! Turns declarative component configs into a live object graph.
//!
//! - [`TypeRegistry`] maps a component `kind` to its factory; plugins fill it.
//! - [`ComponentBuilder`] collects declarations, orders them by dependency,
//!   and calls each factory exactly once.
//! - [`RunnableGraph`] owns the result and releases acquired resources on
//!   shutdown.

pub mod builder;
pub mod cleanup;
pub mod context;
pub mod graph;
pub mod registry;

#[cfg(test)]
mod testing;

pub use builder::ComponentBuilder;
pub use cleanup::CleanupStack;
pub use context::BuildContext;
pub use graph::RunnableGraph;
pub use registry::{ComponentFactory, DiscoveryReport, Plugin, TypeRegistry};
