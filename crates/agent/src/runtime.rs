//! Config → registry → graph → run, in one place.

use std::path::Path;
use std::sync::Arc;

use agentry_builder::{ComponentBuilder, Plugin, RunnableGraph, TypeRegistry};
use agentry_config::{ConfigError, WorkflowConfig};
use agentry_core::error::BuildError;
use agentry_core::event::TraceEmitter;
use agentry_core::session::{RunOutcome, RunSession};
use agentry_core::workflow::RunContext;
use thiserror::Error;
use tracing::{info, warn};

use crate::stream_event::{self, RunStream};

/// Every plugin shipped with the workspace.
pub fn builtin_plugins() -> Vec<Plugin> {
    vec![
        agentry_tools::PLUGIN,
        agentry_providers::PLUGIN,
        agentry_store::PLUGIN,
        crate::PLUGIN,
    ]
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),
}

/// A built component graph ready to serve runs.
///
/// Cheap to share: many sessions may run concurrently against one runtime.
pub struct Runtime {
    registry: Arc<TypeRegistry>,
    graph: Arc<RunnableGraph>,
}

impl Runtime {
    /// Load a workflow file (with environment overrides) and build it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let config = WorkflowConfig::load(path.as_ref())?;
        Self::from_config(&config)
    }

    /// Build from a parsed config using the plugins it names.
    pub fn from_config(config: &WorkflowConfig) -> Result<Self, RuntimeError> {
        Self::from_config_with_emitter(config, Arc::new(TraceEmitter::new()))
    }

    /// Like [`Runtime::from_config`], publishing trace events on `emitter`.
    pub fn from_config_with_emitter(
        config: &WorkflowConfig,
        emitter: Arc<TraceEmitter>,
    ) -> Result<Self, RuntimeError> {
        let registry = Arc::new(registry_for(config)?);
        Self::build(config, registry, emitter)
    }

    /// Build against a caller-assembled registry (custom kinds, test doubles).
    pub fn build(
        config: &WorkflowConfig,
        registry: Arc<TypeRegistry>,
        emitter: Arc<TraceEmitter>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let mut builder = ComponentBuilder::new(registry.clone()).with_emitter(emitter);
        for decl in &config.components {
            builder.add(&decl.name, decl.to_component_config())?;
        }
        builder.set_entry(&config.entry.name, config.entry.to_component_config())?;

        let graph = builder.build()?;
        info!(entry = graph.entry_name(), components = graph.len(), "Runtime ready");
        Ok(Self {
            registry,
            graph: Arc::new(graph),
        })
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn graph(&self) -> &Arc<RunnableGraph> {
        &self.graph
    }

    pub fn emitter(&self) -> Arc<TraceEmitter> {
        self.graph.emitter()
    }

    /// Run `input` in a fresh session.
    pub async fn run(&self, input: &str) -> (RunSession, RunOutcome) {
        let mut session = RunSession::new();
        let outcome = self.run_session(&mut session, input, &RunContext::new()).await;
        (session, outcome)
    }

    /// Run `input` against an existing session.
    pub async fn run_session(&self, session: &mut RunSession, input: &str, ctx: &RunContext) -> RunOutcome {
        self.graph.entry().run(session, input, ctx).await
    }

    /// Run on a spawned task and stream progress.
    pub fn stream(&self, session: RunSession, input: impl Into<String>, ctx: RunContext) -> RunStream {
        stream_event::spawn_run(self.graph.entry(), session, input.into(), ctx)
    }

    /// Release the graph's resources. Returns the number of teardown actions run.
    pub fn shutdown(&self) -> usize {
        self.graph.shutdown()
    }
}

/// A registry loaded with the built-in plugins, restricted to the ones the
/// config names when it names any.
pub fn registry_for(config: &WorkflowConfig) -> Result<TypeRegistry, RuntimeError> {
    let available = builtin_plugins();
    let selected: Vec<Plugin> = match &config.plugins {
        None => available,
        Some(names) => names
            .iter()
            .map(|name| {
                available
                    .iter()
                    .find(|p| p.name == name.as_str())
                    .copied()
                    .ok_or_else(|| RuntimeError::UnknownPlugin(name.clone()))
            })
            .collect::<Result<_, _>>()?,
    };

    let mut registry = TypeRegistry::new();
    let report = registry.discover_plugins(&selected);
    if !report.failed.is_empty() {
        warn!(failed = report.failed.len(), loaded = report.loaded.len(), "Some plugins were skipped");
    }
    Ok(registry)
}
