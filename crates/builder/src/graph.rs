//! The built, runnable component graph.

use agentry_core::component::ComponentInstance;
use agentry_core::error::BuildError;
use agentry_core::event::TraceEmitter;
use agentry_core::provider::ReasoningBackend;
use agentry_core::session::SessionStore;
use agentry_core::tool::Tool;
use agentry_core::workflow::Workflow;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::cleanup::CleanupStack;

/// Every built component, its dependency edges, and the entry workflow.
///
/// Shared read-only by all runs. Teardown actions registered during the build
/// run on [`RunnableGraph::shutdown`] or when the graph is dropped.
pub struct RunnableGraph {
    entry_name: String,
    entry: Arc<dyn Workflow>,
    order: Vec<String>,
    components: HashMap<String, ComponentInstance>,
    dependencies: HashMap<String, Vec<String>>,
    emitter: Arc<TraceEmitter>,
    cleanup: Mutex<CleanupStack>,
}

impl RunnableGraph {
    pub(crate) fn new(
        entry_name: String,
        order: Vec<String>,
        components: HashMap<String, ComponentInstance>,
        dependencies: HashMap<String, Vec<String>>,
        emitter: Arc<TraceEmitter>,
        cleanup: CleanupStack,
    ) -> Result<Self, BuildError> {
        let entry = components
            .get(&entry_name)
            .and_then(|c| c.as_workflow())
            .cloned()
            .ok_or_else(|| BuildError::WrongComponentType {
                name: entry_name.clone(),
                expected: "workflow".into(),
            })?;

        Ok(Self {
            entry_name,
            entry,
            order,
            components,
            dependencies,
            emitter,
            cleanup: Mutex::new(cleanup),
        })
    }

    /// The workflow a run starts from.
    pub fn entry(&self) -> Arc<dyn Workflow> {
        self.entry.clone()
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    pub fn emitter(&self) -> Arc<TraceEmitter> {
        self.emitter.clone()
    }

    pub fn get(&self, name: &str) -> Option<&ComponentInstance> {
        self.components.get(name)
    }

    pub fn backend(&self, name: &str) -> Option<Arc<dyn ReasoningBackend>> {
        self.get(name)?.as_backend().cloned()
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.get(name)?.as_tool().cloned()
    }

    pub fn store(&self, name: &str) -> Option<Arc<dyn SessionStore>> {
        self.get(name)?.as_store().cloned()
    }

    pub fn workflow(&self, name: &str) -> Option<Arc<dyn Workflow>> {
        self.get(name)?.as_workflow().cloned()
    }

    /// Component names in build order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Direct dependencies of `name`.
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.dependencies
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Names reachable from the entry (entry included), in build order.
    ///
    /// Declared components outside this set were still built but no run will
    /// touch them.
    pub fn reachable_from_entry(&self) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack = vec![self.entry_name.as_str()];
        while let Some(name) = stack.pop() {
            if seen.insert(name) {
                stack.extend(self.dependencies(name).iter().map(String::as_str));
            }
        }
        self.order
            .iter()
            .filter(|n| seen.contains(n.as_str()))
            .cloned()
            .collect()
    }

    /// Release every resource acquired during the build, newest first.
    ///
    /// Returns how many teardown actions ran; later calls return 0.
    pub fn shutdown(&self) -> usize {
        let ran = self
            .cleanup
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .run_all();
        if ran > 0 {
            info!(entry = %self.entry_name, released = ran, "Component graph shut down");
        }
        ran
    }
}

impl std::fmt::Debug for RunnableGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnableGraph")
            .field("entry", &self.entry_name)
            .field("components", &self.order)
            .finish()
    }
}
