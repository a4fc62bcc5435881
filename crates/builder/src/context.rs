//! The view of the build in progress that factories receive.

use agentry_core::component::ComponentInstance;
use agentry_core::error::BuildError;
use agentry_core::event::TraceEmitter;
use agentry_core::provider::ReasoningBackend;
use agentry_core::session::SessionStore;
use agentry_core::tool::Tool;
use agentry_core::workflow::Workflow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cleanup::CleanupStack;

/// Handed to every factory invocation.
///
/// Gives access to siblings that were already built (dependencies are
/// always built first), the shared trace emitter, and a teardown registry for
/// resources the factory acquires.
pub struct BuildContext {
    current: String,
    built: HashMap<String, ComponentInstance>,
    emitter: Arc<TraceEmitter>,
    pub(crate) cleanup: CleanupStack,
}

impl BuildContext {
    pub(crate) fn new(emitter: Arc<TraceEmitter>) -> Self {
        Self {
            current: String::new(),
            built: HashMap::new(),
            emitter,
            cleanup: CleanupStack::new(),
        }
    }

    pub(crate) fn begin(&mut self, name: &str) {
        self.current = name.to_string();
    }

    pub(crate) fn insert(&mut self, name: String, instance: ComponentInstance) {
        self.built.insert(name, instance);
    }

    pub(crate) fn into_parts(self) -> (HashMap<String, ComponentInstance>, CleanupStack) {
        (self.built, self.cleanup)
    }

    /// Name of the component currently being built.
    pub fn component_name(&self) -> &str {
        &self.current
    }

    /// The emitter shared by every run of the graph.
    pub fn emitter(&self) -> Arc<TraceEmitter> {
        self.emitter.clone()
    }

    /// A sibling component, if it has been built.
    pub fn get(&self, name: &str) -> Option<&ComponentInstance> {
        self.built.get(name)
    }

    fn require(&self, name: &str) -> Result<&ComponentInstance, BuildError> {
        self.built
            .get(name)
            .ok_or_else(|| BuildError::UnresolvedDependency {
                component: self.current.clone(),
                dependency: name.to_string(),
            })
    }

    fn wrong_type(name: &str, expected: &str) -> BuildError {
        BuildError::WrongComponentType {
            name: name.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn backend(&self, name: &str) -> Result<Arc<dyn ReasoningBackend>, BuildError> {
        self.require(name)?
            .as_backend()
            .cloned()
            .ok_or_else(|| Self::wrong_type(name, "backend"))
    }

    pub fn tool(&self, name: &str) -> Result<Arc<dyn Tool>, BuildError> {
        self.require(name)?
            .as_tool()
            .cloned()
            .ok_or_else(|| Self::wrong_type(name, "tool"))
    }

    pub fn store(&self, name: &str) -> Result<Arc<dyn SessionStore>, BuildError> {
        self.require(name)?
            .as_store()
            .cloned()
            .ok_or_else(|| Self::wrong_type(name, "store"))
    }

    pub fn workflow(&self, name: &str) -> Result<Arc<dyn Workflow>, BuildError> {
        self.require(name)?
            .as_workflow()
            .cloned()
            .ok_or_else(|| Self::wrong_type(name, "workflow"))
    }

    /// Register a release action for a resource the current component holds.
    ///
    /// Actions run last-registered-first when the graph shuts down, or
    /// immediately if a later component fails to build.
    pub fn on_teardown<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let label = self.current.clone();
        self.cleanup.push(label, action);
    }
}
