//! Type registry: maps a component `kind` to the factory that builds it.
//!
//! One registry is created at process start, filled by plugins, and then
//! handed (read-only) to every [`crate::ComponentBuilder`].

use agentry_core::component::{ComponentConfig, ComponentInstance};
use agentry_core::error::BuildError;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::BuildContext;

/// Turns a [`ComponentConfig`] into a live [`ComponentInstance`].
pub trait ComponentFactory: Send + Sync {
    /// Build the component declared as `name`.
    ///
    /// `ctx` exposes the siblings built so far and the teardown registry.
    fn build(
        &self,
        name: &str,
        config: &ComponentConfig,
        ctx: &mut BuildContext,
    ) -> Result<ComponentInstance, BuildError>;

    /// Components that must be built before this one.
    fn dependencies(&self, config: &ComponentConfig) -> Vec<String> {
        config.references()
    }
}

impl<F> ComponentFactory for F
where
    F: Fn(&str, &ComponentConfig, &mut BuildContext) -> Result<ComponentInstance, BuildError>
        + Send
        + Sync,
{
    fn build(
        &self,
        name: &str,
        config: &ComponentConfig,
        ctx: &mut BuildContext,
    ) -> Result<ComponentInstance, BuildError> {
        self(name, config, ctx)
    }
}

/// A statically linked plugin: a name plus a function that registers kinds.
#[derive(Clone, Copy)]
pub struct Plugin {
    pub name: &'static str,
    pub register: fn(&mut TypeRegistry) -> Result<(), BuildError>,
}

impl Plugin {
    pub const fn new(
        name: &'static str,
        register: fn(&mut TypeRegistry) -> Result<(), BuildError>,
    ) -> Self {
        Self { name, register }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name).finish()
    }
}

/// Outcome of [`TypeRegistry::discover_plugins`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Plugins that registered without error.
    pub loaded: Vec<String>,

    /// Plugins that failed, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Central directory of component kinds.
#[derive(Default)]
pub struct TypeRegistry {
    factories: HashMap<String, Arc<dyn ComponentFactory>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `kind`. Each kind may be registered once.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        factory: Arc<dyn ComponentFactory>,
    ) -> Result<(), BuildError> {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            return Err(BuildError::DuplicateKind(kind));
        }
        debug!(kind = %kind, "Registered component kind");
        self.factories.insert(kind, factory);
        Ok(())
    }

    /// Register a closure as the factory for `kind`.
    pub fn register_fn<F>(&mut self, kind: impl Into<String>, factory: F) -> Result<(), BuildError>
    where
        F: Fn(&str, &ComponentConfig, &mut BuildContext) -> Result<ComponentInstance, BuildError>
            + Send
            + Sync
            + 'static,
    {
        self.register(kind, Arc::new(factory))
    }

    /// Look up the factory registered for `kind`.
    pub fn lookup(&self, kind: &str) -> Result<Arc<dyn ComponentFactory>, BuildError> {
        self.factories
            .get(kind)
            .cloned()
            .ok_or_else(|| BuildError::UnknownKind(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// All registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Load every plugin in `plugins`, in order.
    ///
    /// A plugin that returns an error or panics is logged and skipped; the
    /// remaining plugins are still loaded. Kinds a failing plugin registered
    /// before it failed stay registered.
    pub fn discover_plugins(&mut self, plugins: &[Plugin]) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for plugin in plugins {
            let register = plugin.register;
            let outcome = catch_unwind(AssertUnwindSafe(|| register(self)));
            match outcome {
                Ok(Ok(())) => {
                    info!(plugin = plugin.name, "Loaded plugin");
                    report.loaded.push(plugin.name.to_string());
                }
                Ok(Err(e)) => {
                    warn!(plugin = plugin.name, error = %e, "Plugin failed to register");
                    report.failed.push((plugin.name.to_string(), e.to_string()));
                }
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    warn!(plugin = plugin.name, %reason, "Plugin panicked during registration");
                    report.failed.push((plugin.name.to_string(), reason));
                }
            }
        }

        report
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
