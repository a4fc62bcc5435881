//! Component builder: turns declared configs into a connected object graph.
//!
//! Declarations are collected first; `build()` resolves cross-references into
//! a dependency graph, orders it topologically (declaration order breaks
//! ties), and invokes each factory exactly once.

use agentry_core::component::ComponentConfig;
use agentry_core::error::BuildError;
use agentry_core::event::TraceEmitter;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::BuildContext;
use crate::graph::RunnableGraph;
use crate::registry::{ComponentFactory, TypeRegistry};

struct Declaration {
    name: String,
    config: ComponentConfig,
    factory: Arc<dyn ComponentFactory>,
}

/// Collects component declarations and builds them into a [`RunnableGraph`].
pub struct ComponentBuilder {
    registry: Arc<TypeRegistry>,
    declarations: Vec<Declaration>,
    entry: Option<String>,
    emitter: Arc<TraceEmitter>,
}

impl ComponentBuilder {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            declarations: Vec::new(),
            entry: None,
            emitter: Arc::new(TraceEmitter::new()),
        }
    }

    /// Use an existing emitter instead of a fresh one.
    pub fn with_emitter(mut self, emitter: Arc<TraceEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Declare a component.
    ///
    /// The kind must already be registered and the name must be unused.
    pub fn add(&mut self, name: impl Into<String>, config: ComponentConfig) -> Result<(), BuildError> {
        let name = name.into();
        if self.declarations.iter().any(|d| d.name == name) {
            return Err(BuildError::DuplicateComponent(name));
        }
        let factory = self.registry.lookup(&config.kind)?;
        debug!(component = %name, kind = %config.kind, "Declared component");
        self.declarations.push(Declaration {
            name,
            config,
            factory,
        });
        Ok(())
    }

    /// Declare a component and mark it as the run's entry point.
    pub fn set_entry(&mut self, name: impl Into<String>, config: ComponentConfig) -> Result<(), BuildError> {
        if let Some(existing) = &self.entry {
            return Err(BuildError::EntryAlreadySet(existing.clone()));
        }
        let name = name.into();
        self.add(name.clone(), config)?;
        self.entry = Some(name);
        Ok(())
    }

    /// Number of declared components.
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Resolve dependencies, build every component once, and return the graph.
    ///
    /// If a factory fails, the teardown actions registered by components
    /// built so far run (newest first) before the error is returned.
    pub fn build(self) -> Result<RunnableGraph, BuildError> {
        let entry = self.entry.clone().ok_or(BuildError::MissingEntry)?;
        let dependencies = self.resolve_dependencies()?;
        let order = self.build_order(&dependencies)?;

        let mut ctx = BuildContext::new(self.emitter.clone());
        for &idx in &order {
            let decl = &self.declarations[idx];
            ctx.begin(&decl.name);
            match decl.factory.build(&decl.name, &decl.config, &mut ctx) {
                Ok(instance) => {
                    debug!(
                        component = %decl.name,
                        kind = %decl.config.kind,
                        instance = instance.type_name(),
                        "Built component"
                    );
                    ctx.insert(decl.name.clone(), instance);
                }
                Err(e) => {
                    warn!(component = %decl.name, error = %e, "Component build failed, releasing resources");
                    ctx.cleanup.run_all();
                    return Err(e);
                }
            }
        }

        let names: Vec<String> = order
            .iter()
            .map(|&idx| self.declarations[idx].name.clone())
            .collect();
        let (components, cleanup) = ctx.into_parts();
        let deps_by_name = self
            .declarations
            .iter()
            .zip(dependencies)
            .map(|(d, deps)| (d.name.clone(), deps))
            .collect();

        let graph = RunnableGraph::new(entry, names, components, deps_by_name, self.emitter, cleanup)?;
        info!(
            entry = %graph.entry_name(),
            components = graph.len(),
            "Component graph built"
        );
        Ok(graph)
    }

    /// Dependencies of each declaration (parallel to `declarations`).
    fn resolve_dependencies(&self) -> Result<Vec<Vec<String>>, BuildError> {
        let mut resolved = Vec::with_capacity(self.declarations.len());
        for decl in &self.declarations {
            let deps = decl.factory.dependencies(&decl.config);
            for dep in &deps {
                if !self.declarations.iter().any(|d| &d.name == dep) {
                    return Err(BuildError::UnresolvedDependency {
                        component: decl.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            resolved.push(deps);
        }
        Ok(resolved)
    }

    /// Kahn's algorithm; among ready components the earliest declared goes first.
    fn build_order(&self, dependencies: &[Vec<String>]) -> Result<Vec<usize>, BuildError> {
        let index: HashMap<&str, usize> = self
            .declarations
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.as_str(), i))
            .collect();

        let n = self.declarations.len();
        let mut pending = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, deps) in dependencies.iter().enumerate() {
            for dep in deps {
                let d = index[dep.as_str()];
                pending[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &next in &dependents[i] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < n {
            let stuck: Vec<usize> = (0..n).filter(|i| pending[*i] > 0).collect();
            return Err(BuildError::CyclicDependency {
                cycle: self.find_cycle(&stuck, dependencies, &index),
            });
        }
        Ok(order)
    }

    /// Walk dependency edges among `stuck` nodes until one repeats.
    ///
    /// Every stuck node has at least one stuck dependency, so the walk always
    /// closes a loop.
    fn find_cycle(
        &self,
        stuck: &[usize],
        dependencies: &[Vec<String>],
        index: &HashMap<&str, usize>,
    ) -> Vec<String> {
        let mut path: Vec<usize> = Vec::new();
        let mut current = stuck[0];
        loop {
            if let Some(pos) = path.iter().position(|&p| p == current) {
                let mut cycle: Vec<String> = path[pos..]
                    .iter()
                    .map(|&i| self.declarations[i].name.clone())
                    .collect();
                cycle.push(self.declarations[current].name.clone());
                return cycle;
            }
            path.push(current);
            current = dependencies[current]
                .iter()
                .map(|dep| index[dep.as_str()])
                .find(|d| stuck.contains(d))
                .unwrap_or(current);
        }
    }
}
