//! Test fixtures: trivial component kinds and a build recorder.

use agentry_core::component::{ComponentConfig, ComponentInstance};
use agentry_core::error::{BuildError, ToolError};
use agentry_core::session::{RunOutcome, RunSession};
use agentry_core::tool::Tool;
use agentry_core::workflow::{RunContext, Workflow};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::context::BuildContext;
use crate::registry::TypeRegistry;

pub(crate) struct DummyTool {
    name: String,
}

#[async_trait]
impl Tool for DummyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "does nothing"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        Ok(arguments)
    }
}

pub(crate) struct DummyWorkflow {
    name: String,
    _tools: Vec<Arc<dyn Tool>>,
}

#[async_trait]
impl Workflow for DummyWorkflow {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _session: &mut RunSession, input: &str, _ctx: &RunContext) -> RunOutcome {
        RunOutcome::Answered {
            content: input.to_string(),
        }
    }
}

pub(crate) fn dummy_tool_factory(
    name: &str,
    _config: &ComponentConfig,
    _ctx: &mut BuildContext,
) -> Result<ComponentInstance, BuildError> {
    Ok(ComponentInstance::Tool(Arc::new(DummyTool {
        name: name.to_string(),
    })))
}

/// Resolves every referenced sibling, whatever its type.
fn dummy_workflow_factory(
    name: &str,
    config: &ComponentConfig,
    ctx: &mut BuildContext,
) -> Result<ComponentInstance, BuildError> {
    let mut tools = Vec::new();
    for dep in config.references() {
        if let Ok(tool) = ctx.tool(&dep) {
            tools.push(tool);
        } else if ctx.get(&dep).is_none() {
            return Err(BuildError::UnresolvedDependency {
                component: name.to_string(),
                dependency: dep,
            });
        }
    }
    Ok(ComponentInstance::Workflow(Arc::new(DummyWorkflow {
        name: name.to_string(),
        _tools: tools,
    })))
}

pub(crate) fn register_dummy_kinds(registry: &mut TypeRegistry) -> Result<(), BuildError> {
    registry.register_fn("tool/dummy", dummy_tool_factory)?;
    registry.register_fn("workflow/dummy", dummy_workflow_factory)?;
    Ok(())
}

/// Records build and teardown order across a test.
#[derive(Clone, Default)]
pub(crate) struct BuildLog {
    built: Arc<Mutex<Vec<String>>>,
    released: Arc<Mutex<Vec<String>>>,
}

impl BuildLog {
    pub(crate) fn order(&self) -> Vec<String> {
        self.built.lock().unwrap().clone()
    }

    pub(crate) fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

/// A registry whose kinds log each build and register a teardown action.
///
/// `tool/failing` always fails.
pub(crate) fn dummy_registry(log: &BuildLog) -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();

    let tool_log = log.clone();
    registry
        .register_fn("tool/dummy", move |name: &str, config: &ComponentConfig, ctx: &mut BuildContext| {
            tool_log.built.lock().unwrap().push(name.to_string());
            let released = tool_log.released.clone();
            let label = name.to_string();
            ctx.on_teardown(move || released.lock().unwrap().push(label));
            dummy_tool_factory(name, config, ctx)
        })
        .unwrap();

    let wf_log = log.clone();
    registry
        .register_fn("workflow/dummy", move |name: &str, config: &ComponentConfig, ctx: &mut BuildContext| {
            wf_log.built.lock().unwrap().push(name.to_string());
            let released = wf_log.released.clone();
            let label = name.to_string();
            ctx.on_teardown(move || released.lock().unwrap().push(label));
            dummy_workflow_factory(name, config, ctx)
        })
        .unwrap();

    registry
        .register_fn("tool/failing", |name: &str, _: &ComponentConfig, _: &mut BuildContext| {
            Err(BuildError::Factory {
                component: name.to_string(),
                reason: "connection refused".into(),
            })
        })
        .unwrap();

    Arc::new(registry)
}
