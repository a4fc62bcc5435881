//! The agent loop: the runnable heart of Agentry.
//!
//! The agent follows an **Observe → Reason → Act** cycle:
//!
//! 1. **Observe**: append the task (first pass) and any observer snapshot
//! 2. **Reason**: send the history and tool descriptors to the backend
//! 3. **Act**: if the reply requests tools, dispatch them and append one
//!    result message per call, then loop back to step 1
//! 4. **Done**: a reply without tool calls is the answer
//!
//! The loop also stops on the iteration limit, a fatal error, or cancellation.
//! [`Runtime`] wires a [`WorkflowConfig`](agentry_config::WorkflowConfig)
//! through the registry and builder into a runnable graph.

pub mod loop_runner;
pub mod runtime;
pub mod settings;
pub mod stream_event;

use agentry_builder::{BuildContext, Plugin, TypeRegistry};
use agentry_core::component::{ComponentConfig, ComponentInstance};
use agentry_core::error::BuildError;
use agentry_tools::ToolDispatcher;
use std::sync::Arc;

pub use loop_runner::AgentLoop;
pub use runtime::{Runtime, RuntimeError, builtin_plugins, registry_for};
pub use settings::{AgentSettings, LoopSettings, RetryPolicy};
pub use stream_event::{AgentStreamEvent, RunStream, spawn_run};

/// Registers the `agent/tool_calling` kind.
pub const PLUGIN: Plugin = Plugin::new("agent", register);

pub fn register(registry: &mut TypeRegistry) -> Result<(), BuildError> {
    registry.register_fn("agent/tool_calling", build_tool_calling)
}

fn build_tool_calling(
    name: &str,
    config: &ComponentConfig,
    ctx: &mut BuildContext,
) -> Result<ComponentInstance, BuildError> {
    let settings: AgentSettings = config.parse_params(name)?;
    settings
        .loop_settings
        .validate()
        .map_err(|reason| BuildError::InvalidParams {
            component: name.to_string(),
            reason,
        })?;

    let backend = ctx.backend(&settings.llm_name)?;

    let mut tools = ToolDispatcher::new().with_timeout(settings.loop_settings.tool_timeout());
    for tool_name in &settings.tool_names {
        let tool = ctx.tool(tool_name)?;
        tools.register(tool).map_err(|e| BuildError::Factory {
            component: name.to_string(),
            reason: e.to_string(),
        })?;
    }

    let mut agent = AgentLoop::new(name, backend, Arc::new(tools))
        .with_settings(settings.loop_settings)
        .with_emitter(ctx.emitter());
    if let Some(store_name) = &settings.store_name {
        agent = agent.with_store(ctx.store(store_name)?);
    }
    if let Some(prompt) = settings.system_prompt {
        agent = agent.with_system_prompt(prompt);
    }

    Ok(ComponentInstance::Workflow(Arc::new(agent)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_builder::ComponentBuilder;
    use serde_json::json;

    fn registry() -> Arc<TypeRegistry> {
        let mut registry = TypeRegistry::new();
        let report = registry.discover_plugins(&builtin_plugins());
        assert!(report.failed.is_empty());
        Arc::new(registry)
    }

    fn scripted() -> ComponentConfig {
        ComponentConfig::new("llm/scripted").with_param("responses", json!([{ "content": "hi" }]))
    }

    #[test]
    fn builtin_plugins_register_all_kinds() {
        let registry = registry();
        for kind in [
            "agent/tool_calling",
            "llm/scripted",
            "llm/openai_compat",
            "tool/echo",
            "tool/calculator",
            "tool/ask_model",
            "store/in_memory",
            "store/file",
        ] {
            assert!(registry.contains(kind), "missing {kind}");
        }
    }

    #[test]
    fn agent_wires_named_components() {
        let mut builder = ComponentBuilder::new(registry());
        builder.add("llm", scripted()).unwrap();
        builder.add("echo", ComponentConfig::new("tool/echo")).unwrap();
        builder.add("sessions", ComponentConfig::new("store/in_memory")).unwrap();
        builder
            .set_entry(
                "assistant",
                ComponentConfig::new("agent/tool_calling")
                    .with_param("llm_name", "llm")
                    .with_param("tool_names", json!(["echo"]))
                    .with_param("store_name", "sessions"),
            )
            .unwrap();

        let graph = builder.build().unwrap();
        assert_eq!(graph.entry_name(), "assistant");
        assert_eq!(graph.dependencies("assistant"), ["llm", "sessions", "echo"]);
    }

    #[test]
    fn tool_names_must_name_tools() {
        let mut builder = ComponentBuilder::new(registry());
        builder.add("llm", scripted()).unwrap();
        builder
            .set_entry(
                "assistant",
                ComponentConfig::new("agent/tool_calling")
                    .with_param("llm_name", "llm")
                    .with_param("tool_names", json!(["llm"])),
            )
            .unwrap();

        let err = builder.build().err().unwrap();
        assert_eq!(
            err,
            BuildError::WrongComponentType {
                name: "llm".into(),
                expected: "tool".into()
            }
        );
    }

    #[test]
    fn zero_max_iterations_is_invalid() {
        let mut builder = ComponentBuilder::new(registry());
        builder.add("llm", scripted()).unwrap();
        builder
            .set_entry(
                "assistant",
                ComponentConfig::new("agent/tool_calling")
                    .with_param("llm_name", "llm")
                    .with_param("max_iterations", 0),
            )
            .unwrap();

        let err = builder.build().err().unwrap();
        assert!(matches!(err, BuildError::InvalidParams { ref component, .. } if component == "assistant"));
    }
}
