//! Tool dispatch and built-in tools for Agentry.
//!
//! [`ToolDispatcher`] validates and runs tool calls; the built-in tools are
//! registered as component kinds by [`PLUGIN`]:
//!
//! | kind              | tool              | params                          |
//! |-------------------|-------------------|---------------------------------|
//! | `tool/echo`       | [`EchoTool`]      | none                            |
//! | `tool/calculator` | [`CalculatorTool`]| none                            |
//! | `tool/ask_model`  | [`AskModelTool`]  | `llm_name`, `system_prompt`?    |
//!
//! A tool's name is the name of the component that declares it.

pub mod ask_model;
pub mod calculator;
pub mod dispatch;
pub mod echo;

use agentry_builder::{BuildContext, Plugin, TypeRegistry};
use agentry_core::component::{ComponentConfig, ComponentInstance};
use agentry_core::error::BuildError;
use std::sync::Arc;

pub use ask_model::AskModelTool;
pub use calculator::CalculatorTool;
pub use dispatch::{DEFAULT_TOOL_TIMEOUT, FnTool, ToolDispatcher};
pub use echo::EchoTool;

/// Registers the built-in tool kinds.
pub const PLUGIN: Plugin = Plugin::new("tools", register);

pub fn register(registry: &mut TypeRegistry) -> Result<(), BuildError> {
    registry.register_fn("tool/echo", build_echo)?;
    registry.register_fn("tool/calculator", build_calculator)?;
    registry.register_fn("tool/ask_model", build_ask_model)?;
    Ok(())
}

fn build_echo(
    name: &str,
    _config: &ComponentConfig,
    _ctx: &mut BuildContext,
) -> Result<ComponentInstance, BuildError> {
    Ok(ComponentInstance::Tool(Arc::new(EchoTool::new(name))))
}

fn build_calculator(
    name: &str,
    _config: &ComponentConfig,
    _ctx: &mut BuildContext,
) -> Result<ComponentInstance, BuildError> {
    Ok(ComponentInstance::Tool(Arc::new(CalculatorTool::new(name))))
}

fn build_ask_model(
    name: &str,
    config: &ComponentConfig,
    ctx: &mut BuildContext,
) -> Result<ComponentInstance, BuildError> {
    let backend = ctx.backend(config.str_param(name, "llm_name")?)?;
    let mut tool = AskModelTool::new(name, backend);
    if let Some(prompt) = config.params.get("system_prompt").and_then(|v| v.as_str()) {
        tool = tool.with_system_prompt(prompt);
    }
    Ok(ComponentInstance::Tool(Arc::new(tool)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_builder::ComponentBuilder;

    #[test]
    fn plugin_registers_every_kind() {
        let mut registry = TypeRegistry::new();
        let report = registry.discover_plugins(&[PLUGIN]);
        assert_eq!(report.loaded, vec!["tools"]);
        assert_eq!(
            registry.kinds(),
            vec!["tool/ask_model", "tool/calculator", "tool/echo"]
        );
    }

    #[test]
    fn ask_model_requires_a_backend() {
        let mut registry = TypeRegistry::new();
        register(&mut registry).unwrap();
        registry
            .register_fn("workflow/noop", |name: &str, _: &ComponentConfig, _: &mut BuildContext| {
                Err(BuildError::Factory {
                    component: name.to_string(),
                    reason: "not reached".into(),
                })
            })
            .unwrap();

        let mut builder = ComponentBuilder::new(Arc::new(registry));
        builder.add("calc", ComponentConfig::new("tool/calculator")).unwrap();
        builder
            .add("ask", ComponentConfig::new("tool/ask_model").with_param("llm_name", "calc"))
            .unwrap();
        builder.set_entry("main", ComponentConfig::new("workflow/noop")).unwrap();

        let err = builder.build().err().unwrap();
        assert_eq!(
            err,
            BuildError::WrongComponentType {
                name: "calc".into(),
                expected: "backend".into()
            }
        );
    }
}
