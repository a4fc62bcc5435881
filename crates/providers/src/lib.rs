//! Reasoning backend implementations for Agentry.
//!
//! All backends implement `agentry_core::ReasoningBackend`. [`PLUGIN`]
//! registers them as component kinds:
//!
//! - `llm/openai_compat`: any OpenAI-compatible HTTP endpoint
//! - `llm/scripted`: replays a fixed list of responses

pub mod openai_compat;
pub mod scripted;

use agentry_builder::{BuildContext, Plugin, TypeRegistry};
use agentry_core::component::{ComponentConfig, ComponentInstance};
use agentry_core::error::BuildError;
use std::sync::Arc;
use tracing::info;

pub use openai_compat::{OpenAiCompatBackend, OpenAiCompatSettings};
pub use scripted::{ScriptStep, ScriptedBackend, ScriptedSettings};

/// Registers the built-in backend kinds.
pub const PLUGIN: Plugin = Plugin::new("providers", register);

pub fn register(registry: &mut TypeRegistry) -> Result<(), BuildError> {
    registry.register_fn("llm/openai_compat", build_openai_compat)?;
    registry.register_fn("llm/scripted", build_scripted)?;
    Ok(())
}

fn build_openai_compat(
    name: &str,
    config: &ComponentConfig,
    _ctx: &mut BuildContext,
) -> Result<ComponentInstance, BuildError> {
    let settings: OpenAiCompatSettings = config.parse_params(name)?;
    let backend = OpenAiCompatBackend::from_settings(name, &settings).map_err(|e| BuildError::Factory {
        component: name.to_string(),
        reason: e.to_string(),
    })?;
    info!(component = %name, model = %settings.model, base_url = %settings.base_url, "Configured OpenAI-compatible backend");
    Ok(ComponentInstance::Backend(Arc::new(backend)))
}

fn build_scripted(
    name: &str,
    config: &ComponentConfig,
    _ctx: &mut BuildContext,
) -> Result<ComponentInstance, BuildError> {
    let settings: ScriptedSettings = config.parse_params(name)?;
    Ok(ComponentInstance::Backend(Arc::new(ScriptedBackend::from_script(
        name,
        settings.responses,
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_backend_kinds() {
        let mut registry = TypeRegistry::new();
        register(&mut registry).unwrap();
        assert_eq!(registry.kinds(), vec!["llm/openai_compat", "llm/scripted"]);
    }

    #[test]
    fn scripted_params_are_validated() {
        let config = ComponentConfig::new("llm/scripted").with_param("responses", "not a list");
        let err = config.parse_params::<ScriptedSettings>("llm").unwrap_err();
        assert!(matches!(err, BuildError::InvalidParams { .. }));
    }

    #[test]
    fn openai_requires_model() {
        let config = ComponentConfig::new("llm/openai_compat");
        let err = config.parse_params::<OpenAiCompatSettings>("llm").unwrap_err();
        assert!(matches!(err, BuildError::InvalidParams { ref component, .. } if component == "llm"));
    }
}
