//! Workflow configuration for Agentry.
//!
//! A workflow file declares the components to build and the entry point to
//! run, in TOML:
//!
//! ```toml
//! plugins = ["providers", "tools", "agent"]
//!
//! [[components]]
//! name = "main_llm"
//! kind = "llm/openai_compat"
//! params = { model = "gpt-4o", api_key_env = "OPENAI_API_KEY" }
//!
//! [[components]]
//! name = "echo"
//! kind = "tool/echo"
//!
//! [entry]
//! name = "assistant"
//! kind = "agent/tool_calling"
//! params = { llm_name = "main_llm", tool_names = ["echo"], max_iterations = 8 }
//! ```
//!
//! Components are kept in file order; that order breaks ties when the
//! builder sorts them by dependency.

use agentry_core::component::ComponentConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the entry's `max_iterations` param.
pub const ENV_MAX_ITERATIONS: &str = "AGENTRY_MAX_ITERATIONS";

/// Environment variable overriding the entry's `tool_timeout_secs` param.
pub const ENV_TOOL_TIMEOUT_SECS: &str = "AGENTRY_TOOL_TIMEOUT_SECS";

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Plugins to load, by name. All known plugins when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<String>>,

    /// Components in declaration order.
    #[serde(default)]
    pub components: Vec<ComponentDecl>,

    /// The component a run starts from.
    pub entry: ComponentDecl,
}

/// One named component declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDecl {
    pub name: String,

    pub kind: String,

    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ComponentDecl {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            params: serde_json::Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The config handed to the component's factory.
    pub fn to_component_config(&self) -> ComponentConfig {
        ComponentConfig {
            kind: self.kind.clone(),
            params: self.params.clone(),
        }
    }
}

impl WorkflowConfig {
    pub fn new(entry: ComponentDecl) -> Self {
        Self {
            plugins: None,
            components: Vec::new(),
            entry,
        }
    }

    pub fn with_component(mut self, component: ComponentDecl) -> Self {
        self.components.push(component);
        self
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Self::parse_at(content, Path::new("<inline>"))
    }

    fn parse_at(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        debug!(
            path = %path.display(),
            components = config.components.len(),
            entry = %config.entry.name,
            "Parsed workflow config"
        );
        Ok(config)
    }

    /// Read, parse and validate a workflow file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse_at(&content, path)
    }

    /// [`WorkflowConfig::load_from`] followed by environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Check names and kinds.
    ///
    /// Names must be non-empty and unique across components and the entry;
    /// kinds must be non-empty. Whether a kind is actually registered is only
    /// known to the builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for decl in self.components.iter().chain(std::iter::once(&self.entry)) {
            if decl.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "component of kind '{}' has an empty name",
                    decl.kind
                )));
            }
            if decl.kind.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "component '{}' has an empty kind",
                    decl.name
                )));
            }
            if !seen.insert(decl.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "component name '{}' is declared more than once",
                    decl.name
                )));
            }
        }

        if let Some(plugins) = &self.plugins {
            if plugins.iter().any(|p| p.trim().is_empty()) {
                return Err(ConfigError::ValidationError("plugin names must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup` (the environment, in
    /// production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in [ENV_MAX_ITERATIONS, ENV_TOOL_TIMEOUT_SECS] {
            let Some(raw) = lookup(key) else { continue };
            let value: u64 = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("{key} must be a non-negative integer, got '{raw}'"))
            })?;
            let param = match key {
                ENV_MAX_ITERATIONS => "max_iterations",
                _ => "tool_timeout_secs",
            };
            info!(param, value, "Overriding entry param from environment");
            self.entry.params.insert(param.into(), value.into());
        }
        Ok(())
    }

    /// Every declaration, entry last.
    pub fn declarations(&self) -> impl Iterator<Item = &ComponentDecl> {
        self.components.iter().chain(std::iter::once(&self.entry))
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
plugins = ["providers", "tools", "agent"]

[[components]]
name = "main_llm"
kind = "llm/scripted"

[[components]]
name = "echo"
kind = "tool/echo"

[[components]]
name = "calc"
kind = "tool/calculator"

[entry]
name = "assistant"
kind = "agent/tool_calling"
params = { llm_name = "main_llm", tool_names = ["echo", "calc"], max_iterations = 8 }
"#;

    #[test]
    fn parses_components_in_order() {
        let config = WorkflowConfig::parse(SAMPLE).unwrap();
        let names: Vec<&str> = config.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["main_llm", "echo", "calc"]);
        assert_eq!(config.plugins.as_ref().unwrap().len(), 3);
        assert_eq!(config.entry.params["tool_names"], json!(["echo", "calc"]));
    }

    #[test]
    fn entry_converts_to_component_config() {
        let config = WorkflowConfig::parse(SAMPLE).unwrap();
        let component = config.entry.to_component_config();
        assert_eq!(component.kind, "agent/tool_calling");
        assert_eq!(component.references(), vec!["main_llm", "echo", "calc"]);
    }

    #[test]
    fn duplicate_names_rejected() {
        let toml = r#"
[[components]]
name = "x"
kind = "tool/echo"

[entry]
name = "x"
kind = "agent/tool_calling"
"#;
        let err = WorkflowConfig::parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("'x'")));
    }

    #[test]
    fn empty_kind_rejected() {
        let config = WorkflowConfig::new(ComponentDecl::new("a", ""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_entry_is_a_parse_error() {
        let err = WorkflowConfig::parse("[[components]]\nname = \"a\"\nkind = \"tool/echo\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_override_replaces_max_iterations() {
        let mut config = WorkflowConfig::parse(SAMPLE).unwrap();
        config
            .apply_overrides_from(|key| (key == ENV_MAX_ITERATIONS).then(|| "3".to_string()))
            .unwrap();
        assert_eq!(config.entry.params["max_iterations"], json!(3));
    }

    #[test]
    fn bad_env_override_rejected() {
        let mut config = WorkflowConfig::parse(SAMPLE).unwrap();
        let err = config
            .apply_overrides_from(|key| (key == ENV_TOOL_TIMEOUT_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(WorkflowConfig::load_from(&path).unwrap().entry.name, "assistant");

        let err = WorkflowConfig::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn toml_roundtrip() {
        let config = WorkflowConfig::new(
            ComponentDecl::new("assistant", "agent/tool_calling").with_param("llm_name", "llm"),
        )
        .with_component(ComponentDecl::new("llm", "llm/scripted"));
        let text = config.to_toml().unwrap();
        assert_eq!(WorkflowConfig::parse(&text).unwrap(), config);
    }
}
