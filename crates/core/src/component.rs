//! Component configuration and built component instances.
//!
//! A [`ComponentConfig`] is one node of the declarative configuration tree:
//! its `kind` selects the factory that builds it, its `params` are handed to
//! that factory untouched. The factory returns a [`ComponentInstance`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::BuildError;
use crate::provider::ReasoningBackend;
use crate::session::SessionStore;
use crate::tool::Tool;
use crate::workflow::Workflow;

/// A tagged configuration record. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Selects the concrete implementation at build time (e.g. "tool/echo").
    pub kind: String,

    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ComponentConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: serde_json::Map::new(),
        }
    }

    /// Builder-style param setter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Names of other components this config refers to.
    ///
    /// By convention a param ending in `_name` holds one component name and a
    /// param ending in `_names` holds a list of them. Order follows the params
    /// map; duplicates are removed.
    pub fn references(&self) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        for (key, value) in &self.params {
            let found: Vec<&str> = if key.ends_with("_names") {
                value
                    .as_array()
                    .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
                    .unwrap_or_default()
            } else if key.ends_with("_name") {
                value.as_str().into_iter().collect()
            } else {
                continue;
            };
            for name in found {
                if !refs.iter().any(|r| r == name) {
                    refs.push(name.to_string());
                }
            }
        }
        refs
    }

    /// Deserialize the params into a typed settings struct.
    pub fn parse_params<T: serde::de::DeserializeOwned>(&self, component: &str) -> Result<T, BuildError> {
        serde_json::from_value(serde_json::Value::Object(self.params.clone())).map_err(|e| {
            BuildError::InvalidParams {
                component: component.to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// Read a required string param.
    pub fn str_param(&self, component: &str, key: &str) -> Result<&str, BuildError> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| BuildError::InvalidParams {
                component: component.to_string(),
                reason: format!("missing string param '{key}'"),
            })
    }
}

/// A live runtime object produced by a factory.
///
/// Owned by the built graph for the lifetime of a workflow run. Components are
/// either immutable or synchronise internally; the loop never locks on their
/// behalf.
#[derive(Clone)]
pub enum ComponentInstance {
    Backend(Arc<dyn ReasoningBackend>),
    Tool(Arc<dyn Tool>),
    Store(Arc<dyn SessionStore>),
    Workflow(Arc<dyn Workflow>),
}

impl ComponentInstance {
    /// Short label of the variant, used in error messages and listings.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Backend(_) => "backend",
            Self::Tool(_) => "tool",
            Self::Store(_) => "store",
            Self::Workflow(_) => "workflow",
        }
    }

    pub fn as_backend(&self) -> Option<&Arc<dyn ReasoningBackend>> {
        match self {
            Self::Backend(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tool(&self) -> Option<&Arc<dyn Tool>> {
        match self {
            Self::Tool(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_store(&self) -> Option<&Arc<dyn SessionStore>> {
        match self {
            Self::Store(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_workflow(&self) -> Option<&Arc<dyn Workflow>> {
        match self {
            Self::Workflow(w) => Some(w),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComponentInstance::{}", self.type_name())
    }
}
