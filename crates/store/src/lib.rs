//! Run session stores for Agentry.
//!
//! Both stores implement `agentry_core::SessionStore` and are registered as
//! component kinds by [`PLUGIN`]:
//!
//! - `store/in_memory`: process-local, no params
//! - `store/file`: one JSON file per session under `params.dir`

pub mod file;
pub mod in_memory;

use agentry_builder::{BuildContext, Plugin, TypeRegistry};
use agentry_core::component::{ComponentConfig, ComponentInstance};
use agentry_core::error::BuildError;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

pub use file::FileSessionStore;
pub use in_memory::InMemorySessionStore;

/// Registers the built-in store kinds.
pub const PLUGIN: Plugin = Plugin::new("store", register);

pub fn register(registry: &mut TypeRegistry) -> Result<(), BuildError> {
    registry.register_fn("store/in_memory", build_in_memory)?;
    registry.register_fn("store/file", build_file)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct FileStoreSettings {
    dir: PathBuf,
}

fn build_in_memory(
    _name: &str,
    _config: &ComponentConfig,
    _ctx: &mut BuildContext,
) -> Result<ComponentInstance, BuildError> {
    Ok(ComponentInstance::Store(Arc::new(InMemorySessionStore::new())))
}

fn build_file(
    name: &str,
    config: &ComponentConfig,
    _ctx: &mut BuildContext,
) -> Result<ComponentInstance, BuildError> {
    let settings: FileStoreSettings = config.parse_params(name)?;
    Ok(ComponentInstance::Store(Arc::new(FileSessionStore::new(settings.dir))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_needs_a_directory() {
        let err = ComponentConfig::new("store/file")
            .parse_params::<FileStoreSettings>("sessions")
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidParams { .. }));
    }

    #[test]
    fn registers_store_kinds() {
        let mut registry = TypeRegistry::new();
        let report = registry.discover_plugins(&[PLUGIN]);
        assert!(report.failed.is_empty());
        assert!(registry.contains("store/in_memory"));
        assert!(registry.contains("store/file"));
    }
}
