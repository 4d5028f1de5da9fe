// src/registry/instance.rs

//! Handle to a live plugin instance.

use std::sync::Arc;

use crate::plugin::{Plugin, PluginType};

/// A (instance, type, generation) triple obtained from the registry with
/// a use count taken.
///
/// The holder must hand the handle back via
/// [`Registry::release_plugin_instance`] or
/// [`Registry::dismiss_plugin_instance`] before its next lookup.
///
/// [`Registry::release_plugin_instance`]: super::Registry::release_plugin_instance
/// [`Registry::dismiss_plugin_instance`]: super::Registry::dismiss_plugin_instance
#[derive(Clone)]
pub struct PluginHandle {
    registered_name: String,
    plugin: Arc<dyn Plugin>,
    plugin_type: PluginType,
    generation: u64,
}

impl PluginHandle {
    pub(super) fn new(
        registered_name: String,
        plugin: Arc<dyn Plugin>,
        plugin_type: PluginType,
        generation: u64,
    ) -> Self {
        Self {
            registered_name,
            plugin,
            plugin_type,
            generation,
        }
    }

    /// The name the registry resolves this plugin under.
    pub fn registered_name(&self) -> &str {
        &self.registered_name
    }

    /// The instance's self-reported name (usually equal to
    /// [`registered_name`](Self::registered_name)).
    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("registered_name", &self.registered_name)
            .field("plugin_type", &self.plugin_type)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
