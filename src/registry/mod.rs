// src/registry/mod.rs

//! Plugin registry.
//!
//! Resolves plugin names to live, reference-counted instances and owns
//! the hot-update machinery:
//!
//! - [`Registry::get_plugin_instance`] constructs an instance on first
//!   lookup (and after a dismissal or hot update) and bumps its use
//!   count. Every handle must be released or dismissed before the
//!   caller's next lookup.
//! - [`Registry::dismiss_plugin_instance`] marks an instance permanently
//!   unusable so the next lookup constructs a fresh replacement.
//! - [`Registry::update_plugin`] swaps a plugin's constructor (hot swap)
//!   and notifies subscribers which generation was superseded.
//!
//! Generations are monotonic per plugin name: every construction gets a
//! new one, so a subscriber can tell whether the instance it is watching
//! is stale.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{PipelineError, Result};
use crate::plugin::{Plugin, PluginConstructor, PluginType};

pub mod instance;

pub use instance::PluginHandle;

/// Notification that a plugin was hot-swapped.
#[derive(Debug, Clone)]
pub struct PluginUpdate {
    /// Name of the replaced plugin.
    pub plugin: String,
    /// Generation that the update supersedes. Any instance with a
    /// generation less than or equal to this is running stale code.
    pub superseded_generation: u64,
}

/// A live subscription to [`PluginUpdate`] events.
///
/// Keep the `id`; passing it to [`Registry::unsubscribe`] closes the
/// channel, which is how a consumer's listener loop terminates.
pub struct UpdateSubscription {
    pub id: u64,
    pub receiver: mpsc::UnboundedReceiver<PluginUpdate>,
}

struct LiveInstance {
    plugin: Arc<dyn Plugin>,
    generation: u64,
    use_count: u64,
    dismissed: bool,
}

struct PluginEntry {
    plugin_type: PluginType,
    constructor: PluginConstructor,
    live: Option<LiveInstance>,
    /// Generation of the most recently constructed instance.
    generation: u64,
}

pub struct Registry {
    entries: Mutex<HashMap<String, PluginEntry>>,
    subscribers: Mutex<Vec<(u64, mpsc::UnboundedSender<PluginUpdate>)>>,
    next_subscriber_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Register a plugin under `name`. Construction is lazy; the first
    /// lookup builds the instance.
    pub fn register(
        &self,
        name: impl Into<String>,
        plugin_type: PluginType,
        constructor: PluginConstructor,
    ) {
        let name = name.into();
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            name,
            PluginEntry {
                plugin_type,
                constructor,
                live: None,
                generation: 0,
            },
        );
    }

    /// Resolve `name` to a live instance, incrementing its use count.
    ///
    /// `for_run` marks execution lookups; preparation lookups pass
    /// `false`. Both count uses, the flag only differentiates intent in
    /// logs.
    pub fn get_plugin_instance(&self, name: &str, for_run: bool) -> Result<PluginHandle> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| PipelineError::UnknownPlugin(name.to_string()))?;

        let needs_construction = entry.live.as_ref().map_or(true, |live| live.dismissed);
        if needs_construction {
            entry.generation += 1;
            entry.live = Some(LiveInstance {
                plugin: (entry.constructor)(),
                generation: entry.generation,
                use_count: 0,
                dismissed: false,
            });
            debug!(
                plugin = %name,
                generation = entry.generation,
                for_run,
                "constructed plugin instance"
            );
        }

        let live = entry.live.as_mut().expect("instance constructed above");
        live.use_count += 1;

        Ok(PluginHandle::new(
            name.to_string(),
            Arc::clone(&live.plugin),
            entry.plugin_type,
            live.generation,
        ))
    }

    /// Decrement the use count taken by `get_plugin_instance`.
    pub fn release_plugin_instance(&self, handle: &PluginHandle) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(live) = entries
            .get_mut(handle.registered_name())
            .and_then(|entry| entry.live.as_mut())
        {
            if live.generation == handle.generation() {
                live.use_count = live.use_count.saturating_sub(1);
            }
        }
    }

    /// Release the handle and mark the instance unusable, so the next
    /// lookup constructs a fresh replacement.
    pub fn dismiss_plugin_instance(&self, handle: &PluginHandle) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(live) = entries
            .get_mut(handle.registered_name())
            .and_then(|entry| entry.live.as_mut())
        {
            if live.generation == handle.generation() {
                live.use_count = live.use_count.saturating_sub(1);
                live.dismissed = true;
                debug!(
                    plugin = %handle.registered_name(),
                    generation = live.generation,
                    "plugin instance dismissed"
                );
            }
        }
    }

    /// Hot-swap the constructor for `name` and notify subscribers.
    ///
    /// The current instance (if any) is marked dismissed; in-flight
    /// handles stay valid until released, and the next lookup builds an
    /// instance from the new constructor at a higher generation.
    pub fn update_plugin(&self, name: &str, constructor: PluginConstructor) -> Result<()> {
        let superseded = {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| PipelineError::UnknownPlugin(name.to_string()))?;

            entry.constructor = constructor;
            if let Some(live) = entry.live.as_mut() {
                live.dismissed = true;
            }
            entry.generation
        };

        debug!(plugin = %name, superseded_generation = superseded, "plugin hot-updated");

        let subscribers = self.subscribers.lock().unwrap();
        for (_, sender) in subscribers.iter() {
            let _ = sender.send(PluginUpdate {
                plugin: name.to_string(),
                superseded_generation: superseded,
            });
        }

        Ok(())
    }

    /// Subscribe to hot-update notifications.
    pub fn subscribe_updates(&self) -> UpdateSubscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push((id, tx));
        UpdateSubscription { id, receiver: rx }
    }

    /// Drop the subscription with the given id, closing its channel.
    /// Unknown ids are ignored, so this is idempotent.
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|(sub_id, _)| *sub_id != id);
    }

    /// Generation of the current live instance of `name`, if one exists.
    pub fn generation_of(&self, name: &str) -> Option<u64> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(name)
            .and_then(|entry| entry.live.as_ref())
            .map(|live| live.generation)
    }

    /// Use count of the current live instance of `name` (diagnostics).
    pub fn use_count_of(&self, name: &str) -> Option<u64> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(name)
            .and_then(|entry| entry.live.as_ref())
            .map(|live| live.use_count)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
