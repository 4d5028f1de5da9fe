// src/pipeline/hot_update.rs

//! Hot-update listener.
//!
//! A dedicated worker for the pipeline's lifetime. It consumes
//! [`PluginUpdate`] notices from the registry subscription and, when a
//! notice targets the currently running plugin at a stale generation,
//! fires the rerun slot so the driver re-executes that index against the
//! replacement instance.
//!
//! The identity read races with the driver clearing the slots after a
//! run; firing an empty slot is a no-op, so a lost race just means the
//! old instance runs to completion once, which is acceptable.

use std::sync::Arc;

use tracing::debug;

use crate::registry::PluginUpdate;

use super::Pipeline;

/// Spawn the listener worker. Does nothing if the listener was already
/// started.
///
/// The loop ends when the subscription channel closes, i.e. when
/// [`Pipeline::close`] unsubscribes from the registry.
pub(crate) fn spawn_update_listener(pipeline: Arc<Pipeline>) {
    let Some(mut rx) = pipeline.take_update_receiver() else {
        return;
    };

    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            pipeline.handle_plugin_update(&update);
        }
        debug!(pipeline = %pipeline.name(), "plugin update listener finished");
    });
}

impl Pipeline {
    pub(crate) fn handle_plugin_update(&self, update: &PluginUpdate) {
        let stale = {
            let running = self.running_plugin.lock().unwrap();
            match running.as_ref() {
                Some(running) => {
                    running.name == update.plugin
                        && running.generation <= update.superseded_generation
                }
                None => false,
            }
        };

        if stale {
            debug!(
                pipeline = %self.name(),
                plugin = %update.plugin,
                superseded_generation = update.superseded_generation,
                "running plugin superseded by hot update, requesting rerun"
            );
            self.rerun_cancel.fire();
        }
    }
}
