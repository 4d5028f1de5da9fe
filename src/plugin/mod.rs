// src/plugin/mod.rs

//! Plugin contract.
//!
//! A plugin is one processing stage of a pipeline. The driver resolves
//! plugin names to live instances through the registry and invokes them
//! in configured order.
//!
//! Cancellation is cooperative: a plugin must watch the task's status and
//! wind down when it observes `Finishing`. The pipeline never hard-kills
//! a plugin; a plugin that ignores the status simply runs to completion.

use std::sync::Arc;

use async_trait::async_trait;

use crate::pipeline::Context;
use crate::task::Task;

/// Kind of a plugin.
///
/// Only `Source` plugins may be preempted by a scheduler: a source blocks
/// waiting for new input, so interrupting it is always safe, whereas
/// interrupting a transform would abandon a task mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    Source,
    Process,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn plugin_type(&self) -> PluginType;

    /// Called once per instance before the pipeline starts running, e.g.
    /// to expose indicators or warm caches. Default: nothing.
    fn prepare(&self, _ctx: &Context) {}

    /// Run the plugin against the task.
    ///
    /// An `Err` return means a failure the plugin could not absorb; the
    /// driver attaches it to the task (code 503) and dismisses this
    /// instance.
    async fn run(&self, ctx: &Context, task: Arc<dyn Task>) -> anyhow::Result<()>;
}

/// Factory producing a fresh plugin instance.
///
/// The registry invokes it on first lookup, after a dismissal, and after
/// a hot update replaced it.
pub type PluginConstructor = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;
