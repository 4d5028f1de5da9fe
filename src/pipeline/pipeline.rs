// src/pipeline/pipeline.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, warn};

use crate::config::model::PipelineConfig;
use crate::errors::{PipelineError, Result};
use crate::registry::{PluginUpdate, Registry};
use crate::stats::updater::spawn_stat_updaters;
use crate::stats::{ExecSample, PluginExecSample, StatsSink, STAT_CHANNEL_CAPACITY};
use crate::task::{
    with_cancel, CancelReason, PipelineTask, RecoveryFn, Task, TaskError, TaskStatus,
    CODE_SERVICE_UNAVAILABLE,
};

use super::hot_update;
use super::slots::{CancelCell, RunningPlugin};
use super::Context;

/// Drives a task through an ordered chain of plugins.
///
/// One driver may be active per pipeline at a time ([`Pipeline::run`]
/// rejects concurrent entry). Alongside the driver, a pipeline owns three
/// long-lived workers: two stat aggregators (spawned on construction) and
/// one hot-update listener (spawned by [`Pipeline::prepare`]).
///
/// Teardown order: [`Pipeline::stop`] first, then [`Pipeline::close`].
/// `stop` waits for the stat aggregators to drain; `close` only cancels
/// the registry update subscription, which `stop` does not depend on.
pub struct Pipeline {
    config: PipelineConfig,
    ctx: Arc<Context>,
    registry: Arc<Registry>,
    recoveries: Vec<RecoveryFn>,

    started: AtomicBool,
    stopped: AtomicBool,

    pub(crate) stop_cancel: CancelCell,
    pub(crate) schedule_cancel: CancelCell,
    pub(crate) rerun_cancel: CancelCell,
    pub(crate) running_plugin: Mutex<Option<RunningPlugin>>,

    pub(crate) pipeline_stat_tx: mpsc::Sender<ExecSample>,
    pub(crate) plugin_stat_tx: mpsc::Sender<PluginExecSample>,
    stat_stop_tx: watch::Sender<bool>,
    stat_done_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,

    /// Signalled exactly once, when a running driver exits while the
    /// pipeline is stopped.
    done: Notify,

    update_subscription_id: u64,
    update_rx: Mutex<Option<mpsc::UnboundedReceiver<PluginUpdate>>>,
}

impl Pipeline {
    /// Create a pipeline and spawn its stat aggregators.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        config: PipelineConfig,
        ctx: Arc<Context>,
        stats: Arc<dyn StatsSink>,
        registry: Arc<Registry>,
    ) -> Arc<Self> {
        Self::with_recoveries(config, ctx, stats, registry, Vec::new())
    }

    /// Like [`Pipeline::new`], with recovery callbacks consulted when a
    /// plugin produces a terminal response.
    pub fn with_recoveries(
        config: PipelineConfig,
        ctx: Arc<Context>,
        stats: Arc<dyn StatsSink>,
        registry: Arc<Registry>,
        recoveries: Vec<RecoveryFn>,
    ) -> Arc<Self> {
        let (pipeline_stat_tx, pipeline_stat_rx) = mpsc::channel(STAT_CHANNEL_CAPACITY);
        let (plugin_stat_tx, plugin_stat_rx) = mpsc::channel(STAT_CHANNEL_CAPACITY);
        let (stat_stop_tx, stat_stop_rx) = watch::channel(false);
        let (stat_done_tx, stat_done_rx) = mpsc::channel(2);

        spawn_stat_updaters(
            stats,
            pipeline_stat_rx,
            plugin_stat_rx,
            stat_stop_rx,
            stat_done_tx,
        );

        let subscription = registry.subscribe_updates();

        Arc::new(Self {
            config,
            ctx,
            registry,
            recoveries,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_cancel: CancelCell::new(),
            schedule_cancel: CancelCell::new(),
            rerun_cancel: CancelCell::new(),
            running_plugin: Mutex::new(None),
            pipeline_stat_tx,
            plugin_stat_tx,
            stat_stop_tx,
            stat_done_rx: tokio::sync::Mutex::new(stat_done_rx),
            done: Notify::new(),
            update_subscription_id: subscription.id,
            update_rx: Mutex::new(Some(subscription.receiver)),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn context(&self) -> &Context {
        &self.ctx
    }

    /// Prepare all plugins (e.g. for indicator exposing) and start the
    /// hot-update listener.
    pub fn prepare(self: &Arc<Self>) {
        for name in &self.config.plugins {
            if self.is_stopped() {
                break;
            }
            match self.registry.get_plugin_instance(name, false) {
                Ok(handle) => {
                    handle.plugin().prepare(&self.ctx);
                    self.registry.release_plugin_instance(&handle);
                }
                Err(err) => {
                    // preparation of later plugins might depend on this one
                    warn!(plugin = %name, error = %err, "plugin instance lookup failed");
                    break;
                }
            }
        }

        hot_update::spawn_update_listener(Arc::clone(self));
    }

    /// Run one task through the plugin chain.
    ///
    /// Returns `Ok(())` without doing anything if the pipeline is already
    /// stopped, and [`PipelineError::AlreadyStarted`] if another driver is
    /// in flight.
    pub async fn run(&self) -> Result<()> {
        if self.is_stopped() {
            return Ok(()); // stopped before run
        }

        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::AlreadyStarted);
        }

        let task = Arc::new(PipelineTask::with_recoveries(self.recoveries.clone()));
        let (t, stop_handle) = with_cancel(
            Arc::clone(&task) as Arc<dyn Task>,
            CancelReason::PipelineStopped,
        );
        self.stop_cancel.arm(move || stop_handle.cancel());

        let started_at = Instant::now();
        let mut preempted = false;

        let names = &self.config.plugins;
        let mut i = 0;

        while i < names.len() && !self.is_stopped() {
            let name = names[i].as_str();

            // A failed lookup is acceptable to the pipeline: mark the task
            // and let the status dispatch below route it into recovery.
            let handle = match self.registry.get_plugin_instance(name, true) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    warn!(plugin = %name, error = %err, "plugin instance lookup failed");
                    t.set_error(TaskError::Failed(err.to_string()), CODE_SERVICE_UNAVAILABLE);
                    None
                }
            };

            let mut ran = false;
            let status = t.status();
            if matches!(status, TaskStatus::Pending | TaskStatus::Running) {
                if status == TaskStatus::Pending {
                    task.start();
                }

                if let Some(handle) = &handle {
                    ran = true;
                    let outcome = self.run_plugin(handle, &t, &task).await;
                    preempted = outcome.preempted;

                    if !outcome.success && !outcome.preempted && !self.is_stopped() {
                        self.registry.dismiss_plugin_instance(handle);
                    } else {
                        self.registry.release_plugin_instance(handle);
                    }

                    if !outcome.success && outcome.rerun {
                        // re-enter the same index; the next lookup returns
                        // a freshly constructed instance
                        continue;
                    }
                }
            }

            // A plugin may have moved the task to a terminal status either
            // by returning or via a concurrently firing cancellation;
            // re-reading the status here treats both paths uniformly.
            match t.status() {
                TaskStatus::ResponseImmediately => {
                    if self.is_stopped() {
                        task.finish(t.as_ref());
                    } else if let Some(handle) = &handle {
                        let recovered = task.recover(
                            handle.name(),
                            handle.plugin_type(),
                            TaskStatus::Running,
                            t.as_ref(),
                        );
                        if !recovered {
                            warn!(
                                pipeline = %self.config.name,
                                plugin = %name,
                                result_code = t.result_code(),
                                error = ?t.error(),
                                "plugin execution failure the pipeline could not recover"
                            );
                            task.finish(t.as_ref());
                        }
                    }
                }
                TaskStatus::Finishing => task.finish(t.as_ref()),
                _ => {}
            }

            if !ran {
                if let Some(handle) = &handle {
                    self.registry.release_plugin_instance(handle);
                }
            }

            if t.status() == TaskStatus::Finished {
                break;
            }

            i += 1;
        }

        if !task.finished() {
            task.finish(t.as_ref());
        }

        if !preempted && !self.is_stopped() {
            let sample = ExecSample {
                started_at,
                finished_at: Instant::now(),
                successful: t.error().is_none(),
            };
            // skip the update if the channel is busy
            let _ = self.pipeline_stat_tx.try_send(sample);
        }

        self.stop_cancel.disarm();
        self.started.store(false, Ordering::SeqCst);

        if self.is_stopped() {
            self.done.notify_one();
        }

        Ok(())
    }

    /// Stop the pipeline.
    ///
    /// `scheduled = true` is a cooperative scheduler preempting the
    /// pipeline: the current task is canceled through the preempt slot,
    /// which only affects source plugins. `scheduled = false` is a hard
    /// stop through the stop slot.
    ///
    /// When this returns, any in-flight driver has exited and both stat
    /// channels have been drained into the sink. Losers of the stop race
    /// return immediately.
    pub async fn stop(&self, scheduled: bool) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return; // already stopped
        }

        info!(pipeline = %self.config.name, scheduled, "stopping pipeline");

        if scheduled {
            self.schedule_cancel.fire();
        } else {
            self.stop_cancel.fire();
        }

        if self.started.load(Ordering::SeqCst) {
            // wait for the driver to exit
            self.done.notified().await;
        }

        // notify both updaters, then wait for both drains
        let _ = self.stat_stop_tx.send(true);

        let mut done_rx = self.stat_done_rx.lock().await;
        let _ = done_rx.recv().await;
        let _ = done_rx.recv().await;

        debug!(pipeline = %self.config.name, "pipeline stopped, statistics drained");
    }

    /// Cancel the registry update subscription, ending the hot-update
    /// listener.
    ///
    /// Call [`Pipeline::stop`] first: `stop` waits on the stat
    /// aggregators, which `close` does not touch, so the required order
    /// is stop, then close. Idempotent.
    pub fn close(&self) {
        self.registry.unsubscribe(self.update_subscription_id);
    }

    pub(crate) fn take_update_receiver(&self) -> Option<mpsc::UnboundedReceiver<PluginUpdate>> {
        self.update_rx.lock().unwrap().take()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("started", &self.started)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}
