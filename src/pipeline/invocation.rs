// src/pipeline/invocation.rs

//! A single plugin invocation.
//!
//! The driver delegates here to run one plugin exactly once under its
//! cancel wrappers and classify the outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use crate::plugin::PluginType;
use crate::registry::PluginHandle;
use crate::stats::{ExecSample, PluginExecSample};
use crate::task::{
    with_cancel, CancelReason, PipelineTask, Task, TaskError, CODE_SERVICE_UNAVAILABLE,
};

use super::slots::RunningPlugin;
use super::Pipeline;

/// Classification of one plugin invocation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InvocationOutcome {
    /// The plugin returned without error.
    pub(crate) success: bool,
    /// The preempt cancel fired during the run.
    pub(crate) preempted: bool,
    /// The hot-update cancel fired during the run; the driver should
    /// re-enter the same plugin index.
    pub(crate) rerun: bool,
}

impl Pipeline {
    /// Run one plugin against the task.
    ///
    /// `input` is the task view the driver holds (already carrying the
    /// per-run stop wrapper); `task` is the concrete task beneath it.
    pub(crate) async fn run_plugin(
        &self,
        handle: &PluginHandle,
        input: &Arc<dyn Task>,
        task: &Arc<PipelineTask>,
    ) -> InvocationOutcome {
        let mut t: Arc<dyn Task> = Arc::clone(input);

        // Only a source plugin may be preempted: a source blocks waiting
        // for new input, while interrupting a transform would leave the
        // task mid-flight.
        let preempted = Arc::new(AtomicBool::new(false));
        if handle.plugin_type() == PluginType::Source {
            let (wrapped, canceller) = with_cancel(t, CancelReason::PipelinePreempted);
            t = wrapped;

            let flag = Arc::clone(&preempted);
            self.schedule_cancel.arm(move || {
                flag.store(true, Ordering::SeqCst);
                canceller.cancel();
            });
        }

        let original_code = input.result_code();

        let rerun = Arc::new(AtomicBool::new(false));
        let (wrapped, canceller) = with_cancel(t, CancelReason::PluginUpdated);
        t = wrapped;
        {
            let flag = Arc::clone(&rerun);
            self.rerun_cancel.arm(move || {
                flag.store(true, Ordering::SeqCst);
                canceller.cancel();
            });
        }

        *self.running_plugin.lock().unwrap() = Some(RunningPlugin {
            name: handle.name().to_string(),
            generation: handle.generation(),
        });

        let started_at = Instant::now();
        let result = handle.plugin().run(self.context(), Arc::clone(&t)).await;
        let finished_at = Instant::now();

        *self.running_plugin.lock().unwrap() = None;
        self.rerun_cancel.disarm();
        self.schedule_cancel.disarm();

        let preempted = preempted.load(Ordering::SeqCst);
        let rerun = rerun.load(Ordering::SeqCst);

        if !rerun && !preempted && !self.is_stopped() {
            let sample = PluginExecSample {
                sample: ExecSample {
                    started_at,
                    finished_at,
                    successful: result.is_ok() && t.error().is_none(),
                },
                plugin_name: handle.name().to_string(),
            };
            // skip the update if the channel is busy
            let _ = self.plugin_stat_tx.try_send(sample);
        }

        if let Err(err) = &result {
            if rerun {
                // erase every trace of the canceled attempt so the retry
                // starts from the pre-run result code
                task.clear_error(original_code);
            } else if !preempted {
                if !self.is_stopped() {
                    warn!(
                        plugin = %handle.name(),
                        error = %err,
                        "plugin encountered a failure it could not cover"
                    );
                }

                // do not overwrite an error the plugin itself attached
                if t.error().is_none() {
                    t.set_error(TaskError::Failed(err.to_string()), CODE_SERVICE_UNAVAILABLE);
                }
            }
        }

        InvocationOutcome {
            success: result.is_ok(),
            preempted,
            rerun,
        }
    }
}
