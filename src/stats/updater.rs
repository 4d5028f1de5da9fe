// src/stats/updater.rs

//! Background stat aggregators.
//!
//! Each pipeline spawns two workers, one per stat channel. A worker
//! forwards samples into the sink until the stop signal arrives, then
//! drains whatever is still buffered with a non-blocking loop, sends one
//! acknowledgement and exits. `Pipeline::stop` waits for both
//! acknowledgements, which is the drain-on-shutdown guarantee.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use super::{ExecSample, PluginExecSample, StatsSink};

/// Spawn both aggregator workers.
///
/// `done_tx` receives exactly one message per worker once its drain is
/// complete.
pub(crate) fn spawn_stat_updaters(
    sink: Arc<dyn StatsSink>,
    pipeline_rx: mpsc::Receiver<ExecSample>,
    plugin_rx: mpsc::Receiver<PluginExecSample>,
    stop_rx: watch::Receiver<bool>,
    done_tx: mpsc::Sender<()>,
) {
    tokio::spawn(pipeline_stat_updater(
        Arc::clone(&sink),
        pipeline_rx,
        stop_rx.clone(),
        done_tx.clone(),
    ));
    tokio::spawn(plugin_stat_updater(sink, plugin_rx, stop_rx, done_tx));
}

async fn pipeline_stat_updater(
    sink: Arc<dyn StatsSink>,
    mut rx: mpsc::Receiver<ExecSample>,
    mut stop_rx: watch::Receiver<bool>,
    done_tx: mpsc::Sender<()>,
) {
    loop {
        tokio::select! {
            sample = rx.recv() => match sample {
                Some(sample) => apply_pipeline_sample(sink.as_ref(), sample),
                None => break,
            },
            _ = stop_rx.changed() => {
                while let Ok(sample) = rx.try_recv() {
                    apply_pipeline_sample(sink.as_ref(), sample);
                }
                let _ = done_tx.send(()).await;
                debug!("pipeline stat updater drained and stopped");
                return;
            }
        }
    }
}

async fn plugin_stat_updater(
    sink: Arc<dyn StatsSink>,
    mut rx: mpsc::Receiver<PluginExecSample>,
    mut stop_rx: watch::Receiver<bool>,
    done_tx: mpsc::Sender<()>,
) {
    loop {
        tokio::select! {
            sample = rx.recv() => match sample {
                Some(sample) => apply_plugin_sample(sink.as_ref(), sample),
                None => break,
            },
            _ = stop_rx.changed() => {
                while let Ok(sample) = rx.try_recv() {
                    apply_plugin_sample(sink.as_ref(), sample);
                }
                let _ = done_tx.send(()).await;
                debug!("plugin stat updater drained and stopped");
                return;
            }
        }
    }
}

fn apply_pipeline_sample(sink: &dyn StatsSink, sample: ExecSample) {
    if let Err(err) = sink.update_pipeline_execution(sample.elapsed()) {
        error!(error = %err, "pipeline execution statistics update failed");
    }
    if let Err(err) = sink.update_task_execution(sample.kind()) {
        error!(error = %err, "task execution statistics update failed");
    }
}

fn apply_plugin_sample(sink: &dyn StatsSink, sample: PluginExecSample) {
    if let Err(err) = sink.update_plugin_execution(
        &sample.plugin_name,
        sample.sample.kind(),
        sample.sample.elapsed(),
    ) {
        error!(
            plugin = %sample.plugin_name,
            error = %err,
            "plugin execution statistics update failed"
        );
    }
}
