use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use taskpipe::stats::{StatKind, StatsSink};

/// One sink update, as observed by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    PipelineExecution(Duration),
    TaskExecution(StatKind),
    PluginExecution {
        plugin_name: String,
        kind: StatKind,
        elapsed: Duration,
    },
}

/// A sink that records every update for later assertion.
///
/// The gate lets a test block the stat aggregators: while closed, every
/// update waits, so the bounded stat channels fill up and producers start
/// dropping. Open by default.
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    gate_open: Mutex<bool>,
    gate_cv: Condvar,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            gate_open: Mutex::new(true),
            gate_cv: Condvar::new(),
        })
    }

    pub fn close_gate(&self) {
        *self.gate_open.lock().unwrap() = false;
    }

    pub fn open_gate(&self) {
        *self.gate_open.lock().unwrap() = true;
        self.gate_cv.notify_all();
    }

    fn wait_gate(&self) {
        let mut open = self.gate_open.lock().unwrap();
        while !*open {
            open = self.gate_cv.wait(open).unwrap();
        }
    }

    fn record(&self, call: SinkCall) {
        self.wait_gate();
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pipeline_executions(&self) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::PipelineExecution(elapsed) => Some(elapsed),
                _ => None,
            })
            .collect()
    }

    pub fn task_executions(&self) -> Vec<StatKind> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::TaskExecution(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }

    /// Plugin updates in arrival order, as (name, kind) pairs.
    pub fn plugin_executions(&self) -> Vec<(String, StatKind)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::PluginExecution {
                    plugin_name, kind, ..
                } => Some((plugin_name, kind)),
                _ => None,
            })
            .collect()
    }
}

impl StatsSink for RecordingSink {
    fn update_pipeline_execution(&self, elapsed: Duration) -> anyhow::Result<()> {
        self.record(SinkCall::PipelineExecution(elapsed));
        Ok(())
    }

    fn update_task_execution(&self, kind: StatKind) -> anyhow::Result<()> {
        self.record(SinkCall::TaskExecution(kind));
        Ok(())
    }

    fn update_plugin_execution(
        &self,
        plugin_name: &str,
        kind: StatKind,
        elapsed: Duration,
    ) -> anyhow::Result<()> {
        self.record(SinkCall::PluginExecution {
            plugin_name: plugin_name.to_string(),
            kind,
            elapsed,
        });
        Ok(())
    }
}
