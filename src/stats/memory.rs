// src/stats/memory.rs

//! In-memory statistics sink.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{StatKind, StatsSink};

/// Aggregated counters for one execution category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecCounters {
    pub success: u64,
    pub failure: u64,
    pub all: u64,
    pub total_elapsed: Duration,
}

impl ExecCounters {
    fn record(&mut self, kind: StatKind) {
        match kind {
            StatKind::Success => self.success += 1,
            StatKind::Failure => self.failure += 1,
            StatKind::All => {}
        }
        self.all += 1;
    }
}

#[derive(Debug, Default)]
struct MemoryStatsState {
    pipeline_executions: u64,
    pipeline_elapsed: Duration,
    task: ExecCounters,
    plugins: HashMap<String, ExecCounters>,
}

/// Default sink: keeps everything in process memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryStats {
    state: Mutex<MemoryStatsState>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pipeline_executions(&self) -> u64 {
        self.state.lock().unwrap().pipeline_executions
    }

    pub fn pipeline_elapsed(&self) -> Duration {
        self.state.lock().unwrap().pipeline_elapsed
    }

    pub fn task_counters(&self) -> ExecCounters {
        self.state.lock().unwrap().task
    }

    pub fn plugin_counters(&self, plugin_name: &str) -> Option<ExecCounters> {
        self.state
            .lock()
            .unwrap()
            .plugins
            .get(plugin_name)
            .copied()
    }
}

impl StatsSink for MemoryStats {
    fn update_pipeline_execution(&self, elapsed: Duration) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.pipeline_executions += 1;
        state.pipeline_elapsed += elapsed;
        Ok(())
    }

    fn update_task_execution(&self, kind: StatKind) -> anyhow::Result<()> {
        self.state.lock().unwrap().task.record(kind);
        Ok(())
    }

    fn update_plugin_execution(
        &self,
        plugin_name: &str,
        kind: StatKind,
        elapsed: Duration,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        let counters = state.plugins.entry(plugin_name.to_string()).or_default();
        counters.record(kind);
        counters.total_elapsed += elapsed;
        Ok(())
    }
}
