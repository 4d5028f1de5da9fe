// src/stats/mod.rs

//! Execution statistics.
//!
//! The driver publishes flat samples onto two bounded channels with
//! `try_send` (drop-on-full): statistics are best-effort by design and
//! must never stall the hot path. Two background aggregators drain the
//! channels into a [`StatsSink`]; on shutdown each performs a
//! non-blocking drain of everything still buffered, so an orderly stop
//! loses nothing that was successfully enqueued.

use std::time::{Duration, Instant};

/// Counter bucket addressed by sink updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Success,
    Failure,
    All,
}

/// Destination for aggregated statistics.
///
/// Implementations must be cheap and non-blocking where possible; a slow
/// sink delays draining, which makes the bounded channels drop samples.
pub trait StatsSink: Send + Sync {
    fn update_pipeline_execution(&self, elapsed: Duration) -> anyhow::Result<()>;
    fn update_task_execution(&self, kind: StatKind) -> anyhow::Result<()>;
    fn update_plugin_execution(
        &self,
        plugin_name: &str,
        kind: StatKind,
        elapsed: Duration,
    ) -> anyhow::Result<()>;
}

/// One pipeline/task execution sample.
#[derive(Debug, Clone)]
pub struct ExecSample {
    pub started_at: Instant,
    pub finished_at: Instant,
    pub successful: bool,
}

impl ExecSample {
    pub fn elapsed(&self) -> Duration {
        self.finished_at.duration_since(self.started_at)
    }

    pub fn kind(&self) -> StatKind {
        if self.successful {
            StatKind::Success
        } else {
            StatKind::Failure
        }
    }
}

/// One plugin execution sample.
#[derive(Debug, Clone)]
pub struct PluginExecSample {
    pub sample: ExecSample,
    pub plugin_name: String,
}

/// Capacity of both stat channels. Producers drop on full.
pub const STAT_CHANNEL_CAPACITY: usize = 1024;

pub mod memory;
pub mod updater;

pub use memory::MemoryStats;
