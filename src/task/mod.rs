// src/task/mod.rs

//! Task model for the pipeline.
//!
//! A task is the value the pipeline drives through its plugin chain. It
//! carries:
//! - a status (small state machine, see [`TaskStatus`])
//! - a result code (HTTP-flavoured, e.g. 200 / 503)
//! - at most one error
//! - arbitrary string-keyed payload values for plugins to communicate
//!
//! The driver owns a concrete [`PipelineTask`] and hands plugins a
//! `dyn Task` view, possibly wrapped by one or more cancel decorators
//! (see [`cancel`]). Plugins observe cancellation cooperatively through
//! the task status; nothing in the pipeline hard-kills a plugin.

/// Canonical "everything fine" result code.
pub const CODE_OK: u16 = 200;

/// Result code attached to registry failures, plugin failures and
/// cancellations.
pub const CODE_SERVICE_UNAVAILABLE: u16 = 503;

/// Status of a task as it moves through the plugin chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Created, no plugin has run yet.
    Pending,
    /// The chain is executing.
    Running,
    /// A plugin (or a failed lookup) produced a terminal response; the
    /// driver will attempt recovery or finish the task.
    ResponseImmediately,
    /// The task is winding down (set by cancellation wrappers).
    Finishing,
    /// Terminal.
    Finished,
}

impl TaskStatus {
    /// Whether the status is past the point where a cancel wrapper may
    /// overlay it.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::ResponseImmediately | TaskStatus::Finishing | TaskStatus::Finished
        )
    }
}

/// Why a cancel wrapper fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    PipelineStopped,
    PipelinePreempted,
    PluginUpdated,
}

/// Error carried by a task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task canceled: pipeline stopped")]
    CanceledByPipelineStopped,

    #[error("task canceled: pipeline preempted")]
    CanceledByPipelinePreempted,

    #[error("task canceled: plugin updated")]
    CanceledByPluginUpdated,

    /// A plugin or registry failure, carried as a message.
    #[error("{0}")]
    Failed(String),
}

impl From<CancelReason> for TaskError {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::PipelineStopped => TaskError::CanceledByPipelineStopped,
            CancelReason::PipelinePreempted => TaskError::CanceledByPipelinePreempted,
            CancelReason::PluginUpdated => TaskError::CanceledByPluginUpdated,
        }
    }
}

/// The task view plugins and wrappers operate on.
///
/// Reads (`status`, `result_code`, `error`, `value`) may be overlaid by a
/// cancel wrapper; writes always reach the innermost task.
pub trait Task: Send + Sync {
    fn status(&self) -> TaskStatus;
    fn result_code(&self) -> u16;
    fn error(&self) -> Option<TaskError>;

    /// Attach an error. Moves a `Pending`/`Running` task to
    /// `ResponseImmediately` so the driver's status dispatch can route it
    /// into recovery.
    fn set_error(&self, err: TaskError, code: u16);

    fn value(&self, key: &str) -> Option<serde_json::Value>;
    fn set_value(&self, key: &str, value: serde_json::Value);
}

pub mod base;
pub mod cancel;

pub use base::{PipelineTask, RecoveryFn};
pub use cancel::{with_cancel, CancelHandle};
