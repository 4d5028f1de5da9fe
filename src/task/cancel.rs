// src/task/cancel.rs

//! Cancel decorators for tasks.
//!
//! [`with_cancel`] wraps a task so that an external trigger can move it
//! into a canceled state with a named reason. While the trigger has not
//! fired, the wrapper is transparent. Once fired:
//!
//! - `status()` reports `Finishing` unless the inner task is already
//!   terminal
//! - `error()` reports the cancel reason
//! - `result_code()` reports 503
//!
//! The inner task's payload is never touched by the wrapper; writes
//! (`set_error`, `set_value`) always pass through. Wrappers stack: the
//! driver layers a preempt wrapper and a hot-update wrapper on top of the
//! per-run stop wrapper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{CancelReason, Task, TaskError, TaskStatus, CODE_SERVICE_UNAVAILABLE};

struct CancelState {
    fired: AtomicBool,
    reason: CancelReason,
}

/// Idempotent trigger returned by [`with_cancel`].
///
/// Safe to call from any thread, any number of times, including after the
/// wrapped task has finished; late or repeated invocations are no-ops.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.state.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!(reason = ?self.state.reason, "task cancel fired");
        }
    }

    pub fn fired(&self) -> bool {
        self.state.fired.load(Ordering::SeqCst)
    }
}

struct CancelableTask {
    inner: Arc<dyn Task>,
    state: Arc<CancelState>,
}

impl CancelableTask {
    fn fired(&self) -> bool {
        self.state.fired.load(Ordering::SeqCst)
    }
}

impl Task for CancelableTask {
    fn status(&self) -> TaskStatus {
        let inner = self.inner.status();
        if self.fired() && !inner.is_terminal() {
            TaskStatus::Finishing
        } else {
            inner
        }
    }

    fn result_code(&self) -> u16 {
        if self.fired() {
            CODE_SERVICE_UNAVAILABLE
        } else {
            self.inner.result_code()
        }
    }

    fn error(&self) -> Option<TaskError> {
        if self.fired() {
            Some(self.state.reason.into())
        } else {
            self.inner.error()
        }
    }

    fn set_error(&self, err: TaskError, code: u16) {
        self.inner.set_error(err, code);
    }

    fn value(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.value(key)
    }

    fn set_value(&self, key: &str, value: serde_json::Value) {
        self.inner.set_value(key, value);
    }
}

/// Wrap `inner` with a cancel decorator for `reason`.
///
/// Returns the wrapped task and the trigger that cancels it.
pub fn with_cancel(inner: Arc<dyn Task>, reason: CancelReason) -> (Arc<dyn Task>, CancelHandle) {
    let state = Arc::new(CancelState {
        fired: AtomicBool::new(false),
        reason,
    });

    let task = CancelableTask {
        inner,
        state: Arc::clone(&state),
    };

    (Arc::new(task), CancelHandle { state })
}
