// src/task/base.rs

//! Concrete task implementation owned by the pipeline driver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::plugin::PluginType;

use super::{Task, TaskError, TaskStatus, CODE_OK};

/// Recovery callback consulted when a plugin produced a terminal response.
///
/// Receives the name and type of the plugin that failed plus the task view
/// the driver observed. Returning `true` claims the failure: the task's
/// error is cleared and its status reset so the chain can continue.
pub type RecoveryFn = Arc<dyn Fn(&str, PluginType, &dyn Task) -> bool + Send + Sync>;

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    result_code: u16,
    error: Option<TaskError>,
    values: HashMap<String, serde_json::Value>,
}

/// The task the driver creates for each run.
///
/// All mutation goes through `&self`; the driver shares it with cancel
/// wrappers and plugins as an `Arc<dyn Task>`.
pub struct PipelineTask {
    state: Mutex<TaskState>,
    recoveries: Vec<RecoveryFn>,
}

impl PipelineTask {
    pub fn new() -> Self {
        Self::with_recoveries(Vec::new())
    }

    /// A task consulting the given recovery callbacks in order when
    /// [`PipelineTask::recover`] is called.
    pub fn with_recoveries(recoveries: Vec<RecoveryFn>) -> Self {
        Self {
            state: Mutex::new(TaskState {
                status: TaskStatus::Pending,
                result_code: CODE_OK,
                error: None,
                values: HashMap::new(),
            }),
            recoveries,
        }
    }

    /// `Pending` → `Running`. Called once per run by the driver.
    pub fn start(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status == TaskStatus::Pending {
            state.status = TaskStatus::Running;
        }
    }

    /// Persist the final error/code as observed through `view` (the
    /// outermost wrapper the driver holds) and mark the task `Finished`.
    ///
    /// `view` is read before the lock is taken; a wrapper overlay (cancel
    /// reason, 503) becomes the task's durable outcome here.
    pub fn finish(&self, view: &dyn Task) {
        let error = view.error();
        let code = view.result_code();

        let mut state = self.state.lock().unwrap();
        state.error = error;
        state.result_code = code;
        state.status = TaskStatus::Finished;
    }

    /// Attempt recovery from a terminal response produced by the named
    /// plugin. On success the error is cleared, the result code reset and
    /// the status moved to `target_status`.
    pub fn recover(
        &self,
        plugin_name: &str,
        plugin_type: PluginType,
        target_status: TaskStatus,
        view: &dyn Task,
    ) -> bool {
        let claimed = self
            .recoveries
            .iter()
            .any(|recovery| recovery(plugin_name, plugin_type, view));

        if !claimed {
            return false;
        }

        debug!(plugin = %plugin_name, "task recovered from plugin failure");

        let mut state = self.state.lock().unwrap();
        state.error = None;
        state.result_code = CODE_OK;
        state.status = target_status;
        true
    }

    /// Wipe a cancellation-era error so a rerun leaves no trace of the
    /// canceled attempt: error cleared, result code restored, and a status
    /// knocked to `ResponseImmediately`/`Finishing` put back to `Running`.
    pub fn clear_error(&self, original_code: u16) {
        let mut state = self.state.lock().unwrap();
        state.error = None;
        state.result_code = original_code;
        if matches!(
            state.status,
            TaskStatus::ResponseImmediately | TaskStatus::Finishing
        ) {
            state.status = TaskStatus::Running;
        }
    }

    pub fn finished(&self) -> bool {
        self.state.lock().unwrap().status == TaskStatus::Finished
    }
}

impl Default for PipelineTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for PipelineTask {
    fn status(&self) -> TaskStatus {
        self.state.lock().unwrap().status
    }

    fn result_code(&self) -> u16 {
        self.state.lock().unwrap().result_code
    }

    fn error(&self) -> Option<TaskError> {
        self.state.lock().unwrap().error.clone()
    }

    fn set_error(&self, err: TaskError, code: u16) {
        let mut state = self.state.lock().unwrap();
        state.error = Some(err);
        state.result_code = code;
        if matches!(state.status, TaskStatus::Pending | TaskStatus::Running) {
            state.status = TaskStatus::ResponseImmediately;
        }
    }

    fn value(&self, key: &str) -> Option<serde_json::Value> {
        self.state.lock().unwrap().values.get(key).cloned()
    }

    fn set_value(&self, key: &str, value: serde_json::Value) {
        self.state.lock().unwrap().values.insert(key.to_string(), value);
    }
}

impl std::fmt::Debug for PipelineTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("PipelineTask")
            .field("status", &state.status)
            .field("result_code", &state.result_code)
            .field("error", &state.error)
            .finish_non_exhaustive()
    }
}
