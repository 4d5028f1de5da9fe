use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use taskpipe::pipeline::Context;
use taskpipe::plugin::{Plugin, PluginConstructor, PluginType};
use taskpipe::task::{Task, TaskStatus};

/// Shared log of plugin executions, in order.
pub type RunLog = Arc<Mutex<Vec<String>>>;

pub fn new_run_log() -> RunLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// A plugin that completes immediately, recording its run into a log.
pub struct InstantPlugin {
    name: String,
    plugin_type: PluginType,
    fail_with: Option<String>,
    log: RunLog,
}

impl InstantPlugin {
    pub fn succeeding(name: &str, plugin_type: PluginType, log: RunLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            plugin_type,
            fail_with: None,
            log,
        })
    }

    pub fn failing(
        name: &str,
        plugin_type: PluginType,
        message: &str,
        log: RunLog,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            plugin_type,
            fail_with: Some(message.to_string()),
            log,
        })
    }

    /// Constructor registering fresh succeeding instances.
    pub fn constructor(name: &str, plugin_type: PluginType, log: RunLog) -> PluginConstructor {
        let name = name.to_string();
        Arc::new(move || -> Arc<dyn Plugin> {
            InstantPlugin::succeeding(&name, plugin_type, Arc::clone(&log))
        })
    }

    /// Constructor registering fresh failing instances.
    pub fn failing_constructor(
        name: &str,
        plugin_type: PluginType,
        message: &str,
        log: RunLog,
    ) -> PluginConstructor {
        let name = name.to_string();
        let message = message.to_string();
        Arc::new(move || -> Arc<dyn Plugin> {
            InstantPlugin::failing(&name, plugin_type, &message, Arc::clone(&log))
        })
    }
}

#[async_trait]
impl Plugin for InstantPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    async fn run(&self, ctx: &Context, _task: Arc<dyn Task>) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(self.name.clone());

        // Leave a trace in the shared context, the way real plugins pass
        // intermediate results along the chain.
        let mut trace = ctx
            .value("trace")
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        trace.push(serde_json::json!(self.name));
        ctx.set_value("trace", serde_json::Value::Array(trace));

        match &self.fail_with {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

/// Observation point shared between a [`ControllablePlugin`] and the test
/// driving it.
#[derive(Default)]
pub struct PluginProbe {
    runs_started: AtomicUsize,
    runs_completed: AtomicUsize,
    runs_canceled: AtomicUsize,
    release: Notify,
}

impl PluginProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn runs_started(&self) -> usize {
        self.runs_started.load(Ordering::SeqCst)
    }

    pub fn runs_completed(&self) -> usize {
        self.runs_completed.load(Ordering::SeqCst)
    }

    pub fn runs_canceled(&self) -> usize {
        self.runs_canceled.load(Ordering::SeqCst)
    }

    /// Allow one pending (or future) run to complete successfully.
    pub fn release_one(&self) {
        self.release.notify_one();
    }
}

/// A plugin that blocks inside `run` until the probe releases it or the
/// task is canceled, whichever comes first.
///
/// Cancellation is observed cooperatively by polling the task status, the
/// same way a real source plugin would between blocking reads.
pub struct ControllablePlugin {
    name: String,
    plugin_type: PluginType,
    probe: Arc<PluginProbe>,
}

impl ControllablePlugin {
    pub fn new(name: &str, plugin_type: PluginType, probe: Arc<PluginProbe>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            plugin_type,
            probe,
        })
    }

    pub fn constructor(
        name: &str,
        plugin_type: PluginType,
        probe: Arc<PluginProbe>,
    ) -> PluginConstructor {
        let name = name.to_string();
        Arc::new(move || -> Arc<dyn Plugin> {
            ControllablePlugin::new(&name, plugin_type, Arc::clone(&probe))
        })
    }
}

async fn task_finishing(task: &Arc<dyn Task>) {
    loop {
        if task.status() == TaskStatus::Finishing {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[async_trait]
impl Plugin for ControllablePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    async fn run(&self, _ctx: &Context, task: Arc<dyn Task>) -> anyhow::Result<()> {
        self.probe.runs_started.fetch_add(1, Ordering::SeqCst);

        tokio::select! {
            _ = self.probe.release.notified() => {
                self.probe.runs_completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            _ = task_finishing(&task) => {
                self.probe.runs_canceled.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("plugin '{}' observed task cancellation", self.name))
            }
        }
    }
}
