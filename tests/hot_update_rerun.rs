//! Hot-swap of a running plugin.
//!
//! When the registry replaces a plugin while an instance of it is inside
//! `run`, the pipeline cancels that attempt and re-executes the same
//! chain index against the freshly constructed replacement, leaving no
//! statistical trace of the canceled attempt.

use std::sync::Arc;

use taskpipe::pipeline::{Context, Pipeline};
use taskpipe::plugin::PluginType;
use taskpipe::registry::Registry;
use taskpipe::stats::{StatKind, StatsSink};

use taskpipe_test_utils::builders::pipeline_config;
use taskpipe_test_utils::plugins::{new_run_log, ControllablePlugin, InstantPlugin, PluginProbe};
use taskpipe_test_utils::sinks::RecordingSink;
use taskpipe_test_utils::{init_tracing, wait_until, with_timeout};

#[tokio::test]
async fn update_of_the_running_plugin_triggers_a_rerun() {
    init_tracing();

    let probe = PluginProbe::new();
    let registry = Arc::new(Registry::new());
    registry.register(
        "a",
        PluginType::Source,
        ControllablePlugin::constructor("a", PluginType::Source, Arc::clone(&probe)),
    );

    let sink = RecordingSink::new();
    let pipeline = Pipeline::new(
        pipeline_config("hot-swap", &["a"]),
        Arc::new(Context::new("hot-swap")),
        Arc::clone(&sink) as Arc<dyn StatsSink>,
        Arc::clone(&registry),
    );
    pipeline.prepare();

    let driver = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run().await })
    };

    wait_until("old instance to start", || probe.runs_started() == 1).await;

    // Replace the blocking plugin with one that completes instantly.
    let replacement_log = new_run_log();
    registry
        .update_plugin(
            "a",
            InstantPlugin::constructor("a", PluginType::Source, Arc::clone(&replacement_log)),
        )
        .expect("update should succeed");

    with_timeout(driver)
        .await
        .expect("driver task should not panic")
        .expect("run should succeed");

    pipeline.stop(false).await;
    pipeline.close();

    // The old instance was canceled; the replacement ran the same index.
    assert_eq!(probe.runs_canceled(), 1);
    assert_eq!(*replacement_log.lock().unwrap(), vec!["a"]);
    assert_eq!(registry.generation_of("a"), Some(2));

    // Only the successful rerun is visible in the statistics.
    assert_eq!(
        sink.plugin_executions(),
        vec![("a".to_string(), StatKind::Success)]
    );
    assert_eq!(sink.pipeline_executions().len(), 1);
    assert_eq!(sink.task_executions(), vec![StatKind::Success]);
}

#[tokio::test]
async fn update_notice_for_an_older_generation_is_ignored() {
    init_tracing();

    let old_probe = PluginProbe::new();
    let registry = Arc::new(Registry::new());
    registry.register(
        "a",
        PluginType::Source,
        ControllablePlugin::constructor("a", PluginType::Source, Arc::clone(&old_probe)),
    );

    let sink = RecordingSink::new();
    let pipeline = Pipeline::new(
        pipeline_config("stale-notice", &["a"]),
        Arc::new(Context::new("stale-notice")),
        Arc::clone(&sink) as Arc<dyn StatsSink>,
        Arc::clone(&registry),
    );
    pipeline.prepare();

    // Swap in the replacement before the driver ever runs. The update
    // notice supersedes generation 1, but the driver will construct and
    // run generation 2, which the listener must leave alone.
    let new_probe = PluginProbe::new();
    registry
        .update_plugin(
            "a",
            ControllablePlugin::constructor("a", PluginType::Source, Arc::clone(&new_probe)),
        )
        .expect("update should succeed");

    let driver = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run().await })
    };

    wait_until("replacement to start", || new_probe.runs_started() == 1).await;
    assert_eq!(registry.generation_of("a"), Some(2));

    // Give the listener time to process the stale notice, then verify it
    // did not cancel the newer instance.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(new_probe.runs_canceled(), 0);

    new_probe.release_one();
    with_timeout(driver)
        .await
        .expect("driver task should not panic")
        .expect("run should succeed");

    pipeline.stop(false).await;
    pipeline.close();

    assert_eq!(old_probe.runs_started(), 0);
    assert_eq!(new_probe.runs_completed(), 1);
    assert_eq!(sink.task_executions(), vec![StatKind::Success]);
}

#[tokio::test]
async fn update_while_idle_only_affects_the_next_run() {
    init_tracing();

    let log = new_run_log();
    let registry = Arc::new(Registry::new());
    registry.register(
        "a",
        PluginType::Source,
        InstantPlugin::constructor("a", PluginType::Source, Arc::clone(&log)),
    );

    let sink = RecordingSink::new();
    let pipeline = Pipeline::new(
        pipeline_config("idle-update", &["a"]),
        Arc::new(Context::new("idle-update")),
        Arc::clone(&sink) as Arc<dyn StatsSink>,
        Arc::clone(&registry),
    );
    pipeline.prepare();

    pipeline.run().await.expect("run should succeed");
    assert_eq!(registry.generation_of("a"), Some(1));

    let replacement_log = new_run_log();
    registry
        .update_plugin(
            "a",
            InstantPlugin::constructor("a", PluginType::Source, Arc::clone(&replacement_log)),
        )
        .expect("update should succeed");

    pipeline.run().await.expect("run should succeed");
    assert_eq!(registry.generation_of("a"), Some(2));
    assert_eq!(*replacement_log.lock().unwrap(), vec!["a"]);

    pipeline.stop(false).await;
    pipeline.close();

    assert_eq!(sink.pipeline_executions().len(), 2);
}
