//! Registry lookup, reference counting, dismissal and update fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskpipe::errors::PipelineError;
use taskpipe::plugin::{Plugin, PluginType};
use taskpipe::registry::Registry;

use taskpipe_test_utils::plugins::{new_run_log, InstantPlugin};
use taskpipe_test_utils::with_timeout;

fn counting_registry() -> (Arc<Registry>, Arc<AtomicUsize>) {
    let registry = Arc::new(Registry::new());
    let constructions = Arc::new(AtomicUsize::new(0));
    let log = new_run_log();
    {
        let constructions = Arc::clone(&constructions);
        registry.register(
            "a",
            PluginType::Process,
            Arc::new(move || -> Arc<dyn Plugin> {
                constructions.fetch_add(1, Ordering::SeqCst);
                InstantPlugin::succeeding("a", PluginType::Process, Arc::clone(&log))
            }),
        );
    }
    (registry, constructions)
}

#[test]
fn unknown_plugins_are_rejected() {
    let registry = Registry::new();
    let err = registry.get_plugin_instance("ghost", true).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownPlugin(_)));

    let log = new_run_log();
    let err = registry
        .update_plugin("ghost", InstantPlugin::constructor("ghost", PluginType::Process, log))
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownPlugin(_)));
}

#[test]
fn instances_are_shared_until_dismissed() {
    let (registry, constructions) = counting_registry();

    let first = registry.get_plugin_instance("a", true).expect("lookup");
    let second = registry.get_plugin_instance("a", false).expect("lookup");

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert_eq!(first.generation(), 1);
    assert_eq!(second.generation(), 1);
    assert_eq!(registry.use_count_of("a"), Some(2));

    registry.release_plugin_instance(&second);
    assert_eq!(registry.use_count_of("a"), Some(1));

    registry.dismiss_plugin_instance(&first);
    assert_eq!(registry.use_count_of("a"), Some(0));

    // The dismissal forces a fresh construction at the next generation.
    let third = registry.get_plugin_instance("a", true).expect("lookup");
    assert_eq!(constructions.load(Ordering::SeqCst), 2);
    assert_eq!(third.generation(), 2);
    registry.release_plugin_instance(&third);
}

#[test]
fn release_of_a_stale_handle_does_not_touch_the_new_instance() {
    let (registry, _constructions) = counting_registry();

    let old = registry.get_plugin_instance("a", true).expect("lookup");
    registry.dismiss_plugin_instance(&old);

    let new = registry.get_plugin_instance("a", true).expect("lookup");
    assert_eq!(registry.use_count_of("a"), Some(1));

    // Handing back the generation-1 handle again must not affect the
    // generation-2 instance.
    registry.release_plugin_instance(&old);
    assert_eq!(registry.use_count_of("a"), Some(1));

    registry.release_plugin_instance(&new);
    assert_eq!(registry.use_count_of("a"), Some(0));
}

#[tokio::test]
async fn updates_notify_subscribers_and_supersede_the_live_instance() {
    let (registry, constructions) = counting_registry();
    let mut subscription = registry.subscribe_updates();

    let handle = registry.get_plugin_instance("a", true).expect("lookup");
    assert_eq!(handle.generation(), 1);
    registry.release_plugin_instance(&handle);

    let replacement_log = new_run_log();
    registry
        .update_plugin(
            "a",
            InstantPlugin::constructor("a", PluginType::Process, replacement_log),
        )
        .expect("update");

    let update = with_timeout(subscription.receiver.recv())
        .await
        .expect("subscriber should receive the update");
    assert_eq!(update.plugin, "a");
    assert_eq!(update.superseded_generation, 1);

    // The next lookup builds from the new constructor at generation 2;
    // the counting constructor is gone.
    let handle = registry.get_plugin_instance("a", true).expect("lookup");
    assert_eq!(handle.generation(), 2);
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    registry.release_plugin_instance(&handle);
}

#[tokio::test]
async fn unsubscribe_closes_the_update_channel() {
    let (registry, _constructions) = counting_registry();

    let mut subscription = registry.subscribe_updates();
    registry.unsubscribe(subscription.id);

    assert!(with_timeout(subscription.receiver.recv()).await.is_none());

    // Unsubscribing twice is harmless.
    registry.unsubscribe(subscription.id);
}
