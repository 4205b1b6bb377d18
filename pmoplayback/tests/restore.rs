mod common;

use std::thread;
use std::time::Duration;

use serde_json::json;

use common::{Harness, PlayerCall, cast, movie, p2p_only_cast};
use pmoplayback::{
    DeviceMessage, LoadOptions, OrchestratorEvent, PlaybackConfig, RemoteCommand, RendererInfo,
    SelectionOrigin,
};

fn harness(verification_ms: u64, window_ms: u64) -> Harness {
    let mut config = PlaybackConfig::default();
    config.restore.verification_timeout_ms = verification_ms;
    config.restore.recovery_window_ms = window_ms;
    Harness::with_config(config)
}

fn select_and_connect(h: &Harness, renderer: &RendererInfo) {
    h.orchestrator.on_device_discovered(renderer.clone());
    h.orchestrator.set_renderer(
        Some(renderer.clone()),
        true,
        SelectionOrigin::Picker { global: false },
    );
    h.orchestrator.on_device_connected(&renderer.id);
}

/// Casts `movie("m")` to `renderer`, plays it to 120 s, then loses the device.
fn play_then_lose(h: &Harness, renderer: &RendererInfo) {
    select_and_connect(h, renderer);
    h.orchestrator
        .load(vec![movie("m")], 0, LoadOptions::default());
    h.orchestrator.on_device_message(
        &renderer.id,
        &DeviceMessage::new("status", json!({"position": 120_000, "phase": "PLAYING"})),
    );
    h.orchestrator.on_device_disconnected(&renderer.id, false);
}

#[test]
fn test_unclean_loss_arms_recovery_and_stops_locally() {
    let h = harness(200, 7000);
    let tv = cast("tv");

    play_then_lose(&h, &tv);

    let record = h.orchestrator.recovery_record().unwrap();
    assert_eq!(record.device_id, tv.id);
    assert_eq!(record.last_media.unwrap().resume_position_ms, 120_000);

    assert!(h.player.calls().contains(&PlayerCall::Stop));
    assert_eq!(*h.presentation.closed.lock().unwrap(), vec![true]);
    assert_eq!(h.registry.selected_renderer(), None);
    assert!(h.orchestrator.now_playing().is_none());
    assert!(
        h.drain_events()
            .contains(&OrchestratorEvent::StoppedAfterDeviceLoss)
    );
    // Resume position survives in the catalog
    assert_eq!(h.catalog.entries()[0].item.resume_position_ms, 120_000);
}

#[test]
fn test_rediscovery_restores_without_autostart() {
    let h = harness(5000, 7000);
    let tv = cast("tv");
    play_then_lose(&h, &tv);

    h.orchestrator.on_device_discovered(tv.clone());

    assert_eq!(h.registry.selected_renderer(), Some(tv.clone()));
    assert_eq!(h.channel.connects(), vec!["tv".to_string(), "tv".to_string()]);
    assert_eq!(h.playlist_load_count(), 2);
    assert_eq!(
        h.player.loads().last(),
        Some(&PlayerCall::Load {
            locator: "http://media.local/m.mkv".to_string(),
            position_ms: 120_000,
            start: false
        })
    );
    assert!(h.orchestrator.recovery_record().is_none());
    assert!(h.orchestrator.has_pending_restore_check());

    h.orchestrator.on_device_connected(&tv.id);
    assert!(matches!(
        h.channel.loads().last(),
        Some(RemoteCommand::Load {
            position_ms: 120_000,
            autoplay: false,
            ..
        })
    ));
}

#[test]
fn test_restore_is_consumed_once() {
    let h = harness(5000, 7000);
    let tv = cast("tv");
    play_then_lose(&h, &tv);

    assert!(h.orchestrator.restore_device(&tv));
    let loads = h.playlist_load_count();

    assert!(!h.orchestrator.restore_device(&tv));
    h.orchestrator.on_device_discovered(tv.clone());
    assert_eq!(h.playlist_load_count(), loads);
}

#[test]
fn test_restored_session_that_plays_is_kept() {
    let h = harness(200, 7000);
    let tv = cast("tv");
    play_then_lose(&h, &tv);
    h.orchestrator.on_device_discovered(tv.clone());
    h.orchestrator.on_device_connected(&tv.id);

    h.orchestrator
        .on_device_message(&tv.id, &DeviceMessage::new("playing", json!({})));
    thread::sleep(Duration::from_millis(500));

    assert!(!h.orchestrator.has_pending_restore_check());
    assert_eq!(h.registry.selected_renderer(), Some(tv));
    assert!(h.orchestrator.now_playing().is_some());
    assert_eq!(h.channel.disconnects(), 0);
}

#[test]
fn test_restored_session_that_stalls_is_stopped() {
    let h = harness(200, 7000);
    let tv = cast("tv");
    play_then_lose(&h, &tv);
    h.orchestrator.on_device_discovered(tv.clone());
    h.orchestrator.on_device_connected(&tv.id);

    thread::sleep(Duration::from_millis(500));

    assert!(!h.orchestrator.has_pending_restore_check());
    assert_eq!(h.registry.selected_renderer(), None);
    assert!(h.orchestrator.now_playing().is_none());
    assert_eq!(h.channel.disconnects(), 1);
    assert!(h.orchestrator.recovery_record().is_none());
}

#[test]
fn test_restore_bypasses_media_class_filter() {
    let h = harness(5000, 7000);
    let d = p2p_only_cast("d");

    // Plain item loaded locally, then cast to a peer-to-peer only device
    h.orchestrator
        .load(vec![movie("m")], 0, LoadOptions::default());
    select_and_connect(&h, &d);
    assert_eq!(h.channel.loads().len(), 1);
    h.orchestrator.on_device_disconnected(&d.id, false);

    h.orchestrator.on_device_discovered(d.clone());

    assert_eq!(h.playlist_load_count(), 2);
    assert_eq!(
        h.orchestrator.now_playing().map(|m| m.locator),
        Some("http://media.local/m.mkv".to_string())
    );
}

#[test]
fn test_new_load_discards_recovery() {
    let h = harness(5000, 7000);
    let tv = cast("tv");
    play_then_lose(&h, &tv);

    h.orchestrator
        .load(vec![movie("other")], 0, LoadOptions::default());
    assert!(h.orchestrator.recovery_record().is_none());

    h.orchestrator.stop(Default::default());
    assert!(!h.orchestrator.restore_device(&tv));
}

#[test]
fn test_recovery_expires_after_window() {
    let h = harness(5000, 50);
    let tv = cast("tv");
    play_then_lose(&h, &tv);

    thread::sleep(Duration::from_millis(150));
    h.orchestrator.on_device_discovered(tv.clone());

    assert_eq!(h.playlist_load_count(), 1);
    assert_eq!(h.registry.selected_renderer(), None);
}

#[test]
fn test_device_removal_counts_as_loss() {
    let h = harness(5000, 7000);
    let tv = cast("tv");
    select_and_connect(&h, &tv);
    h.orchestrator
        .load(vec![movie("m")], 0, LoadOptions::default());

    h.orchestrator.on_device_removed(&tv.id);

    assert!(h.orchestrator.recovery_record().is_some());
    assert!(h.registry.get(&tv.id).is_none());
}

#[test]
fn test_acknowledged_close_never_arms_recovery() {
    let h = harness(5000, 7000);
    let tv = cast("tv");
    select_and_connect(&h, &tv);
    h.orchestrator
        .load(vec![movie("m")], 0, LoadOptions::default());

    h.orchestrator.on_device_disconnected(&tv.id, true);

    assert!(h.orchestrator.recovery_record().is_none());
    assert_eq!(h.registry.selected_renderer(), None);
    assert!(h.presentation.closed.lock().unwrap().is_empty());
}
