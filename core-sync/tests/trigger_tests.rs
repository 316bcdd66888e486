//! Lifecycle and auth events driving the sync entry points.

mod common;

use bridge_desktop::ChannelLifecycleObserver;
use bridge_traits::lifecycle::LifecycleEvent;
use common::{FakeSpotify, Harness, API_BASE, START_MS};
use core_library::LikedSongStore;
use core_runtime::config::{AutoSyncSettings, FetcherSettings};
use core_runtime::events::{AuthEvent, CoreEvent};
use core_sync::{AutoSyncService, SpotifyFetcher, SyncDispatcher, SyncTrigger, SyncTriggerHub};
use std::sync::Arc;
use std::time::Duration;

async fn hub(h: &Harness) -> (SyncTriggerHub, AutoSyncService) {
    let fetcher = Arc::new(SpotifyFetcher::new(
        Arc::new(h.spotify.clone()),
        h.clock.clone(),
        API_BASE,
        FetcherSettings::default(),
    ));
    let auto_sync = AutoSyncService::new(
        h.tokens.clone(),
        fetcher,
        h.store.clone(),
        None,
        h.settings.clone(),
        h.event_bus.clone(),
        h.clock.clone(),
        AutoSyncSettings::default(),
    )
    .await;

    let dispatcher = SyncDispatcher::new(h.coordinator.clone(), auto_sync.clone());
    (SyncTriggerHub::new(dispatcher), auto_sync)
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

fn auth_event(event: AuthEvent) -> CoreEvent {
    CoreEvent::Auth(event)
}

#[tokio::test(start_paused = true)]
async fn test_focus_regain_runs_quick_sync() {
    let h = Harness::new(FakeSpotify::with_tracks(5, START_MS)).await;
    let (hub, _) = hub(&h).await;
    let observer = ChannelLifecycleObserver::new();
    hub.listen_lifecycle(&observer).await.unwrap();

    observer.notify(LifecycleEvent::Hidden);
    settle().await;
    assert_eq!(h.spotify.request_count(), 0);

    observer.notify(LifecycleEvent::FocusGained);
    settle().await;
    assert_eq!(h.store.count().await.unwrap(), 5);

    hub.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_triggers_runs_one_pass() {
    let h = Harness::new(FakeSpotify::with_tracks(5, START_MS)).await;
    let (hub, _) = hub(&h).await;
    let observer = ChannelLifecycleObserver::new();
    hub.listen_lifecycle(&observer).await.unwrap();
    hub.listen_events(&h.event_bus).await;

    observer.notify(LifecycleEvent::FocusGained);
    observer.notify(LifecycleEvent::Visible);
    h.event_bus
        .emit(auth_event(AuthEvent::TokenRefreshed {
            provider: "spotify".to_string(),
            expires_at_ms: START_MS + 3_600_000,
        }))
        .unwrap();
    observer.notify(LifecycleEvent::FocusGained);
    settle().await;

    assert_eq!(h.spotify.request_count(), 1);
    assert_eq!(h.store.count().await.unwrap(), 5);

    hub.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_waits_before_syncing() {
    let h = Harness::new(FakeSpotify::with_tracks(5, START_MS)).await;
    let (hub, _) = hub(&h).await;
    hub.listen_events(&h.event_bus).await;

    h.event_bus
        .emit(auth_event(AuthEvent::SignedIn {
            provider: "spotify".to_string(),
        }))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.spotify.request_count(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.store.count().await.unwrap(), 5);

    hub.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_stops_auto_sync() {
    let h = Harness::new(FakeSpotify::with_tracks(1, START_MS)).await;
    let (hub, auto_sync) = hub(&h).await;
    hub.listen_events(&h.event_bus).await;
    assert!(auto_sync.start(10.0).await);

    h.event_bus
        .emit(auth_event(AuthEvent::SignedOut {
            provider: "spotify".to_string(),
        }))
        .unwrap();
    settle().await;

    assert!(!auto_sync.is_enabled().await);
    hub.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_trigger_forces_past_cooldown() {
    let h = Harness::new(FakeSpotify::with_tracks(2, START_MS)).await;
    let (hub, _) = hub(&h).await;
    assert!(h.coordinator.quick_sync().await.success);

    let quick = hub.fire(SyncTrigger::FocusRegained).await.unwrap();
    assert!(!quick.success);

    let manual = hub.fire(SyncTrigger::Manual).await.unwrap();
    assert!(manual.success);
}

#[tokio::test(start_paused = true)]
async fn test_timer_trigger_runs_auto_sync_pass() {
    let h = Harness::new(FakeSpotify::with_tracks(2, START_MS)).await;
    let (hub, _) = hub(&h).await;

    let outcome = hub.dispatcher().dispatch(SyncTrigger::Timer).await;

    assert!(outcome.success);
    assert!(h
        .store
        .get("spotify-auto-track0")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_detaches_listeners() {
    let h = Harness::new(FakeSpotify::with_tracks(1, START_MS)).await;
    let (hub, _) = hub(&h).await;
    let observer = ChannelLifecycleObserver::new();
    hub.listen_lifecycle(&observer).await.unwrap();
    hub.listen_events(&h.event_bus).await;
    assert_eq!(h.event_bus.subscriber_count(), 1);

    hub.shutdown().await;

    assert_eq!(observer.notify(LifecycleEvent::FocusGained), 0);
    assert_eq!(h.event_bus.subscriber_count(), 0);
}
