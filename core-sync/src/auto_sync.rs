//! # Auto-Sync Service
//!
//! Periodically pulls the most recently saved Spotify tracks into the
//! library. Unlike the library coordinator it only looks at a recent window,
//! deduplicates by title and artist, and writes each track on its own under
//! a `spotify-auto-` document id, optionally swapping the preview for a
//! full-length stream found through the search catalog.
//!
//! The configuration lives in the settings store as camelCase JSON under
//! [`AUTO_SYNC_CONFIG_KEY`] and is only written by this service.
//!
//! Repeated failures disable the service once `retry_count` reaches
//! `max_retries`.

use crate::catalog::TrackCatalog;
use crate::error::{Result, SyncError};
use crate::fetcher::SpotifyFetcher;
use crate::progress::{scaled_percent, ProgressReporter, ProgressSubscription, SyncOutcome};
use crate::reconciler::reconcile_by_title_artist;
use crate::transformer::transform_all;
use bridge_traits::storage::{get_json, set_json, SettingsStore};
use bridge_traits::time::Clock;
use core_auth::AccessTokenProvider;
use core_library::{LikedSongSource, LikedSongStore, SyncedTrack};
use core_runtime::config::AutoSyncSettings;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncEvent, SyncPipeline};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Settings key of the persisted [`AutoSyncConfig`].
pub const AUTO_SYNC_CONFIG_KEY: &str = "spotify-auto-sync-config";

const FAST_START_DELAY: Duration = Duration::from_millis(500);
const OVERDUE_START_DELAY: Duration = Duration::from_secs(5);

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSyncConfig {
    pub enabled: bool,
    pub interval_minutes: f64,
    /// Epoch ms of the last successful pass, 0 when never
    pub last_sync_timestamp: i64,
    pub max_songs_per_sync: u32,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl AutoSyncConfig {
    pub fn from_settings(settings: &AutoSyncSettings) -> Self {
        Self {
            enabled: false,
            interval_minutes: settings.interval_minutes,
            last_sync_timestamp: 0,
            max_songs_per_sync: settings.max_songs_per_sync,
            retry_count: 0,
            max_retries: settings.max_retries,
        }
    }

    /// Zero for negative intervals, capped at
    /// [`AutoSyncSettings::MAX_INTERVAL_MINUTES`].
    pub fn interval(&self) -> Duration {
        let minutes = self
            .interval_minutes
            .min(AutoSyncSettings::MAX_INTERVAL_MINUTES);
        Duration::try_from_secs_f64(minutes * 60.0).unwrap_or_default()
    }
}

impl Default for AutoSyncConfig {
    fn default() -> Self {
        Self::from_settings(&AutoSyncSettings::default())
    }
}

/// Human description of a sync interval.
pub fn describe_interval(minutes: f64) -> String {
    if minutes < 1.0 {
        format!("ultra-fast ({} seconds)", (minutes * 60.0).round() as u64)
    } else if minutes == 1.0 {
        "instant sync".to_string()
    } else {
        format!("every {} minutes", minutes)
    }
}

/// How far back a pass looks for saved tracks.
pub fn recent_window(minutes: f64) -> Duration {
    if minutes < 1.0 {
        HOUR
    } else if minutes <= 5.0 {
        DAY
    } else {
        7 * DAY
    }
}

// ============================================================================
// Service
// ============================================================================

/// Periodic recent-tracks sync. Cheap to clone.
#[derive(Clone)]
pub struct AutoSyncService {
    inner: Arc<Inner>,
}

struct Inner {
    tokens: Arc<dyn AccessTokenProvider>,
    fetcher: Arc<SpotifyFetcher>,
    store: Arc<dyn LikedSongStore>,
    catalog: Option<Arc<dyn TrackCatalog>>,
    settings_store: Arc<dyn SettingsStore>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    defaults: AutoSyncSettings,
    config: Mutex<AutoSyncConfig>,
    timer: Mutex<Option<CancellationToken>>,
    in_progress: AtomicBool,
}

struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AutoSyncService {
    /// Create the service, restoring the persisted configuration.
    ///
    /// Does not start the timer even if the stored config is enabled; see
    /// [`resume`](Self::resume).
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        tokens: Arc<dyn AccessTokenProvider>,
        fetcher: Arc<SpotifyFetcher>,
        store: Arc<dyn LikedSongStore>,
        catalog: Option<Arc<dyn TrackCatalog>>,
        settings_store: Arc<dyn SettingsStore>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        defaults: AutoSyncSettings,
    ) -> Self {
        let mut config = match get_json::<AutoSyncConfig>(settings_store.as_ref(), AUTO_SYNC_CONFIG_KEY)
            .await
        {
            Ok(Some(config)) => config,
            Ok(None) => AutoSyncConfig::from_settings(&defaults),
            Err(e) => {
                warn!(error = %e, "Unreadable auto-sync config, using defaults");
                AutoSyncConfig::from_settings(&defaults)
            }
        };
        if !AutoSyncSettings::is_valid_interval(config.interval_minutes) {
            warn!(
                interval_minutes = config.interval_minutes,
                "Stored auto-sync interval out of range, using default"
            );
            config.interval_minutes = defaults.interval_minutes;
        }

        Self {
            inner: Arc::new(Inner {
                tokens,
                fetcher,
                store,
                catalog,
                settings_store,
                event_bus,
                clock,
                defaults,
                config: Mutex::new(config),
                timer: Mutex::new(None),
                in_progress: AtomicBool::new(false),
            }),
        }
    }

    /// Enable periodic passes every `interval_minutes`.
    ///
    /// Returns false when the interval is invalid or Spotify is not
    /// connected; both cases emit an error status.
    #[instrument(skip(self))]
    pub async fn start(&self, interval_minutes: f64) -> bool {
        let reporter = self.inner.reporter();

        if !AutoSyncSettings::is_valid_interval(interval_minutes) {
            let e = SyncError::InvalidInterval(interval_minutes);
            reporter.failed("Auto-sync not enabled", &e);
            return false;
        }
        if !self.inner.tokens.is_authenticated().await {
            reporter.failed("Spotify not connected", &SyncError::NotConnected);
            return false;
        }

        let config = self
            .inner
            .update_config(|c| {
                c.enabled = true;
                c.interval_minutes = interval_minutes;
                c.retry_count = 0;
            })
            .await;

        let token = CancellationToken::new();
        if let Some(previous) = self.inner.timer.lock().await.replace(token.clone()) {
            previous.cancel();
        }
        self.spawn_timer(&config, token);

        let description = describe_interval(interval_minutes);
        reporter.idle(&format!("Auto-sync enabled ({})", description));
        let _ = self
            .inner
            .event_bus
            .emit(CoreEvent::Sync(SyncEvent::AutoSyncStarted {
                interval_secs: config.interval().as_secs(),
                description: description.clone(),
            }));

        info!(interval = %description, "Auto-sync started");
        true
    }

    /// Start with the persisted interval if the stored config is enabled.
    pub async fn resume(&self) -> bool {
        let config = self.config().await;
        if !config.enabled {
            return false;
        }
        self.start(config.interval_minutes).await
    }

    /// Cancel the timer and persist `enabled = false`. A running pass is
    /// allowed to finish.
    pub async fn stop(&self) {
        self.inner.stop(None).await;
    }

    /// Cancel the timer but keep the persisted config, so a later
    /// [`resume`](Self::resume) picks up where this left off.
    pub async fn suspend(&self) {
        if let Some(token) = self.inner.timer.lock().await.take() {
            token.cancel();
            debug!("Auto-sync timer suspended");
        }
    }

    /// Run one pass now. Returns false when not connected, when a pass is
    /// already running or when the pass fails.
    pub async fn trigger_manual_sync(&self) -> bool {
        if !self.inner.tokens.is_authenticated().await {
            debug!("Manual auto-sync skipped, Spotify not connected");
            return false;
        }
        self.inner.run_pass().await.success
    }

    /// One scheduled pass, as run by the timer.
    pub async fn run_pass(&self) -> SyncOutcome {
        self.inner.run_pass().await
    }

    pub async fn config(&self) -> AutoSyncConfig {
        self.inner.config.lock().await.clone()
    }

    pub async fn is_enabled(&self) -> bool {
        self.inner.config.lock().await.enabled
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.in_progress.load(Ordering::SeqCst)
    }

    /// Time until the next pass is due, `None` when disabled.
    pub async fn time_until_next_sync(&self) -> Option<Duration> {
        let config = self.config().await;
        if !config.enabled {
            return None;
        }
        let elapsed = self
            .inner
            .clock
            .unix_timestamp_millis()
            .saturating_sub(config.last_sync_timestamp)
            .max(0) as u64;
        let interval_ms = config.interval().as_millis() as u64;
        Some(Duration::from_millis(interval_ms.saturating_sub(elapsed)))
    }

    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription::new(&self.inner.event_bus, SyncPipeline::AutoSync)
    }

    fn spawn_timer(&self, config: &AutoSyncConfig, token: CancellationToken) {
        let inner = Arc::clone(&self.inner);
        let interval = config.interval().max(Duration::from_millis(1));
        let first_delay = first_pass_delay(config, inner.clock.unix_timestamp_millis());

        tokio::spawn(async move {
            if let Some(delay) = first_delay {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {
                        inner.run_pass().await;
                    }
                }
            }

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        inner.run_pass().await;
                    }
                }
            }
            debug!("Auto-sync timer stopped");
        });
    }
}

/// Delay before the first pass after `start`, `None` to wait a full interval.
fn first_pass_delay(config: &AutoSyncConfig, now_ms: i64) -> Option<Duration> {
    if config.interval_minutes <= 1.0 {
        return Some(FAST_START_DELAY);
    }
    let elapsed = now_ms.saturating_sub(config.last_sync_timestamp);
    (elapsed > config.interval().as_millis() as i64).then_some(OVERDUE_START_DELAY)
}

impl Inner {
    fn reporter(&self) -> ProgressReporter {
        ProgressReporter::new(self.event_bus.clone(), SyncPipeline::AutoSync)
    }

    async fn update_config(&self, mutate: impl FnOnce(&mut AutoSyncConfig)) -> AutoSyncConfig {
        let mut config = self.config.lock().await;
        mutate(&mut config);
        if let Err(e) = set_json(self.settings_store.as_ref(), AUTO_SYNC_CONFIG_KEY, &*config).await
        {
            warn!(error = %e, "Failed to persist auto-sync config");
        }
        config.clone()
    }

    async fn stop(&self, reason: Option<String>) {
        if let Some(token) = self.timer.lock().await.take() {
            token.cancel();
        }
        self.update_config(|c| c.enabled = false).await;

        if reason.is_none() {
            self.reporter().idle("Auto-sync disabled");
        }
        let _ = self
            .event_bus
            .emit(CoreEvent::Sync(SyncEvent::AutoSyncStopped { reason: reason.clone() }));
        info!(reason = ?reason, "Auto-sync stopped");
    }

    fn try_begin(&self) -> Option<PassGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| PassGuard(&self.in_progress))
    }

    #[instrument(skip(self))]
    async fn run_pass(&self) -> SyncOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!("Auto-sync pass already running");
            return SyncOutcome::failed(&SyncError::SyncInProgress);
        };

        if !self.tokens.is_authenticated().await {
            warn!("Spotify not connected, stopping auto-sync");
            self.stop(Some(SyncError::NotConnected.to_string())).await;
            return SyncOutcome::failed(&SyncError::NotConnected);
        }

        let mut reporter = self.reporter();
        match self.sync_recent(&mut reporter).await {
            Ok((candidates, added)) => {
                let now = self.clock.unix_timestamp_millis();
                self.update_config(|c| {
                    c.last_sync_timestamp = now;
                    c.retry_count = 0;
                })
                .await;

                let message = if added > 0 {
                    format!("Added {} new songs automatically", added)
                } else {
                    "No new songs to sync".to_string()
                };
                reporter.completed(&message, Some((added as u64, candidates as u64)));
                if added > 0 {
                    let _ = self
                        .event_bus
                        .emit(CoreEvent::Library(LibraryEvent::LikedSongsUpdated {
                            source: LikedSongSource::Spotify.to_string(),
                            count: added as u64,
                        }));
                }

                info!(added, candidates, "Auto-sync pass completed");
                SyncOutcome::succeeded(candidates, added, 0)
            }
            Err(e) => {
                let config = self.update_config(|c| c.retry_count += 1).await;
                error!(
                    error = %e,
                    retry = config.retry_count,
                    max_retries = config.max_retries,
                    "Auto-sync pass failed"
                );

                if config.retry_count >= config.max_retries {
                    let message = format!("Auto-sync disabled after {} failures", config.max_retries);
                    reporter.failed(&message, &e);
                    self.stop(Some(message)).await;
                } else {
                    reporter.failed(
                        &format!(
                            "Auto-sync failed ({}/{}). Will retry later.",
                            config.retry_count, config.max_retries
                        ),
                        &e,
                    );
                }
                SyncOutcome::failed(&e)
            }
        }
    }

    /// Returns `(candidates, added)`.
    async fn sync_recent(&self, reporter: &mut ProgressReporter) -> Result<(usize, usize)> {
        reporter.syncing("Checking for new songs...", 0, None);

        let access_token = self.tokens.access_token().await?;
        let config = self.config.lock().await.clone();
        let now = self.clock.unix_timestamp_millis();
        let cutoff = now - recent_window(config.interval_minutes).as_millis() as i64;

        let items = self
            .fetcher
            .fetch_recent(&access_token, cutoff, Some(self.defaults.fetch_cap))
            .await?;
        let tracks = transform_all(&items, now);
        let fresh = reconcile_by_title_artist(self.store.as_ref(), tracks).await?;

        let batch: Vec<SyncedTrack> = fresh
            .into_iter()
            .take(config.max_songs_per_sync as usize)
            .collect();
        let candidates = batch.len();
        debug!(fetched = items.len(), candidates, "Recent tracks reconciled");

        if candidates == 0 {
            return Ok((0, 0));
        }

        let message = format!("Adding {} new songs...", candidates);
        reporter.syncing(&message, 10, Some((0, candidates as u64)));

        let mut added = 0usize;
        for (index, track) in batch.into_iter().enumerate() {
            let track = self.enrich(track).await;
            let song_id = track.auto_sync_id();

            match self
                .store
                .upsert(&song_id, &track, LikedSongSource::Spotify)
                .await
            {
                Ok(()) => added += 1,
                Err(e) => warn!(song_id = %song_id, error = %e, "Skipping track that failed to save"),
            }

            reporter.syncing(
                &message,
                scaled_percent(index + 1, candidates, 10, 90),
                Some((added as u64, candidates as u64)),
            );
            tokio::time::sleep(self.defaults.item_delay).await;
        }

        Ok((candidates, added))
    }

    /// Swap in full-length audio and artwork from the catalog when found.
    async fn enrich(&self, mut track: SyncedTrack) -> SyncedTrack {
        let Some(catalog) = &self.catalog else {
            return track;
        };
        if let Some(found) = catalog.find(&track.title, &track.artist).await {
            track.audio_url = found.audio_url;
            if let Some(image_url) = found.image_url {
                track.image_url = image_url;
            }
            if let Some(duration) = found.duration_secs {
                track.duration_secs = duration;
            }
        }
        track
    }
}
