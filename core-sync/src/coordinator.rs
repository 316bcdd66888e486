//! # Library Sync Coordinator
//!
//! Runs full passes of the Spotify saved-tracks collection into the
//! liked-songs store.
//!
//! ## State machine
//!
//! `idle → waiting → syncing → completed | error → idle`. Every transition
//! is broadcast as a [`SyncProgress`](core_runtime::events::SyncProgress) on
//! the event bus with [`SyncPipeline::Library`].
//!
//! ## Pass
//!
//! 1. Acquire the persisted lease and start its heartbeat
//! 2. Get an access token
//! 3. Fetch every page (0-50%)
//! 4. Transform, read the existing ids once, reconcile by id
//! 5. Persist in batches (50-100%)
//! 6. Record the cooldown timestamp, emit `completed`
//!
//! A failure emits `error` and leaves the cooldown timestamp untouched.
//!
//! ## Exclusion
//!
//! An `AtomicBool` is flipped before the first `.await` of every entry point
//! and reset by a drop guard. The persisted lease covers other invocations
//! sharing the settings store and expires when its heartbeat stops.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = LibrarySyncCoordinator::new(
//!     token_manager,
//!     fetcher,
//!     store,
//!     settings_store,
//!     event_bus,
//!     clock,
//!     LibrarySyncSettings::default(),
//! );
//!
//! let outcome = coordinator.quick_sync().await;
//! if !outcome.success {
//!     println!("sync skipped: {:?}", outcome.error);
//! }
//! ```

use crate::error::{Result, SyncError};
use crate::fetcher::SpotifyFetcher;
use crate::persister::BatchPersister;
use crate::progress::{scaled_percent, ProgressReporter, ProgressSubscription, SyncInfo, SyncOutcome};
use crate::reconciler::reconcile_by_id;
use crate::state::SyncStateStore;
use crate::transformer::transform_all;
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use core_auth::AccessTokenProvider;
use core_library::{LikedSongSource, LikedSongStore, UpsertOp};
use core_runtime::config::LibrarySyncSettings;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncPipeline};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub const MSG_PREPARING: &str = "Preparing to sync your Spotify library...";
pub const MSG_FETCHING: &str = "Fetching songs from Spotify...";
pub const MSG_SAVING: &str = "Saving songs to your library...";
pub const MSG_EMPTY: &str = "No liked songs found in your Spotify library";
pub const MSG_FAILED: &str = "Failed to sync your Spotify library";

/// Resets the in-progress flag when a pass ends, however it ends.
struct InProgressGuard<'a>(&'a AtomicBool);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Library sync coordinator
pub struct LibrarySyncCoordinator {
    tokens: Arc<dyn AccessTokenProvider>,
    fetcher: Arc<SpotifyFetcher>,
    store: Arc<dyn LikedSongStore>,
    state: SyncStateStore,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    settings: LibrarySyncSettings,
    in_progress: AtomicBool,
    /// Lease holder id, unique per coordinator instance
    holder_id: String,
}

impl LibrarySyncCoordinator {
    pub fn new(
        tokens: Arc<dyn AccessTokenProvider>,
        fetcher: Arc<SpotifyFetcher>,
        store: Arc<dyn LikedSongStore>,
        settings_store: Arc<dyn SettingsStore>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        settings: LibrarySyncSettings,
    ) -> Self {
        Self {
            tokens,
            fetcher,
            store,
            state: SyncStateStore::new(settings_store, clock.clone()),
            event_bus,
            clock,
            settings,
            in_progress: AtomicBool::new(false),
            holder_id: format!("library-{}", Uuid::new_v4()),
        }
    }

    pub fn settings(&self) -> &LibrarySyncSettings {
        &self.settings
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// First pass after sign-in: bypasses the cooldown and waits
    /// `post_auth_delay` before starting.
    #[instrument(skip(self))]
    pub async fn sync_after_auth(&self) -> SyncOutcome {
        let Some(guard) = self.try_begin() else {
            return self.reject(SyncError::SyncInProgress);
        };

        let reporter = ProgressReporter::new(self.event_bus.clone(), SyncPipeline::Library);
        reporter.waiting(MSG_PREPARING);
        tokio::time::sleep(self.settings.post_auth_delay).await;

        self.run_pass(guard, reporter).await
    }

    /// Pass subject to the cooldown. Rejections perform no network I/O.
    #[instrument(skip(self))]
    pub async fn quick_sync(&self) -> SyncOutcome {
        let Some(guard) = self.try_begin() else {
            return self.reject(SyncError::SyncInProgress);
        };

        match self.state.cooldown_remaining(self.settings.cooldown).await {
            Ok(None) => {}
            Ok(Some(remaining)) => {
                return self.reject(SyncError::CooldownActive {
                    remaining_ms: remaining.as_millis() as u64,
                });
            }
            Err(e) => {
                warn!(error = %e, "Could not read sync cooldown");
                return SyncOutcome::failed(&e);
            }
        }

        let reporter = ProgressReporter::new(self.event_bus.clone(), SyncPipeline::Library);
        self.run_pass(guard, reporter).await
    }

    /// Clear the cooldown and any abandoned lease, then run a pass.
    ///
    /// A pass already running in this process still wins.
    #[instrument(skip(self))]
    pub async fn force_sync(&self) -> SyncOutcome {
        let Some(guard) = self.try_begin() else {
            return self.reject(SyncError::SyncInProgress);
        };

        if let Err(e) = self.state.clear_last_sync().await {
            warn!(error = %e, "Could not clear sync cooldown");
        }
        match self.state.break_stale_lease(self.settings.lease_ttl).await {
            Ok(true) => info!("Recovered from an abandoned sync"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Could not inspect sync lease"),
        }

        let reporter = ProgressReporter::new(self.event_bus.clone(), SyncPipeline::Library);
        self.run_pass(guard, reporter).await
    }

    pub async fn sync_info(&self) -> SyncInfo {
        let in_progress = self.is_syncing();
        let last_sync = self.state.last_sync().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read last sync timestamp");
            None
        });

        let cooling_down = last_sync.is_some_and(|last| {
            let elapsed = self.clock.unix_timestamp_millis().saturating_sub(last);
            elapsed < self.settings.cooldown.as_millis() as i64
        });

        SyncInfo {
            last_sync,
            can_sync: !in_progress && !cooling_down,
            in_progress,
        }
    }

    /// Forget the cooldown timestamp and the lease.
    pub async fn clear_sync_data(&self) -> Result<()> {
        self.state.clear_last_sync().await?;
        self.state.clear_lease().await?;

        ProgressReporter::new(self.event_bus.clone(), SyncPipeline::Library)
            .idle("Sync data cleared");
        info!("Library sync data cleared");
        Ok(())
    }

    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription::new(&self.event_bus, SyncPipeline::Library)
    }

    fn try_begin(&self) -> Option<InProgressGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InProgressGuard(&self.in_progress))
    }

    fn reject(&self, error: SyncError) -> SyncOutcome {
        debug!(reason = %error, "Library sync rejected");
        SyncOutcome::failed(&error)
    }

    async fn run_pass(&self, _guard: InProgressGuard<'_>, mut reporter: ProgressReporter) -> SyncOutcome {
        reporter.reset();

        match self.leased_pass(&mut reporter).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_rejection() => self.reject(e),
            Err(e) => {
                error!(error = %e, "Library sync failed");
                reporter.failed(MSG_FAILED, &e);
                SyncOutcome::failed(&e)
            }
        }
    }

    async fn leased_pass(&self, reporter: &mut ProgressReporter) -> Result<SyncOutcome> {
        if !self
            .state
            .try_acquire_lease(&self.holder_id, self.settings.lease_ttl)
            .await?
        {
            return Err(SyncError::SyncInProgress);
        }

        let heartbeat = Heartbeat::spawn(
            self.state.clone(),
            self.holder_id.clone(),
            self.settings.heartbeat_interval,
        );
        let result = self.sync_library(reporter).await;
        // an in-flight refresh must not rewrite the lease after release
        heartbeat.stop().await;

        if let Err(e) = self.state.release_lease(&self.holder_id).await {
            warn!(error = %e, "Failed to release sync lease");
        }
        result
    }

    async fn sync_library(&self, reporter: &mut ProgressReporter) -> Result<SyncOutcome> {
        reporter.syncing(MSG_FETCHING, 0, None);

        let access_token = self.tokens.access_token().await?;
        let items = self
            .fetcher
            .fetch_all(&access_token, |fetched, total| {
                let total = total.map_or(fetched, |t| t as usize).max(fetched);
                reporter.syncing(
                    MSG_FETCHING,
                    scaled_percent(fetched, total, 0, 50),
                    Some((fetched as u64, total as u64)),
                );
            })
            .await?;

        let tracks = transform_all(&items, self.clock.unix_timestamp_millis());
        let existing = self.store.list_ids().await?;
        let reconciliation = reconcile_by_id(&existing, &tracks);
        let tracks_count = reconciliation.len();

        debug!(
            fetched = items.len(),
            new = reconciliation.new.len(),
            update = reconciliation.update.len(),
            "Reconciled saved tracks"
        );

        if tracks_count == 0 {
            self.state.record_success().await?;
            reporter.completed(MSG_EMPTY, Some((0, 0)));
            info!("Spotify library is empty");
            return Ok(SyncOutcome::succeeded(0, 0, 0));
        }

        let ops: Vec<UpsertOp> = reconciliation
            .new
            .into_iter()
            .map(|t| UpsertOp::insert(t, LikedSongSource::Spotify))
            .chain(
                reconciliation
                    .update
                    .into_iter()
                    .map(|t| UpsertOp::update(t, LikedSongSource::Spotify)),
            )
            .collect();

        let total = ops.len() as u64;
        reporter.syncing(MSG_SAVING, 50, Some((0, total)));

        let persister = BatchPersister::new(self.store.clone(), self.settings.batch_size);
        let report = persister
            .persist(ops, |committed, total| {
                reporter.syncing(
                    MSG_SAVING,
                    scaled_percent(committed, total, 50, 50),
                    Some((committed as u64, total as u64)),
                );
            })
            .await?;

        self.state.record_success().await?;

        let message = format!(
            "Synced {} songs ({} new, {} updated)",
            report.total(),
            report.inserted,
            report.updated
        );
        reporter.completed(&message, Some((total, total)));
        let _ = self
            .event_bus
            .emit(CoreEvent::Library(LibraryEvent::LikedSongsUpdated {
                source: LikedSongSource::Spotify.to_string(),
                count: report.total() as u64,
            }));

        info!(
            added = report.inserted,
            updated = report.updated,
            batches = report.batches,
            "Library sync completed"
        );
        Ok(SyncOutcome::succeeded(tracks_count, report.inserted, report.updated))
    }
}

/// Lease refresh task for a running pass. Dropping it cancels the task;
/// [`stop`](Self::stop) also waits for a refresh already in flight.
struct Heartbeat {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Heartbeat {
    fn spawn(state: SyncStateStore, holder: String, every: Duration) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(every) => match state.heartbeat(&holder).await {
                        Ok(true) => {}
                        Ok(false) => {
                            warn!("Sync lease was taken over");
                            break;
                        }
                        Err(e) => warn!(error = %e, "Sync lease heartbeat failed"),
                    },
                }
            }
        });

        Self { token, task }
    }

    async fn stop(mut self) {
        self.token.cancel();
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "Sync lease heartbeat task ended abnormally");
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::MemorySettings;
    use crate::state::LEASE_KEY;
    use bridge_traits::time::ManualClock;

    #[tokio::test(start_paused = true)]
    async fn test_stopped_heartbeat_cannot_resurrect_released_lease() {
        let settings = MemorySettings::default();
        let clock = Arc::new(ManualClock::at_millis(1_000_000));
        let state = SyncStateStore::new(Arc::new(settings.clone()), clock);
        let ttl = Duration::from_secs(300);
        assert!(state.try_acquire_lease("me", ttl).await.unwrap());

        settings.gate(LEASE_KEY);
        let heartbeat = Heartbeat::spawn(state.clone(), "me".to_string(), Duration::from_secs(1));
        // the refresh has read the lease and is about to write it back
        settings.entered.notified().await;

        let finish = {
            let state = state.clone();
            tokio::spawn(async move {
                heartbeat.stop().await;
                state.release_lease("me").await.unwrap();
            })
        };
        tokio::task::yield_now().await;
        assert!(state.lease().await.unwrap().is_some());

        settings.release.notify_one();
        finish.await.unwrap();

        assert!(state.lease().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_refreshes_until_stopped() {
        let settings = MemorySettings::default();
        let clock = Arc::new(ManualClock::at_millis(1_000_000));
        let state = SyncStateStore::new(Arc::new(settings.clone()), clock.clone());
        assert!(state
            .try_acquire_lease("me", Duration::from_secs(300))
            .await
            .unwrap());

        let heartbeat = Heartbeat::spawn(state.clone(), "me".to_string(), Duration::from_secs(1));
        clock.advance(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let lease = state.lease().await.unwrap().unwrap();
        assert_eq!(lease.heartbeat_at, 1_010_000);
        assert_eq!(lease.acquired_at, 1_000_000);

        heartbeat.stop().await;
        clock.advance(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(state.lease().await.unwrap().unwrap().heartbeat_at, 1_010_000);
    }
}
