//! # Liked-Songs Sync
//!
//! Keeps the local liked-songs library in step with the user's Spotify
//! saved tracks.
//!
//! ## Overview
//!
//! A trigger reaches the [`LibrarySyncCoordinator`], which obtains an access
//! token and runs the pipeline:
//!
//! ```text
//! SpotifyFetcher ──> transform ──> reconcile ──> BatchPersister
//!   (pages, 429)     (SyncedTrack)   (new/update)   (≤500 per commit)
//! ```
//!
//! and finally records the cooldown timestamp and emits a terminal status
//! on the event bus.
//!
//! ## Components
//!
//! - **Fetcher** (`fetcher`): paginated `/me/tracks` reader with rate-limit handling
//! - **Transformer** (`transformer`): Spotify items to [`SyncedTrack`](core_library::SyncedTrack)
//! - **Reconciler** (`reconciler`): classifies tracks against the store
//! - **Persister** (`persister`): atomic batched writes
//! - **Sync State** (`state`): cooldown timestamp and heartbeat lease
//! - **Coordinator** (`coordinator`): full library sync state machine
//! - **Auto-Sync** (`auto_sync`): periodic recent-tracks sync
//! - **Catalog** (`catalog`): full-length audio lookup for auto-synced tracks
//! - **Triggers** (`triggers`): lifecycle and auth event wiring

pub mod auto_sync;
pub mod catalog;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod persister;
pub mod progress;
pub mod reconciler;
pub mod state;
pub mod transformer;
pub mod triggers;
pub mod types;

pub use auto_sync::{
    describe_interval, recent_window, AutoSyncConfig, AutoSyncService, AUTO_SYNC_CONFIG_KEY,
};
pub use catalog::{CatalogMatch, HttpTrackCatalog, TrackCatalog};
pub use coordinator::LibrarySyncCoordinator;
pub use error::{Result, SyncError};
pub use fetcher::{FetchLimits, SpotifyFetcher};
pub use persister::{BatchPersister, PersistReport};
pub use progress::{ProgressSubscription, SyncInfo, SyncOutcome};
pub use reconciler::{reconcile_by_id, reconcile_by_title_artist, Reconciliation};
pub use state::{SyncLease, SyncStateStore, LAST_SYNC_KEY, LEASE_KEY};
pub use transformer::{transform, transform_all};
pub use triggers::{SyncDispatcher, SyncTrigger, SyncTriggerHub};
pub use types::{SavedTrackItem, SavedTracksPage, SpotifyTrack};
