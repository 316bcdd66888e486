//! Optimistic like/unlike
//!
//! Each write moves a song through `Pending → Confirmed | Failed`. The UI
//! renders the intent while pending and the prior value after a failure.
//! Every transition is published as [`LibraryEvent::LikeStateChanged`].
//!
//! Confirmed songs are not cached; their state is read back from the store.

use crate::error::{LibraryError, Result};
use crate::models::{LikedSongSource, SyncedTrack};
use crate::store::LikedSongStore;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, LikeStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Per-song optimistic state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeState {
    /// A write is in flight. `intent` is the liked value being written.
    Pending { intent: bool },
    /// The store agrees with `liked`.
    Confirmed { liked: bool },
    /// The last write failed. The visible flag is `!intent`.
    Failed { intent: bool, error: String },
}

impl LikeState {
    /// The liked flag the UI should render.
    pub fn visible_liked(&self) -> bool {
        match self {
            LikeState::Pending { intent } => *intent,
            LikeState::Confirmed { liked } => *liked,
            LikeState::Failed { intent, .. } => !intent,
        }
    }

    pub fn status(&self) -> LikeStatus {
        match self {
            LikeState::Pending { .. } => LikeStatus::Pending,
            LikeState::Confirmed { .. } => LikeStatus::Confirmed,
            LikeState::Failed { .. } => LikeStatus::Failed,
        }
    }
}

/// Like/unlike service over a [`LikedSongStore`].
///
/// Only unsettled songs (pending or failed) are tracked in memory. Once a
/// write is confirmed the store is the source of truth, so changes made by a
/// library sync are seen by the next read.
pub struct LikedSongsService {
    store: Arc<dyn LikedSongStore>,
    event_bus: EventBus,
    states: Mutex<HashMap<String, LikeState>>,
}

impl LikedSongsService {
    pub fn new(store: Arc<dyn LikedSongStore>, event_bus: EventBus) -> Self {
        Self {
            store,
            event_bus,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Like a song. Returns `Ok(false)` when it is already liked.
    ///
    /// # Errors
    /// - `WritePending` if another write for this song is in flight
    /// - the store error if the write fails (state becomes `Failed`)
    #[instrument(skip(self, track), fields(song_id = %track.id))]
    pub async fn like(&self, track: SyncedTrack) -> Result<bool> {
        let song_id = track.id.clone();
        let store = self.store.clone();
        self.write(&song_id, true, async move {
            store
                .upsert(&track.id, &track, LikedSongSource::Mavrixfy)
                .await
        })
        .await
    }

    /// Unlike a song. Returns `Ok(false)` when it was not liked.
    #[instrument(skip(self))]
    pub async fn unlike(&self, song_id: &str) -> Result<bool> {
        let store = self.store.clone();
        let id = song_id.to_string();
        self.write(song_id, false, async move { store.delete(&id).await.map(|_| ()) })
            .await
    }

    /// Current state of a song. Settled songs report `Confirmed` with the
    /// stored value.
    pub async fn state(&self, song_id: &str) -> Result<LikeState> {
        if let Some(state) = self.states.lock().await.get(song_id).cloned() {
            return Ok(state);
        }
        Ok(LikeState::Confirmed {
            liked: self.stored_liked(song_id).await?,
        })
    }

    /// Liked flag as the UI should render it right now.
    ///
    /// A pending write shows its intent. Everything else, including a failed
    /// write, shows what the store holds.
    pub async fn is_liked(&self, song_id: &str) -> Result<bool> {
        if let Some(LikeState::Pending { intent }) = self.states.lock().await.get(song_id) {
            return Ok(*intent);
        }
        self.stored_liked(song_id).await
    }

    /// Number of songs with a pending or failed write.
    pub async fn tracked_count(&self) -> usize {
        self.states.lock().await.len()
    }

    async fn stored_liked(&self, song_id: &str) -> Result<bool> {
        Ok(self.store.get(song_id).await?.is_some())
    }

    async fn write<F>(&self, song_id: &str, intent: bool, op: F) -> Result<bool>
    where
        F: std::future::Future<Output = Result<()>> + Send,
    {
        if self.is_pending(song_id).await {
            return Err(LibraryError::WritePending {
                song_id: song_id.to_string(),
            });
        }

        if self.stored_liked(song_id).await? == intent {
            debug!(song_id, liked = intent, "Like state unchanged");
            self.states.lock().await.remove(song_id);
            return Ok(false);
        }

        {
            let mut states = self.states.lock().await;
            if matches!(states.get(song_id), Some(LikeState::Pending { .. })) {
                return Err(LibraryError::WritePending {
                    song_id: song_id.to_string(),
                });
            }
            states.insert(song_id.to_string(), LikeState::Pending { intent });
        }
        self.publish(song_id, &LikeState::Pending { intent });

        match op.await {
            Ok(()) => {
                self.states.lock().await.remove(song_id);
                self.publish(song_id, &LikeState::Confirmed { liked: intent });
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Library(LibraryEvent::LikedSongsUpdated {
                        source: LikedSongSource::Mavrixfy.to_string(),
                        count: 1,
                    }));
                info!(song_id, liked = intent, "Like state confirmed");
                Ok(true)
            }
            Err(e) => {
                warn!(song_id, liked = intent, error = %e, "Like write failed, reverting");
                let state = LikeState::Failed {
                    intent,
                    error: e.to_string(),
                };
                self.set_state(song_id, state.clone()).await;
                self.publish(song_id, &state);
                Err(e)
            }
        }
    }

    async fn is_pending(&self, song_id: &str) -> bool {
        matches!(
            self.states.lock().await.get(song_id),
            Some(LikeState::Pending { .. })
        )
    }

    async fn set_state(&self, song_id: &str, state: LikeState) {
        self.states.lock().await.insert(song_id.to_string(), state);
    }

    fn publish(&self, song_id: &str, state: &LikeState) {
        // No subscribers is fine.
        let _ = self
            .event_bus
            .emit(CoreEvent::Library(LibraryEvent::LikeStateChanged {
                song_id: song_id.to_string(),
                state: state.status(),
                liked: state.visible_liked(),
            }));
    }
}
