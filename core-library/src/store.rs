//! Liked-songs document store
//!
//! [`LikedSongStore`] is the seam between the sync pipeline and persistence.
//! Two implementations are provided:
//!
//! - [`SqliteLikedSongStore`]: the `liked_songs` table, scoped to one user
//! - [`InMemoryLikedSongStore`]: a map-backed store with failure injection
//!
//! Every write stamps `synced_at` from the injected clock. Batches are
//! committed atomically and may not exceed [`LikedSongStore::max_batch_size`].

use crate::error::{LibraryError, Result};
use crate::models::{
    title_artist_key, LikedSongRow, LikedSongSource, PersistedLikedSong, SyncedTrack, UpsertOp,
};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_runtime::config::MAX_BATCH_SIZE;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Persistence interface for liked-song documents.
#[async_trait]
pub trait LikedSongStore: Send + Sync {
    /// Largest batch [`commit_batch`](Self::commit_batch) accepts.
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    /// All document ids in the collection.
    async fn list_ids(&self) -> Result<HashSet<String>>;

    /// Whether a document with this title and artist exists.
    ///
    /// Comparison is trimmed and case-insensitive.
    async fn exists_by_title_artist(&self, title: &str, artist: &str) -> Result<bool>;

    /// Apply all writes atomically. Returns the number of documents written.
    ///
    /// # Errors
    /// - `BatchTooLarge` when `ops.len()` exceeds the store limit
    /// - any store error, in which case nothing from this batch is visible
    async fn commit_batch(&self, ops: &[UpsertOp]) -> Result<usize>;

    /// Insert or overwrite a single document.
    async fn upsert(&self, song_id: &str, track: &SyncedTrack, source: LikedSongSource)
        -> Result<()>;

    async fn get(&self, song_id: &str) -> Result<Option<PersistedLikedSong>>;

    /// All documents, most recently added first.
    async fn list(&self) -> Result<Vec<PersistedLikedSong>>;

    async fn count(&self) -> Result<u64>;

    /// Delete a document.
    ///
    /// # Returns
    /// - `Ok(true)` if a document was deleted
    /// - `Ok(false)` if none existed
    async fn delete(&self, song_id: &str) -> Result<bool>;
}

fn check_batch(ops: &[UpsertOp], max: usize) -> Result<()> {
    if ops.len() > max {
        return Err(LibraryError::BatchTooLarge {
            size: ops.len(),
            max,
        });
    }
    for op in ops {
        op.track.validate().map_err(|msg| LibraryError::InvalidInput {
            field: format!("track {}", op.song_id),
            message: msg,
        })?;
    }
    Ok(())
}

// =============================================================================
// SQLite
// =============================================================================

const UPSERT_SQL: &str = r#"
    INSERT INTO liked_songs (
        user_id, song_id, title, artist, album, image_url, audio_url,
        duration_secs, added_at, spotify_url, popularity, preview_url,
        source, synced_at, title_key, artist_key
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (user_id, song_id) DO UPDATE SET
        title = excluded.title,
        artist = excluded.artist,
        album = excluded.album,
        image_url = excluded.image_url,
        audio_url = excluded.audio_url,
        duration_secs = excluded.duration_secs,
        added_at = excluded.added_at,
        spotify_url = excluded.spotify_url,
        popularity = excluded.popularity,
        preview_url = excluded.preview_url,
        source = excluded.source,
        synced_at = excluded.synced_at,
        title_key = excluded.title_key,
        artist_key = excluded.artist_key
"#;

const SELECT_COLUMNS: &str = "song_id, title, artist, album, image_url, audio_url, \
     duration_secs, added_at, spotify_url, popularity, preview_url, source, synced_at";

/// SQLite implementation of [`LikedSongStore`], scoped to one user.
pub struct SqliteLikedSongStore {
    pool: SqlitePool,
    user_id: String,
    clock: Arc<dyn Clock>,
}

impl SqliteLikedSongStore {
    pub fn new(pool: SqlitePool, user_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            user_id: user_id.into(),
            clock,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn upsert_query<'q>(
        &'q self,
        song_id: &'q str,
        track: &'q SyncedTrack,
        source: LikedSongSource,
        synced_at: i64,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        // SQLite's lower()/trim() only handle ASCII, so the keys are computed here
        let (title_key, artist_key) = track.title_artist_key();
        sqlx::query(UPSERT_SQL)
            .bind(&self.user_id)
            .bind(song_id)
            .bind(&track.title)
            .bind(&track.artist)
            .bind(&track.album)
            .bind(&track.image_url)
            .bind(&track.audio_url)
            .bind(i64::from(track.duration_secs))
            .bind(track.added_at)
            .bind(&track.spotify_url)
            .bind(track.popularity.map(i64::from))
            .bind(&track.preview_url)
            .bind(source.as_str())
            .bind(synced_at)
            .bind(title_key)
            .bind(artist_key)
    }
}

#[async_trait]
impl LikedSongStore for SqliteLikedSongStore {
    async fn list_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<(String,)> =
            sqlx::query_as("SELECT song_id FROM liked_songs WHERE user_id = ?")
                .bind(&self.user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn exists_by_title_artist(&self, title: &str, artist: &str) -> Result<bool> {
        let (title, artist) = title_artist_key(title, artist);
        let found: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM liked_songs
            WHERE user_id = ? AND title_key = ? AND artist_key = ?
            LIMIT 1
            "#,
        )
        .bind(&self.user_id)
        .bind(title)
        .bind(artist)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    #[instrument(skip(self, ops), fields(user_id = %self.user_id, ops = ops.len()))]
    async fn commit_batch(&self, ops: &[UpsertOp]) -> Result<usize> {
        check_batch(ops, self.max_batch_size())?;
        if ops.is_empty() {
            return Ok(0);
        }

        let synced_at = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;
        for op in ops {
            self.upsert_query(&op.song_id, &op.track, op.source, synced_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(committed = ops.len(), "Batch committed");
        Ok(ops.len())
    }

    async fn upsert(
        &self,
        song_id: &str,
        track: &SyncedTrack,
        source: LikedSongSource,
    ) -> Result<()> {
        track.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "track".to_string(),
            message: msg,
        })?;

        let synced_at = self.clock.unix_timestamp_millis();
        self.upsert_query(song_id, track, source, synced_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, song_id: &str) -> Result<Option<PersistedLikedSong>> {
        let sql = format!(
            "SELECT {} FROM liked_songs WHERE user_id = ? AND song_id = ?",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, LikedSongRow>(&sql)
            .bind(&self.user_id)
            .bind(song_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PersistedLikedSong::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<PersistedLikedSong>> {
        let sql = format!(
            "SELECT {} FROM liked_songs WHERE user_id = ? ORDER BY added_at DESC, song_id",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, LikedSongRow>(&sql)
            .bind(&self.user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PersistedLikedSong::try_from).collect()
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM liked_songs WHERE user_id = ?")
                .bind(&self.user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn delete(&self, song_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM liked_songs WHERE user_id = ? AND song_id = ?")
            .bind(&self.user_id)
            .bind(song_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Default)]
struct InMemoryState {
    songs: BTreeMap<String, PersistedLikedSong>,
    commit_calls: usize,
    fail_on_commit: Option<usize>,
    failing_songs: HashSet<String>,
}

/// Map-backed [`LikedSongStore`].
///
/// Used by tests and by hosts without a database. Failures can be injected
/// per batch call or per song id.
pub struct InMemoryLikedSongStore {
    state: Mutex<InMemoryState>,
    clock: Arc<dyn Clock>,
    max_batch_size: usize,
}

impl InMemoryLikedSongStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
            clock,
            max_batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Lower the batch limit.
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max.max(1);
        self
    }

    /// Fail the `n`th call (1-based) to `commit_batch`.
    pub async fn fail_on_commit(&self, n: usize) {
        self.state.lock().await.fail_on_commit = Some(n);
    }

    /// Fail every write touching this document id.
    pub async fn fail_song(&self, song_id: impl Into<String>) {
        self.state.lock().await.failing_songs.insert(song_id.into());
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.fail_on_commit = None;
        state.failing_songs.clear();
    }

    /// Number of `commit_batch` calls seen so far.
    pub async fn commit_calls(&self) -> usize {
        self.state.lock().await.commit_calls
    }

    fn document(
        &self,
        song_id: &str,
        track: &SyncedTrack,
        source: LikedSongSource,
        synced_at: i64,
    ) -> PersistedLikedSong {
        PersistedLikedSong {
            song_id: song_id.to_string(),
            track: track.clone(),
            source,
            synced_at,
        }
    }
}

#[async_trait]
impl LikedSongStore for InMemoryLikedSongStore {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn list_ids(&self) -> Result<HashSet<String>> {
        Ok(self.state.lock().await.songs.keys().cloned().collect())
    }

    async fn exists_by_title_artist(&self, title: &str, artist: &str) -> Result<bool> {
        let key = title_artist_key(title, artist);
        let state = self.state.lock().await;
        Ok(state
            .songs
            .values()
            .any(|song| song.track.title_artist_key() == key))
    }

    async fn commit_batch(&self, ops: &[UpsertOp]) -> Result<usize> {
        check_batch(ops, self.max_batch_size)?;

        let mut state = self.state.lock().await;
        state.commit_calls += 1;

        if state.fail_on_commit == Some(state.commit_calls) {
            warn!(call = state.commit_calls, "Injected batch failure");
            return Err(LibraryError::Unavailable(format!(
                "injected failure on commit {}",
                state.commit_calls
            )));
        }
        if let Some(op) = ops.iter().find(|op| state.failing_songs.contains(&op.song_id)) {
            return Err(LibraryError::Unavailable(format!(
                "injected failure for {}",
                op.song_id
            )));
        }

        let synced_at = self.clock.unix_timestamp_millis();
        for op in ops {
            let doc = self.document(&op.song_id, &op.track, op.source, synced_at);
            state.songs.insert(op.song_id.clone(), doc);
        }
        Ok(ops.len())
    }

    async fn upsert(
        &self,
        song_id: &str,
        track: &SyncedTrack,
        source: LikedSongSource,
    ) -> Result<()> {
        track.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "track".to_string(),
            message: msg,
        })?;

        let mut state = self.state.lock().await;
        if state.failing_songs.contains(song_id) {
            return Err(LibraryError::Unavailable(format!(
                "injected failure for {}",
                song_id
            )));
        }
        let doc = self.document(song_id, track, source, self.clock.unix_timestamp_millis());
        state.songs.insert(song_id.to_string(), doc);
        Ok(())
    }

    async fn get(&self, song_id: &str) -> Result<Option<PersistedLikedSong>> {
        Ok(self.state.lock().await.songs.get(song_id).cloned())
    }

    async fn list(&self) -> Result<Vec<PersistedLikedSong>> {
        let mut songs: Vec<_> = self.state.lock().await.songs.values().cloned().collect();
        songs.sort_by(|a, b| {
            b.track
                .added_at
                .cmp(&a.track.added_at)
                .then_with(|| a.song_id.cmp(&b.song_id))
        });
        Ok(songs)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.state.lock().await.songs.len() as u64)
    }

    async fn delete(&self, song_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.failing_songs.contains(song_id) {
            return Err(LibraryError::Unavailable(format!(
                "injected failure for {}",
                song_id
            )));
        }
        Ok(state.songs.remove(song_id).is_some())
    }
}
