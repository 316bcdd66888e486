//! Domain models for the liked-songs collection
//!
//! `SyncedTrack` is the normalized shape produced from a Spotify saved-track
//! item. `PersistedLikedSong` is what the store hands back: the same track
//! plus the store-assigned `synced_at` and a source tag.

use crate::error::{LibraryError, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Prefix applied to document ids written by the auto-sync pipeline.
pub const AUTO_SYNC_ID_PREFIX: &str = "spotify-auto-";

// =============================================================================
// Source
// =============================================================================

/// Which pipeline wrote a liked-song document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikedSongSource {
    /// Imported from the Spotify saved-tracks collection.
    Spotify,
    /// Liked directly inside the app.
    Mavrixfy,
}

impl LikedSongSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikedSongSource::Spotify => "spotify",
            LikedSongSource::Mavrixfy => "mavrixfy",
        }
    }
}

impl fmt::Display for LikedSongSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LikedSongSource {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spotify" => Ok(LikedSongSource::Spotify),
            "mavrixfy" => Ok(LikedSongSource::Mavrixfy),
            other => Err(LibraryError::InvalidInput {
                field: "source".to_string(),
                message: format!("unknown liked-song source '{}'", other),
            }),
        }
    }
}

// =============================================================================
// SyncedTrack
// =============================================================================

/// A normalized track ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedTrack {
    /// Spotify track id
    pub id: String,
    pub title: String,
    /// Artist names joined with ", "
    pub artist: String,
    pub album: String,
    pub image_url: String,
    /// Playable audio URL. May be empty or a 30 second preview.
    pub audio_url: String,
    pub duration_secs: u32,
    /// When the user saved the track on Spotify (epoch ms)
    pub added_at: i64,
    pub spotify_url: String,
    pub popularity: Option<u32>,
    pub preview_url: Option<String>,
}

impl SyncedTrack {
    /// Validate the fields the store depends on.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Track id cannot be empty".to_string());
        }
        if self.title.trim().is_empty() {
            return Err("Track title cannot be empty".to_string());
        }
        if self.artist.trim().is_empty() {
            return Err("Track artist cannot be empty".to_string());
        }
        if self.added_at < 0 {
            return Err("added_at cannot be negative".to_string());
        }
        Ok(())
    }

    /// Document id used by the auto-sync pipeline.
    pub fn auto_sync_id(&self) -> String {
        format!("{}{}", AUTO_SYNC_ID_PREFIX, self.id)
    }

    /// Key used for title+artist deduplication.
    pub fn title_artist_key(&self) -> (String, String) {
        title_artist_key(&self.title, &self.artist)
    }
}

/// Normalize a title/artist pair: trimmed and lowercased.
pub fn title_artist_key(title: &str, artist: &str) -> (String, String) {
    (title.trim().to_lowercase(), artist.trim().to_lowercase())
}

// =============================================================================
// PersistedLikedSong
// =============================================================================

/// A liked-song document as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLikedSong {
    /// Document id: the Spotify id, or `spotify-auto-<id>` for auto-sync writes
    pub song_id: String,
    pub track: SyncedTrack,
    pub source: LikedSongSource,
    /// Assigned by the store on every write (epoch ms)
    pub synced_at: i64,
}

impl PersistedLikedSong {
    /// Compare two documents ignoring the store-assigned timestamp.
    pub fn same_content(&self, other: &PersistedLikedSong) -> bool {
        self.song_id == other.song_id && self.track == other.track && self.source == other.source
    }
}

/// Flat row shape of the `liked_songs` table.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct LikedSongRow {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub image_url: String,
    pub audio_url: String,
    pub duration_secs: i64,
    pub added_at: i64,
    pub spotify_url: String,
    pub popularity: Option<i64>,
    pub preview_url: Option<String>,
    pub source: String,
    pub synced_at: i64,
}

impl TryFrom<LikedSongRow> for PersistedLikedSong {
    type Error = LibraryError;

    fn try_from(row: LikedSongRow) -> Result<Self> {
        let source = row.source.parse()?;
        let track_id = row
            .song_id
            .strip_prefix(AUTO_SYNC_ID_PREFIX)
            .unwrap_or(&row.song_id)
            .to_string();

        Ok(Self {
            track: SyncedTrack {
                id: track_id,
                title: row.title,
                artist: row.artist,
                album: row.album,
                image_url: row.image_url,
                audio_url: row.audio_url,
                duration_secs: u32::try_from(row.duration_secs).unwrap_or(0),
                added_at: row.added_at,
                spotify_url: row.spotify_url,
                popularity: row.popularity.and_then(|p| u32::try_from(p).ok()),
                preview_url: row.preview_url,
            },
            song_id: row.song_id,
            source,
            synced_at: row.synced_at,
        })
    }
}

// =============================================================================
// Write operations
// =============================================================================

/// Whether a write creates a new document or refreshes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Insert,
    Update,
}

/// One document write inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOp {
    pub kind: UpsertKind,
    pub song_id: String,
    pub track: SyncedTrack,
    pub source: LikedSongSource,
}

impl UpsertOp {
    pub fn insert(track: SyncedTrack, source: LikedSongSource) -> Self {
        Self {
            kind: UpsertKind::Insert,
            song_id: track.id.clone(),
            track,
            source,
        }
    }

    pub fn update(track: SyncedTrack, source: LikedSongSource) -> Self {
        Self {
            kind: UpsertKind::Update,
            song_id: track.id.clone(),
            track,
            source,
        }
    }

    /// Override the document id (auto-sync uses a prefixed id).
    pub fn with_song_id(mut self, song_id: impl Into<String>) -> Self {
        self.song_id = song_id.into();
        self
    }
}

#[cfg(test)]
pub(crate) fn sample_track(id: &str, title: &str, artist: &str) -> SyncedTrack {
    SyncedTrack {
        id: id.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
        album: "Album".to_string(),
        image_url: "https://i.scdn.co/image/300".to_string(),
        audio_url: String::new(),
        duration_secs: 200,
        added_at: 1_700_000_000_000,
        spotify_url: format!("https://open.spotify.com/track/{}", id),
        popularity: Some(50),
        preview_url: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_round_trips_through_str() {
        assert_eq!("spotify".parse::<LikedSongSource>().unwrap(), LikedSongSource::Spotify);
        assert_eq!(LikedSongSource::Mavrixfy.to_string(), "mavrixfy");
        assert!("youtube".parse::<LikedSongSource>().is_err());
    }

    #[test]
    fn test_track_validation() {
        let mut track = sample_track("abc", "Song", "Artist");
        assert!(track.validate().is_ok());

        track.title = "   ".to_string();
        assert!(track.validate().is_err());

        track.title = "Song".to_string();
        track.id = String::new();
        assert!(track.validate().is_err());
    }

    #[test]
    fn test_title_artist_key_normalizes() {
        assert_eq!(
            title_artist_key("  Blinding Lights ", "The WEEKND"),
            ("blinding lights".to_string(), "the weeknd".to_string())
        );
    }

    #[test]
    fn test_auto_sync_id_prefix() {
        let track = sample_track("4uLU6hMCjMI75M1A2tKUQC", "Song", "Artist");
        assert_eq!(track.auto_sync_id(), "spotify-auto-4uLU6hMCjMI75M1A2tKUQC");

        let op = UpsertOp::insert(track.clone(), LikedSongSource::Spotify)
            .with_song_id(track.auto_sync_id());
        assert_eq!(op.kind, UpsertKind::Insert);
        assert_eq!(op.song_id, "spotify-auto-4uLU6hMCjMI75M1A2tKUQC");
    }

    #[test]
    fn test_row_conversion_strips_auto_prefix() {
        let row = LikedSongRow {
            song_id: "spotify-auto-xyz".to_string(),
            title: "T".to_string(),
            artist: "A".to_string(),
            album: String::new(),
            image_url: String::new(),
            audio_url: String::new(),
            duration_secs: 180,
            added_at: 10,
            spotify_url: String::new(),
            popularity: None,
            preview_url: None,
            source: "spotify".to_string(),
            synced_at: 20,
        };

        let song = PersistedLikedSong::try_from(row).unwrap();
        assert_eq!(song.song_id, "spotify-auto-xyz");
        assert_eq!(song.track.id, "xyz");
        assert_eq!(song.track.duration_secs, 180);
    }
}
