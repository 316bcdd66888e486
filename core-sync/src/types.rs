//! Spotify Web API response types
//!
//! Only the fields the sync pipeline reads are modelled. Everything is
//! defaulted so partially populated items (local files, removed tracks)
//! still deserialize and are dropped later by the transformer.

use serde::{Deserialize, Serialize};

/// `GET /me/tracks` response page.
///
/// See: https://developer.spotify.com/documentation/web-api/reference/get-users-saved-tracks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedTracksPage {
    #[serde(default)]
    pub items: Vec<SavedTrackItem>,

    /// URL of the next page, absent on the last one
    #[serde(default)]
    pub next: Option<String>,

    /// Total number of saved tracks
    #[serde(default)]
    pub total: Option<u64>,

    #[serde(default)]
    pub offset: Option<u64>,

    #[serde(default)]
    pub limit: Option<u64>,
}

/// A saved-track entry: when it was saved and the track itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedTrackItem {
    /// RFC 3339 timestamp
    #[serde(default)]
    pub added_at: Option<String>,

    #[serde(default)]
    pub track: Option<SpotifyTrack>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotifyTrack {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,

    #[serde(default)]
    pub album: Option<SpotifyAlbum>,

    #[serde(default)]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub preview_url: Option<String>,

    #[serde(default)]
    pub external_urls: Option<ExternalUrls>,

    #[serde(default)]
    pub popularity: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotifyArtist {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotifyAlbum {
    #[serde(default)]
    pub name: Option<String>,

    /// Widest first: 640, 300, 64
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotifyImage {
    pub url: String,

    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}
