//! Saved-track item → [`SyncedTrack`] mapping.
//!
//! Pure functions. Items without a track or without an id are dropped; every
//! other missing field falls back to a placeholder. Whitespace-only strings
//! count as missing, so every mapped track passes [`SyncedTrack::validate`].

use crate::fetcher::parse_added_at;
use crate::types::SavedTrackItem;
use core_library::SyncedTrack;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Map one saved-track item. `fallback_added_at` (epoch ms) is used when the
/// item's own timestamp is missing or unparseable.
pub fn transform(item: &SavedTrackItem, fallback_added_at: i64) -> Option<SyncedTrack> {
    let track = item.track.as_ref()?;
    let id = track.id.as_deref().filter(|id| !id.trim().is_empty())?;

    let title = track
        .name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(UNKNOWN_TITLE)
        .to_string();

    let artist_names: Vec<&str> = track
        .artists
        .iter()
        .filter_map(|a| a.name.as_deref())
        .filter(|name| !name.trim().is_empty())
        .collect();
    let artist = if artist_names.is_empty() {
        UNKNOWN_ARTIST.to_string()
    } else {
        artist_names.join(", ")
    };

    let album = track.album.as_ref();
    // Prefer the 300px rendition.
    let image_url = album
        .and_then(|a| a.images.get(1).or_else(|| a.images.first()))
        .map(|img| img.url.clone())
        .unwrap_or_default();

    let added_at = item
        .added_at
        .as_deref()
        .and_then(parse_added_at)
        .filter(|ms| *ms >= 0)
        .unwrap_or(fallback_added_at);

    Some(SyncedTrack {
        id: id.to_string(),
        title,
        artist,
        album: album.and_then(|a| a.name.clone()).unwrap_or_default(),
        image_url,
        audio_url: track.preview_url.clone().unwrap_or_default(),
        duration_secs: u32::try_from(track.duration_ms.unwrap_or(0) / 1000).unwrap_or(u32::MAX),
        added_at,
        spotify_url: track
            .external_urls
            .as_ref()
            .and_then(|urls| urls.spotify.clone())
            .unwrap_or_default(),
        popularity: track.popularity,
        preview_url: track.preview_url.clone(),
    })
}

/// Map a batch, dropping untransformable items and keeping order.
pub fn transform_all(items: &[SavedTrackItem], fallback_added_at: i64) -> Vec<SyncedTrack> {
    items
        .iter()
        .filter_map(|item| transform(item, fallback_added_at))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExternalUrls, SpotifyAlbum, SpotifyArtist, SpotifyImage, SpotifyTrack};

    fn image(url: &str) -> SpotifyImage {
        SpotifyImage {
            url: url.to_string(),
            width: None,
            height: None,
        }
    }

    fn full_item() -> SavedTrackItem {
        SavedTrackItem {
            added_at: Some("2024-03-01T10:00:00Z".to_string()),
            track: Some(SpotifyTrack {
                id: Some("abc".to_string()),
                name: Some("Levitating".to_string()),
                artists: vec![
                    SpotifyArtist {
                        name: Some("Dua Lipa".to_string()),
                    },
                    SpotifyArtist {
                        name: Some("DaBaby".to_string()),
                    },
                ],
                album: Some(SpotifyAlbum {
                    name: Some("Future Nostalgia".to_string()),
                    images: vec![image("640"), image("300"), image("64")],
                }),
                duration_ms: Some(203_999),
                preview_url: Some("https://p.scdn.co/mp3-preview/abc".to_string()),
                external_urls: Some(ExternalUrls {
                    spotify: Some("https://open.spotify.com/track/abc".to_string()),
                }),
                popularity: Some(81),
            }),
        }
    }

    #[test]
    fn test_full_item() {
        let track = transform(&full_item(), 0).unwrap();

        assert_eq!(track.id, "abc");
        assert_eq!(track.title, "Levitating");
        assert_eq!(track.artist, "Dua Lipa, DaBaby");
        assert_eq!(track.album, "Future Nostalgia");
        assert_eq!(track.image_url, "300");
        assert_eq!(track.audio_url, "https://p.scdn.co/mp3-preview/abc");
        assert_eq!(track.duration_secs, 203);
        assert_eq!(track.added_at, 1_709_287_200_000);
        assert_eq!(track.spotify_url, "https://open.spotify.com/track/abc");
        assert_eq!(track.popularity, Some(81));
        assert_eq!(track.preview_url.as_deref(), Some("https://p.scdn.co/mp3-preview/abc"));
    }

    #[test]
    fn test_missing_track_or_id_is_dropped() {
        let mut item = full_item();
        item.track.as_mut().unwrap().id = Some(String::new());
        assert!(transform(&item, 0).is_none());

        item.track.as_mut().unwrap().id = None;
        assert!(transform(&item, 0).is_none());

        item.track = None;
        assert!(transform(&item, 0).is_none());
    }

    #[test]
    fn test_placeholders_and_fallbacks() {
        let item = SavedTrackItem {
            added_at: Some("yesterday".to_string()),
            track: Some(SpotifyTrack {
                id: Some("bare".to_string()),
                ..Default::default()
            }),
        };

        let track = transform(&item, 42).unwrap();

        assert_eq!(track.title, UNKNOWN_TITLE);
        assert_eq!(track.artist, UNKNOWN_ARTIST);
        assert_eq!(track.album, "");
        assert_eq!(track.image_url, "");
        assert_eq!(track.audio_url, "");
        assert_eq!(track.duration_secs, 0);
        assert_eq!(track.added_at, 42);
        assert!(track.preview_url.is_none());
    }

    #[test]
    fn test_blank_names_fall_back_to_placeholders() {
        let mut item = full_item();
        {
            let track = item.track.as_mut().unwrap();
            track.name = Some("   ".to_string());
            track.artists = vec![
                SpotifyArtist {
                    name: Some("Good".to_string()),
                },
                SpotifyArtist {
                    name: Some("\t ".to_string()),
                },
            ];
        }

        let track = transform(&item, 0).unwrap();
        assert_eq!(track.title, UNKNOWN_TITLE);
        assert_eq!(track.artist, "Good");
        assert!(track.validate().is_ok());

        item.track.as_mut().unwrap().artists = vec![SpotifyArtist {
            name: Some("  ".to_string()),
        }];
        let track = transform(&item, 0).unwrap();
        assert_eq!(track.artist, UNKNOWN_ARTIST);
        assert!(track.validate().is_ok());

        item.track.as_mut().unwrap().id = Some(" ".to_string());
        assert!(transform(&item, 0).is_none());
    }

    #[test]
    fn test_pre_epoch_added_at_uses_fallback() {
        let mut item = full_item();
        item.added_at = Some("1960-01-01T00:00:00Z".to_string());

        let track = transform(&item, 7).unwrap();
        assert_eq!(track.added_at, 7);
        assert!(track.validate().is_ok());
    }

    #[test]
    fn test_single_image_is_used() {
        let mut item = full_item();
        item.track.as_mut().unwrap().album.as_mut().unwrap().images = vec![image("only")];
        assert_eq!(transform(&item, 0).unwrap().image_url, "only");
    }

    #[test]
    fn test_transform_all_keeps_order() {
        let mut second = full_item();
        second.track.as_mut().unwrap().id = Some("def".to_string());
        let items = vec![full_item(), SavedTrackItem::default(), second];

        let ids: Vec<_> = transform_all(&items, 0).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["abc", "def"]);
    }
}
