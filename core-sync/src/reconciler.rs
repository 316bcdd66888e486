//! Existing-item reconciliation
//!
//! Two keys are in use:
//!
//! - full and manual sync compare exact Spotify ids against the persisted id set
//! - auto-sync compares trimmed, case-insensitive title and artist through the store

use crate::error::Result;
use core_library::{title_artist_key, LikedSongStore, SyncedTrack};
use std::collections::HashSet;

/// Split of an incoming batch against the persisted collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Ids absent from the store
    pub new: Vec<SyncedTrack>,
    /// Ids already persisted
    pub update: Vec<SyncedTrack>,
}

impl Reconciliation {
    pub fn len(&self) -> usize {
        self.new.len() + self.update.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.update.is_empty()
    }
}

/// Partition `incoming` by id against `existing_ids`.
///
/// Duplicate ids in `incoming` collapse to their first occurrence. Neither
/// input is mutated.
pub fn reconcile_by_id(existing_ids: &HashSet<String>, incoming: &[SyncedTrack]) -> Reconciliation {
    let mut seen: HashSet<&str> = HashSet::with_capacity(incoming.len());
    let mut result = Reconciliation::default();

    for track in incoming {
        if !seen.insert(track.id.as_str()) {
            continue;
        }
        if existing_ids.contains(&track.id) {
            result.update.push(track.clone());
        } else {
            result.new.push(track.clone());
        }
    }

    result
}

/// Keep the tracks whose title and artist are not yet in the store.
///
/// Incoming tracks sharing an id or a title/artist pair are collapsed to the
/// first occurrence.
pub async fn reconcile_by_title_artist(
    store: &dyn LikedSongStore,
    incoming: Vec<SyncedTrack>,
) -> Result<Vec<SyncedTrack>> {
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_keys: HashSet<(String, String)> = HashSet::new();
    let mut fresh = Vec::new();

    for track in incoming {
        let key = title_artist_key(&track.title, &track.artist);
        if !seen_ids.insert(track.id.clone()) || !seen_keys.insert(key) {
            continue;
        }
        if !store.exists_by_title_artist(&track.title, &track.artist).await? {
            fresh.push(track);
        }
    }

    Ok(fresh)
}
