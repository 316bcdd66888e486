//! # Liked-Songs Library
//!
//! Owns the persisted liked-songs collection.
//!
//! ## Overview
//!
//! This crate manages:
//! - SQLite schema, migrations and connection pooling ([`db`])
//! - The [`LikedSongStore`] document store and its SQLite and in-memory
//!   implementations ([`store`])
//! - Optimistic like/unlike with a pending/confirmed/failed tri-state ([`likes`])

pub mod db;
pub mod error;
pub mod likes;
pub mod models;
pub mod store;

pub use error::{LibraryError, Result};
pub use likes::{LikeState, LikedSongsService};
pub use models::{
    title_artist_key, LikedSongSource, PersistedLikedSong, SyncedTrack, UpsertKind, UpsertOp,
    AUTO_SYNC_ID_PREFIX,
};
pub use store::{InMemoryLikedSongStore, LikedSongStore, SqliteLikedSongStore};
