use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Spotify rejected the access token")]
    Unauthorized,

    #[error("Spotify not connected")]
    NotConnected,

    #[error("Spotify API error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Persisted {committed} of {total} songs before failing: {source}")]
    Persist {
        committed: usize,
        total: usize,
        #[source]
        source: LibraryError,
    },

    #[error("Host bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Sync cooldown active, retry in {remaining_ms} ms")]
    CooldownActive { remaining_ms: u64 },

    #[error("Sync already in progress")]
    SyncInProgress,

    #[error("Invalid auto-sync interval: {0} minutes")]
    InvalidInterval(f64),
}

impl SyncError {
    /// Whether the user has to reconnect Spotify before a retry can succeed.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(_) | SyncError::Unauthorized | SyncError::NotConnected
        )
    }

    /// Rejections that happen before any work starts.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SyncError::CooldownActive { .. } | SyncError::SyncInProgress
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
