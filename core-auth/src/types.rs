use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider tag used in auth events.
pub const SPOTIFY_PROVIDER: &str = "spotify";

/// Scopes requested during Spotify sign-in.
pub const SPOTIFY_SCOPES: &[&str] = &[
    "user-library-read",
    "user-read-email",
    "user-read-private",
];

/// OAuth 2.0 token set.
///
/// Contains the access token, optional refresh token, and absolute expiry
/// for the connected Spotify account.
///
/// # Security
///
/// Tokens should be stored securely and never logged. The `Debug` implementation
/// redacts sensitive information.
///
/// # Examples
///
/// ```
/// use core_auth::OAuthTokens;
///
/// let tokens = OAuthTokens::from_parts(
///     "BQD...".to_string(),
///     Some("AQC...".to_string()),
///     1_700_003_600_000,
/// );
///
/// assert!(!tokens.is_expired_at(1_700_000_000_000));
/// assert!(tokens.needs_refresh_at(1_700_003_400_000, 300_000));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Unix epoch milliseconds
    expires_at: i64,
}

impl OAuthTokens {
    /// Build a token set from a token response.
    ///
    /// # Arguments
    ///
    /// * `expires_in` - Seconds until expiry, as reported by the token endpoint
    /// * `now_ms` - Issue time (Unix epoch milliseconds)
    pub fn issued(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        now_ms: i64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: now_ms.saturating_add(expires_in.saturating_mul(1000)),
        }
    }

    /// Rebuild a token set from stored parts.
    pub fn from_parts(access_token: String, refresh_token: Option<String>, expires_at: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Expiry as Unix epoch milliseconds.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// True when the token is expired or expires within `buffer_ms`.
    pub fn needs_refresh_at(&self, now_ms: i64, buffer_ms: i64) -> bool {
        now_ms >= self.expires_at.saturating_sub(buffer_ms)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }

    /// Milliseconds until expiry, or `None` once expired.
    pub fn remaining_ms(&self, now_ms: i64) -> Option<i64> {
        if self.is_expired_at(now_ms) {
            None
        } else {
            Some(self.expires_at - now_ms)
        }
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
