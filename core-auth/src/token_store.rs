//! Secure Token Storage
//!
//! Persists the Spotify token set through the platform `SecureStore`
//! (Keychain, Keystore, Secret Service).
//!
//! ## Security Features
//!
//! - Tokens are never logged or exposed in error messages
//! - Corrupted entries are erased instead of being retried forever
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{OAuthTokens, TokenStore};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let token_store = TokenStore::new(secure_store);
//!
//! let tokens = OAuthTokens::from_parts(
//!     "access_token_value".to_string(),
//!     Some("refresh_token_value".to_string()),
//!     1_700_003_600_000,
//! );
//!
//! token_store.store_tokens(&tokens).await?;
//! let retrieved = token_store.retrieve_tokens().await?;
//! token_store.delete_tokens().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::OAuthTokens;
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Secure store key holding the serialized token set.
pub const TOKEN_STORAGE_KEY: &str = "spotify_tokens";

/// Secure storage for the Spotify OAuth tokens
///
/// Tokens are serialized to JSON before storage. All operations go through
/// the injected `SecureStore`.
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self { secure_store }
    }

    /// Store the token set, overwriting any previous one.
    pub async fn store_tokens(&self, tokens: &OAuthTokens) -> Result<()> {
        let json = serde_json::to_vec(tokens).map_err(|e| {
            warn!(error = %e, "Failed to serialize tokens");
            AuthError::SerializationFailed {
                context: "token set".to_string(),
                source: e,
            }
        })?;

        self.secure_store
            .set_secret(TOKEN_STORAGE_KEY, &json)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to store tokens in secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(
            has_refresh_token = tokens.refresh_token().is_some(),
            expires_at = tokens.expires_at(),
            "Tokens stored securely"
        );

        Ok(())
    }

    /// Retrieve the stored token set.
    ///
    /// Returns:
    /// - `Ok(Some(tokens))` if tokens exist and are valid
    /// - `Ok(None)` if no tokens are stored
    /// - `Err(TokenCorrupted)` if the entry could not be parsed (it is deleted)
    pub async fn retrieve_tokens(&self) -> Result<Option<OAuthTokens>> {
        let data = self
            .secure_store
            .get_secret(TOKEN_STORAGE_KEY)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to retrieve tokens from secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        let Some(data) = data else {
            debug!("No tokens found in storage");
            return Ok(None);
        };

        match serde_json::from_slice::<OAuthTokens>(&data) {
            Ok(tokens) => {
                debug!(
                    has_refresh_token = tokens.refresh_token().is_some(),
                    expires_at = tokens.expires_at(),
                    "Tokens retrieved"
                );
                Ok(Some(tokens))
            }
            Err(e) => {
                warn!(error = %e, "Failed to deserialize tokens, they may be corrupted");

                if let Err(delete_err) = self.secure_store.delete_secret(TOKEN_STORAGE_KEY).await {
                    warn!(error = %delete_err, "Failed to delete corrupted token data");
                }

                Err(AuthError::TokenCorrupted(e.to_string()))
            }
        }
    }

    /// Delete the stored tokens. Succeeds when nothing is stored.
    pub async fn delete_tokens(&self) -> Result<()> {
        self.secure_store
            .delete_secret(TOKEN_STORAGE_KEY)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to delete tokens from secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!("Tokens deleted");
        Ok(())
    }

    pub async fn has_tokens(&self) -> Result<bool> {
        self.secure_store
            .has_secret(TOKEN_STORAGE_KEY)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }
}
