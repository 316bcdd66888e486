//! # Token Manager
//!
//! Owns the Spotify account connection: sign-in, sign-out and handing out
//! valid access tokens to the sync services.
//!
//! ## Overview
//!
//! `TokenManager` combines the [`OAuthFlowManager`] with the [`TokenStore`]
//! and publishes every auth transition on the event bus. Access tokens are
//! refreshed on demand when they are expired or about to expire. A failed
//! refresh signs the user out so that the UI can prompt for a new consent.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AccessTokenProvider, TokenManager};
//! # use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//! # async fn example(manager: TokenManager) -> core_auth::Result<()> {
//! let url = manager.authorization_url("state-123").await?;
//! // Host opens `url`, receives the callback and then:
//! manager.complete_sign_in("code", "state-123").await?;
//!
//! let token = manager.access_token().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::oauth::{OAuthFlowManager, PkceVerifier};
use crate::token_store::TokenStore;
use crate::types::{OAuthTokens, SPOTIFY_PROVIDER};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Buffer time before token expiration to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(300);

/// Source of bearer tokens for Spotify API calls.
///
/// Implemented by [`TokenManager`]; the sync services only see this trait.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// A non-expired access token, refreshing first when needed.
    async fn access_token(&self) -> Result<String>;

    /// True when tokens exist and are either unexpired or refreshable.
    async fn is_authenticated(&self) -> bool;
}

/// Spotify account connection manager.
pub struct TokenManager {
    token_store: TokenStore,
    oauth: OAuthFlowManager,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    /// Verifier of the sign-in that is waiting for its callback
    pending_sign_in: Mutex<Option<PkceVerifier>>,
    /// Serializes refreshes so concurrent callers share one refresh
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        token_store: TokenStore,
        oauth: OAuthFlowManager,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            token_store,
            oauth,
            event_bus,
            clock,
            pending_sign_in: Mutex::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Start a sign-in and return the authorize URL for the host to open.
    ///
    /// A new call replaces any sign-in still waiting for its callback.
    #[instrument(skip(self, state))]
    pub async fn authorization_url(&self, state: impl Into<String> + Send) -> Result<String> {
        let verifier = PkceVerifier::with_state(state);
        let url = self.oauth.build_auth_url(&verifier)?;

        *self.pending_sign_in.lock().await = Some(verifier);

        self.emit(AuthEvent::SigningIn {
            provider: SPOTIFY_PROVIDER.to_string(),
        });

        info!("Sign-in flow initiated");
        Ok(url)
    }

    /// Finish the sign-in started by [`authorization_url`](Self::authorization_url).
    #[instrument(skip(self, code, state))]
    pub async fn complete_sign_in(&self, code: &str, state: &str) -> Result<()> {
        let verifier = self
            .pending_sign_in
            .lock()
            .await
            .take()
            .ok_or_else(|| {
                warn!("No sign-in in progress");
                AuthError::NoSignInInProgress
            })?;

        let tokens = match self.oauth.exchange_code(code, state, &verifier).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(error = %e, "Authorization code exchange failed");
                self.emit(AuthEvent::AuthError {
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                });
                return Err(e);
            }
        };

        self.token_store.store_tokens(&tokens).await?;

        self.emit(AuthEvent::SignedIn {
            provider: SPOTIFY_PROVIDER.to_string(),
        });

        info!("Spotify account connected");
        Ok(())
    }

    /// Store tokens obtained by the host through another flow.
    pub async fn sign_in_with_tokens(&self, tokens: &OAuthTokens) -> Result<()> {
        self.token_store.store_tokens(tokens).await?;
        self.emit(AuthEvent::SignedIn {
            provider: SPOTIFY_PROVIDER.to_string(),
        });
        Ok(())
    }

    /// Delete the stored tokens and announce the sign-out.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        self.token_store.delete_tokens().await?;
        *self.pending_sign_in.lock().await = None;

        self.emit(AuthEvent::SignedOut {
            provider: SPOTIFY_PROVIDER.to_string(),
        });

        info!("Spotify account disconnected");
        Ok(())
    }

    /// Expiry of the stored access token (Unix epoch milliseconds).
    pub async fn token_expiry(&self) -> Result<Option<i64>> {
        Ok(self
            .token_store
            .retrieve_tokens()
            .await?
            .map(|t| t.expires_at()))
    }

    fn needs_refresh(&self, tokens: &OAuthTokens) -> bool {
        tokens.needs_refresh_at(
            self.clock.unix_timestamp_millis(),
            TOKEN_REFRESH_BUFFER.as_millis() as i64,
        )
    }

    async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens> {
        self.emit(AuthEvent::TokenRefreshing {
            provider: SPOTIFY_PROVIDER.to_string(),
        });

        match self.oauth.refresh_access_token(refresh_token).await {
            Ok(tokens) => {
                self.token_store.store_tokens(&tokens).await?;
                self.emit(AuthEvent::TokenRefreshed {
                    provider: SPOTIFY_PROVIDER.to_string(),
                    expires_at_ms: tokens.expires_at(),
                });
                Ok(tokens)
            }
            Err(e) => {
                error!(error = %e, "Token refresh failed, signing out");
                if let Err(delete_err) = self.token_store.delete_tokens().await {
                    warn!(error = %delete_err, "Failed to clear tokens after refresh failure");
                }
                self.emit(AuthEvent::AuthError {
                    message: format!("Token refresh failed: {}", e),
                    recoverable: false,
                });
                self.emit(AuthEvent::SignedOut {
                    provider: SPOTIFY_PROVIDER.to_string(),
                });
                Err(e)
            }
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is not an error
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}

#[async_trait]
impl AccessTokenProvider for TokenManager {
    #[instrument(skip(self))]
    async fn access_token(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        let tokens = self
            .token_store
            .retrieve_tokens()
            .await?
            .ok_or(AuthError::NotAuthenticated)?;

        if !self.needs_refresh(&tokens) {
            debug!("Token is valid, no refresh needed");
            return Ok(tokens.access_token().to_string());
        }

        let Some(refresh_token) = tokens.refresh_token().filter(|t| !t.is_empty()) else {
            warn!("Access token expired and no refresh token is stored");
            return Err(AuthError::NoRefreshToken);
        };

        info!("Token expired or expiring soon, refreshing");
        let refreshed = self.refresh(refresh_token).await?;
        Ok(refreshed.access_token().to_string())
    }

    async fn is_authenticated(&self) -> bool {
        match self.token_store.retrieve_tokens().await {
            Ok(Some(tokens)) => {
                !tokens.is_expired_at(self.clock.unix_timestamp_millis()) || tokens.can_refresh()
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Could not read tokens");
                false
            }
        }
    }
}
