//! # Authentication Module
//!
//! Spotify account connection for the sync core.
//!
//! ## Overview
//!
//! This module handles the OAuth 2.0 authorization code flow (with PKCE)
//! against the Spotify accounts service, persists the resulting tokens in the
//! platform secure store, and refreshes them on demand.
//!
//! ## Features
//!
//! - PKCE authorization URL and code exchange
//! - Automatic token refresh within five minutes of expiry
//! - Logout on failed refresh
//! - Auth state event emission on the core event bus
//! - [`AccessTokenProvider`] seam consumed by the sync services

pub mod error;
pub mod manager;
pub mod oauth;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::{AccessTokenProvider, TokenManager};
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use token_store::{TokenStore, TOKEN_STORAGE_KEY};
pub use types::{OAuthTokens, SPOTIFY_PROVIDER, SPOTIFY_SCOPES};
