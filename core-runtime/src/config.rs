//! # Core Configuration Module
//!
//! Provides configuration management for the Mavrixfy sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all necessary bridges and settings for the sync
//! services. It enforces fail-fast validation so that missing capabilities and
//! inconsistent tuning are reported before any service starts.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - Spotify Web API, accounts service and search backend
//! - `SecureStore` - OAuth token persistence
//! - `SettingsStore` - Sync timestamps, leases and auto-sync configuration
//!
//! ## Optional Dependencies
//!
//! - `LifecycleObserver` - Window focus/visibility triggers
//! - `Clock` - Defaults to [`SystemClock`]
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for
//! `HttpClient`, `SecureStore` and `SettingsStore` are injected automatically
//! if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SpotifyConfig};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/library.db")
//!     .user_id("firebase-uid")
//!     .spotify(SpotifyConfig::new("client-id", "mavrixfy://callback"))
//!     .search_base_url("https://search.example.com")
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! The builder validates all required dependencies and provides actionable
//! error messages when capabilities are missing:
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! // Without desktop-shims this fails with Error::CapabilityMissing
//! let result = CoreConfig::builder()
//!     .database_path("/path/to/library.db")
//!     .build();
//! assert!(result.is_err());
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, HttpClient, LifecycleObserver, SecureStore, SettingsStore, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Largest write group the liked-songs store accepts in one commit.
pub const MAX_BATCH_SIZE: usize = 500;

const DEFAULT_ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";
const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_EVENT_CAPACITY: usize = 128;

// ============================================================================
// Component settings
// ============================================================================

/// Spotify application registration and endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyConfig {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret. PKCE-only apps leave this unset.
    pub client_secret: Option<String>,
    /// Redirect URI registered for the app
    pub redirect_uri: String,
    /// Accounts service base (authorize and token endpoints)
    pub accounts_base_url: String,
    /// Web API base, including the version segment
    pub api_base_url: String,
}

impl SpotifyConfig {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            accounts_base_url: DEFAULT_ACCOUNTS_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Point both Spotify endpoints at a different host (used by tests).
    pub fn with_base_urls(
        mut self,
        accounts_base_url: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Self {
        self.accounts_base_url = accounts_base_url.into();
        self.api_base_url = api_base_url.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("Spotify client id cannot be empty".to_string()));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(Error::Config(
                "Spotify redirect URI cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Paginated fetch tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetcherSettings {
    /// Items requested per page (the Web API caps this at 50)
    pub page_size: u32,
    /// Pause between consecutive page requests
    pub page_delay: Duration,
    /// Wait applied on 429 when `Retry-After` is missing or unparseable
    pub default_retry_after: Duration,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            page_delay: Duration::from_millis(100),
            default_retry_after: Duration::from_secs(5),
        }
    }
}

/// Library (full) sync tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibrarySyncSettings {
    /// Delay between sign-in and the first pass
    pub post_auth_delay: Duration,
    /// Minimum time between two successful quick syncs
    pub cooldown: Duration,
    /// Write group size for the persister
    pub batch_size: usize,
    /// A lease without a heartbeat for this long is considered abandoned
    pub lease_ttl: Duration,
    /// How often a running pass refreshes its lease
    pub heartbeat_interval: Duration,
}

impl Default for LibrarySyncSettings {
    fn default() -> Self {
        Self {
            post_auth_delay: Duration::from_secs(4),
            cooldown: Duration::from_secs(30),
            batch_size: MAX_BATCH_SIZE,
            lease_ttl: Duration::from_secs(5 * 60),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Auto-sync defaults used until a persisted configuration exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoSyncSettings {
    pub interval_minutes: f64,
    pub max_songs_per_sync: u32,
    pub max_retries: u32,
    /// Upper bound on items fetched per pass
    pub fetch_cap: usize,
    /// Pause between per-item writes
    pub item_delay: Duration,
}

impl AutoSyncSettings {
    /// Longest accepted auto-sync interval (one year).
    pub const MAX_INTERVAL_MINUTES: f64 = 365.0 * 24.0 * 60.0;

    /// Finite, positive and at most [`Self::MAX_INTERVAL_MINUTES`].
    pub fn is_valid_interval(minutes: f64) -> bool {
        minutes.is_finite() && minutes > 0.0 && minutes <= Self::MAX_INTERVAL_MINUTES
    }
}

impl Default for AutoSyncSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 0.17,
            max_songs_per_sync: 20,
            max_retries: 3,
            fetch_cap: 100,
            item_delay: Duration::from_millis(200),
        }
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Resume periodic auto-sync at startup when it was left enabled
    pub enable_auto_sync: bool,

    /// React to window focus/visibility (requires LifecycleObserver)
    pub enable_lifecycle_triggers: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_auto_sync: true,
            enable_lifecycle_triggers: false,
        }
    }
}

// ============================================================================
// CoreConfig
// ============================================================================

/// Core configuration for the sync services.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite liked-songs database
    pub database_path: PathBuf,

    /// Owner of the liked-songs collection
    pub user_id: String,

    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
    pub clock: Arc<dyn Clock>,

    pub spotify: SpotifyConfig,

    /// Search backend used to enrich auto-synced tracks. `None` disables
    /// enrichment.
    pub search_base_url: Option<String>,

    pub fetcher: FetcherSettings,
    pub library_sync: LibrarySyncSettings,
    pub auto_sync: AutoSyncSettings,
    pub features: FeatureFlags,

    /// Buffer size of the event bus
    pub event_capacity: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("user_id", &self.user_id)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field(
                "lifecycle_observer",
                &self
                    .lifecycle_observer
                    .as_ref()
                    .map(|_| "LifecycleObserver { ... }"),
            )
            .field("spotify_client_id", &self.spotify.client_id)
            .field("search_base_url", &self.search_base_url)
            .field("fetcher", &self.fetcher)
            .field("library_sync", &self.library_sync)
            .field("auto_sync", &self.auto_sync)
            .field("features", &self.features)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path and user id are not empty
    /// - Spotify registration is complete
    /// - Page size and batch size are within API/store limits
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.user_id.trim().is_empty() {
            return Err(Error::Config("User id cannot be empty".to_string()));
        }

        self.spotify.validate()?;

        if self.fetcher.page_size == 0 || self.fetcher.page_size > 50 {
            return Err(Error::Config(
                "Page size must be between 1 and 50".to_string(),
            ));
        }

        if self.library_sync.batch_size == 0 || self.library_sync.batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "Batch size must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }

        if self.library_sync.heartbeat_interval >= self.library_sync.lease_ttl {
            return Err(Error::Config(
                "Lease heartbeat interval must be shorter than the lease TTL".to_string(),
            ));
        }

        if !AutoSyncSettings::is_valid_interval(self.auto_sync.interval_minutes) {
            return Err(Error::Config(format!(
                "Auto-sync interval must be greater than 0 and at most {} minutes",
                AutoSyncSettings::MAX_INTERVAL_MINUTES
            )));
        }

        if self.features.enable_lifecycle_triggers && self.lifecycle_observer.is_none() {
            return Err(Error::Config(
                "Lifecycle triggers enabled but no LifecycleObserver provided. \
                 Disable the feature or inject a LifecycleObserver implementation."
                    .to_string(),
            ));
        }

        if self.event_capacity == 0 {
            return Err(Error::Config(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Capability defaults
// ============================================================================

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str, desktop_default: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: ensure the 'desktop-shims' feature is enabled to use the default {}. \
             Mobile: inject a platform-native implementation.",
            capability, purpose, desktop_default
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new().map_err(|e| {
        Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing(
        "HttpClient",
        "Spotify and search requests",
        "ReqwestHttpClient",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(capability_missing(
        "SecureStore",
        "credential persistence",
        "KeyringSecureStore",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(database_path: &Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let candidate = database_path
        .parent()
        .map(|parent| parent.join("settings.db"))
        .unwrap_or_else(|| PathBuf::from("settings.db"));

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default settings store: {}",
                    e
                ))
            })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
            })
    };

    // Blocking inside a runtime worker panics, so hop to a plain thread.
    let store = match Handle::try_current() {
        Ok(_) => {
            let path = candidate.clone();
            thread::spawn(move || init_store(path))
                .join()
                .map_err(|_| {
                    Error::Internal(
                        "Worker thread panicked while creating default SettingsStore".to_string(),
                    )
                })??
        }
        Err(_) => init_store(candidate)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_database_path: &Path) -> Result<Arc<dyn SettingsStore>> {
    Err(capability_missing(
        "SettingsStore",
        "sync state persistence",
        "SqliteSettingsStore",
    ))
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    user_id: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
    clock: Option<Arc<dyn Clock>>,
    spotify: Option<SpotifyConfig>,
    search_base_url: Option<String>,
    fetcher: FetcherSettings,
    library_sync: LibrarySyncSettings,
    auto_sync: AutoSyncSettings,
    features: FeatureFlags,
    event_capacity: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the liked-songs database path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the owner of the liked-songs collection.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest-based client is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the secure store used for OAuth tokens.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Sets the settings store used for sync state.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn lifecycle_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.lifecycle_observer = Some(observer);
        self
    }

    /// Overrides the time source (tests inject a `ManualClock`).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn spotify(mut self, spotify: SpotifyConfig) -> Self {
        self.spotify = Some(spotify);
        self
    }

    pub fn search_base_url(mut self, url: impl Into<String>) -> Self {
        self.search_base_url = Some(url.into());
        self
    }

    pub fn fetcher(mut self, settings: FetcherSettings) -> Self {
        self.fetcher = settings;
        self
    }

    pub fn library_sync(mut self, settings: LibrarySyncSettings) -> Self {
        self.library_sync = settings;
        self
    }

    pub fn auto_sync(mut self, settings: AutoSyncSettings) -> Self {
        self.auto_sync = settings;
        self
    }

    pub fn enable_auto_sync(mut self, enabled: bool) -> Self {
        self.features.enable_auto_sync = enabled;
        self
    }

    /// Requires a `LifecycleObserver` to be provided.
    pub fn enable_lifecycle_triggers(mut self, enabled: bool) -> Self {
        self.features.enable_lifecycle_triggers = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - Required fields or bridges are missing
    /// - Configuration values are invalid
    /// - Feature flags are inconsistent with available bridges
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let spotify = self.spotify.ok_or_else(|| {
            Error::Config(
                "Spotify configuration is required. Use .spotify() to set it.".to_string(),
            )
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&database_path)?,
        };

        let config = CoreConfig {
            database_path,
            user_id: self.user_id.unwrap_or_else(|| "local".to_string()),
            http_client,
            secure_store,
            settings_store,
            lifecycle_observer: self.lifecycle_observer,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            spotify,
            search_base_url: self.search_base_url,
            fetcher: self.fetcher,
            library_sync: self.library_sync,
            auto_sync: self.auto_sync,
            features: self.features,
            event_capacity: self.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{HttpRequest, HttpResponse};

    struct NullHttpClient;

    #[async_trait]
    impl HttpClient for NullHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse::new(200, Vec::new()))
        }
    }

    struct NullSecureStore;

    #[async_trait]
    impl SecureStore for NullSecureStore {
        async fn set_secret(&self, _key: &str, _value: &[u8]) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_secret(&self, _key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn delete_secret(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn clear_all(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NullSettingsStore;

    #[async_trait]
    impl SettingsStore for NullSettingsStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        async fn set_bool(&self, _key: &str, _value: bool) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_bool(&self, _key: &str) -> BridgeResult<Option<bool>> {
            Ok(None)
        }

        async fn set_i64(&self, _key: &str, _value: i64) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_i64(&self, _key: &str) -> BridgeResult<Option<i64>> {
            Ok(None)
        }

        async fn set_f64(&self, _key: &str, _value: f64) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_f64(&self, _key: &str) -> BridgeResult<Option<f64>> {
            Ok(None)
        }

        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn has_key(&self, _key: &str) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn clear_all(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NullLifecycle;

    #[async_trait]
    impl LifecycleObserver for NullLifecycle {
        async fn subscribe_changes(
            &self,
        ) -> BridgeResult<Box<dyn bridge_traits::LifecycleChangeStream>> {
            Err(bridge_traits::BridgeError::NotAvailable(
                "lifecycle".to_string(),
            ))
        }
    }

    fn complete_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path("/data/library.db")
            .spotify(SpotifyConfig::new("client", "mavrixfy://callback"))
            .http_client(Arc::new(NullHttpClient))
            .secure_store(Arc::new(NullSecureStore))
            .settings_store(Arc::new(NullSettingsStore))
    }

    #[test]
    fn test_builder_with_all_required_fields() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.database_path, PathBuf::from("/data/library.db"));
        assert_eq!(config.user_id, "local");
        assert_eq!(config.spotify.api_base_url, "https://api.spotify.com/v1");
        assert_eq!(config.fetcher.page_size, 50);
        assert_eq!(config.library_sync.cooldown, Duration::from_secs(30));
        assert_eq!(config.library_sync.batch_size, 500);
        assert_eq!(config.auto_sync.max_songs_per_sync, 20);
        assert!(config.features.enable_auto_sync);
        assert!(config.search_base_url.is_none());
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = CoreConfig::builder()
            .spotify(SpotifyConfig::new("client", "mavrixfy://callback"))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database path is required"));
    }

    #[test]
    fn test_builder_requires_spotify() {
        let result = CoreConfig::builder()
            .database_path("/data/library.db")
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Spotify configuration is required"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_reports_missing_capabilities() {
        let result = CoreConfig::builder()
            .database_path("/data/library.db")
            .spotify(SpotifyConfig::new("client", "mavrixfy://callback"))
            .build();
        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "HttpClient")
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }

        let result = CoreConfig::builder()
            .database_path("/data/library.db")
            .spotify(SpotifyConfig::new("client", "mavrixfy://callback"))
            .http_client(Arc::new(NullHttpClient))
            .secure_store(Arc::new(NullSecureStore))
            .build();
        let message = result.unwrap_err().to_string();
        assert!(message.contains("SettingsStore"));
        assert!(message.contains("sync state persistence"));
    }

    #[test]
    fn test_validate_rejects_empty_client_id() {
        let result = complete_builder()
            .spotify(SpotifyConfig::new("  ", "mavrixfy://callback"))
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("client id")));

        let result = complete_builder()
            .spotify(SpotifyConfig::new("client", ""))
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("redirect URI")));
    }

    #[test]
    fn test_validate_rejects_page_and_batch_limits() {
        let result = complete_builder()
            .fetcher(FetcherSettings {
                page_size: 0,
                ..FetcherSettings::default()
            })
            .build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = complete_builder()
            .library_sync(LibrarySyncSettings {
                batch_size: 501,
                ..LibrarySyncSettings::default()
            })
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Batch size")));
    }

    #[test]
    fn test_validate_rejects_heartbeat_longer_than_ttl() {
        let result = complete_builder()
            .library_sync(LibrarySyncSettings {
                heartbeat_interval: Duration::from_secs(600),
                ..LibrarySyncSettings::default()
            })
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_auto_sync_interval() {
        for minutes in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e300] {
            let result = complete_builder()
                .auto_sync(AutoSyncSettings {
                    interval_minutes: minutes,
                    ..AutoSyncSettings::default()
                })
                .build();
            assert!(
                matches!(&result, Err(Error::Config(msg)) if msg.contains("Auto-sync interval")),
                "{minutes} accepted"
            );
        }

        assert!(AutoSyncSettings::is_valid_interval(
            AutoSyncSettings::MAX_INTERVAL_MINUTES
        ));
    }

    #[test]
    fn test_lifecycle_triggers_require_observer() {
        let result = complete_builder().enable_lifecycle_triggers(true).build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("no LifecycleObserver provided"));

        let config = complete_builder()
            .lifecycle_observer(Arc::new(NullLifecycle))
            .enable_lifecycle_triggers(true)
            .build()
            .unwrap();
        assert!(config.features.enable_lifecycle_triggers);
    }

    #[test]
    fn test_spotify_config_builders() {
        let spotify = SpotifyConfig::new("id", "app://cb")
            .with_client_secret("shh")
            .with_base_urls("http://localhost:1", "http://localhost:2/v1");

        assert_eq!(spotify.client_secret.as_deref(), Some("shh"));
        assert_eq!(spotify.accounts_base_url, "http://localhost:1");
        assert_eq!(spotify.api_base_url, "http://localhost:2/v1");
    }

    #[test]
    fn test_component_defaults() {
        let fetcher = FetcherSettings::default();
        assert_eq!(fetcher.page_delay, Duration::from_millis(100));
        assert_eq!(fetcher.default_retry_after, Duration::from_secs(5));

        let library = LibrarySyncSettings::default();
        assert_eq!(library.post_auth_delay, Duration::from_secs(4));
        assert_eq!(library.lease_ttl, Duration::from_secs(300));

        let auto = AutoSyncSettings::default();
        assert_eq!(auto.interval_minutes, 0.17);
        assert_eq!(auto.max_retries, 3);
        assert_eq!(auto.fetch_cap, 100);
        assert_eq!(auto.item_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = complete_builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("HttpClient { ... }"));
        assert!(!debug.contains("client_secret"));
    }
}
