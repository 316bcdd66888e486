//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, secure
//! storage, settings, lifecycle) into the sync core. It is created once at
//! startup from a [`CoreConfig`] and shut down explicitly. Desktop apps
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) so that missing bridges fall back to desktop adapters.
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SpotifyConfig};
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .database_path(data_dir.join("library.db"))
//!     .user_id(uid)
//!     .spotify(SpotifyConfig::new(client_id, "mavrixfy://callback"))
//!     .search_base_url("https://search.example.com")
//!     .build()?;
//!
//! let core = CoreService::new(config).await?;
//! let url = core.auth().authorization_url(state).await?;
//! // ... host opens `url`, receives the callback ...
//! core.auth().complete_sign_in(&code, &state).await?; // library sync follows
//!
//! core.shutdown().await;
//! ```

pub mod error;

pub use error::{CoreError, Result};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::{default_data_dir, ChannelLifecycleObserver};

use core_auth::{OAuthConfig, OAuthFlowManager, TokenManager, TokenStore};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{LikedSongStore, LikedSongsService, SqliteLikedSongStore};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_sync::{
    AutoSyncService, HttpTrackCatalog, LibrarySyncCoordinator, SpotifyFetcher, SyncDispatcher,
    SyncInfo, SyncOutcome, SyncTrigger, SyncTriggerHub, TrackCatalog,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
pub struct CoreService {
    event_bus: EventBus,
    pool: SqlitePool,
    auth: Arc<TokenManager>,
    store: Arc<dyn LikedSongStore>,
    likes: Arc<LikedSongsService>,
    library_sync: Arc<LibrarySyncCoordinator>,
    auto_sync: AutoSyncService,
    triggers: SyncTriggerHub,
}

impl CoreService {
    /// Build every service from `config` and start listening for triggers.
    ///
    /// Auto-sync resumes when it was left enabled and the
    /// `enable_auto_sync` flag is set.
    #[instrument(skip(config), fields(user_id = %config.user_id))]
    pub async fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_capacity);
        let clock = config.clock.clone();

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let store: Arc<dyn LikedSongStore> = Arc::new(SqliteLikedSongStore::new(
            pool.clone(),
            config.user_id.clone(),
            clock.clone(),
        ));

        let oauth = OAuthFlowManager::new(
            OAuthConfig::spotify(&config.spotify),
            config.http_client.clone(),
            clock.clone(),
        );
        let auth = Arc::new(TokenManager::new(
            TokenStore::new(config.secure_store.clone()),
            oauth,
            event_bus.clone(),
            clock.clone(),
        ));

        let fetcher = Arc::new(SpotifyFetcher::new(
            config.http_client.clone(),
            clock.clone(),
            config.spotify.api_base_url.clone(),
            config.fetcher,
        ));

        let library_sync = Arc::new(LibrarySyncCoordinator::new(
            auth.clone(),
            fetcher.clone(),
            store.clone(),
            config.settings_store.clone(),
            event_bus.clone(),
            clock.clone(),
            config.library_sync,
        ));

        let catalog: Option<Arc<dyn TrackCatalog>> = config.search_base_url.as_ref().map(|url| {
            Arc::new(HttpTrackCatalog::new(config.http_client.clone(), url.clone()))
                as Arc<dyn TrackCatalog>
        });
        let auto_sync = AutoSyncService::new(
            auth.clone(),
            fetcher,
            store.clone(),
            catalog,
            config.settings_store.clone(),
            event_bus.clone(),
            clock,
            config.auto_sync,
        )
        .await;

        let likes = Arc::new(LikedSongsService::new(store.clone(), event_bus.clone()));

        let triggers =
            SyncTriggerHub::new(SyncDispatcher::new(library_sync.clone(), auto_sync.clone()));
        triggers.listen_events(&event_bus).await;

        // validate() guarantees an observer when the flag is set
        if let (true, Some(observer)) = (
            config.features.enable_lifecycle_triggers,
            &config.lifecycle_observer,
        ) {
            triggers.listen_lifecycle(observer.as_ref()).await?;
        }

        if config.features.enable_auto_sync && auto_sync.resume().await {
            info!("Auto-sync resumed");
        }

        info!("Core service ready");
        Ok(Self {
            event_bus,
            pool,
            auth,
            store,
            likes,
            library_sync,
            auto_sync,
            triggers,
        })
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Stream of every core event. Dropping it unsubscribes.
    pub fn subscribe(&self) -> EventStream {
        self.event_bus.stream()
    }

    /// Spotify connection: sign-in URL, callback, sign-out.
    pub fn auth(&self) -> &Arc<TokenManager> {
        &self.auth
    }

    pub fn library_sync(&self) -> &Arc<LibrarySyncCoordinator> {
        &self.library_sync
    }

    pub fn auto_sync(&self) -> &AutoSyncService {
        &self.auto_sync
    }

    pub fn likes(&self) -> &Arc<LikedSongsService> {
        &self.likes
    }

    pub fn store(&self) -> Arc<dyn LikedSongStore> {
        self.store.clone()
    }

    /// Run a trigger through the same guards as the automatic ones.
    pub async fn trigger(&self, trigger: SyncTrigger) -> SyncOutcome {
        self.triggers.dispatcher().dispatch(trigger).await
    }

    pub async fn sync_info(&self) -> SyncInfo {
        self.library_sync.sync_info().await
    }

    /// Stop the listeners and the auto-sync timer, then close the database.
    ///
    /// The persisted auto-sync config is left untouched.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.auto_sync.suspend().await;
        self.triggers.shutdown().await;
        self.pool.close().await;
        info!("Core service shut down");
    }
}
