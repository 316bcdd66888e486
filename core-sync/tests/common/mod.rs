//! Shared fixtures for the sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::ManualClock;
use core_auth::{AccessTokenProvider, AuthError};
use core_library::InMemoryLikedSongStore;
use core_runtime::config::{FetcherSettings, LibrarySyncSettings};
use core_runtime::events::EventBus;
use core_sync::{LibrarySyncCoordinator, SpotifyFetcher};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub const API_BASE: &str = "https://api.spotify.test/v1";

/// 2024-06-01T00:00:00Z
pub const START_MS: i64 = 1_717_200_000_000;

// ============================================================================
// Fake Spotify Web API
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub offset: usize,
    pub at: tokio::time::Instant,
}

#[derive(Default)]
struct FakeState {
    items: Vec<Value>,
    advertise_next_on_last: bool,
    /// Request number (1-based) answered once with 429 and this Retry-After
    rate_limited_requests: HashMap<usize, String>,
    fail_status: Option<u16>,
    requests: Vec<RecordedRequest>,
}

/// In-process `/me/tracks` endpoint serving a fixed collection.
#[derive(Clone)]
pub struct FakeSpotify {
    state: Arc<Mutex<FakeState>>,
    gate: Arc<AsyncMutex<()>>,
}

impl FakeSpotify {
    pub fn with_items(items: Vec<Value>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                items,
                ..Default::default()
            })),
            gate: Arc::new(AsyncMutex::new(())),
        }
    }

    /// `n` tracks saved one minute apart, newest first, ending at `newest_ms`.
    pub fn with_tracks(n: usize, newest_ms: i64) -> Self {
        Self::with_items(saved_items(n, newest_ms))
    }

    /// Keep advertising `next` on the final page.
    pub fn advertise_next_on_last(&self) {
        self.state.lock().unwrap().advertise_next_on_last = true;
    }

    pub fn rate_limit_request(&self, request: usize, retry_after: &str) {
        self.state
            .lock()
            .unwrap()
            .rate_limited_requests
            .insert(request, retry_after.to_string());
    }

    pub fn fail_with(&self, status: Option<u16>) {
        self.state.lock().unwrap().fail_status = status;
    }

    pub fn set_items(&self, items: Vec<Value>) {
        self.state.lock().unwrap().items = items;
    }

    /// Hold every request until the guard is dropped.
    pub async fn hold(&self) -> OwnedMutexGuard<()> {
        self.gate.clone().lock_owned().await
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    fn respond(&self, request: &HttpRequest, offset: usize, limit: usize) -> HttpResponse {
        let mut state = self.state.lock().unwrap();
        let request_number = state.requests.len();

        if let Some(status) = state.fail_status {
            return HttpResponse::new(status, "{\"error\":\"fake failure\"}");
        }
        if let Some(retry_after) = state.rate_limited_requests.remove(&request_number) {
            return HttpResponse::new(429, "").with_header("Retry-After", retry_after);
        }
        assert_eq!(
            request.headers.get("Authorization").map(String::as_str),
            Some("Bearer access-token")
        );

        let total = state.items.len();
        let end = (offset + limit).min(total);
        let page: Vec<Value> = state.items[offset.min(total)..end].to_vec();
        let next = (end < total || state.advertise_next_on_last)
            .then(|| format!("{API_BASE}/me/tracks?offset={end}&limit={limit}"));

        let body = json!({
            "items": page,
            "next": next,
            "total": total,
            "offset": offset,
            "limit": limit,
        });
        HttpResponse::new(200, serde_json::to_vec(&body).unwrap())
    }
}

fn query_param(url: &str, name: &str) -> Option<usize> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .and_then(|(_, v)| v.parse().ok())
}

#[async_trait]
impl HttpClient for FakeSpotify {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        if !request.url.starts_with(&format!("{API_BASE}/me/tracks")) {
            return Err(BridgeError::Network(format!("unexpected url {}", request.url)));
        }
        let offset = query_param(&request.url, "offset").unwrap_or(0);
        let limit = query_param(&request.url, "limit").unwrap_or(20);

        self.state.lock().unwrap().requests.push(RecordedRequest {
            url: request.url.clone(),
            offset,
            at: tokio::time::Instant::now(),
        });

        let _gate = self.gate.lock().await;
        Ok(self.respond(&request, offset, limit))
    }
}

pub fn saved_item(n: usize, added_at_ms: i64) -> Value {
    saved_item_named(n, &format!("Song {n}"), &format!("Artist {n}"), added_at_ms)
}

pub fn saved_item_named(n: usize, title: &str, artist: &str, added_at_ms: i64) -> Value {
    let added_at = chrono::DateTime::from_timestamp_millis(added_at_ms)
        .unwrap()
        .to_rfc3339();
    json!({
        "added_at": added_at,
        "track": {
            "id": format!("track{n}"),
            "name": title,
            "artists": [{"name": artist}],
            "album": {
                "name": format!("Album {n}"),
                "images": [
                    {"url": format!("https://img.test/{n}/640"), "width": 640, "height": 640},
                    {"url": format!("https://img.test/{n}/300"), "width": 300, "height": 300}
                ]
            },
            "duration_ms": 200_500,
            "preview_url": format!("https://preview.test/{n}.mp3"),
            "external_urls": {"spotify": format!("https://open.spotify.com/track/track{n}")},
            "popularity": 50
        }
    })
}

pub fn saved_items(n: usize, newest_ms: i64) -> Vec<Value> {
    (0..n)
        .map(|i| saved_item(i, newest_ms - (i as i64) * 60_000))
        .collect()
}

// ============================================================================
// Auth and settings
// ============================================================================

pub struct FakeTokens {
    authenticated: AtomicBool,
}

impl FakeTokens {
    pub fn signed_in() -> Arc<Self> {
        Arc::new(Self {
            authenticated: AtomicBool::new(true),
        })
    }

    pub fn sign_out(&self) {
        self.authenticated.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccessTokenProvider for FakeTokens {
    async fn access_token(&self) -> core_auth::Result<String> {
        if self.authenticated.load(Ordering::SeqCst) {
            Ok("access-token".to_string())
        } else {
            Err(AuthError::NotAuthenticated)
        }
    }

    async fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }
}

/// Settings store over a plain map. Stays on the test runtime, so paused
/// time only advances when the code under test is really waiting.
#[derive(Clone, Default)]
pub struct MemorySettings {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySettings {
    fn put(&self, key: &str, value: String) {
        self.data.lock().unwrap().insert(key.to_string(), value);
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> BridgeResult<Option<T>> {
        match self.data.lock().unwrap().get(key) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| BridgeError::OperationFailed(format!("bad value for {key}"))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.put(key, value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.put(key, value.to_string());
        Ok(())
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        self.parsed(key)
    }

    async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()> {
        self.put(key, value.to_string());
        Ok(())
    }

    async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>> {
        self.parsed(key)
    }

    async fn set_f64(&self, key: &str, value: f64) -> BridgeResult<()> {
        self.put(key, value.to_string());
        Ok(())
    }

    async fn get_f64(&self, key: &str) -> BridgeResult<Option<f64>> {
        self.parsed(key)
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> BridgeResult<bool> {
        Ok(self.data.lock().unwrap().contains_key(key))
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.data.lock().unwrap().keys().cloned().collect())
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.data.lock().unwrap().clear();
        Ok(())
    }
}

pub fn settings_store() -> Arc<MemorySettings> {
    Arc::new(MemorySettings::default())
}

// ============================================================================
// Library sync harness
// ============================================================================

pub struct Harness {
    pub spotify: FakeSpotify,
    pub tokens: Arc<FakeTokens>,
    pub store: Arc<InMemoryLikedSongStore>,
    pub settings: Arc<MemorySettings>,
    pub clock: Arc<ManualClock>,
    pub event_bus: EventBus,
    pub coordinator: Arc<LibrarySyncCoordinator>,
}

impl Harness {
    pub async fn new(spotify: FakeSpotify) -> Self {
        Self::with_settings(spotify, FetcherSettings::default(), LibrarySyncSettings::default())
            .await
    }

    pub async fn with_settings(
        spotify: FakeSpotify,
        fetcher_settings: FetcherSettings,
        sync_settings: LibrarySyncSettings,
    ) -> Self {
        let clock = Arc::new(ManualClock::at_millis(START_MS));
        let tokens = FakeTokens::signed_in();
        let store = Arc::new(InMemoryLikedSongStore::new(clock.clone()));
        let settings = settings_store();
        let event_bus = EventBus::new(1024);

        let fetcher = Arc::new(SpotifyFetcher::new(
            Arc::new(spotify.clone()),
            clock.clone(),
            API_BASE,
            fetcher_settings,
        ));
        let coordinator = Arc::new(LibrarySyncCoordinator::new(
            tokens.clone(),
            fetcher,
            store.clone(),
            settings.clone(),
            event_bus.clone(),
            clock.clone(),
            sync_settings,
        ));

        Self {
            spotify,
            tokens,
            store,
            settings,
            clock,
            event_bus,
            coordinator,
        }
    }
}
