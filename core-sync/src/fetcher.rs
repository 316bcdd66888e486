//! # Saved-Tracks Fetcher
//!
//! Pages through `GET /me/tracks` and returns the ordered union of all pages,
//! newest first.
//!
//! ## Termination
//!
//! Pagination stops on the first page that has no `next` link, is empty, or
//! holds fewer than `page_size` items. When the API still advertises `next`
//! on a full final page, one extra request confirms the end with an empty
//! page.
//!
//! ## Rate limiting
//!
//! A 429 response sleeps for `Retry-After` seconds (default 5) and retries
//! the same offset. There is no retry limit and no page is skipped. Every
//! other failure surfaces unmasked: 401 as [`SyncError::Unauthorized`], other
//! non-2xx as [`SyncError::Http`], malformed bodies as [`SyncError::Parse`].

use crate::error::{Result, SyncError};
use crate::types::{SavedTrackItem, SavedTracksPage};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use chrono::DateTime;
use core_runtime::config::FetcherSettings;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Per-request timeout for the Web API.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum bytes of an error body carried into [`SyncError::Http`].
const MAX_ERROR_BODY: usize = 256;

/// Optional bounds for a fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchLimits {
    /// Keep only items saved strictly after this instant (epoch ms).
    pub cutoff_ms: Option<i64>,
    /// Stop once this many items were collected.
    pub max_items: Option<usize>,
}

/// Paginated reader of the user's saved tracks.
pub struct SpotifyFetcher {
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    api_base_url: String,
    settings: FetcherSettings,
}

impl SpotifyFetcher {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        api_base_url: impl Into<String>,
        settings: FetcherSettings,
    ) -> Self {
        Self {
            http_client,
            clock,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            settings,
        }
    }

    pub fn settings(&self) -> &FetcherSettings {
        &self.settings
    }

    /// Fetch the whole collection.
    ///
    /// `on_page` receives `(fetched_so_far, total)` after every page.
    pub async fn fetch_all<F>(&self, access_token: &str, on_page: F) -> Result<Vec<SavedTrackItem>>
    where
        F: FnMut(usize, Option<u64>) + Send,
    {
        self.paginate(access_token, FetchLimits::default(), on_page)
            .await
    }

    /// Fetch items saved after `cutoff_ms`, at most `max_items` of them.
    ///
    /// The feed is newest first, so the first page containing an older item
    /// ends pagination.
    pub async fn fetch_recent(
        &self,
        access_token: &str,
        cutoff_ms: i64,
        max_items: Option<usize>,
    ) -> Result<Vec<SavedTrackItem>> {
        let limits = FetchLimits {
            cutoff_ms: Some(cutoff_ms),
            max_items,
        };
        self.paginate(access_token, limits, |_, _| {}).await
    }

    #[instrument(skip(self, access_token, on_page), fields(page_size = self.settings.page_size))]
    async fn paginate<F>(
        &self,
        access_token: &str,
        limits: FetchLimits,
        mut on_page: F,
    ) -> Result<Vec<SavedTrackItem>>
    where
        F: FnMut(usize, Option<u64>) + Send,
    {
        let page_size = self.settings.page_size.max(1) as usize;
        let mut items: Vec<SavedTrackItem> = Vec::new();
        let mut offset: u64 = 0;
        let mut requests = 0usize;

        loop {
            if requests > 0 {
                tokio::time::sleep(self.settings.page_delay).await;
            }

            let page = self.fetch_page(access_token, offset).await?;
            requests += 1;

            let page_len = page.items.len();
            let has_next = page.next.is_some();
            let total = page.total;
            let mut reached_cutoff = false;

            for item in page.items {
                if let Some(cutoff) = limits.cutoff_ms {
                    let is_recent = item
                        .added_at
                        .as_deref()
                        .and_then(parse_added_at)
                        .is_some_and(|added| added > cutoff);
                    if !is_recent {
                        reached_cutoff = true;
                        continue;
                    }
                }
                items.push(item);
            }

            let mut capped = false;
            if let Some(max) = limits.max_items {
                if items.len() >= max {
                    items.truncate(max);
                    capped = true;
                }
            }

            on_page(items.len(), total);
            debug!(offset, page_len, fetched = items.len(), has_next, "Fetched saved-tracks page");

            if !has_next || page_len == 0 || page_len < page_size || reached_cutoff || capped {
                break;
            }
            offset += page_len as u64;
        }

        info!(requests, fetched = items.len(), "Finished fetching saved tracks");
        Ok(items)
    }

    /// Fetch one page, sleeping through 429 responses.
    async fn fetch_page(&self, access_token: &str, offset: u64) -> Result<SavedTracksPage> {
        loop {
            let request = HttpRequest::get(self.page_url(offset))
                .bearer_token(access_token)
                .no_cache()
                .header("Accept", "application/json")
                .timeout(REQUEST_TIMEOUT);

            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|e| SyncError::Network(e.to_string()))?;

            match response.status {
                429 => {
                    let wait = retry_after(&response, self.settings.default_retry_after);
                    warn!(offset, wait_ms = wait.as_millis() as u64, "Rate limited by Spotify, backing off");
                    tokio::time::sleep(wait).await;
                }
                401 => {
                    warn!(offset, "Spotify rejected the access token");
                    return Err(SyncError::Unauthorized);
                }
                status if !response.is_success() => {
                    let mut message = String::from_utf8_lossy(&response.body).to_string();
                    if message.len() > MAX_ERROR_BODY {
                        let mut end = MAX_ERROR_BODY;
                        while !message.is_char_boundary(end) {
                            end -= 1;
                        }
                        message.truncate(end);
                    }
                    warn!(offset, status, "Saved-tracks request failed");
                    return Err(SyncError::Http { status, message });
                }
                _ => {
                    return serde_json::from_slice(&response.body).map_err(|e| {
                        SyncError::Parse(format!("saved-tracks page at offset {}: {}", offset, e))
                    });
                }
            }
        }
    }

    fn page_url(&self, offset: u64) -> String {
        format!(
            "{}/me/tracks?limit={}&offset={}&_t={}",
            self.api_base_url,
            self.settings.page_size,
            offset,
            self.clock.unix_timestamp_millis()
        )
    }
}

/// Parse an RFC 3339 `added_at` into epoch ms.
pub(crate) fn parse_added_at(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Longest `Retry-After` honored before retrying anyway.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// `Retry-After` in seconds, or `default` when missing or unparseable.
///
/// Values above [`MAX_RETRY_AFTER`] are clamped.
fn retry_after(response: &HttpResponse, default: Duration) -> Duration {
    response
        .header("Retry-After")
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map_or(default, |secs| {
            Duration::from_secs_f64(secs.min(MAX_RETRY_AFTER.as_secs_f64()))
        })
}
