//! Search catalog used by auto-sync to replace 30 second previews with
//! full-length audio and better artwork.
//!
//! Lookups never fail the caller: errors are logged and reported as no match.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Preferred download rendition (320 kbps in the catalog's ordering).
const PREFERRED_DOWNLOAD_INDEX: usize = 4;

/// Preferred artwork rendition (500x500).
const PREFERRED_IMAGE_INDEX: usize = 2;

/// Fields borrowed from the best catalog hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMatch {
    pub audio_url: String,
    pub image_url: Option<String>,
    pub duration_secs: Option<u32>,
}

#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// Best match for a title/artist pair, if any.
    async fn find(&self, title: &str, artist: &str) -> Option<CatalogMatch>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    image: Vec<MediaLink>,
    #[serde(default)]
    download_url: Vec<MediaLink>,
    #[serde(default)]
    duration: Option<DurationValue>,
}

#[derive(Debug, Deserialize)]
struct MediaLink {
    #[serde(alias = "link")]
    url: String,
}

/// The catalog reports duration as a number or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Number(u64),
    Text(String),
}

impl DurationValue {
    fn seconds(&self) -> Option<u32> {
        match self {
            DurationValue::Number(n) => u32::try_from(*n).ok(),
            DurationValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn pick(links: &[MediaLink], preferred: usize) -> Option<&MediaLink> {
    links.get(preferred).or_else(|| links.last())
}

/// [`TrackCatalog`] over `GET {base}/api/music/search?query=`.
pub struct HttpTrackCatalog {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
}

impl HttpTrackCatalog {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, query: &str) -> Option<String> {
        url::Url::parse_with_params(
            &format!("{}/api/music/search", self.base_url),
            &[("query", query)],
        )
        .map(String::from)
        .map_err(|e| warn!(error = %e, base_url = %self.base_url, "Invalid search base URL"))
        .ok()
    }
}

#[async_trait]
impl TrackCatalog for HttpTrackCatalog {
    #[instrument(skip(self))]
    async fn find(&self, title: &str, artist: &str) -> Option<CatalogMatch> {
        let query = format!("{} {}", title, artist);
        let url = self.search_url(query.trim())?;

        let response = match self
            .http_client
            .execute(HttpRequest::get(url).timeout(SEARCH_TIMEOUT))
            .await
        {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                warn!(status = response.status, "Catalog search failed");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Catalog search request failed");
                return None;
            }
        };

        let parsed: SearchResponse = match serde_json::from_slice(&response.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Unreadable catalog search response");
                return None;
            }
        };

        let hit = parsed
            .data?
            .results
            .into_iter()
            .find(|r| !r.download_url.is_empty())?;

        let found = CatalogMatch {
            audio_url: pick(&hit.download_url, PREFERRED_DOWNLOAD_INDEX)?.url.clone(),
            image_url: pick(&hit.image, PREFERRED_IMAGE_INDEX).map(|l| l.url.clone()),
            duration_secs: hit.duration.as_ref().and_then(DurationValue::seconds),
        };
        debug!(audio_url = %found.audio_url, "Catalog match found");
        Some(found)
    }
}
