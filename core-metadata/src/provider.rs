//! Catalog provider client
//!
//! Thin typed wrapper over the provider's HTTP surface:
//!
//! - `GET /search?query=` and `GET /trending` return catalog listings
//! - `GET /meta?id=` lists the caption languages of one track
//! - `GET /download-audio?id=` streams the audio asset
//! - `GET /download-lyrics?id=&lang=` returns a caption body, or 404
//!
//! JSON endpoints go through the client's retry path since they are plain
//! idempotent reads. The audio stream does not: a half-consumed stream
//! cannot be resumed, so the download manager reports the failure instead.

use crate::error::{MetadataError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_library::models::{CaptionTrack, CatalogItem};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout applied to every JSON and caption request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Caption listing of one track, as returned by `/meta`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TrackMeta {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tracks: Vec<CaptionTrack>,
}

pub struct CatalogClient {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    request_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl CatalogClient {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http_client,
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search the catalog. A blank query returns an empty list without a
    /// request.
    pub async fn search(&self, query: &str) -> Result<Vec<CatalogItem>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/search?query={}",
            self.base_url,
            urlencoding::encode(query)
        );
        let items: Vec<CatalogItem> = self.get_json("search", url).await?;
        debug!(query, results = items.len(), "Catalog search finished");
        Ok(items)
    }

    pub async fn trending(&self) -> Result<Vec<CatalogItem>> {
        let url = format!("{}/trending", self.base_url);
        self.get_json("trending", url).await
    }

    /// Caption languages available for a track.
    pub async fn track_meta(&self, id: &str) -> Result<TrackMeta> {
        let url = format!("{}/meta?id={}", self.base_url, urlencoding::encode(id));
        self.get_json("meta", url).await
    }

    pub fn audio_url(&self, id: &str) -> String {
        format!(
            "{}/download-audio?id={}",
            self.base_url,
            urlencoding::encode(id)
        )
    }

    /// Open the raw audio byte stream. No timeout applies beyond the HTTP
    /// client's own.
    pub async fn audio_stream(
        &self,
        id: &str,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        self.http_client
            .download_stream(self.audio_url(id))
            .await
            .map_err(|e| MetadataError::ProviderRequest {
                endpoint: "download-audio".to_string(),
                status: None,
                message: e.to_string(),
            })
    }

    /// Fetch a caption body. `Ok(None)` when the provider has no caption for
    /// that language.
    pub async fn caption(&self, id: &str, language: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/download-lyrics?id={}&lang={}",
            self.base_url,
            urlencoding::encode(id),
            urlencoding::encode(language)
        );

        let response = self.get("download-lyrics", url).await?;
        if response.is_not_found() {
            debug!(track_id = id, language, "Provider has no caption");
            return Ok(None);
        }
        let response = Self::ensure_success("download-lyrics", response)?;

        let body = response
            .text()
            .map_err(|e| MetadataError::InvalidResponse(format!("caption body: {}", e)))?;
        Ok(Some(body))
    }

    async fn get(&self, endpoint: &str, url: String) -> Result<HttpResponse> {
        let request = HttpRequest::get(url)
            .header("Accept", "application/json, text/vtt, text/plain")
            .timeout(self.request_timeout);

        self.http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await
            .map_err(|e| {
                warn!(endpoint, error = %e, "Provider request failed");
                MetadataError::ProviderRequest {
                    endpoint: endpoint.to_string(),
                    status: None,
                    message: e.to_string(),
                }
            })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, url: String) -> Result<T> {
        let response = self.get(endpoint, url).await?;
        let response = Self::ensure_success(endpoint, response)?;
        response
            .json()
            .map_err(|e| MetadataError::InvalidResponse(format!("{}: {}", endpoint, e)))
    }

    fn ensure_success(endpoint: &str, response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            return Ok(response);
        }
        Err(MetadataError::ProviderRequest {
            endpoint: endpoint.to_string(),
            status: Some(response.status),
            message: format!(
                "HTTP {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            ),
        })
    }
}
