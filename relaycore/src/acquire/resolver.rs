//! Resolver-API acquisition strategies
//!
//! The resolver is an external HTTP API that turns a YouTube URL into a
//! direct MP4 download URL plus metadata. Two strategies share one client:
//!
//! - [`ResolverDownloadStrategy`] stages the MP4 into the download
//!   directory (primary; local files survive flaky upstream connections
//!   during the long transport phase).
//! - [`ResolverDirectStrategy`] hands the download URL straight to the
//!   transport without staging (fallback when staging fails, e.g. a full
//!   disk).

use crate::acquire::{AcquiredContent, AcquisitionStrategy, ContentSource, StagingGuard};
use crate::error::AcquireError;
use crate::playlist::PlaylistItem;
use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Response envelope of the resolver API
#[derive(Debug, Deserialize)]
struct ResolverResponse {
    status: Option<u16>,
    result: Option<ResolverResult>,
}

#[derive(Debug, Deserialize)]
struct ResolverResult {
    metadata: Option<ResolverMetadata>,
    download: Option<ResolverDownload>,
}

#[derive(Debug, Deserialize)]
struct ResolverMetadata {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
    title: Option<String>,
    seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ResolverDownload {
    status: Option<bool>,
    url: Option<String>,
}

/// A resolved item: direct download URL plus best-effort metadata
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub download_url: String,
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub duration_secs: Option<u64>,
}

/// HTTP client for the resolver API, with per-strategy retry policy
///
/// Transport-level failures (connection reset, DNS, 5xx surfaced as reqwest
/// errors) are retried with exponential backoff and a little jitter. An
/// answer that rejects the request is terminal: retrying an intentional
/// refusal only burns quota.
#[derive(Debug, Clone)]
pub struct ResolverClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl ResolverClient {
    pub fn new(base_url: impl Into<String>, max_retries: u32, retry_base_delay: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            max_retries,
            retry_base_delay,
        }
    }

    /// Builds the client from the global configuration
    pub fn from_config() -> Self {
        let config = relayconfig::get_config();
        Self::new(
            config.get_resolver_base_url(),
            config.get_resolver_max_retries(),
            Duration::from_millis(config.get_resolver_retry_base_delay_ms()),
        )
    }

    /// Resolves a playlist URL into a download URL and metadata
    pub async fn resolve(&self, url: &str) -> Result<ResolvedMedia, AcquireError> {
        let endpoint = format!("{}/api/ytmp4", self.base_url);
        let mut last_error: Option<AcquireError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying resolver call");
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .get(&endpoint)
                .query(&[("url", url)])
                .send()
                .await;

            match response {
                Ok(response) => {
                    let body: ResolverResponse = response.json().await?;
                    return Self::validate(body);
                }
                Err(error) => {
                    warn!(attempt, %error, "resolver call failed");
                    last_error = Some(AcquireError::Http(error));
                }
            }
        }

        Err(last_error.unwrap_or(AcquireError::MissingDownloadUrl))
    }

    /// Exponential backoff with up to 100 ms of jitter
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.retry_base_delay * 2u32.saturating_pow(attempt - 1);
        let jitter = rand::rng().random_range(0..100);
        exp + Duration::from_millis(jitter)
    }

    fn validate(body: ResolverResponse) -> Result<ResolvedMedia, AcquireError> {
        if body.status != Some(200) {
            return Err(AcquireError::ResolverRejected(format!(
                "status {:?}",
                body.status
            )));
        }

        let result = body
            .result
            .ok_or_else(|| AcquireError::ResolverRejected("empty result".to_string()))?;

        let download = result.download.ok_or(AcquireError::MissingDownloadUrl)?;
        if download.status != Some(true) {
            return Err(AcquireError::ResolverRejected(
                "download not available".to_string(),
            ));
        }
        let download_url = download.url.ok_or(AcquireError::MissingDownloadUrl)?;

        let metadata = result.metadata;
        Ok(ResolvedMedia {
            download_url,
            video_id: metadata.as_ref().and_then(|m| m.video_id.clone()),
            title: metadata.as_ref().and_then(|m| m.title.clone()),
            duration_secs: metadata.as_ref().and_then(|m| m.seconds),
        })
    }

    /// Streams the resolved download URL into `target`
    async fn download_to(&self, download_url: &str, target: &Path) -> Result<(), AcquireError> {
        let response = self.client.get(download_url).send().await?;
        let mut stream = response.bytes_stream();

        let mut file = tokio::fs::File::create(target).await?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}

/// Primary strategy: resolve, then stage the MP4 locally
pub struct ResolverDownloadStrategy {
    client: Arc<ResolverClient>,
    download_dir: PathBuf,
}

impl ResolverDownloadStrategy {
    pub fn new(client: Arc<ResolverClient>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            download_dir: download_dir.into(),
        }
    }
}

#[async_trait]
impl AcquisitionStrategy for ResolverDownloadStrategy {
    fn name(&self) -> &'static str {
        "resolver-download"
    }

    async fn acquire(&self, item: &PlaylistItem) -> Result<AcquiredContent, AcquireError> {
        let resolved = self.client.resolve(&item.url).await?;

        let video_id = resolved
            .video_id
            .clone()
            .or_else(|| item.video_id.clone())
            .ok_or_else(|| AcquireError::UnknownVideoId(item.url.clone()))?;

        let target = self.download_dir.join(format!("{video_id}.mp4"));
        info!(item = item.short_id(), target = %target.display(), "staging content");

        let guard = StagingGuard::new(target.clone());
        self.client.download_to(&resolved.download_url, &target).await?;
        guard.disarm();

        Ok(AcquiredContent {
            source: ContentSource::Staged(target),
            strategy: self.name(),
            title: resolved.title,
            duration_secs: resolved.duration_secs,
        })
    }
}

/// Fallback strategy: resolve and pass the remote URL through unstaged
pub struct ResolverDirectStrategy {
    client: Arc<ResolverClient>,
}

impl ResolverDirectStrategy {
    pub fn new(client: Arc<ResolverClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AcquisitionStrategy for ResolverDirectStrategy {
    fn name(&self) -> &'static str {
        "resolver-direct"
    }

    async fn acquire(&self, item: &PlaylistItem) -> Result<AcquiredContent, AcquireError> {
        let resolved = self.client.resolve(&item.url).await?;
        debug!(item = item.short_id(), "passing remote URL to transport unstaged");

        Ok(AcquiredContent {
            source: ContentSource::Remote(resolved.download_url),
            strategy: self.name(),
            title: resolved.title,
            duration_secs: resolved.duration_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> ResolverResponse {
        serde_json::from_str(json).expect("valid test json")
    }

    #[test]
    fn validate_accepts_complete_answer() {
        let body = response(
            r#"{
                "status": 200,
                "result": {
                    "metadata": {"videoId": "abc123", "title": "Clip", "seconds": 245},
                    "download": {"status": true, "url": "https://cdn.example/abc123.mp4"}
                }
            }"#,
        );

        let resolved = ResolverClient::validate(body).expect("resolved");
        assert_eq!(resolved.video_id.as_deref(), Some("abc123"));
        assert_eq!(resolved.duration_secs, Some(245));
        assert_eq!(resolved.download_url, "https://cdn.example/abc123.mp4");
    }

    #[test]
    fn validate_rejects_bad_status() {
        let body = response(r#"{"status": 403}"#);
        assert!(matches!(
            ResolverClient::validate(body),
            Err(AcquireError::ResolverRejected(_))
        ));
    }

    #[test]
    fn validate_rejects_unavailable_download() {
        let body = response(
            r#"{"status": 200, "result": {"download": {"status": false}}}"#,
        );
        assert!(matches!(
            ResolverClient::validate(body),
            Err(AcquireError::ResolverRejected(_))
        ));
    }

    #[test]
    fn validate_requires_a_download_url() {
        let body = response(
            r#"{"status": 200, "result": {"download": {"status": true}}}"#,
        );
        assert!(matches!(
            ResolverClient::validate(body),
            Err(AcquireError::MissingDownloadUrl)
        ));
    }

    #[test]
    fn missing_metadata_is_still_a_success() {
        let body = response(
            r#"{"status": 200, "result": {"download": {"status": true, "url": "https://cdn.example/x.mp4"}}}"#,
        );

        let resolved = ResolverClient::validate(body).expect("resolved");
        assert_eq!(resolved.title, None);
        assert_eq!(resolved.duration_secs, None);
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let client = ResolverClient::new("https://resolver.test", 3, Duration::from_millis(100));

        let first = client.backoff_delay(1);
        let third = client.backoff_delay(3);
        assert!(first >= Duration::from_millis(100));
        assert!(third >= Duration::from_millis(400));
        assert!(third < Duration::from_millis(600));
    }
}
