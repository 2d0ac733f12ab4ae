//! GitHub release metadata and asset downloads.
//!
//! [`ReleaseClient`] talks to the GitHub REST API (`GET /repos/{owner}/{repo}/releases/latest`)
//! and streams release assets to disk. Downloads never hold the whole asset in
//! memory: the body is read chunk by chunk, written through a fixed-size buffer,
//! and progress is reported after every flush.

use crate::core::error::{IoResultExt, Result, UpdateError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Size of the write buffer used while downloading.
pub const DOWNLOAD_CHUNK_SIZE: usize = 128 * 1024;

/// Time limits for release lookups and downloads.
///
/// `request` bounds a whole metadata request. Downloads are bounded only by
/// `read_idle`, the longest gap allowed between two reads, so a slow but
/// steady transfer may take as long as it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read_idle: Duration,
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            read_idle: Duration::from_secs(60),
            request: Duration::from_secs(60),
        }
    }
}

/// Latest-release metadata as returned by the GitHub API.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReleaseMetadata {
    /// The release tag, e.g. `v1.2.3`
    #[serde(rename = "tag_name", default)]
    pub tag: String,
    /// Downloadable files attached to the release, in publication order
    #[serde(default)]
    pub assets: Vec<AssetMetadata>,
}

/// A file attached to a release.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AssetMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "browser_download_url", default)]
    pub download_url: String,
    #[serde(rename = "size", default)]
    pub size_bytes: u64,
}

impl ReleaseMetadata {
    /// First asset whose name contains `filter`, ignoring case.
    ///
    /// Assets without a name or download URL never match, and neither do
    /// checksum files published next to the package.
    #[must_use]
    pub fn find_asset(&self, filter: &str) -> Option<&AssetMetadata> {
        let needle = filter.to_lowercase();
        self.assets.iter().find(|asset| {
            !asset.name.is_empty()
                && !asset.download_url.trim().is_empty()
                && !is_checksum_name(&asset.name)
                && asset.name.to_lowercase().contains(&needle)
        })
    }
}

/// `checksums.txt`, `SHA256SUMS` and `*.sha256` are checksum listings, not packages.
#[must_use]
pub fn is_checksum_name(name: &str) -> bool {
    let name = name.to_lowercase();
    name == "checksums.txt" || name == "sha256sums" || name.ends_with(".sha256")
}

/// HTTP client for release lookups and asset downloads.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    http: reqwest::Client,
    api_url: String,
    request_timeout: Duration,
}

impl ReleaseClient {
    /// Creates a client against `api_url` (normally [`DEFAULT_API_URL`]).
    pub fn new(api_url: &str) -> Result<Self> {
        Self::with_timeouts(api_url, Timeouts::default())
    }

    pub fn with_timeouts(api_url: &str, timeouts: Timeouts) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read_idle)
            .build()
            .map_err(|e| UpdateError::http(api_url, e))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            request_timeout: timeouts.request,
        })
    }

    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Fetches the latest published release of `owner/repo`.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::NotFound`] on HTTP 404
    /// - [`UpdateError::Network`] on transport errors, other non-2xx statuses,
    ///   or a body that is not release JSON
    pub async fn fetch_latest_release(&self, owner: &str, repo: &str) -> Result<ReleaseMetadata> {
        let url = format!("{}/repos/{owner}/{repo}/releases/latest", self.api_url);
        debug!("Fetching latest release from {}", url);

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| UpdateError::http(&url, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(UpdateError::not_found(format!("no published release for {owner}/{repo}")));
        }
        if !status.is_success() {
            return Err(UpdateError::network(&url, format!("HTTP {status}")));
        }

        let body = response.bytes().await.map_err(|e| UpdateError::http(&url, e))?;
        let release: ReleaseMetadata = serde_json::from_slice(&body)
            .map_err(|e| UpdateError::network(&url, format!("malformed release response: {e}")))?;

        debug!("Latest release {} has {} assets", release.tag, release.assets.len());
        Ok(release)
    }

    /// Fetches a small text document, such as a checksum list.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| UpdateError::http(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::network(url, format!("HTTP {status}")));
        }
        response.text().await.map_err(|e| UpdateError::http(url, e))
    }

    /// Streams `url` into `dest`, reporting `(bytes_written, total)` after every chunk.
    ///
    /// `total` is `None` when the server sends no `Content-Length`. On error a
    /// partial file may remain at `dest`.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Network`] on transport errors or a non-2xx status
    /// - [`UpdateError::FileSystem`] if `dest` cannot be written
    /// - [`UpdateError::Cancelled`] if `cancel` fires
    pub async fn download_asset<F>(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<u64>
    where
        F: FnMut(u64, Option<u64>),
    {
        info!("Downloading {} to {}", url, dest.display());

        let mut response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(UpdateError::Cancelled),
            sent = self.http.get(url).send() => sent.map_err(|e| UpdateError::http(url, e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::network(url, format!("HTTP {status}")));
        }

        let total = response.content_length();
        let mut file = File::create(dest).await.fs_context("create", dest)?;
        let mut buffer: Vec<u8> = Vec::with_capacity(DOWNLOAD_CHUNK_SIZE);
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(UpdateError::Cancelled),
                chunk = response.chunk() => chunk.map_err(|e| UpdateError::http(url, e))?,
            };

            let Some(bytes) = chunk else { break };
            buffer.extend_from_slice(&bytes);

            if buffer.len() >= DOWNLOAD_CHUNK_SIZE {
                file.write_all(&buffer).await.fs_context("write", dest)?;
                written += buffer.len() as u64;
                buffer.clear();
                on_progress(written, total);
            }
        }

        if !buffer.is_empty() {
            file.write_all(&buffer).await.fs_context("write", dest)?;
            written += buffer.len() as u64;
            on_progress(written, total);
        }
        file.flush().await.fs_context("flush", dest)?;

        info!("Downloaded {} bytes", written);
        Ok(written)
    }
}
