//! HTTP client for the extraction sidecar.

use super::{DownloadResult, MediaExtractor, RemoteItem};
use crate::catalog::{Media, Source};
use crate::policy::FormatSelection;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct EnumerateRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct EnumerateResponse {
    #[serde(default)]
    items: Vec<RemoteItem>,
}

#[derive(Serialize)]
struct MetadataRequest<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct DownloadRequest<'a> {
    url: &'a str,
    format: &'a str,
    container: &'a str,
    output_path: &'a Path,
}

#[derive(Deserialize)]
struct DownloadResponse {
    format: String,
    container: String,
}

/// Client of the extraction service, which enumerates sources, probes media
/// and writes downloads to the path it is given.
pub struct HttpExtractorClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExtractorClient {
    /// Create a new extractor client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the extraction service (e.g., "http://localhost:9000")
    /// * `timeout_sec` - Request timeout in seconds, downloads included
    pub fn new(base_url: &str, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to connect to extractor at {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Extractor request {} failed with status: {}", path, response.status());
        }
        Ok(response)
    }
}

#[async_trait]
impl MediaExtractor for HttpExtractorClient {
    async fn enumerate_source(&self, source: &Source) -> Result<Vec<RemoteItem>> {
        let url = source.index_url();
        debug!("Enumerating {}", url);
        let response: EnumerateResponse = self
            .post("/enumerate", &EnumerateRequest { url: &url })
            .await?
            .json()
            .await
            .context("Failed to parse enumerate response")?;
        Ok(response.items)
    }

    async fn fetch_metadata(&self, _source: &Source, media: &Media) -> Result<serde_json::Value> {
        let url = media.url();
        self.post("/metadata", &MetadataRequest { url: &url })
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse metadata of {}", media.key))
    }

    async fn download(
        &self,
        source: &Source,
        media: &Media,
        selection: &FormatSelection,
        output_path: &Path,
    ) -> Result<DownloadResult> {
        let url = media.url();
        let format = selection.format_code();
        let request = DownloadRequest {
            url: &url,
            format: &format,
            container: source.extension(),
            output_path,
        };
        let response: DownloadResponse = self
            .post("/download", &request)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse download response of {}", media.key))?;

        Ok(DownloadResult {
            format_code: response.format,
            container: response.container,
        })
    }
}
