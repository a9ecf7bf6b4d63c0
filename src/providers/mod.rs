//! External collaborators of the pipeline: the media extractor, the image
//! fetcher and media servers.
//!
//! The pipeline only depends on the traits; the HTTP implementations are
//! wired in by the binary.

mod extractor;
mod images;
mod media_server;

pub use extractor::HttpExtractorClient;
pub use images::HttpImageFetcher;
pub use media_server::HttpMediaServerClient;

use crate::catalog::{Media, MediaServer, Source};
use crate::policy::FormatSelection;
use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One item returned by a source enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Per-source key of the item. Items with an empty key cannot be indexed.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl RemoteItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
        }
    }
}

/// What the extractor actually downloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadResult {
    /// Format code such as `137+140` or `22`.
    pub format_code: String,
    pub container: String,
}

#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Lists the items currently published by `source`. An empty list means
    /// the source could not be enumerated.
    async fn enumerate_source(&self, source: &Source) -> Result<Vec<RemoteItem>>;

    /// Fetches the metadata document of a media item.
    async fn fetch_metadata(&self, source: &Source, media: &Media) -> Result<serde_json::Value>;

    /// Downloads `selection` of `media` to `output_path`.
    async fn download(
        &self,
        source: &Source,
        media: &Media,
        selection: &FormatSelection,
        output_path: &Path,
    ) -> Result<DownloadResult>;
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<DynamicImage>;
}

#[async_trait]
pub trait MediaServerClient: Send + Sync {
    /// Asks `server` to rescan its libraries.
    async fn update(&self, server: &MediaServer) -> Result<()>;
}
