use super::ImageFetcher;
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::DynamicImage;
use std::time::Duration;

/// Downloads and decodes remote images.
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, url: &str) -> Result<DynamicImage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch image {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch image {}: status {}", url, response.status());
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read image body {}", url))?;
        image::load_from_memory(&bytes).with_context(|| format!("Failed to decode image {}", url))
    }
}
