//! Library refresh requests for Plex and Jellyfin servers.

use super::MediaServerClient;
use crate::catalog::{MediaServer, MediaServerKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

pub struct HttpMediaServerClient {
    client: reqwest::Client,
    /// Used for servers configured with `verify_https = false`.
    insecure_client: reqwest::Client,
}

impl HttpMediaServerClient {
    pub fn new(timeout_sec: u64) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_sec);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let insecure_client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            insecure_client,
        })
    }

    fn client_for(&self, server: &MediaServer) -> &reqwest::Client {
        if server.use_https && !server.verify_https {
            &self.insecure_client
        } else {
            &self.client
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<()> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to connect to media server at {}", url))?;
        if !response.status().is_success() {
            anyhow::bail!("Media server request {} failed with status: {}", url, response.status());
        }
        Ok(())
    }

    async fn update_plex(&self, server: &MediaServer) -> Result<()> {
        let client = self.client_for(server);
        let sections: Vec<String> = if server.libraries.is_empty() {
            vec!["all".to_string()]
        } else {
            server.libraries.clone()
        };

        for section in sections {
            let url = format!("{}/library/sections/{}/refresh", server.base_url(), section);
            let request = client
                .get(&url)
                .query(&[("X-Plex-Token", server.token.as_str())]);
            self.send(request, &url).await?;
        }
        Ok(())
    }

    async fn update_jellyfin(&self, server: &MediaServer) -> Result<()> {
        let url = format!("{}/Library/Refresh", server.base_url());
        let request = self
            .client_for(server)
            .post(&url)
            .header("X-Emby-Token", &server.token);
        self.send(request, &url).await
    }
}

#[async_trait]
impl MediaServerClient for HttpMediaServerClient {
    async fn update(&self, server: &MediaServer) -> Result<()> {
        match server.kind {
            MediaServerKind::Plex => self.update_plex(server).await?,
            MediaServerKind::Jellyfin => self.update_jellyfin(server).await?,
        }
        info!("Requested library refresh on {}", server.base_url());
        Ok(())
    }
}
