//! HTTP implementation of the attachment port.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use super::AttachmentFetcher;

/// Fetches attachment bytes (invoice PDFs and the like) over HTTP.
#[derive(Default)]
pub struct HttpAttachmentFetcher {
    client: Client,
}

impl HttpAttachmentFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl AttachmentFetcher for HttpAttachmentFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch attachment from {url}"))?
            .error_for_status()
            .with_context(|| format!("attachment fetch from {url} returned an error status"))?;

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read attachment body from {url}"))?;

        Ok(bytes.to_vec())
    }
}
