//! HTTP client for a media host account.

use crate::config::MediaConfig;
use crate::error::{MigrateError, Result};
use crate::media::UPLOAD_API_BASE;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

/// Byte transfer against one media host account.
///
/// Only two capabilities exist: fetch bytes by URL (read-only, used against
/// the source account) and upload bytes under a public identifier with
/// overwrite (used against the destination account). There is no delete.
#[async_trait]
pub trait MediaTransfer: Send + Sync {
    /// Fetch an asset's bytes by delivery URL.
    async fn fetch(&self, asset_url: &str) -> Result<Bytes>;

    /// Upload bytes under a public identifier, overwriting any existing
    /// asset with that identifier, and return the new delivery URL.
    async fn upload(&self, public_id: &str, bytes: Bytes) -> Result<String>;
}

/// Media host client backed by reqwest.
#[derive(Clone)]
pub struct MediaClient {
    http: reqwest::Client,
    config: MediaConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl MediaClient {
    /// Create a new client for one account.
    pub fn new(config: MediaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http, config })
    }

    fn upload_endpoint(&self) -> String {
        format!("{}/{}/auto/upload", UPLOAD_API_BASE, self.config.account)
    }

    /// Sign an upload: hex SHA-256 of the sorted `key=value` parameters
    /// joined with `&`, with the API secret appended.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by_key(|(key, _)| *key);

        let joined = sorted
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl MediaTransfer for MediaClient {
    async fn fetch(&self, asset_url: &str) -> Result<Bytes> {
        let response = self.http.get(asset_url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        debug!("fetched {} bytes from {}", bytes.len(), asset_url);
        Ok(bytes)
    }

    async fn upload(&self, public_id: &str, bytes: Bytes) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("overwrite", "true"),
            ("public_id", public_id),
            ("timestamp", &timestamp),
        ]);

        let file_name = public_id
            .rsplit('/')
            .next()
            .unwrap_or(public_id)
            .to_string();
        let form = Form::new()
            .text("public_id", public_id.to_string())
            .text("overwrite", "true")
            .text("timestamp", timestamp)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .part("file", Part::bytes(bytes.to_vec()).file_name(file_name));

        let response = self
            .http
            .post(self.upload_endpoint())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MigrateError::Upload(format!("{}: {}", status, body)));
        }

        let parsed: UploadResponse = response.json().await?;
        debug!("uploaded {} as {}", public_id, parsed.secure_url);
        Ok(parsed.secure_url)
    }
}
