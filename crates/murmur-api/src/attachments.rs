use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

/// A hung upload aborts the whole send, so keep the bound tight.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Blob-store collaborator: turns raw upload bytes into a publicly
/// addressable URL. The core never reads attachments back; it only hands
/// out the URL it was given.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn store(&self, data: Bytes, content_type: &str) -> Result<String>;
}

/// Production implementation backed by the blob server's upload endpoint:
/// POST the raw bytes, read back the object id, build the public URL.
pub struct HttpBlobStore {
    client: reqwest::Client,
    upload_url: String,
    public_base: String,
}

#[derive(serde::Deserialize)]
struct UploadResponse {
    file_id: String,
}

impl HttpBlobStore {
    pub fn new(upload_url: String, public_base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url,
            public_base,
        }
    }
}

#[async_trait]
impl AttachmentStore for HttpBlobStore {
    async fn store(&self, data: Bytes, content_type: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.upload_url)
            .timeout(UPLOAD_TIMEOUT)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .context("blob store unreachable")?;

        if !resp.status().is_success() {
            return Err(anyhow!("blob store rejected upload: {}", resp.status()));
        }

        let upload: UploadResponse = resp
            .json()
            .await
            .context("malformed blob store response")?;

        let url = format!(
            "{}/{}",
            self.public_base.trim_end_matches('/'),
            upload.file_id
        );
        info!("stored attachment at {}", url);
        Ok(url)
    }
}
