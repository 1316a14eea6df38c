// Network collaborator — metadata retrieval and the preview beacon.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::file::FileDescriptor;

/// Network seam the session depends on. Failures propagate as errors and are
/// routed through the session's retry policy (metadata) or silently dropped
/// (beacon).
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn file_info(&self, file_id: &str, token: Option<&str>) -> Result<FileDescriptor>;
    async fn post_event(&self, body: serde_json::Value, token: Option<&str>) -> Result<()>;
}

/// HTTP implementation backed by reqwest. Descriptors come from
/// `GET {api_host}/files/{id}`, beacons go to `POST {api_host}/events`.
pub struct HttpMetadataClient {
    client: Client,
    api_host: String,
}

impl HttpMetadataClient {
    pub fn new(api_host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_host: api_host.into().trim_end_matches('/').to_string(),
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }
}

#[async_trait]
impl MetadataClient for HttpMetadataClient {
    async fn file_info(&self, file_id: &str, token: Option<&str>) -> Result<FileDescriptor> {
        let url = format!("{}/files/{}", self.api_host, file_id);
        let resp = self.authorize(self.client.get(&url), token).send().await?;

        let status = resp.status();
        debug!("file info status={} file_id={}", status.as_u16(), file_id);
        if status.as_u16() == 401 || status.as_u16() == 403 || status.as_u16() == 412 {
            warn!("file info auth rejected status={} file_id={}", status.as_u16(), file_id);
            return Err(anyhow!("auth_rejected: HTTP {}", status.as_u16()));
        }
        if !status.is_success() {
            warn!("file info failed status={} file_id={}", status.as_u16(), file_id);
            return Err(anyhow!("file info failed: HTTP {}", status.as_u16()));
        }

        let descriptor = resp.json::<FileDescriptor>().await?;
        Ok(descriptor)
    }

    async fn post_event(&self, body: serde_json::Value, token: Option<&str>) -> Result<()> {
        let url = format!("{}/events", self.api_host);
        let resp = self
            .authorize(self.client.post(&url), token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("event post failed: HTTP {}", status.as_u16()));
        }
        Ok(())
    }
}
