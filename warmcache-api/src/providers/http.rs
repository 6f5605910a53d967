//! HTTP JSON acquisition (scraper sidecars, upstream JSON APIs).

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use warmcache_core::{AcquireError, Acquirer, ConfigError, Payload, ResourceId};

use super::excerpt;

/// Fetches the payload with a single GET.
pub struct HttpJsonAcquirer {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpJsonAcquirer {
    /// Create an acquirer for `url`. The whole request, body included, is
    /// bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let url = url.into();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("warmcache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "source.url".to_string(),
                value: url.clone(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn transport_error(&self, resource_id: &ResourceId, err: reqwest::Error) -> AcquireError {
        if err.is_timeout() {
            AcquireError::Timeout {
                resource_id: resource_id.clone(),
                after: self.timeout,
            }
        } else {
            AcquireError::failed(resource_id, format!("GET {} failed: {}", self.url, err))
        }
    }
}

#[async_trait]
impl Acquirer for HttpJsonAcquirer {
    async fn acquire(&self, resource_id: &ResourceId) -> Result<Payload, AcquireError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(resource_id, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AcquireError::failed(
                resource_id,
                format!("GET {} returned {}: {}", self.url, status, excerpt(&error_text)),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(resource_id, e))?;

        serde_json::from_slice(&body).map_err(|e| AcquireError::InvalidPayload {
            resource_id: resource_id.clone(),
            reason: format!("GET {} did not return JSON: {}", self.url, e),
        })
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}

impl std::fmt::Debug for HttpJsonAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpJsonAcquirer")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}
