//! HTTP client for replica reads

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::types::{GetResponse, HttpGet};

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Whole-request deadline
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// How long an idle pooled connection is kept
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 5,
        }
    }
}

impl HttpClientConfig {
    pub fn validate(&self) -> TransportResult<()> {
        if self.request_timeout.is_zero() {
            return Err(TransportError::InvalidRequest(
                "request_timeout must be non-zero".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(TransportError::InvalidRequest(
                "connect_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pooled HTTP client. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    config: HttpClientConfig,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> TransportResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .default_headers(Self::build_headers())
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("Failed to build client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers
    }
}

#[async_trait]
impl HttpGet for HttpClient {
    async fn get(&self, url: &str) -> TransportResult<GetResponse> {
        debug!(url = %url, "GET");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(GetResponse {
            url: url.to_string(),
            status_code: status.as_u16(),
            status: status.to_string(),
            body,
        })
    }
}
