//! HTTP client capability used by the dispatcher

use async_trait::async_trait;
use jumeaux_config::{ConfigError, ConfigResult};
use jumeaux_core::{EndpointSpec, HeaderMap, RawResponse};
use reqwest::Client;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Per-request timeout of the default client
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The exchange did not produce an HTTP response
///
/// Any received status code, 4xx and 5xx included, is a success at this
/// layer.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Issues a GET and captures the full response
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<RawResponse, TransportError>;
}

/// `reqwest` client bound to one endpoint's proxy settings
#[derive(Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn for_endpoint(endpoint: &EndpointSpec, timeout: Duration) -> ConfigResult<Self> {
        let client_error = |reason: String| ConfigError::HttpClient {
            endpoint: endpoint
                .name
                .clone()
                .unwrap_or_else(|| endpoint.host.clone()),
            reason,
        };

        let mut builder = Client::builder().timeout(timeout);
        builder = match endpoint.proxy_url() {
            Some(proxy) => builder.proxy(
                reqwest::Proxy::all(proxy.as_str())
                    .map_err(|e| client_error(format!("invalid proxy '{}': {}", proxy, e)))?,
            ),
            // Ignore proxy environment variables unless a proxy is configured
            None => builder.no_proxy(),
        };

        let client = builder.build().map_err(|e| client_error(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<RawResponse, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let started = Instant::now();
        let response = request.send().await?;
        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let response_headers: HeaderMap = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;
        let elapsed = started.elapsed();

        let mut raw = RawResponse::new(final_url, status, body.to_vec()).with_elapsed(elapsed);
        if let Some(content_type) = response_headers.get("content-type") {
            raw = raw.with_content_type(content_type);
        }
        raw.headers = response_headers;
        Ok(raw)
    }
}
