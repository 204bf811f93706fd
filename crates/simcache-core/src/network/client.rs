//! HTTP access for the agent.
//!
//! Every network request the agent issues goes through the [`Network`]
//! trait so the cache logic can be exercised without a live server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;
use url::Url;

use crate::models::HttpResponse;

use super::NetworkError;

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait Network: Send + Sync {
    /// Issue a GET for `url`.
    ///
    /// Transport failures are errors; any HTTP status, including 4xx/5xx,
    /// comes back as a response so callers decide what counts as success.
    async fn fetch(&self, url: &Url) -> Result<HttpResponse, NetworkError>;
}

/// reqwest-backed network access.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, url: &Url) -> Result<HttpResponse, NetworkError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| NetworkError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|source| NetworkError::Transport {
                url: url.to_string(),
                source,
            })?;

        debug!(url = %url, status, bytes = body.len(), "Network response");

        let mut fetched = HttpResponse::new(url.as_str(), status, body);
        fetched.content_type = content_type;
        Ok(fetched)
    }
}
