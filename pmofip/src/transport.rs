//! HTTP transport for the FIP GraphQL endpoint
//!
//! The tracker only needs "fetch this URL with these headers". That seam is
//! the [`Transport`] trait; [`HttpTransport`] is the `reqwest` implementation
//! used in production, tests plug in their own.
//!
//! # Example
//!
//! ```no_run
//! use pmofip::transport::{build_now_url, HttpTransport, Transport, NO_CACHE_HEADERS};
//! use pmofip::config::{DEFAULT_ENDPOINT, DEFAULT_PERSISTED_QUERY_HASH};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = HttpTransport::new()?;
//!     let url = build_now_url(DEFAULT_ENDPOINT, DEFAULT_PERSISTED_QUERY_HASH, 7)?;
//!     let body = transport.fetch(&url, &NO_CACHE_HEADERS).await?;
//!     println!("{} bytes", body.len());
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default timeout for HTTP requests (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = "PMOMusic/0.3.10 (pmofip)";

/// Headers disabling every intermediary and client cache
pub const NO_CACHE_HEADERS: [(&str, &str); 2] = [
    ("Cache-Control", "no-store, no-cache, must-revalidate"),
    ("Pragma", "no-cache"),
];

/// Name of the cache-busting query parameter
pub const CACHE_BUSTER_PARAM: &str = "x";

/// Fetches raw response bodies
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` with `headers`, returning the body of a successful response
    async fn fetch(&self, url: &Url, headers: &[(&str, &str)]) -> Result<Vec<u8>>;
}

/// Build the "Now" query URL for `station_id`
///
/// A fresh random token is appended on every call. FIP's edge caches have
/// been seen serving answers over ten minutes old, and immediate retries
/// without a new token tend to hit the same stale entry.
pub fn build_now_url(endpoint: &str, persisted_query_hash: &str, station_id: u32) -> Result<Url> {
    let mut url = Url::parse(endpoint)?;

    let variables = json!({
        "stationId": station_id,
        "previousTrackLimit": 1,
    });
    let extensions = json!({
        "persistedQuery": {
            "version": 1,
            "sha256Hash": persisted_query_hash,
        }
    });

    url.query_pairs_mut()
        .append_pair("operationName", "Now")
        .append_pair("variables", &variables.to_string())
        .append_pair("extensions", &extensions.to_string())
        .append_pair(CACHE_BUSTER_PARAM, &Uuid::new_v4().to_string());

    Ok(url)
}

/// `reqwest` backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with default settings
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> TransportBuilder {
        TransportBuilder::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url, headers: &[(&str, &str)]) -> Result<Vec<u8>> {
        let mut request = self.client.get(url.clone()).timeout(self.timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(Error::api_error(format!(
                "API returned status: {}",
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Request timeout and User-Agent for an [`HttpTransport`]
#[derive(Debug)]
pub struct TransportBuilder {
    timeout: Duration,
    user_agent: String,
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl TransportBuilder {
    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the transport
    pub fn build(self) -> Result<HttpTransport> {
        let client = Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .build()?;

        Ok(HttpTransport {
            client,
            timeout: self.timeout,
        })
    }
}
