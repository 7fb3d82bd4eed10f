//! Plain HTTP fetching
//!
//! One `reqwest` client per crawl session, resolving through the session's
//! DNS cache. Every request carries the caller's adaptive timeout; redirects
//! are followed up to a fixed hop count and are the only retry at this layer.

use reqwest::header::HeaderMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

use super::dns::{is_dns_failure, DnsCache};
use crate::config::CrawlerConfig;

/// Errors that can occur during fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Domain unavailable: {0}")]
    DomainUnavailable(String),
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    #[error("Too many redirects")]
    TooManyRedirects,
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),
    #[error("Content too large: {0} bytes")]
    ContentTooLarge(usize),
    #[error("Failed to parse URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FetchError {
    /// Non-HTML and oversized responses are skips, not failures
    pub fn is_skip(&self) -> bool {
        matches!(self, FetchError::InvalidContentType(_) | FetchError::ContentTooLarge(_))
    }

    fn from_reqwest(err: reqwest::Error, url: &Url, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else if err.is_redirect() {
            FetchError::TooManyRedirects
        } else if is_dns_failure(&err) {
            FetchError::DomainUnavailable(url.host_str().unwrap_or_default().to_string())
        } else {
            FetchError::Http(err)
        }
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The fetched URL (may differ from request due to redirects)
    pub final_url: Url,
    /// HTTP status code
    pub status_code: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body (HTML content)
    pub body: String,
    /// Content type
    pub content_type: String,
    /// Time taken to fetch
    pub fetch_duration: Duration,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Configuration for the HTTP fetcher
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string
    pub user_agent: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum response size (bytes)
    pub max_content_size: usize,
    /// Maximum redirects to follow
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

impl FetchConfig {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            max_content_size: config.max_content_size,
            max_redirects: config.max_redirects,
        }
    }
}

/// HTTP fetcher bound to one session
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Build a client that resolves through `dns`
    pub fn new(config: FetchConfig, dns: DnsCache) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(&config.user_agent)
            .dns_resolver(std::sync::Arc::new(dns))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, config })
    }

    /// The underlying client (shared with sitemap discovery and prefiltering)
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GET a page under `timeout`.
    ///
    /// Any status code is returned as a result; only transport failures,
    /// non-HTML bodies and oversized bodies are errors.
    pub async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResult, FetchError> {
        let start = Instant::now();

        let mut response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url, timeout))?;

        let status = response.status();
        let final_url = Url::parse(response.url().as_str())
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let headers = response.headers().clone();

        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return Err(FetchError::InvalidContentType(content_type));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.config.max_content_size {
                return Err(FetchError::ContentTooLarge(len as usize));
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url, timeout))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > self.config.max_content_size {
                return Err(FetchError::ContentTooLarge(body.len()));
            }
        }

        Ok(FetchResult {
            final_url,
            status_code: status.as_u16(),
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
            content_type,
            fetch_duration: start.elapsed(),
        })
    }
}
