//! Crawl budget, fetch, and adaptive concurrency configuration

use serde::{Deserialize, Serialize};

use super::DEFAULT_USER_AGENT;

/// Crawl budget and HTTP fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// User agent string sent with every request
    pub user_agent: String,
    /// Maximum pages per crawl, homepage included
    pub max_pages: usize,
    /// Maximum URL path depth accepted into the frontier
    pub max_depth: usize,
    /// Seed the frontier from robots.txt / sitemap.xml
    pub follow_sitemaps: bool,
    /// Allow the headless browser strategy
    pub use_javascript: bool,
    /// Politeness delay between batches (milliseconds)
    pub request_delay_ms: u64,
    /// Maximum redirects followed per request
    pub max_redirects: usize,
    /// Maximum response size in bytes
    pub max_content_size: usize,
    /// Number of concurrent HEAD requests during prefiltering
    pub prefilter_batch_size: usize,
    /// Timeout for a preflight HEAD request (seconds)
    pub prefilter_timeout_secs: u64,
    /// Adaptive request timeout floor (seconds)
    pub min_timeout_secs: u64,
    /// Adaptive request timeout ceiling (seconds)
    pub max_timeout_secs: u64,
    /// Request timeout before any response time has been observed (seconds)
    pub initial_timeout_secs: u64,
    /// Connection timeout (seconds)
    pub connect_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_pages: 250,
            max_depth: 5,
            follow_sitemaps: true,
            use_javascript: true,
            request_delay_ms: 250,
            max_redirects: 5,
            max_content_size: 5 * 1024 * 1024,
            prefilter_batch_size: 10,
            prefilter_timeout_secs: 5,
            min_timeout_secs: 10,
            max_timeout_secs: 45,
            initial_timeout_secs: 20,
            connect_timeout_secs: 10,
        }
    }
}

/// Adaptive concurrency controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Starting batch size
    pub initial: usize,
    /// Lower bound for the batch size
    pub min: usize,
    /// Upper bound for the batch size
    pub max: usize,
    /// Minimum time between two adjustments (seconds)
    pub adjust_interval_secs: u64,
    /// Average response time above which concurrency shrinks (milliseconds)
    pub high_water_ms: u64,
    /// Average response time below which concurrency grows (milliseconds)
    pub low_water_ms: u64,
    /// Number of recent response times kept for the rolling average
    pub window_size: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            initial: 5,
            min: 2,
            max: 10,
            adjust_interval_secs: 10,
            high_water_ms: 5_000,
            low_water_ms: 2_000,
            window_size: 20,
        }
    }
}
