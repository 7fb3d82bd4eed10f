//! Orchestrator types: options, per-page results, reports and statistics

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::structure::SiteStructure;
use crate::config::CrawlerConfig;
use crate::crawling::circuit_breaker::BreakerHealth;
use crate::crawling::extractor::PageFacts;
use crate::crawling::fetcher::FetchError;
use crate::crawling::priority::PageTier;
use crate::crawling::url_manager::UrlError;

/// Per-crawl options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Page budget, homepage included
    pub max_pages: usize,
    /// Allow the browser strategy
    pub use_javascript: bool,
    /// Maximum link depth from the homepage
    pub max_depth: usize,
    /// Seed the frontier from sitemaps
    pub follow_sitemaps: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

impl CrawlOptions {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            use_javascript: config.use_javascript,
            max_depth: config.max_depth,
            follow_sitemaps: config.follow_sitemaps,
        }
    }
}

/// Outcome class of one attempted URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Error,
    Skipped,
}

/// How a page's HTML was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    Http,
    Browser,
}

/// One attempted URL. Produced once, never mutated after being cached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFetchResult {
    pub url: String,
    /// URL after redirects, when it differs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    pub status: FetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<PageFacts>,
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    pub strategy: FetchStrategy,
    pub tier: PageTier,
    pub importance: u32,
    /// Link distance from the homepage
    pub depth: usize,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl PageFetchResult {
    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    /// Size of the HTML actually analyzed
    pub fn html_bytes(&self) -> usize {
        self.html.as_ref().map(|h| h.len()).unwrap_or(0)
    }
}

/// Counters and timings for one crawl
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStats {
    pub pages_crawled: u64,
    pub pages_skipped: u64,
    pub pages_errored: u64,
    pub duplicates: u64,
    pub browser_renders: u64,
    /// URLs rediscovered after they were already attempted
    pub cache_hits: u64,
    pub sitemap_urls: usize,
    pub link_urls: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub avg_response_time_ms: Option<f64>,
    pub final_concurrency: usize,
    pub concurrency_adjustments: u32,
    pub final_timeout_ms: u64,
    pub dns_cache_hits: u64,
    pub dns_cache_misses: u64,
    /// Browser strategy was turned off after a cluster fault
    pub browser_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_breaker: Option<BreakerHealth>,
}

/// Everything one crawl produced
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub homepage: PageFetchResult,
    pub additional_pages: Vec<PageFetchResult>,
    pub site_structure: SiteStructure,
    pub stats: CrawlStats,
}

impl CrawlReport {
    /// Homepage followed by every additional page
    pub fn pages(&self) -> impl Iterator<Item = &PageFetchResult> {
        std::iter::once(&self.homepage).chain(self.additional_pages.iter())
    }
}

/// Errors that end a crawl
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlError),

    #[error("Homepage {url} could not be fetched: {reason}")]
    HomepageFailed { url: String, reason: String },

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] FetchError),
}
