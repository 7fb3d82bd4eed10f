//! Sitemap discovery and duplicate-content configuration

use serde::{Deserialize, Serialize};

/// Sitemap discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitemapConfig {
    /// Maximum page URLs returned from sitemaps
    pub max_urls: usize,
    /// Child sitemaps expanded per sitemap index
    pub max_children_per_index: usize,
    /// Maximum nesting of sitemap indexes
    pub max_index_depth: usize,
    /// Request timeout for robots.txt and sitemap fetches (seconds)
    pub request_timeout_secs: u64,
    /// Largest sitemap body accepted, before and after gunzip (bytes)
    pub max_sitemap_bytes: usize,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            max_urls: 500,
            max_children_per_index: 10,
            max_index_depth: 3,
            request_timeout_secs: 15,
            max_sitemap_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Content similarity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Positional overlap at or above which two pages are duplicates
    pub threshold: f64,
    /// Number of most recent hashes compared for near-duplicates
    pub recent_window: usize,
    /// Hard cap on indexed hashes
    pub max_entries: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            recent_window: 100,
            max_entries: 5_000,
        }
    }
}
