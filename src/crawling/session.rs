//! Per-crawl session state
//!
//! A `CrawlSession` owns every cache that must not leak between crawls: the
//! DNS cache, the content-hash index, the CMS fingerprint, processed sitemaps
//! and the result cache. The orchestrator creates one per `crawl_website`
//! call and drops it on `reset()`.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::debug;
use url::Url;

use super::cms::CmsDetector;
use super::concurrency::{AdaptiveConcurrency, TimeoutBounds};
use super::dns::DnsCache;
use super::fetcher::{FetchConfig, FetchError, HttpFetcher};
use super::orchestrator::{CrawlOptions, FetchStatus, FetchStrategy, PageFetchResult};
use super::similarity::ContentHashIndex;
use super::sitemap::SitemapService;
use super::url_manager::{normalize_url, PrefilterConfig, UrlManager};
use crate::config::Config;

/// Running counters for one session
#[derive(Debug, Clone, Default)]
pub struct SessionCounters {
    pub pages_crawled: u64,
    pub pages_skipped: u64,
    pub pages_errored: u64,
    pub duplicates: u64,
    pub browser_renders: u64,
    pub cache_hits: u64,
}

pub struct CrawlSession {
    pub(crate) origin: Url,
    pub(crate) options: CrawlOptions,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) start: Instant,
    pub(crate) dns: DnsCache,
    pub(crate) fetcher: HttpFetcher,
    pub(crate) url_manager: UrlManager,
    pub(crate) sitemap: SitemapService,
    pub(crate) cms: CmsDetector,
    pub(crate) similarity: ContentHashIndex,
    pub(crate) concurrency: AdaptiveConcurrency,
    similarity_max_entries: usize,
    /// Normalized URL -> result
    cache: HashMap<String, PageFetchResult>,
    /// Cache keys in fetch order
    order: Vec<String>,
    /// Normalized request and final URLs already attempted
    crawled: HashSet<String>,
    /// Attempted URLs the frontier found again
    rediscovered: HashSet<String>,
    pub(crate) counters: SessionCounters,
    pub(crate) browser_disabled: bool,
    pub(crate) site_js_heavy: bool,
    pub(crate) has_sitemap: bool,
    pub(crate) sitemap_urls: usize,
    pub(crate) link_urls: usize,
}

impl CrawlSession {
    pub fn new(origin: Url, options: CrawlOptions, config: &Config) -> Result<Self, FetchError> {
        let dns = DnsCache::new();
        let fetcher = HttpFetcher::new(FetchConfig::from_config(&config.crawler), dns.clone())?;
        let client = fetcher.client().clone();

        Ok(Self {
            url_manager: UrlManager::new(client.clone(), PrefilterConfig::from_config(&config.crawler)),
            sitemap: SitemapService::new(client, config.sitemap.clone()),
            cms: CmsDetector::new(),
            similarity: ContentHashIndex::new(&config.similarity),
            similarity_max_entries: config.similarity.max_entries,
            concurrency: AdaptiveConcurrency::new(
                config.concurrency.clone(),
                TimeoutBounds::from_config(&config.crawler),
            ),
            origin,
            options,
            started_at: Utc::now(),
            start: Instant::now(),
            dns,
            fetcher,
            cache: HashMap::new(),
            order: Vec::new(),
            crawled: HashSet::new(),
            rediscovered: HashSet::new(),
            counters: SessionCounters::default(),
            browser_disabled: false,
            site_js_heavy: false,
            has_sitemap: false,
            sitemap_urls: 0,
            link_urls: 0,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    /// Number of URLs attempted (the page budget counts these)
    pub fn attempted(&self) -> usize {
        self.cache.len()
    }

    pub fn remaining_budget(&self) -> usize {
        self.options.max_pages.saturating_sub(self.cache.len())
    }

    /// Cached result for a URL, by its normalized form
    pub fn cached(&self, url: &str) -> Option<&PageFetchResult> {
        let key = normalize_url(url).ok()?;
        self.cache.get(&key)
    }

    /// Whether a normalized URL was already attempted (as a request or a redirect target)
    pub fn is_crawled(&self, normalized: &str) -> bool {
        self.crawled.contains(normalized)
    }

    pub(crate) fn crawled(&self) -> &HashSet<String> {
        &self.crawled
    }

    /// Results in fetch order
    pub fn results(&self) -> impl Iterator<Item = &PageFetchResult> {
        self.order.iter().filter_map(|k| self.cache.get(k))
    }

    /// Record a finished fetch: similarity, counters, caches.
    ///
    /// A URL is recorded at most once; a second result for the same key is
    /// ignored.
    pub(crate) fn record(&mut self, mut result: PageFetchResult) -> &PageFetchResult {
        let key = result.url.clone();
        if self.cache.contains_key(&key) {
            debug!("Ignoring second result for {}", key);
            return &self.cache[&key];
        }

        match result.status {
            FetchStatus::Success => {
                self.counters.pages_crawled += 1;
                if result.strategy == FetchStrategy::Browser {
                    self.counters.browser_renders += 1;
                }
                if let Some(html) = &result.html {
                    let check = self.similarity.check_content_similarity(html, &result.url);
                    if check.is_duplicate {
                        self.counters.duplicates += 1;
                        result.is_duplicate = true;
                        result.similarity = check.similarity;
                        result.duplicate_of = check.similar_url;
                    }
                }
            }
            FetchStatus::Skipped => self.counters.pages_skipped += 1,
            FetchStatus::Error => self.counters.pages_errored += 1,
        }

        self.crawled.insert(key.clone());
        if let Some(final_url) = result.final_url.as_deref().and_then(|u| normalize_url(u).ok()) {
            self.crawled.insert(final_url);
        }

        self.order.push(key.clone());
        self.cache.entry(key).or_insert(result)
    }

    /// Count a cached URL the frontier found again; each URL counts once
    pub(crate) fn note_cache_hit(&mut self, normalized: &str) {
        if self.rediscovered.insert(normalized.to_string()) {
            self.counters.cache_hits += 1;
        }
    }

    /// Bound the content-hash index between batches
    pub(crate) fn trim_similarity_index(&mut self) {
        self.similarity.cleanup_old_hashes(self.similarity_max_entries);
    }
}
