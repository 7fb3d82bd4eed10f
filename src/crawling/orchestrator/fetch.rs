//! Single-page fetch: HTTP first, browser when the page calls for it

use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use super::types::{FetchStatus, FetchStrategy, PageFetchResult};
use crate::crawling::browser::{detect_javascript_heavy_site, BrowserError, BrowserRenderer};
use crate::crawling::extractor::{PageExtractor, PageFacts};
use crate::crawling::fetcher::{FetchResult, HttpFetcher};
use crate::crawling::priority::classify;
use crate::crawling::url_manager::calculate_page_importance_score;

/// A URL scheduled for fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CrawlTarget {
    /// Normalized URL
    pub url: String,
    pub depth: usize,
}

/// Everything one fetch produced, before session bookkeeping
pub(crate) struct PageOutcome {
    pub result: PageFetchResult,
    /// Response headers of the HTTP fetch, if one completed
    pub headers: Option<HeaderMap>,
    pub elapsed: Duration,
    /// JS-heaviness of the raw HTTP response
    pub js_heavy: bool,
    /// Browser failure that indicates the rendering cluster itself is broken
    pub browser_fault: Option<BrowserError>,
}

/// Borrowed view of the session pieces a fetch needs
pub(crate) struct PageFetcher<'a> {
    pub http: &'a HttpFetcher,
    pub renderer: Option<&'a BrowserRenderer>,
    pub extractor: &'a Arc<dyn PageExtractor>,
    pub origin: &'a str,
    /// Site-level JS-heaviness from the homepage
    pub site_js_heavy: bool,
    /// The detected CMS renders its pages client-side
    pub client_rendered: bool,
}

impl PageFetcher<'_> {
    pub async fn fetch(&self, target: &CrawlTarget, timeout: Duration) -> PageOutcome {
        let start = Instant::now();
        let mut result = blank_result(target, self.origin);

        let url = match Url::parse(&target.url) {
            Ok(u) => u,
            Err(e) => {
                result.error = Some(e.to_string());
                return PageOutcome::finish(result, None, start, None);
            }
        };

        let response = match self.http.fetch(&url, timeout).await {
            Ok(r) => r,
            Err(e) if e.is_skip() => {
                debug!("Skipping {}: {}", url, e);
                result.status = FetchStatus::Skipped;
                result.skip_reason = Some(e.to_string());
                return PageOutcome::finish(result, None, start, None);
            }
            Err(e) => {
                debug!("Fetch failed for {}: {}", url, e);
                result.error = Some(e.to_string());
                return PageOutcome::finish(result, None, start, None);
            }
        };

        result.status_code = Some(response.status_code);
        if response.final_url != url {
            result.final_url = Some(response.final_url.to_string());
        }
        if !response.is_success() {
            result.error = Some(format!("HTTP {}", response.status_code));
            return PageOutcome::finish(result, Some(response.headers), start, None);
        }

        let js_heavy = detect_javascript_heavy_site(&response.body, url.as_str());
        let mut browser_fault = None;
        if let Some(renderer) = self.renderer {
            if renderer.should_use_browser_for_page(url.as_str(), self.site_js_heavy || self.client_rendered || js_heavy) {
                match renderer.fetch_with_browser(&response.final_url).await {
                    Ok(page) => {
                        result.status = FetchStatus::Success;
                        result.strategy = FetchStrategy::Browser;
                        result.facts = Some(page.facts);
                        result.html = Some(page.html);
                        return PageOutcome::finish(result, Some(response.headers), start, None)
                            .with_js_heavy(js_heavy);
                    }
                    Err(e) => {
                        warn!("Browser render failed for {}, using HTTP response: {}", url, e);
                        browser_fault = e.is_cluster_fault().then_some(e);
                    }
                }
            }
        }

        let FetchResult { final_url, headers, body, .. } = response;
        match extract_blocking(self.extractor.clone(), body, final_url).await {
            Ok((html, facts)) => {
                result.status = FetchStatus::Success;
                result.facts = Some(facts);
                result.html = Some(html);
            }
            Err(e) => result.error = Some(e),
        }
        PageOutcome::finish(result, Some(headers), start, browser_fault).with_js_heavy(js_heavy)
    }
}

impl PageOutcome {
    fn finish(
        mut result: PageFetchResult,
        headers: Option<HeaderMap>,
        start: Instant,
        browser_fault: Option<BrowserError>,
    ) -> Self {
        let elapsed = start.elapsed();
        result.response_time_ms = elapsed.as_millis() as u64;
        Self { result, headers, elapsed, js_heavy: false, browser_fault }
    }

    fn with_js_heavy(mut self, js_heavy: bool) -> Self {
        self.js_heavy = js_heavy;
        self
    }
}

/// Error-shaped result; callers fill in whatever they learn
fn blank_result(target: &CrawlTarget, origin: &str) -> PageFetchResult {
    PageFetchResult {
        url: target.url.clone(),
        final_url: None,
        status: FetchStatus::Error,
        status_code: None,
        html: None,
        facts: None,
        is_duplicate: false,
        similarity: None,
        duplicate_of: None,
        strategy: FetchStrategy::Http,
        tier: classify(&target.url),
        importance: calculate_page_importance_score(&target.url, origin),
        depth: target.depth,
        response_time_ms: 0,
        error: None,
        skip_reason: None,
    }
}

async fn extract_blocking(
    extractor: Arc<dyn PageExtractor>,
    html: String,
    url: Url,
) -> Result<(String, PageFacts), String> {
    tokio::task::spawn_blocking(move || {
        let facts = extractor.extract(&html, &url);
        (html, facts)
    })
    .await
    .map_err(|e| format!("extraction task failed: {}", e))
}
