//! Crawl orchestration
//!
//! Drives one crawl end to end:
//! homepage -> fingerprint -> sitemap discovery alongside link extraction ->
//! prioritize -> filter -> batched fetching -> site summary.
//!
//! Only a homepage failure ends a crawl. Every other page degrades to an
//! error- or skip-shaped [`PageFetchResult`].

mod fetch;
mod structure;
mod types;

pub use structure::{analyze_site_structure, SiteSignals, SiteStructure, TierDistribution};
pub use types::{
    CrawlError, CrawlOptions, CrawlReport, CrawlStats, FetchStatus, FetchStrategy, PageFetchResult,
};

use futures::future::join_all;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use self::fetch::{CrawlTarget, PageFetcher};
use super::browser::{BrowserError, BrowserPool, BrowserRenderer};
use super::cms::{CmsKind, CmsOptimizationProfile};
use super::extractor::{HtmlPageExtractor, PageExtractor};
use super::session::CrawlSession;
use super::trap_detection::{path_depth, should_terminate_early};
use super::url_manager::{is_same_site, normalize_url, prioritize_urls_by_importance, UrlError, UrlManager};
use crate::config::Config;
use crate::util::mean_ms;

/// Admission rules for the frontier, fixed once the CMS is known.
///
/// Path depth (URL segments) is bounded by the CMS profile. Link depth
/// (hops from the homepage) is bounded separately by `CrawlOptions::max_depth`
/// in the fetch loop.
struct FrontierFilter {
    origin: String,
    profile: CmsOptimizationProfile,
}

impl FrontierFilter {
    fn new(origin: &str, profile: CmsOptimizationProfile) -> Self {
        Self {
            origin: origin.to_string(),
            profile,
        }
    }

    /// Whether a normalized URL may be scheduled
    fn admits(&self, url: &str, url_manager: &UrlManager, crawled: &HashSet<String>) -> bool {
        if !is_same_site(url, &self.origin) || url_manager.should_skip_url(url, crawled) {
            return false;
        }
        let check = should_terminate_early(url);
        if check.terminate {
            debug!("Dropping {}: {:?}", url, check.reason);
            return false;
        }
        if self.profile.skips(url) {
            return false;
        }
        Url::parse(url)
            .map(|u| path_depth(&u) <= self.profile.max_depth)
            .unwrap_or(false)
    }
}

/// Crawls one site at a time, reusing a shared browser pool across crawls
pub struct CrawlerOrchestrator {
    config: Config,
    extractor: Arc<dyn PageExtractor>,
    browser_pool: Option<Arc<BrowserPool>>,
    session: Option<CrawlSession>,
}

impl CrawlerOrchestrator {
    /// `browser_pool` is optional: without one every page is fetched over HTTP
    pub fn new(config: Config, browser_pool: Option<Arc<BrowserPool>>) -> Self {
        Self {
            config,
            extractor: Arc::new(HtmlPageExtractor::new()),
            browser_pool,
            session: None,
        }
    }

    /// Replace the page extractor used by both fetch strategies
    pub fn with_extractor(mut self, extractor: Arc<dyn PageExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// State of the last crawl, until the next crawl or [`reset`](Self::reset)
    pub fn session(&self) -> Option<&CrawlSession> {
        self.session.as_ref()
    }

    /// Discard the current session and its caches
    pub fn reset(&mut self) {
        if self.session.take().is_some() {
            debug!("Crawl session discarded");
        }
    }

    /// Crawl a website starting from its homepage
    pub async fn crawl_website(&mut self, url: &str, options: CrawlOptions) -> Result<CrawlReport, CrawlError> {
        self.reset();

        let normalized = normalize_url(url)?;
        let origin = Url::parse(&normalized).map_err(|e| UrlError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        info!(
            "Starting crawl of {} (max {} pages, depth {}, javascript: {}, sitemaps: {})",
            normalized, options.max_pages, options.max_depth, options.use_javascript, options.follow_sitemaps
        );

        let mut session = CrawlSession::new(origin, options.clone(), &self.config)?;
        let renderer = match (&self.browser_pool, options.use_javascript) {
            (Some(pool), true) => Some(BrowserRenderer::new(pool.clone(), self.extractor.clone(), &self.config.browser)),
            _ => None,
        };

        // Homepage
        let home = CrawlTarget { url: normalized.clone(), depth: 0 };
        let outcome = PageFetcher {
            http: &session.fetcher,
            renderer: renderer.as_ref(),
            extractor: &self.extractor,
            origin: &normalized,
            site_js_heavy: false,
            client_rendered: false,
        }
        .fetch(&home, session.concurrency.adaptive_timeout())
        .await;

        session.concurrency.record_response_time(outcome.elapsed);
        if let Some(fault) = outcome.browser_fault {
            disable_browser(&mut session, &fault);
        }
        session.site_js_heavy = outcome.js_heavy;

        let homepage = session.record(outcome.result).clone();
        if !homepage.is_success() {
            let reason = homepage
                .error
                .or(homepage.skip_reason)
                .unwrap_or_else(|| "unknown error".to_string());
            warn!("Homepage {} failed: {}", normalized, reason);
            self.session = Some(session);
            return Err(CrawlError::HomepageFailed { url: normalized, reason });
        }
        let homepage_links = homepage
            .facts
            .as_ref()
            .map(|f| f.links.internal.clone())
            .unwrap_or_default();

        // Fingerprint
        let headers = outcome.headers.unwrap_or_default();
        session.cms.detect(homepage.html.as_deref().unwrap_or_default(), &headers, &normalized);
        let filter = FrontierFilter::new(&normalized, session.cms.profile());
        let client_rendered = filter.profile.renders_client_side();

        // Sitemaps and homepage links, side by side
        let sitemap = &mut session.sitemap;
        let origin = &session.origin;
        let (discovery, links) = tokio::join!(
            async {
                if options.follow_sitemaps {
                    Some(sitemap.discover(origin).await)
                } else {
                    None
                }
            },
            async {
                homepage_links
                    .into_iter()
                    .filter(|l| is_same_site(l, &normalized))
                    .collect::<Vec<_>>()
            }
        );

        let sitemap_urls = match discovery {
            Some(d) => {
                session.has_sitemap = d.found;
                d.urls
            }
            None => Vec::new(),
        };
        session.sitemap_urls = sitemap_urls.len();
        session.link_urls = links.len();
        debug!("{} sitemap URLs, {} homepage links", session.sitemap_urls, session.link_urls);

        let mut seen = HashSet::new();
        let merged: Vec<String> = sitemap_urls
            .into_iter()
            .chain(links)
            .filter_map(|u| normalize_url(&u).ok())
            .filter(|u| seen.insert(u.clone()))
            .collect();
        let merged = filter.profile.prioritize(prioritize_urls_by_importance(merged, &normalized));

        let candidates = preprocess(&session, &filter, merged).await;
        info!("{} URLs queued after filtering", candidates.len());

        let mut queued: HashSet<String> = candidates.iter().cloned().collect();
        let mut frontier: VecDeque<CrawlTarget> = candidates
            .into_iter()
            .map(|url| CrawlTarget { url, depth: 1 })
            .collect();

        let delay = Duration::from_millis(self.config.crawler.request_delay_ms);
        while session.remaining_budget() > 0 && !frontier.is_empty() {
            let size = session.concurrency.current().min(session.remaining_budget()).max(1);
            let mut batch = Vec::with_capacity(size);
            while batch.len() < size {
                let Some(target) = frontier.pop_front() else { break };
                if session.is_crawled(&target.url) {
                    session.note_cache_hit(&target.url);
                    continue;
                }
                batch.push(target);
            }
            if batch.is_empty() {
                continue;
            }

            let timeout = session.concurrency.adaptive_timeout();
            debug!("Fetching batch of {} (timeout {:?})", batch.len(), timeout);
            let outcomes = {
                let fetcher = PageFetcher {
                    http: &session.fetcher,
                    renderer: if session.browser_disabled { None } else { renderer.as_ref() },
                    extractor: &self.extractor,
                    origin: &normalized,
                    site_js_heavy: session.site_js_heavy,
                    client_rendered,
                };
                join_all(batch.iter().map(|t| fetcher.fetch(t, timeout))).await
            };

            for outcome in outcomes {
                session.concurrency.record_response_time(outcome.elapsed);
                if let Some(fault) = &outcome.browser_fault {
                    disable_browser(&mut session, fault);
                }

                let depth = outcome.result.depth;
                let recorded = session.record(outcome.result);
                if depth >= options.max_depth {
                    continue;
                }
                let links = recorded
                    .facts
                    .as_ref()
                    .map(|f| f.links.internal.clone())
                    .unwrap_or_default();

                for link in links {
                    let Ok(link) = normalize_url(&link) else { continue };
                    if session.is_crawled(&link) {
                        session.note_cache_hit(&link);
                    } else if !queued.contains(&link)
                        && filter.admits(&link, &session.url_manager, session.crawled())
                    {
                        queued.insert(link.clone());
                        frontier.push_back(CrawlTarget { url: link, depth: depth + 1 });
                    }
                }
            }

            session.trim_similarity_index();
            session.concurrency.maybe_adjust();

            if !delay.is_zero() && !frontier.is_empty() && session.remaining_budget() > 0 {
                tokio::time::sleep(delay).await;
            }
        }

        let report = build_report(&session, homepage, renderer.as_ref().map(|r| r.pool()));
        info!(
            "Crawl of {} finished: {} ok, {} errors, {} skipped, {} duplicates in {}ms",
            normalized,
            report.stats.pages_crawled,
            report.stats.pages_errored,
            report.stats.pages_skipped,
            report.stats.duplicates,
            report.stats.duration_ms
        );
        self.session = Some(session);
        Ok(report)
    }
}

/// Skip rules, early termination, CMS filtering and depth, then a network
/// prefilter on as many candidates as the budget can still take
async fn preprocess(session: &CrawlSession, filter: &FrontierFilter, urls: Vec<String>) -> Vec<String> {
    let before = urls.len();
    let admitted: Vec<String> = urls
        .into_iter()
        .filter(|u| filter.admits(u, &session.url_manager, session.crawled()))
        .collect();
    let mut admitted = session.cms.apply_cms_filtering(admitted);
    admitted.truncate(session.remaining_budget());

    let kept = session.url_manager.prefilter_urls(admitted).await;
    debug!("Preprocessing kept {} of {} candidates", kept.len(), before);
    kept
}

fn disable_browser(session: &mut CrawlSession, fault: &BrowserError) {
    if !session.browser_disabled {
        warn!("Browser rendering disabled for this crawl: {}", fault);
        session.browser_disabled = true;
    }
}

fn build_report(
    session: &CrawlSession,
    homepage: PageFetchResult,
    pool: Option<&Arc<BrowserPool>>,
) -> CrawlReport {
    // The homepage is always the first result
    let additional_pages: Vec<PageFetchResult> = session.results().skip(1).cloned().collect();

    let signals = SiteSignals {
        cms: session.cms.detected_cms().unwrap_or(CmsKind::Custom),
        fingerprint: session.cms.fingerprint().clone(),
        is_javascript_heavy: session.site_js_heavy,
        has_sitemap: session.has_sitemap,
    };
    let site_structure = analyze_site_structure(std::iter::once(&homepage).chain(&additional_pages), signals);

    let counters = session.counters();
    let stats = CrawlStats {
        pages_crawled: counters.pages_crawled,
        pages_skipped: counters.pages_skipped,
        pages_errored: counters.pages_errored,
        duplicates: counters.duplicates,
        browser_renders: counters.browser_renders,
        cache_hits: counters.cache_hits,
        sitemap_urls: session.sitemap_urls,
        link_urls: session.link_urls,
        started_at: session.started_at,
        finished_at: chrono::Utc::now(),
        duration_ms: session.start.elapsed().as_millis() as u64,
        avg_response_time_ms: mean_ms(
            session
                .results()
                .filter(|r| r.status_code.is_some())
                .map(|r| r.response_time_ms),
        ),
        final_concurrency: session.concurrency.current(),
        concurrency_adjustments: session.concurrency.adjustments(),
        final_timeout_ms: session.concurrency.adaptive_timeout().as_millis() as u64,
        dns_cache_hits: session.dns.hits(),
        dns_cache_misses: session.dns.misses(),
        browser_disabled: session.browser_disabled,
        browser_breaker: pool.map(|p| p.breaker_health()),
    };

    CrawlReport {
        homepage,
        additional_pages,
        site_structure,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.crawler.request_delay_ms = 0;
        config
    }

    fn options(max_pages: usize) -> CrawlOptions {
        CrawlOptions {
            max_pages,
            use_javascript: false,
            max_depth: 3,
            follow_sitemaps: false,
        }
    }

    const HOME: &str = r#"<html><head><title>Home</title></head><body>
        <a href="/about">About</a><a href="/contact">Contact</a><a href="/admin/settings">Admin</a>
        <a href="/brochure.pdf">Brochure</a><a href="https://facebook.com/acme">Facebook</a>
        </body></html>"#;

    #[test]
    fn filter_applies_cms_and_depth_rules() {
        let session = CrawlSession::new(
            Url::parse("https://x.test/").unwrap(),
            options(10),
            &quiet_config(),
        )
        .unwrap();
        let filter = FrontierFilter::new("https://x.test/", CmsOptimizationProfile::for_cms(CmsKind::WordPress));
        let admits = |u: &str| filter.admits(u, &session.url_manager, session.crawled());

        assert!(admits("https://x.test/services/drain-cleaning"));
        assert!(admits("https://x.test/feedback"));
        assert!(!admits("https://x.test/wp-admin/options.php"));
        assert!(!admits("https://other.test/about"));
        assert!(!admits("https://x.test/files/menu.pdf"));
        // WordPress profile allows four segments
        assert!(admits("https://x.test/a/b/c/d"));
        assert!(!admits("https://x.test/a/b/c/d/e"));
    }

    #[tokio::test]
    async fn link_depth_does_not_limit_path_depth() {
        let mut server = Server::new_async().await;
        let _home = server
            .mock("GET", "/")
            .with_header("content-type", "text/html")
            .with_body(r#"<html><head><title>Home</title></head><body><a href="/services/plumbing/emergency">Emergency</a></body></html>"#)
            .create_async()
            .await;
        let deep = server
            .mock("GET", "/services/plumbing/emergency")
            .with_header("content-type", "text/html")
            .with_body("<html><head><title>Emergency</title></head><body><p>Burst pipes at any hour.</p></body></html>")
            .expect(1)
            .create_async()
            .await;

        let mut orchestrator = CrawlerOrchestrator::new(quiet_config(), None);
        let report = orchestrator
            .crawl_website(&server.url(), CrawlOptions { max_depth: 1, ..options(10) })
            .await
            .unwrap();

        deep.assert_async().await;
        assert_eq!(report.additional_pages.len(), 1);
        assert_eq!(report.additional_pages[0].depth, 1);
    }

    #[tokio::test]
    async fn cache_hits_count_each_url_once() {
        let mut server = Server::new_async().await;
        let _home = server
            .mock("GET", "/")
            .with_header("content-type", "text/html")
            .with_body(r#"<html><head><title>Home</title></head><body><a href="/a">A</a><a href="/b">B</a></body></html>"#)
            .create_async()
            .await;
        let mut pages = Vec::new();
        for path in ["/a", "/b"] {
            let mock = server
                .mock("GET", path)
                .with_header("content-type", "text/html")
                .with_body(format!(
                    r#"<html><head><title>{0}</title></head><body><p>Page {0} content.</p><a href="/">Home</a><a href="/">Logo</a><a href="/a">A</a></body></html>"#,
                    path
                ))
                .create_async()
                .await;
            pages.push(mock);
        }

        let mut orchestrator = CrawlerOrchestrator::new(quiet_config(), None);
        let report = orchestrator
            .crawl_website(&server.url(), options(10))
            .await
            .unwrap();

        assert_eq!(report.additional_pages.len(), 2);
        // "/" and "/a" are rediscovered many times but each counts once
        assert_eq!(report.stats.cache_hits, 2);
    }

    #[tokio::test]
    async fn homepage_failure_is_fatal() {
        let mut server = Server::new_async().await;
        let _home = server.mock("GET", "/").with_status(500).create_async().await;

        let mut orchestrator = CrawlerOrchestrator::new(quiet_config(), None);
        let err = orchestrator
            .crawl_website(&server.url(), options(5))
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::HomepageFailed { .. }));
        assert_eq!(orchestrator.session().map(|s| s.attempted()), Some(1));
    }

    #[tokio::test]
    async fn crawls_linked_pages_within_budget() {
        let mut server = Server::new_async().await;
        let _home = server
            .mock("GET", "/")
            .with_header("content-type", "text/html")
            .with_body(HOME)
            .create_async()
            .await;
        let about = server
            .mock("GET", "/about")
            .with_header("content-type", "text/html")
            .with_body("<html><head><title>About</title></head><body><p>About us</p><a href=\"/\">Home</a></body></html>")
            .expect(1)
            .create_async()
            .await;
        let _contact = server
            .mock("GET", "/contact")
            .with_status(404)
            .create_async()
            .await;

        let mut orchestrator = CrawlerOrchestrator::new(quiet_config(), None);
        let report = orchestrator
            .crawl_website(&server.url(), options(10))
            .await
            .unwrap();

        about.assert_async().await;
        assert!(report.homepage.is_success());
        assert_eq!(report.additional_pages.len(), 2);
        assert_eq!(report.stats.pages_crawled, 2);
        assert_eq!(report.stats.pages_errored, 1);
        assert_eq!(report.site_structure.total_pages, 3);
        assert!(report.stats.cache_hits >= 1);

        let contact = report
            .pages()
            .find(|p| p.url.ends_with("/contact"))
            .unwrap();
        assert_eq!(contact.status, FetchStatus::Error);
        assert_eq!(contact.status_code, Some(404));
    }

    #[tokio::test]
    async fn budget_includes_homepage() {
        let mut server = Server::new_async().await;
        let _home = server
            .mock("GET", "/")
            .with_header("content-type", "text/html")
            .with_body(HOME)
            .create_async()
            .await;

        let mut orchestrator = CrawlerOrchestrator::new(quiet_config(), None);
        let report = orchestrator
            .crawl_website(&server.url(), options(1))
            .await
            .unwrap();

        assert!(report.additional_pages.is_empty());

        orchestrator.reset();
        assert!(orchestrator.session().is_none());
    }
}
