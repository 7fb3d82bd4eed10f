//! URL management: normalization, skip rules, importance scoring, prefiltering
//!
//! Everything here except `UrlManager::prefilter_urls` is pure. The skip and
//! scoring functions take plain strings so they can be applied to sitemap
//! entries, extracted links and user input alike.

mod scoring;

pub use scoring::{calculate_page_importance_score, is_homepage_path, prioritize_urls_by_importance};

use futures::future::join_all;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::trap_detection;

/// Errors from URL handling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl UrlError {
    fn invalid(url: &str, reason: impl Into<String>) -> Self {
        UrlError::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Tracking/session query parameters stripped during normalization
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "_ga", "_gl", "yclid", "igshid",
    "sid", "sessionid", "phpsessid", "jsessionid",
];

/// Domains never worth crawling from an audited site
const DEFAULT_BLACKLIST: &[&str] = &[
    "facebook.com", "fb.com", "twitter.com", "x.com", "instagram.com", "linkedin.com",
    "youtube.com", "youtu.be", "pinterest.com", "tiktok.com", "google.com", "goo.gl",
    "maps.app.goo.gl", "apple.com", "yelp.com", "bbb.org", "wa.me", "whatsapp.com",
    "t.me", "reddit.com", "vimeo.com", "amazon.com", "doubleclick.net",
];

static RE_PROTOCOL_PREFIX: OnceLock<Regex> = OnceLock::new();
static RE_FOREIGN_SCHEME: OnceLock<Regex> = OnceLock::new();
static RE_DATED_ARCHIVE: OnceLock<Regex> = OnceLock::new();
static RE_PAGINATED_LISTING: OnceLock<Regex> = OnceLock::new();
static RE_SERVICE_AREA: OnceLock<Regex> = OnceLock::new();

fn protocol_prefix() -> &'static Regex {
    // One or more (possibly mangled) http(s) prefixes: "https://", "http//", "https://https://"
    RE_PROTOCOL_PREFIX.get_or_init(|| {
        Regex::new(r"(?i)^(?:https?(?::/{0,2}|/{1,2}))+").expect("valid regex")
    })
}

fn foreign_scheme() -> &'static Regex {
    RE_FOREIGN_SCHEME
        .get_or_init(|| Regex::new(r"(?i)^[a-z][a-z0-9+.\-]*:[^0-9]").expect("valid regex"))
}

fn dated_archive() -> &'static Regex {
    // /2023/05 or /2023/05/14 as a listing (nothing after the date)
    RE_DATED_ARCHIVE.get_or_init(|| {
        Regex::new(r"/(?:19|20)\d{2}/\d{1,2}(?:/\d{1,2})?/?$").expect("valid regex")
    })
}

fn paginated_listing() -> &'static Regex {
    RE_PAGINATED_LISTING.get_or_init(|| {
        Regex::new(r"(?i)/(?:category|categories|tag|tags|author)/[^/]+/page/\d+")
            .expect("valid regex")
    })
}

fn service_area() -> &'static Regex {
    // /service-area/<city>/<service> style permutations
    RE_SERVICE_AREA.get_or_init(|| {
        Regex::new(r"(?i)/(?:service-areas?|areas-we-serve|areas-served)/[^/]+/[^/]+")
            .expect("valid regex")
    })
}

/// Repair a raw URL string so it can be parsed: scheme-relative, missing,
/// mangled or duplicated protocols.
fn repair_protocol(raw: &str) -> Result<String, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::invalid(raw, "empty string"));
    }

    if let Some(m) = protocol_prefix().find(trimmed) {
        let scheme = if m.as_str().to_ascii_lowercase().starts_with("https") {
            "https"
        } else {
            "http"
        };
        let rest = trimmed[m.end()..].trim_start_matches('/');
        return Ok(format!("{}://{}", scheme, rest));
    }

    if let Some(rest) = trimmed.strip_prefix("//") {
        return Ok(format!("https://{}", rest));
    }

    if foreign_scheme().is_match(trimmed) {
        return Err(UrlError::invalid(raw, "unsupported scheme"));
    }

    Ok(format!("https://{}", trimmed.trim_start_matches('/')))
}

/// Normalize a raw URL string into its canonical form.
///
/// - Repairs missing or duplicated protocols
/// - Strips fragments
/// - Removes trailing slashes from non-root paths
/// - Strips tracking/session query parameters and sorts the rest
///
/// Idempotent: normalizing an already normalized URL returns it unchanged.
pub fn normalize_url(raw: &str) -> Result<String, UrlError> {
    let repaired = repair_protocol(raw)?;
    let mut url = Url::parse(&repaired).map_err(|e| UrlError::invalid(raw, e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlError::invalid(raw, "unsupported scheme"));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::invalid(raw, "missing host")),
    }

    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        url.set_path(if trimmed.is_empty() { "/" } else { trimmed });
    }

    if let Some(query) = url.query().map(|q| q.to_string()) {
        let mut params: Vec<&str> = query
            .split('&')
            .filter(|p| !p.is_empty())
            .filter(|p| {
                let key = p.split('=').next().unwrap_or("").to_ascii_lowercase();
                !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_str())
            })
            .collect();

        if params.is_empty() {
            url.set_query(None);
        } else {
            params.sort_unstable();
            url.set_query(Some(&params.join("&")));
        }
    }

    Ok(url.to_string())
}

/// Host without a leading `www.`
pub(crate) fn site_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}

/// Whether `url` belongs to the same site as `base` (`www.` is ignored)
pub fn is_same_site(url: &str, base: &str) -> bool {
    match (Url::parse(url), Url::parse(base)) {
        (Ok(u), Ok(b)) => site_host(&u).is_some() && site_host(&u) == site_host(&b),
        _ => false,
    }
}

/// Structural patterns that produce near-identical pages
pub(crate) fn is_structural_duplicate(url: &Url) -> bool {
    let path = url.path();

    if dated_archive().is_match(path) || paginated_listing().is_match(path) {
        return true;
    }
    if service_area().is_match(path) {
        return true;
    }

    // Query-string pagination of listing pages (?page=3 on /category/...)
    if let Some(query) = url.query() {
        let lower_path = path.to_ascii_lowercase();
        let is_listing = ["/category", "/tag", "/blog", "/news"]
            .iter()
            .any(|p| lower_path.starts_with(p));
        let paginated = query
            .split('&')
            .any(|p| p.starts_with("page=") || p.starts_with("paged="));
        if is_listing && paginated {
            return true;
        }
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    trap_detection::has_repetitive_pattern(&segments, 3) || trap_detection::is_calendar_trap(path)
}

/// Configuration for network prefiltering
#[derive(Debug, Clone)]
pub struct PrefilterConfig {
    /// Concurrent HEAD requests per batch
    pub batch_size: usize,
    /// Per-request timeout
    pub timeout: Duration,
    /// Responses announcing more bytes than this are dropped
    pub max_content_size: usize,
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            timeout: Duration::from_secs(5),
            max_content_size: 5 * 1024 * 1024,
        }
    }
}

impl PrefilterConfig {
    pub fn from_config(config: &crate::config::CrawlerConfig) -> Self {
        Self {
            batch_size: config.prefilter_batch_size.max(1),
            timeout: Duration::from_secs(config.prefilter_timeout_secs),
            max_content_size: config.max_content_size,
        }
    }
}

/// Outcome of a single preflight probe
#[derive(Debug, Clone, PartialEq, Eq)]
enum Preflight {
    Keep,
    NotHtml(String),
    TooLarge(u64),
}

/// Stateful part of URL management: the domain blacklist and the HTTP client
/// used for preflight checks.
pub struct UrlManager {
    blacklist: HashSet<String>,
    client: reqwest::Client,
    prefilter: PrefilterConfig,
}

impl UrlManager {
    /// Create a URL manager with the default blacklist
    pub fn new(client: reqwest::Client, prefilter: PrefilterConfig) -> Self {
        Self {
            blacklist: DEFAULT_BLACKLIST.iter().map(|d| d.to_string()).collect(),
            client,
            prefilter,
        }
    }

    /// Add a domain to the blacklist
    pub fn blacklist_domain(&mut self, domain: &str) {
        self.blacklist
            .insert(domain.trim_start_matches("www.").to_ascii_lowercase());
    }

    /// Normalize a URL (see [`normalize_url`])
    pub fn normalize_url(&self, raw: &str) -> Result<String, UrlError> {
        normalize_url(raw)
    }

    /// Whether a host (or any parent domain) is blacklisted
    pub fn is_blacklisted(&self, host: &str) -> bool {
        let host = host.trim_start_matches("www.").to_ascii_lowercase();
        self.blacklist.iter().any(|d| host == *d || host.ends_with(&format!(".{}", d)))
    }

    /// Decide whether a URL should be skipped.
    ///
    /// Pure: depends only on `url`, the blacklist and the `crawled` snapshot
    /// (which must contain normalized URLs).
    pub fn should_skip_url(&self, url: &str, crawled: &HashSet<String>) -> bool {
        let normalized = match normalize_url(url) {
            Ok(n) => n,
            Err(_) => return true,
        };
        let parsed = match Url::parse(&normalized) {
            Ok(u) => u,
            Err(_) => return true,
        };

        if parsed.host_str().map(|h| self.is_blacklisted(h)).unwrap_or(true) {
            return true;
        }
        if crawled.contains(&normalized) {
            return true;
        }
        is_structural_duplicate(&parsed)
    }

    /// Drop URLs whose preflight proves they are not crawlable HTML.
    ///
    /// Probes run `batch_size` at a time. A failed probe keeps the URL:
    /// network trouble is not evidence of irrelevance.
    pub async fn prefilter_urls(&self, urls: Vec<String>) -> Vec<String> {
        let mut kept = Vec::with_capacity(urls.len());

        for batch in urls.chunks(self.prefilter.batch_size.max(1)) {
            let probes = batch.iter().map(|u| self.preflight(u));
            let outcomes = join_all(probes).await;

            for (url, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Preflight::Keep => kept.push(url.clone()),
                    Preflight::NotHtml(ct) => {
                        debug!("Prefilter dropped {} (content-type {})", url, ct)
                    }
                    Preflight::TooLarge(len) => {
                        debug!("Prefilter dropped {} ({} bytes)", url, len)
                    }
                }
            }
        }

        kept
    }

    async fn preflight(&self, url: &str) -> Preflight {
        let request = self.client.head(url).send();
        let response = match tokio::time::timeout(self.prefilter.timeout, request).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                debug!("Preflight failed for {}: {}", url, e);
                return Preflight::Keep;
            }
            Err(_) => {
                debug!("Preflight timed out for {}", url);
                return Preflight::Keep;
            }
        };

        if !response.status().is_success() {
            // HEAD unsupported, auth walls, etc. say nothing about the content
            return Preflight::Keep;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let content_length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        classify_preflight(
            content_type.as_deref(),
            content_length,
            self.prefilter.max_content_size as u64,
        )
    }
}

/// Decide from response headers whether a URL is worth fetching
fn classify_preflight(content_type: Option<&str>, content_length: Option<u64>, max_size: u64) -> Preflight {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if !ct.contains("text/html") && !ct.contains("application/xhtml") {
            return Preflight::NotHtml(ct);
        }
    }

    match content_length {
        Some(len) if len > max_size => Preflight::TooLarge(len),
        _ => Preflight::Keep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> UrlManager {
        UrlManager::new(reqwest::Client::new(), PrefilterConfig::default())
    }

    #[test]
    fn normalize_repairs_protocols() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com/");
        assert_eq!(normalize_url("//example.com/a").unwrap(), "https://example.com/a");
        assert_eq!(
            normalize_url("https://https://example.com/a").unwrap(),
            "https://example.com/a"
        );
        assert_eq!(normalize_url("http//example.com/a").unwrap(), "http://example.com/a");
        assert_eq!(normalize_url("HTTPS://Example.COM/About/").unwrap(), "https://example.com/About");
        assert_eq!(normalize_url("localhost:3000/x").unwrap(), "https://localhost:3000/x");
    }

    #[test]
    fn normalize_strips_fragment_tracking_and_sorts_query() {
        assert_eq!(
            normalize_url("https://example.com/p/?b=2&utm_source=x&a=1#top").unwrap(),
            "https://example.com/p?a=1&b=2"
        );
        assert_eq!(
            normalize_url("https://example.com/p?utm_medium=email&fbclid=1").unwrap(),
            "https://example.com/p"
        );
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(matches!(normalize_url(""), Err(UrlError::InvalidUrl { .. })));
        assert!(normalize_url("mailto:someone@example.com").is_err());
        assert!(normalize_url("javascript:void(0)").is_err());
        assert!(normalize_url("ftp://example.com/file").is_err());
        assert!(normalize_url("https://").is_err());
        assert!(normalize_url("not a url at all").is_err());
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            "example.com",
            "https://example.com/a/b/",
            "http//example.com//x//",
            "https://https://example.com/p?z=1&a=2&utm_campaign=c#frag",
            "//cdn.example.com/page?page=2",
            "https://example.com:8443/Path/To/",
            "https://example.com/?",
        ];
        for raw in inputs {
            let once = normalize_url(raw).unwrap();
            let twice = normalize_url(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", raw);
        }
    }

    #[test]
    fn same_site_ignores_www() {
        assert!(is_same_site("https://www.example.com/a", "https://example.com/"));
        assert!(!is_same_site("https://blog.example.org/a", "https://example.com/"));
    }

    #[test]
    fn skip_blacklisted_and_crawled() {
        let m = manager();
        let mut crawled = HashSet::new();
        crawled.insert("https://example.com/about".to_string());

        assert!(m.should_skip_url("https://www.facebook.com/acme", &crawled));
        assert!(m.should_skip_url("https://m.youtube.com/watch?v=1", &crawled));
        assert!(m.should_skip_url("https://example.com/about/", &crawled));
        assert!(!m.should_skip_url("https://example.com/contact", &crawled));
        assert!(m.should_skip_url("::::", &crawled));
    }

    #[test]
    fn skip_structural_duplicates() {
        let m = manager();
        let crawled = HashSet::new();
        assert!(m.should_skip_url("https://example.com/2023/05/", &crawled));
        assert!(m.should_skip_url("https://example.com/category/news/page/3", &crawled));
        assert!(m.should_skip_url("https://example.com/category/news?page=2", &crawled));
        assert!(m.should_skip_url("https://example.com/service-area/springfield/plumbing", &crawled));
        assert!(!m.should_skip_url("https://example.com/blog/how-to-fix-a-leak", &crawled));
        assert!(!m.should_skip_url("https://example.com/service-area/springfield", &crawled));
    }

    #[test]
    fn skip_is_deterministic() {
        let m = manager();
        let crawled: HashSet<String> = ["https://example.com/a".to_string()].into_iter().collect();
        for url in ["https://example.com/a", "https://example.com/b", "https://x.com/z"] {
            assert_eq!(m.should_skip_url(url, &crawled), m.should_skip_url(url, &crawled));
        }
    }

    #[test]
    fn custom_blacklist_entries() {
        let mut m = manager();
        assert!(!m.is_blacklisted("partner.example.net"));
        m.blacklist_domain("www.example.net");
        assert!(m.is_blacklisted("partner.example.net"));
        assert!(m.is_blacklisted("example.net"));
    }

    #[test]
    fn preflight_classification() {
        let max = 1_000;
        assert_eq!(classify_preflight(Some("text/html; charset=utf-8"), Some(10), max), Preflight::Keep);
        assert_eq!(classify_preflight(Some("application/xhtml+xml"), None, max), Preflight::Keep);
        assert_eq!(classify_preflight(None, None, max), Preflight::Keep);
        assert_eq!(
            classify_preflight(Some("Image/PNG"), Some(10), max),
            Preflight::NotHtml("image/png".into())
        );
        assert_eq!(classify_preflight(Some("text/html"), Some(5_000), max), Preflight::TooLarge(5_000));
    }

    #[tokio::test]
    async fn prefilter_drops_confirmed_non_html_only() {
        let mut server = mockito::Server::new_async().await;
        let html = server
            .mock("HEAD", "/page")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .create_async()
            .await;
        let pdf = server
            .mock("HEAD", "/brochure")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .create_async()
            .await;
        let missing = server.mock("HEAD", "/gone").with_status(404).create_async().await;

        let m = manager();
        let base = server.url();
        let urls = vec![
            format!("{}/page", base),
            format!("{}/brochure", base),
            format!("{}/gone", base),
            "http://127.0.0.1:1/unreachable".to_string(),
        ];

        let kept = m.prefilter_urls(urls).await;
        assert_eq!(
            kept,
            vec![
                format!("{}/page", base),
                format!("{}/gone", base),
                "http://127.0.0.1:1/unreachable".to_string(),
            ]
        );

        html.assert_async().await;
        pdf.assert_async().await;
        missing.assert_async().await;
    }
}
