//! Sitemap discovery
//!
//! Seeds the frontier from `robots.txt` `Sitemap:` directives and well-known
//! sitemap locations. Indexes are expanded breadth-first with a per-index
//! child cap and a nesting limit. Every failure is local: a sitemap that
//! cannot be fetched or parsed contributes nothing and discovery moves on.
//!
//! Bodies are read under a byte cap. `.xml.gz` files served without a
//! `Content-Encoding` header are gunzipped here, under the same cap.

use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::trap_detection::should_terminate_early;
use super::url_manager::{is_same_site, is_structural_duplicate, normalize_url, prioritize_urls_by_importance};
use crate::config::SitemapConfig;

/// Well-known sitemap paths tried when robots.txt names none that work
pub const WELL_KNOWN_SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/wp-sitemap.xml",
    "/sitemap-index.xml",
    "/sitemap1.xml",
];

/// Errors for a single sitemap; never surfaced past discovery
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("XML parse error: {0}")]
    Parse(String),
    #[error("document is neither a urlset nor a sitemapindex")]
    NotASitemap,
    #[error("body exceeds {0} bytes")]
    TooLarge(usize),
    #[error("gzip error: {0}")]
    Gzip(#[from] std::io::Error),
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Gunzip `bytes`, refusing output larger than `limit`
pub fn gunzip_capped(bytes: &[u8], limit: usize) -> Result<Vec<u8>, SitemapError> {
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(SitemapError::TooLarge(limit));
    }
    Ok(out)
}

/// Where discovery currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveryPhase {
    Idle,
    DiscoveringRobots,
    DiscoveringCandidates,
    ExpandingIndexes,
    Filtering,
    Done,
}

impl fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::DiscoveringRobots => "discovering(robots)",
            Self::DiscoveringCandidates => "discovering(candidates)",
            Self::ExpandingIndexes => "expanding(indexes)",
            Self::Filtering => "filtering",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<urlset>`: page locations
    UrlSet(Vec<String>),
    /// `<sitemapindex>`: child sitemap locations
    Index(Vec<String>),
}

/// Parse a sitemap or sitemap index, ignoring namespaces
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument, SitemapError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root: Option<String> = None;
    let mut in_loc = false;
    let mut text_buf = String::new();
    let mut locations = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                if root.is_none() {
                    root = Some(name.clone());
                }
                if name == "loc" {
                    in_loc = true;
                    text_buf.clear();
                }
            }
            Ok(Event::Text(ref e)) if in_loc => {
                let text = e.unescape().map_err(|err| SitemapError::Parse(err.to_string()))?;
                text_buf.push_str(&text);
            }
            Ok(Event::CData(ref e)) if in_loc => {
                text_buf.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref().eq_ignore_ascii_case(b"loc") {
                    in_loc = false;
                    let loc = text_buf.trim();
                    if !loc.is_empty() {
                        locations.push(loc.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(SitemapError::Parse(e.to_string())),
        }
    }

    match root.as_deref() {
        Some("urlset") => Ok(SitemapDocument::UrlSet(locations)),
        Some("sitemapindex") => Ok(SitemapDocument::Index(locations)),
        _ => Err(SitemapError::NotASitemap),
    }
}

/// `Sitemap:` directives from a robots.txt body
pub fn parse_robots_sitemaps(robots: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    robots
        .lines()
        .filter_map(|line| {
            let (directive, value) = line.split_once(':')?;
            directive
                .trim()
                .eq_ignore_ascii_case("sitemap")
                .then(|| value.trim().to_string())
        })
        .filter(|url| !url.is_empty() && seen.insert(url.clone()))
        .collect()
}

/// Discovery outcome
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapDiscovery {
    /// At least one sitemap was fetched and parsed
    pub found: bool,
    /// Filtered, prioritized page URLs
    pub urls: Vec<String>,
    /// Sitemap documents fetched this run
    pub sitemaps: Vec<String>,
    /// Page URLs listed before filtering
    pub listed: usize,
}

/// Per-session sitemap discovery
pub struct SitemapService {
    client: reqwest::Client,
    config: SitemapConfig,
    /// Sitemap URLs already requested this session
    processed: HashSet<String>,
    phase: DiscoveryPhase,
}

impl SitemapService {
    pub fn new(client: reqwest::Client, config: SitemapConfig) -> Self {
        Self {
            client,
            config,
            processed: HashSet::new(),
            phase: DiscoveryPhase::Idle,
        }
    }

    pub fn phase(&self) -> DiscoveryPhase {
        self.phase
    }

    /// Number of sitemap URLs requested this session
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    fn enter(&mut self, phase: DiscoveryPhase) {
        debug!("Sitemap discovery: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs.max(1))
    }

    /// Discover page URLs for the site at `base`
    pub async fn discover(&mut self, base: &Url) -> SitemapDiscovery {
        let mut result = SitemapDiscovery::default();
        let mut pages: Vec<String> = Vec::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();

        self.enter(DiscoveryPhase::DiscoveringRobots);
        let from_robots = self.robots_sitemaps(base).await;
        if !from_robots.is_empty() {
            debug!("robots.txt lists {} sitemap(s)", from_robots.len());
        }

        self.enter(DiscoveryPhase::DiscoveringCandidates);
        let well_known = WELL_KNOWN_SITEMAP_PATHS
            .iter()
            .filter_map(|path| base.join(path).ok())
            .map(|u| u.to_string());

        // robots.txt entries are all tried; well-known paths only until one works
        for (candidate, listed_in_robots) in from_robots
            .into_iter()
            .map(|u| (u, true))
            .chain(well_known.map(|u| (u, false)))
        {
            if !listed_in_robots && result.found {
                break;
            }
            if let Some(document) = self.fetch_document(&candidate, &mut result).await {
                absorb(document, 0, &mut pages, &mut queue, self.config.max_children_per_index);
            }
        }

        self.enter(DiscoveryPhase::ExpandingIndexes);
        while let Some((child, depth)) = queue.pop_front() {
            if let Some(document) = self.fetch_document(&child, &mut result).await {
                if matches!(document, SitemapDocument::Index(_)) && depth >= self.config.max_index_depth {
                    debug!("Not expanding {}: index nesting limit reached", child);
                    continue;
                }
                absorb(document, depth, &mut pages, &mut queue, self.config.max_children_per_index);
            }
        }

        self.enter(DiscoveryPhase::Filtering);
        result.listed = pages.len();
        result.urls = self.filter_urls(pages, base);

        self.enter(DiscoveryPhase::Done);
        if result.found {
            info!(
                "Sitemaps for {}: {} fetched, {} URLs listed, {} kept",
                base,
                result.sitemaps.len(),
                result.listed,
                result.urls.len()
            );
        } else {
            info!("No sitemap found for {}", base);
        }
        result
    }

    async fn robots_sitemaps(&self, base: &Url) -> Vec<String> {
        let Ok(robots_url) = base.join("/robots.txt") else {
            return Vec::new();
        };
        match self.get_text(robots_url.as_str()).await {
            Ok(body) => parse_robots_sitemaps(&body),
            Err(e) => {
                debug!("No usable robots.txt at {}: {}", robots_url, e);
                Vec::new()
            }
        }
    }

    /// Fetch and parse one sitemap unless it was already requested
    async fn fetch_document(&mut self, url: &str, result: &mut SitemapDiscovery) -> Option<SitemapDocument> {
        let key = normalize_url(url).unwrap_or_else(|_| url.to_string());
        if !self.processed.insert(key) {
            debug!("Sitemap {} already processed", url);
            return None;
        }

        let body = match self.get_text(url).await {
            Ok(body) => body,
            Err(e) => {
                debug!("Sitemap {} unavailable: {}", url, e);
                return None;
            }
        };
        match parse_sitemap(&body) {
            Ok(document) => {
                result.found = true;
                result.sitemaps.push(url.to_string());
                Some(document)
            }
            Err(e) => {
                warn!("Ignoring sitemap {}: {}", url, e);
                None
            }
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, SitemapError> {
        let mut response = self.client.get(url).timeout(self.timeout()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SitemapError::Status(status.as_u16()));
        }

        let limit = self.config.max_sitemap_bytes;
        if let Some(len) = response.content_length() {
            if len as usize > limit {
                return Err(SitemapError::TooLarge(limit));
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() > limit {
                return Err(SitemapError::TooLarge(limit));
            }
        }

        if body.starts_with(&GZIP_MAGIC) {
            body = gunzip_capped(&body, limit)?;
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Same site, crawlable, normalized, deduplicated, scored and capped
    fn filter_urls(&self, urls: Vec<String>, base: &Url) -> Vec<String> {
        let mut seen = HashSet::new();
        let kept: Vec<String> = urls
            .into_iter()
            .filter(|u| is_same_site(u, base.as_str()))
            .filter(|u| !should_terminate_early(u).terminate)
            .filter_map(|u| normalize_url(&u).ok())
            .filter(|u| {
                Url::parse(u)
                    .map(|parsed| !is_structural_duplicate(&parsed))
                    .unwrap_or(false)
            })
            .filter(|u| seen.insert(u.clone()))
            .collect();

        let mut prioritized = prioritize_urls_by_importance(kept, base.as_str());
        prioritized.truncate(self.config.max_urls);
        prioritized
    }
}

fn absorb(
    document: SitemapDocument,
    depth: usize,
    pages: &mut Vec<String>,
    queue: &mut VecDeque<(String, usize)>,
    max_children: usize,
) {
    match document {
        SitemapDocument::UrlSet(urls) => pages.extend(urls),
        SitemapDocument::Index(children) => {
            if children.len() > max_children {
                debug!("Sitemap index lists {} children, expanding {}", children.len(), max_children);
            }
            queue.extend(children.into_iter().take(max_children).map(|c| (c, depth + 1)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn parses_urlset_with_namespace_prefix() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sm:url><sm:loc>https://x.test/a</sm:loc></sm:url>
  <sm:url><sm:loc> https://x.test/b?x=1&amp;y=2 </sm:loc><sm:lastmod>2024-01-01</sm:lastmod></sm:url>
</sm:urlset>"#;
        assert_eq!(
            parse_sitemap(xml).unwrap(),
            SitemapDocument::UrlSet(vec!["https://x.test/a".into(), "https://x.test/b?x=1&y=2".into()])
        );
    }

    #[test]
    fn parses_index_and_cdata() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc><![CDATA[https://x.test/post-sitemap.xml]]></loc></sitemap>
  <sitemap><loc>https://x.test/page-sitemap.xml</loc></sitemap>
</sitemapindex>"#;
        assert_eq!(
            parse_sitemap(xml).unwrap(),
            SitemapDocument::Index(vec![
                "https://x.test/post-sitemap.xml".into(),
                "https://x.test/page-sitemap.xml".into()
            ])
        );
    }

    #[test]
    fn rejects_non_sitemaps() {
        assert!(matches!(parse_sitemap("<html><body>404</body></html>"), Err(SitemapError::NotASitemap)));
        assert!(parse_sitemap("<urlset><url><loc>x</url></urlset>").is_err());
    }

    #[test]
    fn robots_directives() {
        let robots = "User-agent: *\nDisallow: /admin\nSitemap: https://x.test/sitemap.xml\nsitemap:https://x.test/news.xml\nSITEMAP: https://x.test/sitemap.xml\n";
        assert_eq!(
            parse_robots_sitemaps(robots),
            vec!["https://x.test/sitemap.xml", "https://x.test/news.xml"]
        );
    }

    fn service() -> SitemapService {
        SitemapService::new(reqwest::Client::new(), SitemapConfig::default())
    }

    #[test]
    fn filtering_keeps_same_site_pages() {
        let base = Url::parse("https://x.test/").unwrap();
        let urls = vec![
            "https://x.test/blog/post".to_string(),
            "https://www.x.test/contact/".to_string(),
            "https://other.test/page".to_string(),
            "https://x.test/brochure.pdf".to_string(),
            "https://x.test/cart".to_string(),
            "https://x.test/blog/2023/05".to_string(),
            "https://x.test/blog/post#comments".to_string(),
        ];
        let kept = service().filter_urls(urls, &base);
        assert_eq!(kept, vec!["https://www.x.test/contact", "https://x.test/blog/post"]);
    }

    #[tokio::test]
    async fn robots_index_children_union() {
        let mut server = mockito::Server::new_async().await;
        let origin = server.url();

        let robots = server
            .mock("GET", "/robots.txt")
            .with_body(format!("User-agent: *\nSitemap: {}/sitemap.xml\n", origin))
            .expect(2)
            .create_async()
            .await;
        let index = server
            .mock("GET", "/sitemap.xml")
            .with_body(format!(
                "<sitemapindex><sitemap><loc>{0}/a.xml</loc></sitemap><sitemap><loc>{0}/b.xml</loc></sitemap></sitemapindex>",
                origin
            ))
            .expect(1)
            .create_async()
            .await;
        let child_a = server
            .mock("GET", "/a.xml")
            .with_body(format!(
                "<urlset><url><loc>{0}/one</loc></url><url><loc>{0}/two</loc></url><url><loc>{0}/three</loc></url></urlset>",
                origin
            ))
            .expect(1)
            .create_async()
            .await;
        let child_b = server
            .mock("GET", "/b.xml")
            .with_body(format!(
                "<urlset><url><loc>{0}/four</loc></url><url><loc>{0}/five</loc></url><url><loc>{0}/six</loc></url></urlset>",
                origin
            ))
            .expect(1)
            .create_async()
            .await;

        let mut svc = service();
        let base = Url::parse(&origin).unwrap();
        let found = svc.discover(&base).await;

        assert!(found.found);
        assert_eq!(found.listed, 6);
        assert_eq!(found.urls.len(), 6);
        assert_eq!(found.sitemaps.len(), 3);
        assert_eq!(svc.phase(), DiscoveryPhase::Done);

        // A second run in the same session does not refetch anything
        let again = svc.discover(&base).await;
        assert!(again.urls.is_empty());

        robots.assert_async().await;
        index.assert_async().await;
        child_a.assert_async().await;
        child_b.assert_async().await;
    }

    #[tokio::test]
    async fn child_cap_and_self_reference() {
        let mut server = mockito::Server::new_async().await;
        let origin = server.url();

        // The index lists itself first, then 15 children
        let children: String = std::iter::once(format!("<sitemap><loc>{}/sitemap.xml</loc></sitemap>", origin))
            .chain((0..15).map(|i| format!("<sitemap><loc>{}/s{}.xml</loc></sitemap>", origin, i)))
            .collect();
        let index = server
            .mock("GET", "/sitemap.xml")
            .with_body(format!("<sitemapindex>{}</sitemapindex>", children))
            .expect(1)
            .create_async()
            .await;
        let child = server
            .mock("GET", mockito::Matcher::Regex(r"^/s\d+\.xml$".to_string()))
            .with_body(format!("<urlset><url><loc>{}/page</loc></url></urlset>", origin))
            .expect(9)
            .create_async()
            .await;

        let mut svc = SitemapService::new(
            reqwest::Client::new(),
            SitemapConfig {
                max_children_per_index: 10,
                ..SitemapConfig::default()
            },
        );
        let found = svc.discover(&Url::parse(&origin).unwrap()).await;

        assert!(found.found);
        assert_eq!(found.listed, 9);
        assert_eq!(found.urls.len(), 1);
        index.assert_async().await;
        child.assert_async().await;
    }

    #[tokio::test]
    async fn nothing_found_is_empty_not_error() {
        let server = mockito::Server::new_async().await;
        let mut svc = service();
        let found = svc.discover(&Url::parse(&server.url()).unwrap()).await;

        assert!(!found.found);
        assert!(found.urls.is_empty());
        assert_eq!(svc.processed_count(), WELL_KNOWN_SITEMAP_PATHS.len());
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn gunzip_respects_limit() {
        let packed = gzip(&vec![b'a'; 10_000]);
        assert!(packed.len() < 1_000);
        assert_eq!(gunzip_capped(&packed, 10_000).unwrap().len(), 10_000);
        assert!(matches!(gunzip_capped(&packed, 1_000), Err(SitemapError::TooLarge(1_000))));
    }

    #[tokio::test]
    async fn gzipped_sitemap_without_content_encoding() {
        let mut server = mockito::Server::new_async().await;
        let origin = server.url();

        let _robots = server
            .mock("GET", "/robots.txt")
            .with_body(format!("Sitemap: {}/sitemap.xml.gz\n", origin))
            .create_async()
            .await;
        let sitemap = server
            .mock("GET", "/sitemap.xml.gz")
            .with_header("content-type", "application/x-gzip")
            .with_body(gzip(
                format!("<urlset><url><loc>{0}/menu</loc></url><url><loc>{0}/events</loc></url></urlset>", origin)
                    .as_bytes(),
            ))
            .expect(1)
            .create_async()
            .await;

        let found = service().discover(&Url::parse(&origin).unwrap()).await;

        sitemap.assert_async().await;
        assert!(found.found);
        assert_eq!(found.listed, 2);
    }

    #[tokio::test]
    async fn oversized_sitemap_is_ignored() {
        let mut server = mockito::Server::new_async().await;
        let origin = server.url();

        let urls: String = (0..50)
            .map(|i| format!("<url><loc>{}/page-{}</loc></url>", origin, i))
            .collect();
        let _sitemap = server
            .mock("GET", "/sitemap.xml")
            .with_body(format!("<urlset>{}</urlset>", urls))
            .create_async()
            .await;

        let mut svc = SitemapService::new(
            reqwest::Client::new(),
            SitemapConfig {
                max_sitemap_bytes: 512,
                ..SitemapConfig::default()
            },
        );
        let found = svc.discover(&Url::parse(&origin).unwrap()).await;

        assert!(!found.found);
        assert!(found.urls.is_empty());
    }

    #[tokio::test]
    async fn equivalent_sitemap_urls_fetched_once() {
        let mut server = mockito::Server::new_async().await;
        let origin = server.url();

        let _robots = server
            .mock("GET", "/robots.txt")
            .with_body(format!(
                "Sitemap: {0}/sitemap.xml\nSitemap: {0}/sitemap.xml#main\nSitemap: {0}/sitemap.xml/\n",
                origin
            ))
            .create_async()
            .await;
        let sitemap = server
            .mock("GET", Matcher::Regex(r"^/sitemap\.xml/?$".to_string()))
            .with_body(format!("<urlset><url><loc>{}/about</loc></url></urlset>", origin))
            .expect(1)
            .create_async()
            .await;

        let mut svc = service();
        let found = svc.discover(&Url::parse(&origin).unwrap()).await;

        sitemap.assert_async().await;
        assert!(found.found);
        assert_eq!(found.sitemaps.len(), 1);
        assert_eq!(svc.processed_count(), 1);
    }
}
