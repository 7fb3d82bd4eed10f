//! Crawling subsystem for SEO site audits
//!
//! Crawls one website from its homepage and returns structured per-page
//! facts plus a site-level summary for downstream scoring.
//!
//! Key components:
//! - `UrlManager`: normalization, skip rules, importance scoring, prefiltering
//! - `SitemapService`: robots.txt and sitemap discovery
//! - `CmsDetector`: platform fingerprinting and CMS-specific URL filtering
//! - `ContentHashIndex`: near-duplicate content detection
//! - `BrowserRenderer`: headless rendering through a shared `BrowserPool`
//! - `CircuitBreaker`: failure isolation for the browser cluster
//! - `CrawlerOrchestrator`: drives a crawl through a per-crawl `CrawlSession`

pub mod browser;
pub mod circuit_breaker;
pub mod cms;
pub mod concurrency;
pub mod dns;
pub mod extractor;
pub mod fetcher;
pub mod orchestrator;
pub mod priority;
pub mod retry;
pub mod session;
pub mod similarity;
pub mod sitemap;
pub mod trap_detection;
pub mod url_manager;

pub use browser::{BrowserPool, BrowserRenderer};
pub use circuit_breaker::CircuitBreaker;
pub use cms::CmsDetector;
pub use extractor::{HtmlPageExtractor, PageExtractor, PageFacts};
pub use orchestrator::{CrawlOptions, CrawlReport, CrawlerOrchestrator};
pub use session::CrawlSession;
pub use similarity::ContentHashIndex;
pub use sitemap::SitemapService;
pub use url_manager::UrlManager;
