//! SEO crawl: site crawling and page normalization for SEO audits
//!
//! Features:
//! - URL normalization, trap detection and importance-ordered frontiers
//! - Sitemap discovery through robots.txt and well-known locations
//! - CMS fingerprinting with platform-specific crawl filtering
//! - Near-duplicate content detection
//! - Optional headless-browser rendering behind a circuit breaker
//! - Adaptive batch concurrency and request timeouts

pub mod config;
pub mod crawling;
pub mod util;

pub use config::Config;
pub use crawling::{CrawlOptions, CrawlReport, CrawlerOrchestrator};
