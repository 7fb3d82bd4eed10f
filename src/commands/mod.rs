//! CLI command implementations

mod crawl;
mod detect;
mod init;
mod sitemap;

pub use crawl::{crawl_site, CrawlArgs};
pub use detect::detect_site;
pub use init::init_config;
pub use sitemap::discover_sitemaps;

use anyhow::{Context, Result};
use serde::Serialize;
use seo_crawl::crawling::url_manager::normalize_url;
use url::Url;

/// Normalize user input into a crawlable URL
pub(crate) fn parse_site_url(raw: &str) -> Result<Url> {
    let normalized = normalize_url(raw)?;
    Url::parse(&normalized).with_context(|| format!("invalid URL: {}", raw))
}

pub(crate) fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}
