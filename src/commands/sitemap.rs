use anyhow::Result;
use seo_crawl::config::Config;
use seo_crawl::crawling::dns::DnsCache;
use seo_crawl::crawling::fetcher::{FetchConfig, HttpFetcher};
use seo_crawl::crawling::sitemap::SitemapService;
use tracing::info;

use super::{parse_site_url, to_json};

pub async fn discover_sitemaps(config: Config, url: &str, pretty: bool) -> Result<()> {
    let base = parse_site_url(url)?;
    let fetcher = HttpFetcher::new(FetchConfig::from_config(&config.crawler), DnsCache::new())?;
    let mut service = SitemapService::new(fetcher.client().clone(), config.sitemap.clone());

    info!("Discovering sitemaps for {}", base);
    let discovery = service.discover(&base).await;

    println!("{}", to_json(&discovery, pretty)?);
    Ok(())
}
