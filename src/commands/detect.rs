use anyhow::{bail, Result};
use seo_crawl::config::Config;
use seo_crawl::crawling::browser::score_javascript_heaviness;
use seo_crawl::crawling::cms::CmsDetector;
use seo_crawl::crawling::concurrency::TimeoutBounds;
use seo_crawl::crawling::dns::DnsCache;
use seo_crawl::crawling::fetcher::{FetchConfig, HttpFetcher};
use seo_crawl::crawling::priority::classify;
use serde_json::json;

use super::{parse_site_url, to_json};

pub async fn detect_site(config: Config, url: &str) -> Result<()> {
    let url = parse_site_url(url)?;
    let fetcher = HttpFetcher::new(FetchConfig::from_config(&config.crawler), DnsCache::new())?;
    let timeout = TimeoutBounds::from_config(&config.crawler).initial;

    let page = fetcher.fetch(&url, timeout).await?;
    if !page.is_success() {
        bail!("{} returned HTTP {}", url, page.status_code);
    }

    let mut detector = CmsDetector::new();
    let cms = detector.detect(&page.body, &page.headers, url.as_str());
    let javascript = score_javascript_heaviness(&page.body);

    let report = json!({
        "url": url.as_str(),
        "finalUrl": page.final_url.as_str(),
        "cms": cms,
        "fingerprint": detector.fingerprint(),
        "profile": detector.profile(),
        "javascript": {
            "isHeavy": javascript.is_heavy(),
            "score": javascript.score,
            "signals": javascript.signals,
        },
        "tier": classify(url.as_str()),
        "responseTimeMs": page.fetch_duration.as_millis() as u64,
    });

    println!("{}", to_json(&report, true)?);
    Ok(())
}
