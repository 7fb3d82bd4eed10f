use anyhow::Result;
use seo_crawl::config::Config;
use seo_crawl::crawling::browser::{BrowserPool, ChromeLauncher};
use seo_crawl::crawling::orchestrator::{CrawlOptions, CrawlReport, CrawlerOrchestrator};
use seo_crawl::util::truncate_str;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::to_json;

pub struct CrawlArgs {
    pub url: String,
    pub max_pages: Option<usize>,
    pub max_depth: Option<usize>,
    pub use_javascript: bool,
    pub follow_sitemaps: bool,
    pub output: Option<PathBuf>,
    pub pretty: bool,
    pub include_html: bool,
}

pub async fn crawl_site(config: Config, args: CrawlArgs) -> Result<()> {
    let defaults = CrawlOptions::from_config(&config.crawler);
    let options = CrawlOptions {
        max_pages: args.max_pages.unwrap_or(defaults.max_pages),
        max_depth: args.max_depth.unwrap_or(defaults.max_depth),
        use_javascript: args.use_javascript && defaults.use_javascript,
        follow_sitemaps: args.follow_sitemaps && defaults.follow_sitemaps,
    };

    // One pool for the process; the browser itself launches lazily on first render
    let pool = options.use_javascript.then(|| {
        let launcher = Arc::new(ChromeLauncher::new(&config.browser, config.crawler.user_agent.clone()));
        Arc::new(BrowserPool::new(launcher, &config.browser))
    });

    let mut orchestrator = CrawlerOrchestrator::new(config, pool.clone());
    let result = orchestrator.crawl_website(&args.url, options).await;

    if let Some(pool) = &pool {
        let stats = pool.stats();
        info!(
            "Browser pool: {} launches, {} renders, {} render failures",
            stats.launches, stats.renders, stats.render_failures
        );
        pool.shutdown().await;
    }

    let mut report = result?;
    if !args.include_html {
        strip_html(&mut report);
    }

    let json = to_json(&report, args.pretty)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            print_summary(&report);
            println!("\nReport written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn strip_html(report: &mut CrawlReport) {
    report.homepage.html = None;
    for page in &mut report.additional_pages {
        page.html = None;
    }
}

fn print_summary(report: &CrawlReport) {
    let stats = &report.stats;
    let site = &report.site_structure;

    println!("\nCrawl Summary:");
    println!("==============");
    println!("Homepage: {}", report.homepage.url);
    println!("CMS: {}", site.cms);
    println!("JavaScript-heavy: {}", site.is_javascript_heavy);
    println!("Sitemap: {}", if site.has_sitemap { "found" } else { "not found" });
    println!(
        "Pages: {} total, {} ok, {} errors, {} skipped, {} duplicates",
        site.total_pages, site.successful_pages, site.failed_pages, site.skipped_pages, site.duplicate_count
    );
    println!("Browser renders: {}", stats.browser_renders);
    if let Some(avg) = stats.avg_response_time_ms {
        println!("Average response: {:.0}ms", avg);
    }
    println!("Duration: {}ms", stats.duration_ms);

    println!();
    for page in report.pages() {
        let title = page
            .facts
            .as_ref()
            .and_then(|f| f.title.as_deref())
            .unwrap_or("-");
        let status = page
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "---".to_string());
        println!("  [{}] {:<60} {}", status, truncate_str(&page.url, 60), truncate_str(title, 40));
    }
}
