//! Browser-rendered fetching
//!
//! Pages that need client-side rendering are loaded in a shared headless
//! browser and run through the same [`PageExtractor`] as plain fetches, so
//! downstream scoring sees one shape regardless of strategy.

mod blocking;
mod chrome;
mod js_detection;
mod pool;

pub use blocking::{blocked_url_patterns, classify_blocked, BlockedKind};
pub use chrome::ChromeLauncher;
pub use js_detection::{
    detect_javascript_heavy_site, score_javascript_heaviness, JsHeaviness, JS_HEAVY_THRESHOLD,
    JS_SCORE_NOMINAL_MAX,
};
pub use pool::{
    BrowserError, BrowserLease, BrowserPool, EngineLauncher, PoolStats, RenderEngine, RenderOptions,
};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use crate::config::BrowserConfig;
use crate::crawling::extractor::{PageExtractor, PageFacts};
use crate::crawling::priority::{classify, PageTier};

/// Whether a page should be rendered in the browser
///
/// With tier-based rendering, tier-1 pages are always rendered, tier-2 pages
/// only when the site is JS-heavy and tier-3 pages never. Without it, the
/// JS-heaviness signal alone decides.
pub fn should_render(tier: PageTier, is_js_heavy: bool, tier_based: bool) -> bool {
    if !tier_based {
        return is_js_heavy;
    }
    match tier {
        PageTier::Tier1 => true,
        PageTier::Tier2 => is_js_heavy,
        PageTier::Tier3 => false,
    }
}

/// A page loaded through the browser
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub facts: PageFacts,
    pub render_duration: Duration,
}

/// Renders pages through the shared pool and extracts their facts
pub struct BrowserRenderer {
    pool: Arc<BrowserPool>,
    extractor: Arc<dyn PageExtractor>,
    options: RenderOptions,
    tier_based: bool,
}

impl BrowserRenderer {
    pub fn new(pool: Arc<BrowserPool>, extractor: Arc<dyn PageExtractor>, config: &BrowserConfig) -> Self {
        Self {
            pool,
            extractor,
            options: RenderOptions::from_config(config),
            tier_based: config.tier_based_rendering,
        }
    }

    pub fn should_use_browser_for_page(&self, url: &str, is_js_heavy: bool) -> bool {
        should_render(classify(url), is_js_heavy, self.tier_based)
    }

    /// Render `url` and extract facts from the rendered DOM
    pub async fn fetch_with_browser(&self, url: &Url) -> Result<RenderedPage, BrowserError> {
        let start = Instant::now();
        let html = self.pool.render(url.as_str(), &self.options).await?;

        // The DOM can be large; keep parsing off the async workers
        let extractor = self.extractor.clone();
        let page_url = url.clone();
        let (html, facts) = tokio::task::spawn_blocking(move || {
            let facts = extractor.extract(&html, &page_url);
            (html, facts)
        })
        .await
        .map_err(|e| BrowserError::Protocol(format!("extraction task failed: {}", e)))?;

        let render_duration = start.elapsed();
        debug!("Rendered {} in {:?} ({} bytes)", url, render_duration, html.len());
        Ok(RenderedPage { html, facts, render_duration })
    }

    pub fn pool(&self) -> &Arc<BrowserPool> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::pool::testing::{fast_config, FakeLauncher};
    use super::*;
    use crate::crawling::extractor::HtmlPageExtractor;

    #[test]
    fn tier_policy() {
        assert!(should_render(PageTier::Tier1, false, true));
        assert!(should_render(PageTier::Tier2, true, true));
        assert!(!should_render(PageTier::Tier2, false, true));
        assert!(!should_render(PageTier::Tier3, true, true));

        assert!(!should_render(PageTier::Tier1, false, false));
        assert!(should_render(PageTier::Tier3, true, false));
    }

    fn renderer(tier_based: bool) -> (Arc<FakeLauncher>, BrowserRenderer) {
        let launcher = FakeLauncher::new(
            "<html><head><title>Rendered</title></head><body><h1>Hydrated</h1><a href=\"/contact\">Contact</a></body></html>",
            0,
        );
        let config = BrowserConfig {
            tier_based_rendering: tier_based,
            settle_ms: 0,
            ..fast_config()
        };
        let pool = Arc::new(BrowserPool::new(launcher.clone(), &config));
        let extractor: Arc<dyn PageExtractor> = Arc::new(HtmlPageExtractor::new());
        (launcher, BrowserRenderer::new(pool, extractor, &config))
    }

    #[test]
    fn decides_per_page() {
        let (_, r) = renderer(true);
        assert!(r.should_use_browser_for_page("https://x.test/", false));
        assert!(!r.should_use_browser_for_page("https://x.test/blog/2021/05/post", true));

        let (_, r) = renderer(false);
        assert!(!r.should_use_browser_for_page("https://x.test/", false));
        assert!(r.should_use_browser_for_page("https://x.test/", true));
    }

    #[tokio::test]
    async fn extracts_rendered_dom() {
        let (launcher, r) = renderer(true);
        let page = r
            .fetch_with_browser(&Url::parse("https://x.test/").unwrap())
            .await
            .unwrap();

        assert_eq!(page.facts.title.as_deref(), Some("Rendered"));
        assert_eq!(page.facts.headings.h1, vec!["Hydrated"]);
        assert_eq!(page.facts.links.internal, vec!["https://x.test/contact"]);
        assert_eq!(launcher.launches.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
