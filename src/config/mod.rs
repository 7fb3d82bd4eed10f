//! Configuration for the crawler

mod browser;
mod crawler;
mod discovery;
mod logging;

pub use browser::{BrowserConfig, ENV_BROWSER_EXECUTABLE, ENV_TIER_BASED_RENDERING};
pub use crawler::{ConcurrencyConfig, CrawlerConfig};
pub use discovery::{SimilarityConfig, SitemapConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default user agent for every HTTP request (pages, robots.txt, sitemaps)
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; SeoAuditBot/1.0; +https://example.com/bot)";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Crawl budget and fetch settings
    #[serde(default)]
    pub crawler: CrawlerConfig,
    /// Adaptive concurrency settings
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    /// Headless browser settings
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Sitemap discovery settings
    #[serde(default)]
    pub sitemap: SitemapConfig,
    /// Duplicate content settings
    #[serde(default)]
    pub similarity: SimilarityConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults (still env-overridden).
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let mut config = Config::default();
            config.apply_env();
            config.validate()?;
            Ok(config)
        }
    }

    /// Apply `BROWSER_EXECUTABLE_PATH` and `TIER_BASED_RENDERING` overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_BROWSER_EXECUTABLE).filter(|p| !p.trim().is_empty()) {
            self.browser.executable_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_TIER_BASED_RENDERING) {
            match browser::parse_flag(&raw) {
                Some(flag) => self.browser.tier_based_rendering = flag,
                None => tracing::warn!(
                    "Ignoring {}={:?}: expected true/false",
                    ENV_TIER_BASED_RENDERING,
                    raw
                ),
            }
        }
    }

    /// Serialize to TOML (used by `init`)
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate all configuration fields.
    ///
    /// Every problem is collected and reported in a single error.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.crawler.max_pages == 0 {
            errors.push("crawler.max_pages must be positive".to_string());
        }
        if self.crawler.max_depth == 0 {
            errors.push("crawler.max_depth must be positive".to_string());
        }
        if self.crawler.user_agent.trim().is_empty() {
            errors.push("crawler.user_agent must not be empty".to_string());
        }
        if self.crawler.prefilter_batch_size == 0 {
            errors.push("crawler.prefilter_batch_size must be positive".to_string());
        }
        if self.crawler.min_timeout_secs == 0 {
            errors.push("crawler.min_timeout_secs must be positive".to_string());
        }
        if self.crawler.min_timeout_secs > self.crawler.max_timeout_secs {
            errors.push(format!(
                "crawler.min_timeout_secs ({}) must not exceed max_timeout_secs ({})",
                self.crawler.min_timeout_secs, self.crawler.max_timeout_secs
            ));
        }

        if self.concurrency.min == 0 {
            errors.push("concurrency.min must be positive".to_string());
        }
        if self.concurrency.min > self.concurrency.max {
            errors.push(format!(
                "concurrency.min ({}) must not exceed concurrency.max ({})",
                self.concurrency.min, self.concurrency.max
            ));
        }
        if self.concurrency.low_water_ms >= self.concurrency.high_water_ms {
            errors.push("concurrency.low_water_ms must be below high_water_ms".to_string());
        }
        if self.concurrency.window_size == 0 {
            errors.push("concurrency.window_size must be positive".to_string());
        }

        if self.browser.max_pages == 0 {
            errors.push("browser.max_pages must be positive".to_string());
        }
        if self.browser.launch_backoff_ms.is_empty() {
            errors.push("browser.launch_backoff_ms must contain at least one delay".to_string());
        }
        if self.browser.breaker_failure_threshold == 0 {
            errors.push("browser.breaker_failure_threshold must be positive".to_string());
        }
        if self.browser.breaker_half_open_max_calls == 0 {
            errors.push("browser.breaker_half_open_max_calls must be positive".to_string());
        }

        if self.sitemap.max_children_per_index == 0 {
            errors.push("sitemap.max_children_per_index must be positive".to_string());
        }
        if self.sitemap.max_sitemap_bytes == 0 {
            errors.push("sitemap.max_sitemap_bytes must be positive".to_string());
        }

        if !(0.0..=1.0).contains(&self.similarity.threshold) || self.similarity.threshold == 0.0 {
            errors.push("similarity.threshold must be between 0.0 (exclusive) and 1.0".to_string());
        }
        if self.similarity.max_entries == 0 {
            errors.push("similarity.max_entries must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
