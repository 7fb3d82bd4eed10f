//! Page priority tiers
//!
//! Tier 1: homepage and primary conversion pages (services, contact, pricing)
//! Tier 2: secondary informational pages
//! Tier 3: archival and boilerplate pages (listings, pagination, legal)

use serde::{Deserialize, Serialize};
use url::Url;

use super::url_manager::is_homepage_path;

/// Priority classification of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PageTier {
    #[serde(rename = "tier1")]
    Tier1,
    #[serde(rename = "tier2")]
    Tier2,
    #[serde(rename = "tier3")]
    Tier3,
}

impl PageTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1 => "tier1",
            Self::Tier2 => "tier2",
            Self::Tier3 => "tier3",
        }
    }

    /// Weight given to findings on pages of this tier
    pub fn weight(&self) -> f32 {
        match self {
            Self::Tier1 => 1.0,
            Self::Tier2 => 0.6,
            Self::Tier3 => 0.3,
        }
    }
}

const TIER1_SEGMENTS: &[&str] = &[
    "service", "contact", "about", "pricing", "price", "quote", "emergency", "location",
    "book", "schedule", "appointment", "products", "shop",
];

const TIER3_SEGMENTS: &[&str] = &[
    "tag", "tags", "category", "categories", "author", "page", "archive", "archives",
    "privacy", "terms", "cookie", "disclaimer", "legal", "search", "feed", "sitemap",
    "wp-content", "attachment",
];

/// Classify a URL into a priority tier.
///
/// Listings and legal pages are recognised first so that e.g.
/// `/services/page/4` lands in Tier 3.
pub fn classify(url: &str) -> PageTier {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return PageTier::Tier3,
    };

    let path = parsed.path().to_ascii_lowercase();
    if is_homepage_path(&path) {
        return PageTier::Tier1;
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let archival = segments.iter().any(|seg| {
        TIER3_SEGMENTS
            .iter()
            .any(|t| seg == t || (seg.starts_with(t) && t.len() > 4))
    }) || segments.iter().filter(|s| s.parse::<u32>().is_ok()).count() >= 2;
    if archival {
        return PageTier::Tier3;
    }

    // Primary pages sit near the root
    if segments.len() <= 2 && segments.iter().any(|seg| TIER1_SEGMENTS.iter().any(|t| seg.contains(t))) {
        return PageTier::Tier1;
    }

    PageTier::Tier2
}
