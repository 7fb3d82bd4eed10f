//! Site-structure summary

use serde::Serialize;
use std::collections::HashSet;

use super::types::{FetchStatus, PageFetchResult};
use crate::crawling::cms::{CmsKind, SiteFingerprint};
use crate::crawling::priority::PageTier;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierDistribution {
    pub tier1: usize,
    pub tier2: usize,
    pub tier3: usize,
}

impl TierDistribution {
    fn add(&mut self, tier: PageTier) {
        match tier {
            PageTier::Tier1 => self.tier1 += 1,
            PageTier::Tier2 => self.tier2 += 1,
            PageTier::Tier3 => self.tier3 += 1,
        }
    }
}

/// Aggregate view of the crawled site
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStructure {
    pub total_pages: usize,
    pub successful_pages: usize,
    pub failed_pages: usize,
    pub skipped_pages: usize,
    pub cms: CmsKind,
    pub fingerprint: SiteFingerprint,
    pub is_javascript_heavy: bool,
    /// Mean HTML size of successful pages (bytes)
    pub average_page_size: usize,
    pub total_word_count: usize,
    pub unique_image_count: usize,
    pub has_sitemap: bool,
    pub duplicate_count: usize,
    /// Successful pages per tier
    pub tier_distribution: TierDistribution,
}

/// Site-level facts the pages alone do not carry
#[derive(Debug, Clone)]
pub struct SiteSignals {
    pub cms: CmsKind,
    pub fingerprint: SiteFingerprint,
    pub is_javascript_heavy: bool,
    pub has_sitemap: bool,
}

pub fn analyze_site_structure<'a>(
    pages: impl IntoIterator<Item = &'a PageFetchResult>,
    signals: SiteSignals,
) -> SiteStructure {
    let mut total = 0;
    let mut successful = 0;
    let mut failed = 0;
    let mut skipped = 0;
    let mut html_bytes = 0usize;
    let mut words = 0usize;
    let mut duplicates = 0;
    let mut images: HashSet<&str> = HashSet::new();
    let mut tiers = TierDistribution::default();

    for page in pages {
        total += 1;
        match page.status {
            FetchStatus::Success => {
                successful += 1;
                html_bytes += page.html_bytes();
                tiers.add(page.tier);
                if page.is_duplicate {
                    duplicates += 1;
                }
                if let Some(facts) = &page.facts {
                    words += facts.word_count;
                    images.extend(facts.images.iter().map(|i| i.src.as_str()));
                }
            }
            FetchStatus::Error => failed += 1,
            FetchStatus::Skipped => skipped += 1,
        }
    }

    SiteStructure {
        total_pages: total,
        successful_pages: successful,
        failed_pages: failed,
        skipped_pages: skipped,
        cms: signals.cms,
        fingerprint: signals.fingerprint,
        is_javascript_heavy: signals.is_javascript_heavy,
        average_page_size: if successful > 0 { html_bytes / successful } else { 0 },
        total_word_count: words,
        unique_image_count: images.len(),
        has_sitemap: signals.has_sitemap,
        duplicate_count: duplicates,
        tier_distribution: tiers,
    }
}
