//! Page extraction types
//!
//! `PageFacts` is the per-page contract handed to scoring. Its shape is the
//! same whether the HTML came from a plain GET or a browser render.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pages with fewer words are flagged as thin content
pub const THIN_CONTENT_WORDS: usize = 300;

/// Structural facts extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFacts {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    /// `name`/`property` → content for every meta tag with content
    pub meta_tags: BTreeMap<String, String>,
    pub canonical: Option<String>,
    pub lang: Option<String>,
    pub headings: Headings,
    pub links: Links,
    pub images: Vec<ImageFacts>,
    /// Parsed `application/ld+json` blocks
    pub schema: Vec<serde_json::Value>,
    pub has_viewport: bool,
    pub word_count: usize,
    pub security: SecurityFacts,
    pub accessibility: AccessibilityFacts,
    pub performance: PerformanceFacts,
    pub seo_issues: SeoIssues,
}

/// Heading texts by level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headings {
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
    pub h4: Vec<String>,
    pub h5: Vec<String>,
    pub h6: Vec<String>,
}

impl Headings {
    pub(crate) fn level_mut(&mut self, level: u8) -> Option<&mut Vec<String>> {
        match level {
            1 => Some(&mut self.h1),
            2 => Some(&mut self.h2),
            3 => Some(&mut self.h3),
            4 => Some(&mut self.h4),
            5 => Some(&mut self.h5),
            6 => Some(&mut self.h6),
            _ => None,
        }
    }

    pub fn total(&self) -> usize {
        self.h1.len() + self.h2.len() + self.h3.len() + self.h4.len() + self.h5.len() + self.h6.len()
    }
}

/// Absolute link targets split by site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    pub internal: Vec<String>,
    pub external: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFacts {
    pub src: String,
    pub alt: Option<String>,
    /// `alt` attribute present and non-empty
    pub has_alt: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFacts {
    pub is_https: bool,
    pub has_mixed_content: bool,
    /// `http://` subresources on an HTTPS page
    pub mixed_content_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityFacts {
    pub has_lang_attribute: bool,
    pub images_missing_alt: usize,
    pub inputs_without_label: usize,
    pub links_without_text: usize,
    pub has_skip_link: bool,
    pub has_main_landmark: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceFacts {
    pub html_bytes: usize,
    pub script_count: usize,
    pub external_script_count: usize,
    pub stylesheet_count: usize,
    pub inline_style_count: usize,
    pub image_count: usize,
    pub lazy_image_count: usize,
}

/// On-page problems scoring cares about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoIssues {
    pub noindex: bool,
    pub nofollow: bool,
    pub thin_content: bool,
    pub missing_title: bool,
    pub missing_meta_description: bool,
    pub missing_h1: bool,
    pub multiple_h1: bool,
    /// More than one `<title>` or meta description on the page
    pub duplicate_meta: bool,
}

impl SeoIssues {
    pub fn count(&self) -> usize {
        [
            self.noindex,
            self.nofollow,
            self.thin_content,
            self.missing_title,
            self.missing_meta_description,
            self.missing_h1,
            self.multiple_h1,
            self.duplicate_meta,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}
