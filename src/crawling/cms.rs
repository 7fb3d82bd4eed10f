//! CMS and front-end framework fingerprinting
//!
//! Signatures are checked in a fixed order (WordPress, Shopify, Squarespace,
//! Wix, Joomla, Drupal). Every matching platform is flagged in the
//! fingerprint, but the detected CMS is the last one that matched. A site
//! with signatures from several platforms is therefore reported as the one
//! checked latest, which is not necessarily the platform serving the page.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use url::Url;

/// Content management system behind a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmsKind {
    WordPress,
    Shopify,
    Squarespace,
    Wix,
    Joomla,
    Drupal,
    Custom,
}

impl fmt::Display for CmsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WordPress => "WordPress",
            Self::Shopify => "Shopify",
            Self::Squarespace => "Squarespace",
            Self::Wix => "Wix",
            Self::Joomla => "Joomla",
            Self::Drupal => "Drupal",
            Self::Custom => "Custom",
        };
        f.write_str(name)
    }
}

/// Client-side framework footprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Framework {
    React,
    Angular,
    Vue,
}

/// Platform flags gathered from the homepage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteFingerprint {
    pub is_wordpress: bool,
    pub is_shopify: bool,
    pub is_squarespace: bool,
    pub is_wix: bool,
    pub is_joomla: bool,
    pub is_drupal: bool,
    pub framework: Option<Framework>,
    pub is_custom: bool,
}

impl SiteFingerprint {
    fn flag_mut(&mut self, cms: CmsKind) -> Option<&mut bool> {
        match cms {
            CmsKind::WordPress => Some(&mut self.is_wordpress),
            CmsKind::Shopify => Some(&mut self.is_shopify),
            CmsKind::Squarespace => Some(&mut self.is_squarespace),
            CmsKind::Wix => Some(&mut self.is_wix),
            CmsKind::Joomla => Some(&mut self.is_joomla),
            CmsKind::Drupal => Some(&mut self.is_drupal),
            CmsKind::Custom => None,
        }
    }
}

/// Extra crawl hints attached to a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecialHandling {
    /// Content is rendered client-side; every page is treated as JS-heavy
    ClientRendered,
}

/// Whether one profile pattern matches a URL.
///
/// `/a/b` patterns match a run of whole path segments anywhere in the path,
/// so `/feed` matches `/blog/feed/` but not `/feedback`. Other patterns are
/// query parameters: `?key=` matches any value, `key=value` only that value.
fn pattern_matches(pattern: &str, url: &Url) -> bool {
    if pattern.starts_with('/') {
        let wanted: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        if wanted.is_empty() {
            return false;
        }
        let path = url.path().to_ascii_lowercase();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        segments.windows(wanted.len()).any(|w| w == wanted.as_slice())
    } else {
        let param = pattern.trim_start_matches('?');
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        url.query_pairs().any(|(k, v)| {
            k.eq_ignore_ascii_case(key) && (value.is_empty() || v.eq_ignore_ascii_case(value))
        })
    }
}

/// Crawl-shaping hints derived from the detected CMS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsOptimizationProfile {
    pub cms: CmsKind,
    pub priority_paths: Vec<String>,
    pub skip_paths: Vec<String>,
    pub max_depth: usize,
    pub special_handling: Vec<SpecialHandling>,
}

impl CmsOptimizationProfile {
    /// Profile for a CMS, falling back to a generic profile for custom sites
    pub fn for_cms(cms: CmsKind) -> Self {
        let (priority, skip, max_depth, special): (&[&str], &[&str], usize, &[SpecialHandling]) =
            match cms {
                CmsKind::WordPress => (
                    &["/services", "/service", "/about", "/contact", "/locations"],
                    &[
                        "/wp-admin", "/wp-login.php", "/wp-json", "/wp-content/uploads", "/wp-includes",
                        "/xmlrpc.php", "/feed", "/comments/feed", "?replytocom=", "/author/",
                        "/tag/", "/trackback",
                    ],
                    4,
                    &[],
                ),
                CmsKind::Shopify => (
                    &["/collections", "/products", "/pages"],
                    &[
                        "/cart", "/checkout", "/account", "/search", "/collections/all",
                        "?variant=", "/policies/", "/cdn/", "/apps/",
                    ],
                    3,
                    &[],
                ),
                CmsKind::Squarespace => (
                    &["/services", "/about", "/contact"],
                    &["/config", "/cart", "/commerce/", "?format=json", "/s/", "/account"],
                    3,
                    &[SpecialHandling::ClientRendered],
                ),
                CmsKind::Wix => (
                    &["/services", "/about", "/contact", "/book-online"],
                    &["/_api/", "/_partials/", "/_serverless/", "?lightbox=", "/account/"],
                    3,
                    &[SpecialHandling::ClientRendered],
                ),
                CmsKind::Joomla => (
                    &["/services", "/about", "/contact"],
                    &[
                        "/administrator", "option=com_users", "/component/users", "?format=feed",
                        "tmpl=component", "/component/search",
                    ],
                    4,
                    &[],
                ),
                CmsKind::Drupal => (
                    &["/services", "/about", "/contact"],
                    &[
                        "/user/", "/admin/", "/node/add", "/filter/tips", "/search/node",
                        "?destination=", "/taxonomy/term/",
                    ],
                    4,
                    &[],
                ),
                CmsKind::Custom => (
                    &["/services", "/about", "/contact"],
                    &["/admin", "/login", "/cart", "/checkout", "/search"],
                    5,
                    &[],
                ),
            };

        Self {
            cms,
            priority_paths: priority.iter().map(|s| s.to_string()).collect(),
            skip_paths: skip.iter().map(|s| s.to_string()).collect(),
            max_depth,
            special_handling: special.to_vec(),
        }
    }

    /// Whether a URL matches a skip pattern. Only the path and query are
    /// inspected, never the host.
    pub fn skips(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| self.skip_paths.iter().any(|p| pattern_matches(p, &u)))
            .unwrap_or(false)
    }

    pub fn is_priority(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| self.priority_paths.iter().any(|p| pattern_matches(p, &u)))
            .unwrap_or(false)
    }

    /// Move priority-path URLs ahead of the rest, keeping relative order
    pub fn prioritize(&self, urls: Vec<String>) -> Vec<String> {
        let (mut first, rest): (Vec<String>, Vec<String>) = urls.into_iter().partition(|u| self.is_priority(u));
        first.extend(rest);
        first
    }

    pub fn renders_client_side(&self) -> bool {
        self.special_handling.contains(&SpecialHandling::ClientRendered)
    }
}

/// (html substrings, (header, value substring) pairs), all lowercase
type Signature = (&'static [&'static str], &'static [(&'static str, &'static str)]);

const CMS_SIGNATURES: &[(CmsKind, Signature)] = &[
    (
        CmsKind::WordPress,
        (
            &["/wp-content/", "/wp-includes/", "content=\"wordpress", "wp-json", "wp-emoji"],
            &[("x-powered-by", "wordpress"), ("link", "api.w.org"), ("x-pingback", "xmlrpc.php")],
        ),
    ),
    (
        CmsKind::Shopify,
        (
            &["cdn.shopify.com", "shopify.theme", "myshopify.com", "shopify-section"],
            &[("x-shopify-stage", ""), ("x-shopid", ""), ("powered-by", "shopify")],
        ),
    ),
    (
        CmsKind::Squarespace,
        (
            &["static1.squarespace.com", "squarespace.com/universal", "content=\"squarespace"],
            &[("server", "squarespace")],
        ),
    ),
    (
        CmsKind::Wix,
        (
            &["static.wixstatic.com", "static.parastorage.com", "content=\"wix.com", "wix-code"],
            &[("x-wix-request-id", ""), ("server", "pepyaka")],
        ),
    ),
    (
        CmsKind::Joomla,
        (
            &["/media/jui/", "content=\"joomla", "/components/com_", "/media/system/js/"],
            &[("x-content-encoded-by", "joomla")],
        ),
    ),
    (
        CmsKind::Drupal,
        (
            &["drupal.settings", "/sites/default/files", "drupal.js", "content=\"drupal", "data-drupal-"],
            &[("x-generator", "drupal"), ("x-drupal-cache", ""), ("x-drupal-dynamic-cache", "")],
        ),
    ),
];

const FRAMEWORK_SIGNATURES: &[(Framework, &[&str])] = &[
    (Framework::React, &["data-reactroot", "react-dom", "__next_data__", "id=\"root\"", "_reactlisteningfor"]),
    (Framework::Angular, &["ng-version", "ng-app", "_nghost-", "_ngcontent-"]),
    (Framework::Vue, &["data-v-", "__vue__", "vue.runtime", "__nuxt", "v-cloak"]),
];

fn matches_signature(html: &str, headers: &HeaderMap, sig: &Signature) -> bool {
    let (html_needles, header_needles) = sig;
    if html_needles.iter().any(|n| html.contains(n)) {
        return true;
    }
    header_needles.iter().any(|(name, needle)| {
        headers.get_all(*name).iter().any(|v| {
            v.to_str()
                .map(|v| v.to_ascii_lowercase().contains(needle))
                .unwrap_or(false)
        })
    })
}

/// Per-session CMS detector
#[derive(Debug, Default)]
pub struct CmsDetector {
    detected: Option<CmsKind>,
    fingerprint: SiteFingerprint,
}

impl CmsDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze the homepage and record the detected platform
    pub fn detect(&mut self, html: &str, headers: &HeaderMap, url: &str) -> CmsKind {
        self.reset();

        let html = html.to_ascii_lowercase();
        let mut detected = CmsKind::Custom;

        for (cms, sig) in CMS_SIGNATURES {
            if matches_signature(&html, headers, sig) {
                if let Some(flag) = self.fingerprint.flag_mut(*cms) {
                    *flag = true;
                }
                if detected != CmsKind::Custom {
                    debug!("{} also matches {}, keeping the later match", url, cms);
                }
                detected = *cms;
            }
        }

        self.fingerprint.framework = FRAMEWORK_SIGNATURES
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| html.contains(n)))
            .map(|(fw, _)| *fw);
        self.fingerprint.is_custom = detected == CmsKind::Custom;
        self.detected = Some(detected);

        info!(
            "Detected CMS for {}: {} (framework: {:?})",
            url, detected, self.fingerprint.framework
        );
        detected
    }

    /// Detected CMS, `None` before [`detect`](Self::detect) runs
    pub fn detected_cms(&self) -> Option<CmsKind> {
        self.detected
    }

    pub fn fingerprint(&self) -> &SiteFingerprint {
        &self.fingerprint
    }

    /// Optimization profile for the detected CMS (generic if undetected)
    pub fn profile(&self) -> CmsOptimizationProfile {
        CmsOptimizationProfile::for_cms(self.detected.unwrap_or(CmsKind::Custom))
    }

    /// Remove URLs matching the profile's skip patterns
    pub fn apply_cms_filtering(&self, urls: Vec<String>) -> Vec<String> {
        let profile = self.profile();
        let before = urls.len();
        let kept: Vec<String> = urls.into_iter().filter(|u| !profile.skips(u)).collect();
        if kept.len() < before {
            debug!(
                "{} filtering removed {} of {} URLs",
                profile.cms,
                before - kept.len(),
                before
            );
        }
        kept
    }

    /// Forget everything about the previous site
    pub fn reset(&mut self) {
        self.detected = None;
        self.fingerprint = SiteFingerprint::default();
    }
}
