//! Subresources a render never needs
//!
//! Images, fonts, media, decorative stylesheets and analytics/ad/tracking
//! hosts are blocked before navigation. Scripts and first-party CSS still
//! load so the rendered DOM matches what a visitor sees.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockedKind {
    Image,
    Font,
    Media,
    DecorativeStyle,
    Tracking,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico", "bmp"];
const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];
const MEDIA_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mp3", "wav", "m4a", "mov", "avi"];

const DECORATIVE_STYLE_HOSTS: &[&str] = &[
    "fonts.googleapis.com",
    "fonts.gstatic.com",
    "use.typekit.net",
    "use.fontawesome.com",
    "kit.fontawesome.com",
];

const TRACKING_HOSTS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "googleadservices.com",
    "googlesyndication.com",
    "doubleclick.net",
    "connect.facebook.net",
    "analytics.tiktok.com",
    "static.hotjar.com",
    "cdn.segment.com",
    "js.hs-analytics.net",
    "snap.licdn.com",
    "bat.bing.com",
    "clarity.ms",
    "fullstory.com",
    "mouseflow.com",
    "crazyegg.com",
    "optimizely.com",
    "quantserve.com",
    "scorecardresearch.com",
    "adnxs.com",
    "taboola.com",
    "outbrain.com",
];

/// Wildcard URL patterns handed to the browser's request blocker
pub fn blocked_url_patterns() -> Vec<String> {
    let by_extension = IMAGE_EXTENSIONS
        .iter()
        .chain(FONT_EXTENSIONS)
        .chain(MEDIA_EXTENSIONS)
        .flat_map(|ext| [format!("*.{}", ext), format!("*.{}?*", ext)]);
    let by_host = DECORATIVE_STYLE_HOSTS
        .iter()
        .chain(TRACKING_HOSTS)
        .map(|host| format!("*{}*", host));

    by_extension.chain(by_host).collect()
}

/// Why a request URL would be blocked, if it would
pub fn classify_blocked(url: &str) -> Option<BlockedKind> {
    let lower = url.to_ascii_lowercase();
    let without_query = lower.split(['?', '#']).next().unwrap_or("");

    let host = url::Url::parse(&lower)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    let host_matches = |list: &[&str]| {
        list.iter()
            .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
    };

    if host_matches(TRACKING_HOSTS) {
        return Some(BlockedKind::Tracking);
    }
    if host_matches(DECORATIVE_STYLE_HOSTS) {
        return Some(BlockedKind::DecorativeStyle);
    }

    let ext = without_query.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    if ext.contains('/') {
        return None;
    }
    if IMAGE_EXTENSIONS.contains(&ext) {
        Some(BlockedKind::Image)
    } else if FONT_EXTENSIONS.contains(&ext) {
        Some(BlockedKind::Font)
    } else if MEDIA_EXTENSIONS.contains(&ext) {
        Some(BlockedKind::Media)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_subresources() {
        assert_eq!(classify_blocked("https://x.test/hero.JPG?w=800"), Some(BlockedKind::Image));
        assert_eq!(classify_blocked("https://x.test/f/inter.woff2"), Some(BlockedKind::Font));
        assert_eq!(classify_blocked("https://x.test/intro.mp4"), Some(BlockedKind::Media));
        assert_eq!(
            classify_blocked("https://www.google-analytics.com/analytics.js"),
            Some(BlockedKind::Tracking)
        );
        assert_eq!(
            classify_blocked("https://fonts.googleapis.com/css2?family=Inter"),
            Some(BlockedKind::DecorativeStyle)
        );
    }

    #[test]
    fn keeps_content_and_scripts() {
        assert_eq!(classify_blocked("https://x.test/"), None);
        assert_eq!(classify_blocked("https://x.test/services"), None);
        assert_eq!(classify_blocked("https://x.test/app.js"), None);
        assert_eq!(classify_blocked("https://x.test/site.css"), None);
        assert_eq!(classify_blocked("https://x.test/v1.2/page"), None);
    }

    #[test]
    fn patterns_cover_every_category() {
        let patterns = blocked_url_patterns();
        assert!(patterns.contains(&"*.png".to_string()));
        assert!(patterns.contains(&"*.woff2?*".to_string()));
        assert!(patterns.contains(&"*.mp4".to_string()));
        assert!(patterns.contains(&"*doubleclick.net*".to_string()));
        assert!(patterns.contains(&"*fonts.googleapis.com*".to_string()));
        assert!(!patterns.iter().any(|p| p.ends_with(".js") || p.ends_with(".css")));
    }
}
