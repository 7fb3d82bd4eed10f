//! Early termination heuristics
//!
//! Decides, from the URL alone, that a candidate is not worth fetching:
//! - Non-HTML file extensions (documents, media, archives, assets)
//! - Download/export/print style query parameters
//! - Excessive URL length
//! - Admin, API, login and cart-like path segments
//! - Excessive path depth
//!
//! Checks run in that order and stop at the first hit.

use serde::Serialize;
use std::fmt;
use url::Url;

/// Longest URL accepted (characters)
pub const MAX_URL_LENGTH: usize = 500;

/// Deepest path accepted (segments)
pub const MAX_PATH_DEPTH: usize = 10;

const NON_HTML_EXTENSIONS: &[&str] = &[
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "rtf", "csv", "txt",
    // images
    "jpg", "jpeg", "png", "gif", "svg", "webp", "ico", "bmp", "tif", "tiff", "avif",
    // media
    "mp3", "mp4", "m4a", "wav", "avi", "mov", "wmv", "webm", "ogg", "flv",
    // archives and binaries
    "zip", "rar", "7z", "tar", "gz", "tgz", "exe", "dmg", "msi", "apk", "iso", "bin",
    // assets and feeds
    "css", "js", "mjs", "map", "json", "xml", "rss", "atom", "woff", "woff2", "ttf", "eot", "otf",
];

const SUSPICIOUS_QUERY_KEYS: &[&str] = &["download", "export", "print", "pdf", "attachment"];

const SUSPICIOUS_SEGMENTS: &[&str] = &[
    "api", "wp-json", "graphql", "xmlrpc.php", "ajax", "admin", "administrator", "wp-admin",
    "wp-login.php", "login", "signin", "sign-in", "logout", "register", "signup", "cart",
    "checkout", "basket", "my-account", "account", "cgi-bin", "oauth", "feed",
];

/// Why a URL was rejected before fetching
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "detail")]
pub enum TerminationReason {
    NonHtmlExtension(String),
    SuspiciousQuery(String),
    UrlTooLong(usize),
    SuspiciousPath(String),
    TooDeep(usize),
    Unparseable,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonHtmlExtension(ext) => write!(f, "non-HTML extension .{}", ext),
            Self::SuspiciousQuery(key) => write!(f, "suspicious query parameter '{}'", key),
            Self::UrlTooLong(len) => write!(f, "URL length {} exceeds {}", len, MAX_URL_LENGTH),
            Self::SuspiciousPath(seg) => write!(f, "suspicious path segment '{}'", seg),
            Self::TooDeep(depth) => write!(f, "path depth {} exceeds {}", depth, MAX_PATH_DEPTH),
            Self::Unparseable => f.write_str("URL cannot be parsed"),
        }
    }
}

/// Result of [`should_terminate_early`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminationCheck {
    pub terminate: bool,
    pub reason: Option<TerminationReason>,
}

impl TerminationCheck {
    fn proceed() -> Self {
        Self {
            terminate: false,
            reason: None,
        }
    }

    fn stop(reason: TerminationReason) -> Self {
        Self {
            terminate: true,
            reason: Some(reason),
        }
    }
}

/// Extension of the final path segment, lowercased
fn extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Fail-fast check for URLs that should never be fetched
pub fn should_terminate_early(url: &str) -> TerminationCheck {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return TerminationCheck::stop(TerminationReason::Unparseable),
    };

    if let Some(ext) = extension(&parsed) {
        if NON_HTML_EXTENSIONS.contains(&ext.as_str()) {
            return TerminationCheck::stop(TerminationReason::NonHtmlExtension(ext));
        }
    }

    for (key, value) in parsed.query_pairs() {
        let key = key.to_ascii_lowercase();
        let value = value.to_ascii_lowercase();
        if SUSPICIOUS_QUERY_KEYS.contains(&key.as_str()) {
            return TerminationCheck::stop(TerminationReason::SuspiciousQuery(key));
        }
        if matches!(key.as_str(), "format" | "output" | "type") && value == "pdf" {
            return TerminationCheck::stop(TerminationReason::SuspiciousQuery(key));
        }
    }

    if url.len() > MAX_URL_LENGTH {
        return TerminationCheck::stop(TerminationReason::UrlTooLong(url.len()));
    }

    let segments: Vec<String> = parsed
        .path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).map(|s| s.to_ascii_lowercase()).collect())
        .unwrap_or_default();

    if let Some(seg) = segments
        .iter()
        .find(|s| SUSPICIOUS_SEGMENTS.contains(&s.as_str()))
    {
        return TerminationCheck::stop(TerminationReason::SuspiciousPath(seg.clone()));
    }

    if segments.len() > MAX_PATH_DEPTH {
        return TerminationCheck::stop(TerminationReason::TooDeep(segments.len()));
    }

    TerminationCheck::proceed()
}

/// Whether path segments repeat often enough to suggest a link loop
/// (e.g. /a/b/a/b/a/b)
pub(crate) fn has_repetitive_pattern(segments: &[&str], max_repeats: usize) -> bool {
    if segments.len() < 4 {
        return false;
    }

    for window_size in 1..=segments.len() / 2 {
        let mut repeat_count = 0;
        for i in 0..segments.len().saturating_sub(window_size) {
            if segments[i] == segments[i + window_size] {
                repeat_count += 1;
                if repeat_count >= max_repeats {
                    return true;
                }
            }
        }
    }

    false
}

/// Three or more consecutive numeric segments (/events/2024/01/15)
pub(crate) fn is_calendar_trap(path: &str) -> bool {
    let mut consecutive_numbers = 0;
    for part in path.split('/').filter(|s| !s.is_empty()) {
        if part.parse::<u32>().is_ok() {
            consecutive_numbers += 1;
            if consecutive_numbers >= 3 {
                return true;
            }
        } else {
            consecutive_numbers = 0;
        }
    }
    false
}

/// Number of non-empty path segments
pub fn path_depth(url: &Url) -> usize {
    url.path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).count())
        .unwrap_or(0)
}
