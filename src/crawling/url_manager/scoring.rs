//! Page importance scoring
//!
//! Rules are applied in a fixed order:
//! homepage short-circuit, one positive pattern, one negative pattern,
//! depth penalty, business keyword bonus. The result is clamped to [1, 100].

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use super::normalize_url;

pub const HOMEPAGE_SCORE: i32 = 100;
const BASE_SCORE: i32 = 50;
const MIN_SCORE: i32 = 1;

/// Segments allowed before the depth penalty starts
const DEPTH_FREE_SEGMENTS: usize = 2;
const DEPTH_PENALTY_PER_SEGMENT: i32 = 5;
const KEYWORD_BONUS: i32 = 10;

/// High-value path fragments; the first match applies
const POSITIVE_PATTERNS: &[(&str, i32)] = &[
    ("contact", 25),
    ("about", 20),
    ("service", 25),
    ("pricing", 20),
    ("quote", 20),
    ("emergency", 20),
    ("location", 15),
    ("testimonial", 10),
    ("portfolio", 10),
];

/// Words that mark a page as describing what a local business sells
const BUSINESS_KEYWORDS: &[&str] = &[
    "repair", "install", "replace", "maintenance", "cleaning", "plumb", "hvac", "heating",
    "cooling", "roof", "electric", "landscap", "pest", "remodel", "dental", "clinic",
    "attorney", "lawyer", "insurance", "restaurant", "menu", "booking", "appointment",
    "estimate", "consult",
];

#[derive(Debug, Clone, Copy)]
enum Negative {
    DatedBlog,
    Listing,
    Pagination,
    Search,
    Archive,
    Feed,
    Sitemap,
    Legal,
}

impl Negative {
    fn penalty(self) -> i32 {
        match self {
            Self::DatedBlog => 30,
            Self::Listing => 25,
            Self::Pagination => 25,
            Self::Search => 30,
            Self::Archive => 20,
            Self::Feed => 35,
            Self::Sitemap => 35,
            Self::Legal => 20,
        }
    }
}

static RE_DATED: OnceLock<Regex> = OnceLock::new();
static RE_PAGINATION: OnceLock<Regex> = OnceLock::new();
static RE_LEGAL: OnceLock<Regex> = OnceLock::new();

fn first_negative(path: &str, query: &str) -> Option<Negative> {
    let dated = RE_DATED
        .get_or_init(|| Regex::new(r"/(?:19|20)\d{2}/\d{1,2}(?:/|$)").expect("valid regex"));
    let pagination = RE_PAGINATION
        .get_or_init(|| Regex::new(r"/page/\d+|(?:^|&)(?:page|paged|p)=\d+").expect("valid regex"));
    let legal = RE_LEGAL.get_or_init(|| {
        Regex::new(r"privacy|terms|cookie|disclaimer|legal|gdpr|accessibility-statement")
            .expect("valid regex")
    });

    if dated.is_match(path) {
        Some(Negative::DatedBlog)
    } else if ["/tag/", "/tags/", "/category/", "/categories/", "/author/"]
        .iter()
        .any(|p| path.contains(p) || path.ends_with(p.trim_end_matches('/')))
    {
        Some(Negative::Listing)
    } else if pagination.is_match(path) || pagination.is_match(query) {
        Some(Negative::Pagination)
    } else if path.contains("search") || query.split('&').any(|p| p.starts_with("s=") || p.starts_with("q=")) {
        Some(Negative::Search)
    } else if path.contains("archive") {
        Some(Negative::Archive)
    } else if path.contains("/feed") || path.contains("rss") {
        Some(Negative::Feed)
    } else if path.contains("sitemap") {
        Some(Negative::Sitemap)
    } else if legal.is_match(path) {
        Some(Negative::Legal)
    } else {
        None
    }
}

/// Whether a path is the site root
pub fn is_homepage_path(path: &str) -> bool {
    matches!(
        path.trim_end_matches('/'),
        "" | "/index.html" | "/index.htm" | "/index.php"
    )
}

/// Score a URL's importance in `[1, 100]`.
///
/// `base_url` identifies the site; a URL on another host is scored by path
/// alone but can never be the homepage.
pub fn calculate_page_importance_score(url: &str, base_url: &str) -> u32 {
    let parsed = match normalize_url(url).ok().and_then(|n| Url::parse(&n).ok()) {
        Some(u) => u,
        None => return MIN_SCORE as u32,
    };
    let same_site = super::is_same_site(parsed.as_str(), base_url)
        || normalize_url(base_url)
            .map(|b| super::is_same_site(parsed.as_str(), &b))
            .unwrap_or(false);

    let path = parsed.path().to_ascii_lowercase();
    if same_site && is_homepage_path(&path) {
        return HOMEPAGE_SCORE as u32;
    }

    let query = parsed.query().unwrap_or("").to_ascii_lowercase();
    let mut score = BASE_SCORE;

    if let Some((_, bonus)) = POSITIVE_PATTERNS.iter().find(|(p, _)| path.contains(p)) {
        score += bonus;
    }

    if let Some(negative) = first_negative(&path, &query) {
        score -= negative.penalty();
    }

    let depth = path.split('/').filter(|s| !s.is_empty()).count();
    if depth > DEPTH_FREE_SEGMENTS {
        score -= (depth - DEPTH_FREE_SEGMENTS) as i32 * DEPTH_PENALTY_PER_SEGMENT;
    }

    if BUSINESS_KEYWORDS.iter().any(|k| path.contains(k)) {
        score += KEYWORD_BONUS;
    }

    score.clamp(MIN_SCORE, HOMEPAGE_SCORE) as u32
}

/// Sort URLs by descending importance; ties go to the shorter URL
pub fn prioritize_urls_by_importance(urls: Vec<String>, base_url: &str) -> Vec<String> {
    let mut scored: Vec<(u32, String)> = urls
        .into_iter()
        .map(|u| (calculate_page_importance_score(&u, base_url), u))
        .collect();

    scored.sort_by(|(sa, ua), (sb, ub)| {
        sb.cmp(sa)
            .then_with(|| ua.len().cmp(&ub.len()))
            .then_with(|| ua.cmp(ub))
    });

    scored.into_iter().map(|(_, u)| u).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://example.com";

    fn score(url: &str) -> u32 {
        calculate_page_importance_score(url, BASE)
    }

    #[test]
    fn homepage_is_exactly_100() {
        assert_eq!(score("https://example.com/"), 100);
        assert_eq!(score("https://example.com"), 100);
        assert_eq!(score("https://www.example.com/index.html"), 100);
        assert_eq!(score("example.com/#hero"), 100);
    }

    #[test]
    fn homepage_with_query_is_still_100() {
        assert_eq!(score("https://example.com/?x=1"), 100);
        assert_eq!(score("https://example.com/?page=2"), 100);
        assert_eq!(score("https://example.com/?s=plumber"), 100);
        assert_eq!(score("https://example.com/index.html?ref=x"), 100);
    }

    #[test]
    fn positive_patterns_boost_once() {
        assert_eq!(score("https://example.com/contact"), 75);
        assert_eq!(score("https://example.com/about"), 70);
        // "contact" is checked before "about", only one applies
        assert_eq!(score("https://example.com/about-contact"), 75);
    }

    #[test]
    fn negative_patterns_penalize_once() {
        assert_eq!(score("https://example.com/privacy-policy"), 30);
        assert_eq!(score("https://example.com/sitemap"), 15);
        assert!(score("https://example.com/blog/2021/04/spring-tips") < score("https://example.com/blog/spring-tips"));
        assert!(score("https://example.com/tag/news") < 50);
    }

    #[test]
    fn depth_penalty_and_keyword_bonus() {
        // four segments: two over the free depth
        assert_eq!(score("https://example.com/a/b/c/d"), 40);
        assert_eq!(score("https://example.com/drain-repair"), 60);
        assert_eq!(score("https://example.com/services/drain-repair"), 85);
    }

    #[test]
    fn scores_stay_in_range() {
        let urls = [
            "https://example.com/feed/archive/search/2020/01/x/y/z/w/v/u/t",
            "https://example.com/services/emergency-repair/contact",
            "::not a url::",
            "https://other.org/",
            "https://example.com/?page=4",
        ];
        for u in urls {
            let s = score(u);
            assert!((1..=100).contains(&s), "{} scored {}", u, s);
        }
        assert_eq!(score("::not a url::"), 1);
    }

    #[test]
    fn foreign_root_is_not_homepage() {
        assert!(score("https://other.org/") < 100);
    }

    #[test]
    fn prioritize_orders_by_score_then_length() {
        let urls = vec![
            "https://example.com/privacy".to_string(),
            "https://example.com/contact-us-today".to_string(),
            "https://example.com/".to_string(),
            "https://example.com/contact".to_string(),
            "https://example.com/xyz".to_string(),
            "https://example.com/ab".to_string(),
        ];
        let ordered = prioritize_urls_by_importance(urls, BASE);
        assert_eq!(
            ordered,
            vec![
                "https://example.com/",
                "https://example.com/contact",
                "https://example.com/contact-us-today",
                "https://example.com/ab",
                "https://example.com/xyz",
                "https://example.com/privacy",
            ]
        );

        let scores: Vec<u32> = ordered.iter().map(|u| score(u)).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }
}
