//! JavaScript-heaviness scoring
//!
//! | signal                                   | points            |
//! |------------------------------------------|-------------------|
//! | framework footprint (React/Vue/Angular/other) | 3 each       |
//! | script tags > 10 / > 5                   | 3 / 2             |
//! | visible text < 500 chars                 | 2                 |
//! | AJAX / fetch usage pattern               | 1 each            |
//! | dynamic loading indicator                | 1 each            |
//! | SPA routing indicator                    | 2 each            |
//! | two or more legacy keywords              | 1                 |
//!
//! A page scoring 4 or more (nominal maximum 20) is JS-heavy.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::crawling::similarity::visible_text;

/// Score at which a page counts as JS-heavy
pub const JS_HEAVY_THRESHOLD: u32 = 4;

/// Nominal maximum score
pub const JS_SCORE_NOMINAL_MAX: u32 = 20;

const FRAMEWORK_POINTS: u32 = 3;
const MANY_SCRIPTS_POINTS: u32 = 3;
const SOME_SCRIPTS_POINTS: u32 = 2;
const MANY_SCRIPTS: usize = 10;
const SOME_SCRIPTS: usize = 5;
const MINIMAL_TEXT_POINTS: u32 = 2;
const MINIMAL_TEXT_CHARS: usize = 500;
const AJAX_POINTS: u32 = 1;
const DYNAMIC_POINTS: u32 = 1;
const SPA_ROUTING_POINTS: u32 = 2;
const LEGACY_POINTS: u32 = 1;
const LEGACY_MIN_MATCHES: usize = 2;

const REACT_FOOTPRINTS: &[&str] = &["id=\"root\"", "id='root'", "data-reactroot", "react-dom", "_reactlisteningfor"];
const ANGULAR_FOOTPRINTS: &[&str] = &["ng-app", "ng-controller", "ng-version", "*ngif", "*ngfor", "[ngclass]", "<app-root"];
const OTHER_FRAMEWORK_FOOTPRINTS: &[&str] = &[
    "__next_data__", "__nuxt__", "id=\"__next\"", "id=\"___gatsby\"", "data-sveltekit",
    "ember-application", "data-server-rendered", "id=\"app\"",
];

const AJAX_PATTERNS: &[&str] = &["fetch(", "xmlhttprequest", "axios", "$.ajax", "$.getjson", "graphql"];
const DYNAMIC_PATTERNS: &[&str] = &["lazyload", "lazy-load", "infinite-scroll", "intersectionobserver", "skeleton", "spinner"];
const SPA_ROUTING_PATTERNS: &[&str] = &[
    "history.pushstate", "router-view", "router-link", "routerlink", "react-router", "#!/", "ng-view",
];
const LEGACY_KEYWORDS: &[&str] = &["react", "vue", "angular", "ember", "backbone", "knockout", "single-page", "webpack"];

static RE_VUE_DIRECTIVE: OnceLock<Regex> = OnceLock::new();
static RE_SCRIPT_TAG: OnceLock<Regex> = OnceLock::new();

/// Breakdown of a page's score
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsHeaviness {
    pub score: u32,
    pub signals: Vec<String>,
}

impl JsHeaviness {
    pub fn is_heavy(&self) -> bool {
        self.score >= JS_HEAVY_THRESHOLD
    }

    fn add(&mut self, points: u32, signal: impl Into<String>) {
        self.score += points;
        self.signals.push(signal.into());
    }
}

fn any_of(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Score a page's dependence on client-side rendering
pub fn score_javascript_heaviness(html: &str) -> JsHeaviness {
    let lower = html.to_ascii_lowercase();
    let mut result = JsHeaviness::default();

    let vue = RE_VUE_DIRECTIVE.get_or_init(|| {
        Regex::new(r#"\sv-(?:if|for|bind|model|show|on|cloak)\b|\sdata-v-[0-9a-f]+|\s@click="#)
            .expect("valid regex")
    });

    if any_of(&lower, REACT_FOOTPRINTS) {
        result.add(FRAMEWORK_POINTS, "react");
    }
    if vue.is_match(&lower) {
        result.add(FRAMEWORK_POINTS, "vue");
    }
    if any_of(&lower, ANGULAR_FOOTPRINTS) {
        result.add(FRAMEWORK_POINTS, "angular");
    }
    if any_of(&lower, OTHER_FRAMEWORK_FOOTPRINTS) {
        result.add(FRAMEWORK_POINTS, "framework");
    }

    let scripts = RE_SCRIPT_TAG
        .get_or_init(|| Regex::new(r"<script\b").expect("valid regex"))
        .find_iter(&lower)
        .count();
    if scripts > MANY_SCRIPTS {
        result.add(MANY_SCRIPTS_POINTS, format!("scripts:{}", scripts));
    } else if scripts > SOME_SCRIPTS {
        result.add(SOME_SCRIPTS_POINTS, format!("scripts:{}", scripts));
    }

    if visible_text(html).chars().count() < MINIMAL_TEXT_CHARS {
        result.add(MINIMAL_TEXT_POINTS, "minimal-text");
    }

    for pattern in AJAX_PATTERNS.iter().filter(|p| lower.contains(*p)) {
        result.add(AJAX_POINTS, format!("ajax:{}", pattern));
    }
    for pattern in DYNAMIC_PATTERNS.iter().filter(|p| lower.contains(*p)) {
        result.add(DYNAMIC_POINTS, format!("dynamic:{}", pattern));
    }
    for pattern in SPA_ROUTING_PATTERNS.iter().filter(|p| lower.contains(*p)) {
        result.add(SPA_ROUTING_POINTS, format!("routing:{}", pattern));
    }

    let legacy = LEGACY_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    if legacy >= LEGACY_MIN_MATCHES {
        result.add(LEGACY_POINTS, "legacy-keywords");
    }

    result
}

/// Whether a page needs a browser to render its content
pub fn detect_javascript_heavy_site(html: &str, url: &str) -> bool {
    let result = score_javascript_heaviness(html);
    if result.is_heavy() {
        tracing::debug!(
            "{} is JS-heavy (score {}/{}: {})",
            url,
            result.score,
            JS_SCORE_NOMINAL_MAX,
            result.signals.join(", ")
        );
    }
    result.is_heavy()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prose(words: usize) -> String {
        (0..words).map(|i| format!("word{} ", i)).collect()
    }

    #[test]
    fn spa_shell_with_many_scripts_is_heavy() {
        let scripts: String = (0..12).map(|i| format!("<script src=\"/js/chunk{}.js\"></script>", i)).collect();
        let html = format!("<html><body><div id=\"root\"></div>{}<p>Loading</p></body></html>", scripts);

        let result = score_javascript_heaviness(&html);
        assert!(result.score >= 8, "score {} ({:?})", result.score, result.signals);
        assert!(result.signals.contains(&"react".to_string()));
        assert!(result.signals.contains(&"minimal-text".to_string()));
        assert!(detect_javascript_heavy_site(&html, "https://x.test/"));
    }

    #[test]
    fn static_article_is_not_heavy() {
        let html = format!(
            "<html><body><h1>Guide</h1><p>{}</p><script src=\"/analytics.js\"></script></body></html>",
            prose(200)
        );
        let result = score_javascript_heaviness(&html);
        assert!(result.score < JS_HEAVY_THRESHOLD, "score {} ({:?})", result.score, result.signals);
        assert!(!detect_javascript_heavy_site(&html, "https://x.test/"));
    }

    #[test]
    fn minimal_text_alone_is_not_enough() {
        let result = score_javascript_heaviness("<html><body><p>Short page</p></body></html>");
        assert_eq!(result.score, 2);
        assert!(!result.is_heavy());
    }

    #[test]
    fn threshold_is_inclusive() {
        // vue footprint (3) + one fetch pattern (1) with plenty of text
        let html = format!(
            "<div v-if=\"ready\">{}</div><script>fetch('/api/items')</script>",
            prose(200)
        );
        let result = score_javascript_heaviness(&html);
        assert_eq!(result.score, 4, "{:?}", result.signals);
        assert!(result.is_heavy());
    }

    #[test]
    fn routing_indicators_score_two_each() {
        let html = format!(
            "<p>{}</p><script>history.pushState({{}}, '', '/x')</script><router-view></router-view>",
            prose(200)
        );
        let result = score_javascript_heaviness(&html);
        assert_eq!(result.score, 4, "{:?}", result.signals);
    }

    #[test]
    fn script_count_bands() {
        let six: String = (0..6).map(|_| "<script></script>").collect();
        let html = format!("<p>{}</p>{}", prose(200), six);
        assert_eq!(score_javascript_heaviness(&html).score, 2);
    }
}
