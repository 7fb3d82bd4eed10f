//! Structural page extraction
//!
//! `PageExtractor` is the capability both fetch strategies depend on. The
//! default `HtmlPageExtractor` parses HTML with `scraper` and pre-compiles
//! every selector once at construction.

mod audit;
mod metadata;
mod types;

pub use types::*;

use scraper::{Html, Selector};
use url::Url;

use super::similarity::visible_text;
use super::url_manager::is_same_site;

/// Turns HTML into [`PageFacts`]
pub trait PageExtractor: Send + Sync {
    /// Extract facts from `html` served at `url` (the final URL after redirects)
    fn extract(&self, html: &str, url: &Url) -> PageFacts;
}

pub(crate) struct Selectors {
    pub title: Selector,
    pub meta: Selector,
    pub canonical: Selector,
    pub html: Selector,
    pub headings: Vec<(u8, Selector)>,
    pub anchors: Selector,
    pub images: Selector,
    pub json_ld: Selector,
    pub scripts: Selector,
    pub stylesheets: Selector,
    pub inline_styles: Selector,
    pub inputs: Selector,
    pub labels: Selector,
    pub main_landmark: Selector,
    pub subresources: Selector,
}

fn compile(css: &str) -> Selector {
    // Only called with the literals below
    Selector::parse(css).unwrap_or_else(|_| panic!("invalid built-in selector: {}", css))
}

impl Selectors {
    fn new() -> Self {
        Self {
            title: compile("title"),
            meta: compile("meta"),
            canonical: compile("link[rel='canonical']"),
            html: compile("html"),
            headings: (1..=6u8).map(|l| (l, compile(&format!("h{}", l)))).collect(),
            anchors: compile("a[href]"),
            images: compile("img"),
            json_ld: compile("script[type='application/ld+json']"),
            scripts: compile("script"),
            stylesheets: compile("link[rel~='stylesheet']"),
            inline_styles: compile("style"),
            inputs: compile("input:not([type='hidden']):not([type='submit']):not([type='button']), select, textarea"),
            labels: compile("label[for]"),
            main_landmark: compile("main, [role='main']"),
            subresources: compile("img[src], script[src], link[href][rel~='stylesheet'], iframe[src], video[src], audio[src], source[src]"),
        }
    }
}

/// Default HTML extractor
pub struct HtmlPageExtractor {
    pub(crate) sel: Selectors,
}

impl HtmlPageExtractor {
    pub fn new() -> Self {
        Self { sel: Selectors::new() }
    }

    /// Absolute http(s) link targets without fragments, deduplicated in order
    pub(crate) fn extract_links(&self, document: &Html, base: &Url) -> Links {
        let mut seen = std::collections::HashSet::new();
        let mut links = Links::default();

        for element in document.select(&self.sel.anchors) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() || href.starts_with('#') {
                continue;
            }
            let Ok(mut url) = base.join(href) else {
                continue;
            };
            if url.scheme() != "http" && url.scheme() != "https" {
                continue;
            }
            url.set_fragment(None);
            let url = url.to_string();
            if !seen.insert(url.clone()) {
                continue;
            }
            if is_same_site(&url, base.as_str()) {
                links.internal.push(url);
            } else {
                links.external.push(url);
            }
        }

        links
    }
}

impl Default for HtmlPageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PageExtractor for HtmlPageExtractor {
    fn extract(&self, html: &str, url: &Url) -> PageFacts {
        let document = Html::parse_document(html);

        let meta = self.extract_meta(&document);
        let title = self.extract_title(&document);
        let meta_description = meta.description.clone();
        let headings = self.extract_headings(&document);
        let links = self.extract_links(&document, url);
        let images = self.extract_images(&document, url);
        let schema = self.extract_schema(&document);
        let lang = self.extract_lang(&document);
        let canonical = self.extract_canonical(&document, url);
        let word_count = visible_text(html).split_whitespace().count();

        let security = self.audit_security(&document, url);
        let accessibility = self.audit_accessibility(&document, &images, lang.is_some());
        let performance = self.audit_performance(&document, html.len(), images.len());

        let robots = meta.robots.to_ascii_lowercase();
        let seo_issues = SeoIssues {
            noindex: robots.contains("noindex"),
            nofollow: robots.contains("nofollow"),
            thin_content: word_count < THIN_CONTENT_WORDS,
            missing_title: title.is_none(),
            missing_meta_description: meta_description.is_none(),
            missing_h1: headings.h1.is_empty(),
            multiple_h1: headings.h1.len() > 1,
            duplicate_meta: meta.title_count > 1 || meta.description_count > 1,
        };

        PageFacts {
            url: url.to_string(),
            title,
            meta_description,
            meta_tags: meta.tags,
            canonical,
            lang,
            headings,
            links,
            images,
            schema,
            has_viewport: meta.has_viewport,
            word_count,
            security,
            accessibility,
            performance,
            seo_issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <title> Acme Plumbing | Home </title>
  <meta name="description" content="Fast plumbing repairs.">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <meta property="og:title" content="Acme">
  <link rel="canonical" href="/">
  <link rel="stylesheet" href="/style.css">
  <script type="application/ld+json">{"@context":"https://schema.org","@type":"Plumber","name":"Acme"}</script>
  <script src="https://cdn.example.net/app.js"></script>
</head>
<body>
  <a href="#main">Skip to content</a>
  <main id="main">
    <h1>Acme Plumbing</h1>
    <h2>Services</h2><h2>Reviews</h2>
    <a href="/services">Services</a>
    <a href="https://www.acme.test/contact#form">Contact</a>
    <a href="https://facebook.com/acme">Facebook</a>
    <a href="mailto:hi@acme.test">Mail</a>
    <a href="/services"><img src="/icon.png"></a>
    <img src="/team.jpg" alt="Our team">
    <img src="/logo.png" alt="" loading="lazy">
    <label for="email">Email</label><input id="email" type="email"><input type="text">
  </main>
</body>
</html>"##;

    fn facts() -> PageFacts {
        HtmlPageExtractor::new().extract(PAGE, &Url::parse("https://acme.test/").unwrap())
    }

    #[test]
    fn extracts_head_metadata() {
        let f = facts();
        assert_eq!(f.title.as_deref(), Some("Acme Plumbing | Home"));
        assert_eq!(f.meta_description.as_deref(), Some("Fast plumbing repairs."));
        assert_eq!(f.meta_tags.get("og:title").map(String::as_str), Some("Acme"));
        assert_eq!(f.canonical.as_deref(), Some("https://acme.test/"));
        assert_eq!(f.lang.as_deref(), Some("en"));
        assert!(f.has_viewport);
        assert_eq!(f.schema.len(), 1);
        assert_eq!(f.schema[0]["@type"], "Plumber");
    }

    #[test]
    fn extracts_headings_and_links() {
        let f = facts();
        assert_eq!(f.headings.h1, vec!["Acme Plumbing"]);
        assert_eq!(f.headings.h2.len(), 2);
        assert_eq!(
            f.links.internal,
            vec!["https://acme.test/services", "https://www.acme.test/contact"]
        );
        assert_eq!(f.links.external, vec!["https://facebook.com/acme"]);
    }

    #[test]
    fn image_alt_presence() {
        let f = facts();
        assert_eq!(f.images.len(), 3);
        assert_eq!(f.images.iter().filter(|i| i.has_alt).count(), 1);
        assert_eq!(f.images[1].src, "https://acme.test/team.jpg");
        assert_eq!(f.accessibility.images_missing_alt, 2);
        assert_eq!(f.performance.lazy_image_count, 1);
    }

    #[test]
    fn audits_and_issues() {
        let f = facts();
        assert!(f.security.is_https);
        assert!(!f.security.has_mixed_content);
        assert!(f.accessibility.has_lang_attribute);
        assert!(f.accessibility.has_skip_link);
        assert!(f.accessibility.has_main_landmark);
        assert_eq!(f.accessibility.inputs_without_label, 1);
        assert_eq!(f.accessibility.links_without_text, 1);
        assert_eq!(f.performance.script_count, 2);
        assert_eq!(f.performance.external_script_count, 1);
        assert_eq!(f.performance.stylesheet_count, 1);

        assert!(f.seo_issues.thin_content);
        assert!(!f.seo_issues.missing_title);
        assert!(!f.seo_issues.missing_h1);
        assert!(!f.seo_issues.noindex);
        assert!(!f.seo_issues.duplicate_meta);
    }

    #[test]
    fn flags_problems_on_bare_page() {
        let html = r#"<html><head>
            <meta name="robots" content="NOINDEX, follow">
            <meta name="description" content="a"><meta name="description" content="b">
            </head><body><h1>One</h1><h1>Two</h1>
            <img src="http://insecure.test/pic.png" alt="pic"></body></html>"#;
        let f = HtmlPageExtractor::new().extract(html, &Url::parse("https://x.test/p").unwrap());

        assert!(f.seo_issues.noindex);
        assert!(!f.seo_issues.nofollow);
        assert!(f.seo_issues.missing_title);
        assert!(f.seo_issues.multiple_h1);
        assert!(f.seo_issues.duplicate_meta);
        assert!(!f.has_viewport);
        assert!(f.security.has_mixed_content);
        assert_eq!(f.security.mixed_content_urls, vec!["http://insecure.test/pic.png"]);
        assert!(!f.accessibility.has_lang_attribute);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(facts()).unwrap();
        assert!(json.get("metaDescription").is_some());
        assert!(json["seoIssues"].get("thinContent").is_some());
        assert!(json["security"].get("isHttps").is_some());
    }
}
