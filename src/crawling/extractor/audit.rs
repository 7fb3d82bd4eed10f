//! Security, accessibility and performance snapshots

use scraper::Html;
use std::collections::HashSet;
use url::Url;

use super::metadata::element_text;
use super::types::{AccessibilityFacts, ImageFacts, PerformanceFacts, SecurityFacts};
use super::HtmlPageExtractor;

impl HtmlPageExtractor {
    pub(super) fn audit_security(&self, document: &Html, url: &Url) -> SecurityFacts {
        let is_https = url.scheme() == "https";
        let mut mixed = Vec::new();

        if is_https {
            for element in document.select(&self.sel.subresources) {
                let attrs = element.value();
                let target = attrs.attr("src").or_else(|| attrs.attr("href")).unwrap_or("");
                if target.trim().to_ascii_lowercase().starts_with("http://") {
                    mixed.push(target.trim().to_string());
                }
            }
        }

        SecurityFacts {
            is_https,
            has_mixed_content: !mixed.is_empty(),
            mixed_content_urls: mixed,
        }
    }

    pub(super) fn audit_accessibility(
        &self,
        document: &Html,
        images: &[ImageFacts],
        has_lang: bool,
    ) -> AccessibilityFacts {
        let labelled: HashSet<&str> = document
            .select(&self.sel.labels)
            .filter_map(|l| l.value().attr("for"))
            .collect();

        let inputs_without_label = document
            .select(&self.sel.inputs)
            .filter(|input| {
                let attrs = input.value();
                let by_for = attrs.attr("id").map(|id| labelled.contains(id)).unwrap_or(false);
                let by_aria = attrs.attr("aria-label").is_some() || attrs.attr("aria-labelledby").is_some();
                let wrapped = input.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .map(|e| e.name() == "label")
                        .unwrap_or(false)
                });
                !(by_for || by_aria || wrapped)
            })
            .count();

        let mut links_without_text = 0;
        let mut has_skip_link = false;
        for anchor in document.select(&self.sel.anchors) {
            let text = element_text(&anchor);
            let href = anchor.value().attr("href").unwrap_or("");
            if href.starts_with('#') && text.to_ascii_lowercase().contains("skip") {
                has_skip_link = true;
            }

            let img_alt = anchor
                .select(&self.sel.images)
                .any(|img| img.value().attr("alt").map(|a| !a.trim().is_empty()).unwrap_or(false));
            let aria = anchor.value().attr("aria-label").is_some() || anchor.value().attr("title").is_some();
            if text.is_empty() && !img_alt && !aria {
                links_without_text += 1;
            }
        }

        AccessibilityFacts {
            has_lang_attribute: has_lang,
            images_missing_alt: images.iter().filter(|i| !i.has_alt).count(),
            inputs_without_label,
            links_without_text,
            has_skip_link,
            has_main_landmark: document.select(&self.sel.main_landmark).next().is_some(),
        }
    }

    pub(super) fn audit_performance(&self, document: &Html, html_bytes: usize, image_count: usize) -> PerformanceFacts {
        let scripts: Vec<_> = document.select(&self.sel.scripts).collect();
        let lazy_image_count = document
            .select(&self.sel.images)
            .filter(|img| {
                let attrs = img.value();
                attrs.attr("loading").map(|l| l.eq_ignore_ascii_case("lazy")).unwrap_or(false)
                    || attrs.attr("data-src").is_some()
            })
            .count();

        PerformanceFacts {
            html_bytes,
            script_count: scripts.len(),
            external_script_count: scripts.iter().filter(|s| s.value().attr("src").is_some()).count(),
            stylesheet_count: document.select(&self.sel.stylesheets).count(),
            inline_style_count: document.select(&self.sel.inline_styles).count(),
            image_count,
            lazy_image_count,
        }
    }
}
