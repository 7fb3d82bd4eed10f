//! Head metadata, headings, images and JSON-LD

use scraper::{ElementRef, Html};
use std::collections::BTreeMap;
use url::Url;

use super::types::{Headings, ImageFacts};
use super::HtmlPageExtractor;

/// What the `<meta>` tags say about a page
#[derive(Debug, Default)]
pub(super) struct MetaSummary {
    pub tags: BTreeMap<String, String>,
    pub description: Option<String>,
    pub robots: String,
    pub has_viewport: bool,
    pub title_count: usize,
    pub description_count: usize,
}

/// Collapse internal whitespace of an element's text
pub(super) fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl HtmlPageExtractor {
    pub(super) fn extract_meta(&self, document: &Html) -> MetaSummary {
        let mut summary = MetaSummary {
            title_count: document.select(&self.sel.title).count(),
            ..Default::default()
        };

        for element in document.select(&self.sel.meta) {
            let attrs = element.value();
            let Some(key) = attrs.attr("name").or_else(|| attrs.attr("property")) else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let content = attrs.attr("content").unwrap_or("").trim();

            match key.as_str() {
                "description" => {
                    summary.description_count += 1;
                    if summary.description.is_none() {
                        summary.description = non_empty(content);
                    }
                }
                "robots" | "googlebot" => {
                    if !summary.robots.is_empty() {
                        summary.robots.push(',');
                    }
                    summary.robots.push_str(content);
                }
                "viewport" => summary.has_viewport = content.contains("width"),
                _ => {}
            }

            if !content.is_empty() {
                summary.tags.entry(key).or_insert_with(|| content.to_string());
            }
        }

        summary
    }

    /// First non-empty `<title>`
    pub(super) fn extract_title(&self, document: &Html) -> Option<String> {
        document
            .select(&self.sel.title)
            .map(|t| element_text(&t))
            .find(|t| !t.is_empty())
    }

    pub(super) fn extract_headings(&self, document: &Html) -> Headings {
        let mut headings = Headings::default();
        for (level, selector) in &self.sel.headings {
            if let Some(bucket) = headings.level_mut(*level) {
                bucket.extend(
                    document
                        .select(selector)
                        .map(|h| element_text(&h))
                        .filter(|t| !t.is_empty()),
                );
            }
        }
        headings
    }

    pub(super) fn extract_images(&self, document: &Html, base: &Url) -> Vec<ImageFacts> {
        document
            .select(&self.sel.images)
            .filter_map(|img| {
                let attrs = img.value();
                let raw = attrs
                    .attr("src")
                    .or_else(|| attrs.attr("data-src"))
                    .or_else(|| attrs.attr("data-lazy-src"))?;
                let src = base
                    .join(raw.trim())
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| raw.trim().to_string());
                let alt = attrs.attr("alt").map(|a| a.trim().to_string());
                let has_alt = alt.as_deref().map(|a| !a.is_empty()).unwrap_or(false);
                Some(ImageFacts { src, alt, has_alt })
            })
            .collect()
    }

    /// JSON-LD blocks that parse; invalid JSON is ignored
    pub(super) fn extract_schema(&self, document: &Html) -> Vec<serde_json::Value> {
        document
            .select(&self.sel.json_ld)
            .filter_map(|script| {
                let raw = script.text().collect::<String>();
                serde_json::from_str::<serde_json::Value>(raw.trim()).ok()
            })
            .collect()
    }

    pub(super) fn extract_lang(&self, document: &Html) -> Option<String> {
        document
            .select(&self.sel.html)
            .next()
            .and_then(|html| html.value().attr("lang"))
            .and_then(non_empty)
    }

    pub(super) fn extract_canonical(&self, document: &Html, base: &Url) -> Option<String> {
        let href = document
            .select(&self.sel.canonical)
            .next()?
            .value()
            .attr("href")?;
        base.join(href.trim()).ok().map(|u| u.to_string())
    }
}
