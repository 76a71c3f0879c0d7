//! HTML extraction for category listings and article pages
//!
//! This module handles parsing rendered markup to extract:
//! - Article links from category pages (via the configured anchor selector)
//! - Publish timestamp and body text from article pages

use crate::config::SiteConfig;
use crate::ConfigError;
use chrono::{NaiveDate, NaiveDateTime};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Timestamp recorded when an article's publish date is missing or unparseable
pub const UNKNOWN_TIMESTAMP: &str = "unknown";

/// Body recorded when an article's body container is missing
pub const UNEXTRACTABLE_BODY: &str = "Content could not be extracted";

/// Output timestamp layout, also used in artifact file names
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M";

/// Extracted content of an article page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    /// Publish timestamp as `%Y-%m-%d-%H-%M`, or [`UNKNOWN_TIMESTAMP`]
    pub publish_timestamp: String,

    /// Paragraphs joined by blank lines, or [`UNEXTRACTABLE_BODY`]
    pub body: String,
}

impl ExtractedContent {
    pub fn has_timestamp(&self) -> bool {
        self.publish_timestamp != UNKNOWN_TIMESTAMP
    }

    pub fn has_body(&self) -> bool {
        self.body != UNEXTRACTABLE_BODY
    }
}

/// Site-specific extractor with precompiled selectors
#[derive(Debug, Clone)]
pub struct SiteExtractor {
    base_url: Url,
    link_selector: Selector,
    date_selector: Selector,
    body_selector: Selector,
    paragraph_selector: Selector,
    date_format: String,
}

impl SiteExtractor {
    /// Compiles the selectors of a site configuration
    pub fn from_config(config: &SiteConfig) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

        Ok(Self {
            base_url,
            link_selector: compile(&config.link_selector)?,
            date_selector: compile(&config.date_selector)?,
            body_selector: compile(&config.body_selector)?,
            paragraph_selector: compile(&config.paragraph_selector)?,
            date_format: config.date_format.clone(),
        })
    }

    /// Extracts the set of absolute article URLs from a category page
    ///
    /// # Link Extraction Rules
    ///
    /// - Only anchors matching the configured link selector are considered
    /// - Relative hrefs are resolved against the site base URL
    /// - `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only hrefs are dropped
    /// - Only HTTP(S) URLs are returned
    pub fn extract_links(&self, html: &str) -> HashSet<String> {
        let document = Html::parse_document(html);

        document
            .select(&self.link_selector)
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| resolve_link(href, &self.base_url))
            .collect()
    }

    /// Extracts publish timestamp and body text from an article page
    ///
    /// Missing markup degrades to [`UNKNOWN_TIMESTAMP`] / [`UNEXTRACTABLE_BODY`]
    /// instead of failing.
    pub fn extract_content(&self, html: &str) -> ExtractedContent {
        let document = Html::parse_document(html);

        let publish_timestamp = document
            .select(&self.date_selector)
            .next()
            .map(|element| element_text(&element))
            .and_then(|text| parse_publish_date(&text, &self.date_format))
            .unwrap_or_else(|| UNKNOWN_TIMESTAMP.to_string());

        let body = document
            .select(&self.body_selector)
            .next()
            .map(|container| {
                container
                    .select(&self.paragraph_selector)
                    .map(|p| element_text(&p))
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n")
            })
            .unwrap_or_else(|| UNEXTRACTABLE_BODY.to_string());

        ExtractedContent {
            publish_timestamp,
            body,
        }
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// Concatenated, trimmed text of an element
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a publish date with `format` and renders it as `%Y-%m-%d-%H-%M`
///
/// Formats without a time component are accepted and treated as midnight.
pub fn parse_publish_date(text: &str, format: &str) -> Option<String> {
    let text = text.trim();

    NaiveDateTime::parse_from_str(text, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only anchors
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) if matches!(absolute_url.scheme(), "http" | "https") => {
            Some(absolute_url.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_config() -> SiteConfig {
        SiteConfig {
            base_url: "https://news.example.com".to_string(),
            link_selector: "a.link-layer-imt".to_string(),
            date_selector: "p.date[data-field='distributionDate']".to_string(),
            date_format: "%d/%m/%Y, %H:%M".to_string(),
            body_selector: "div[data-field='body']".to_string(),
            paragraph_selector: "p".to_string(),
            page_param: "page".to_string(),
        }
    }

    fn extractor() -> SiteExtractor {
        SiteExtractor::from_config(&site_config()).unwrap()
    }

    #[test]
    fn test_extract_only_selected_anchors() {
        let html = r#"<html><body>
            <a class="link-layer-imt" href="/gia-vang.htm">Gold</a>
            <a class="nav" href="/about.htm">About</a>
            <a class="link-layer-imt" href="https://news.example.com/lai-suat.htm">Rates</a>
        </body></html>"#;

        let links = extractor().extract_links(html);

        assert_eq!(links.len(), 2);
        assert!(links.contains("https://news.example.com/gia-vang.htm"));
        assert!(links.contains("https://news.example.com/lai-suat.htm"));
    }

    #[test]
    fn test_duplicate_anchors_collapse() {
        let html = r#"<html><body>
            <a class="link-layer-imt" href="/a.htm">A</a>
            <a class="link-layer-imt" href="/a.htm">A again</a>
        </body></html>"#;

        assert_eq!(extractor().extract_links(html).len(), 1);
    }

    #[test]
    fn test_skip_non_http_links() {
        let html = r##"<html><body>
            <a class="link-layer-imt" href="javascript:void(0)">js</a>
            <a class="link-layer-imt" href="mailto:desk@example.com">mail</a>
            <a class="link-layer-imt" href="#top">top</a>
            <a class="link-layer-imt" href="">empty</a>
            <a class="link-layer-imt">no href</a>
        </body></html>"##;

        assert!(extractor().extract_links(html).is_empty());
    }

    #[test]
    fn test_extract_content() {
        let html = r#"<html><body>
            <p class="date" data-field="distributionDate">14/03/2024, 08:05</p>
            <div data-field="body">
                <p>First paragraph.</p>
                <p>  </p>
                <p>Second <b>bold</b> paragraph.</p>
            </div>
        </body></html>"#;

        let content = extractor().extract_content(html);

        assert_eq!(content.publish_timestamp, "2024-03-14-08-05");
        assert_eq!(content.body, "First paragraph.\n\nSecond bold paragraph.");
        assert!(content.has_timestamp());
        assert!(content.has_body());
    }

    #[test]
    fn test_missing_markup_falls_back() {
        let content = extractor().extract_content("<html><body><p>Nothing here</p></body></html>");

        assert_eq!(content.publish_timestamp, UNKNOWN_TIMESTAMP);
        assert_eq!(content.body, UNEXTRACTABLE_BODY);
        assert!(!content.has_timestamp());
        assert!(!content.has_body());
    }

    #[test]
    fn test_unparseable_date_falls_back() {
        let html = r#"<html><body>
            <p class="date" data-field="distributionDate">yesterday</p>
            <div data-field="body"><p>Text</p></div>
        </body></html>"#;

        let content = extractor().extract_content(html);

        assert_eq!(content.publish_timestamp, UNKNOWN_TIMESTAMP);
        assert_eq!(content.body, "Text");
    }

    #[test]
    fn test_parse_publish_date_date_only_format() {
        assert_eq!(
            parse_publish_date("2024-01-02", "%Y-%m-%d"),
            Some("2024-01-02-00-00".to_string())
        );
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let mut config = site_config();
        config.link_selector = "a[[".to_string();
        assert!(SiteExtractor::from_config(&config).is_err());
    }
}
