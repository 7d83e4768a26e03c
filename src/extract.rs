use std::collections::BTreeMap;

use scraper::{Html, Selector};

use crate::visited;

/// Decreasing-priority containers tried when selecting the content fragment.
const CONTENT_SELECTORS: &[&str] = &["div.document", "div[role='main']", "div.body", "body"];

const PLACEHOLDER_CONTENT: &str = "<p>No content available</p>";

/// URL suffixes that are never worth extracting.
const BINARY_EXTENSIONS: &[&str] = &[".tar.bz2", ".epub", ".pdf", ".zip", ".png", ".jpg", ".gif"];

#[derive(Debug)]
pub struct ExtractedPage {
    /// Serialized HTML of the selected content fragment.
    pub content: String,
    /// `href -> visible link text` for every internal-reference anchor in the
    /// fragment. Consulted by the link rewriter as a title-based fallback.
    pub internal_links: BTreeMap<String, String>,
    pub fingerprint: String,
}

pub fn has_binary_extension(url: &str) -> bool {
    BINARY_EXTENSIONS.iter().any(|ext| url.ends_with(ext))
}

pub fn looks_like_html(body: &str) -> bool {
    if body.trim().is_empty() {
        return false;
    }
    let trimmed = body.trim_start().to_ascii_lowercase();
    trimmed.starts_with("<!doctype html") || trimmed.starts_with("<html") || trimmed.contains("<html")
}

pub fn extract_page(doc: &Html) -> anyhow::Result<ExtractedPage> {
    let content = select_content_fragment(doc)?;

    let fragment = Html::parse_fragment(&content);
    let anchor_selector = selector("a.reference.internal")?;
    let mut internal_links = BTreeMap::new();
    for link in fragment.select(&anchor_selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let text = link.text().collect::<String>();
        let text = text.trim();
        let text = if text.is_empty() { "Untitled" } else { text };
        internal_links.insert(href.to_owned(), text.to_owned());
    }

    let fingerprint = visited::fingerprint(&content);

    Ok(ExtractedPage {
        content,
        internal_links,
        fingerprint,
    })
}

fn select_content_fragment(doc: &Html) -> anyhow::Result<String> {
    for css in CONTENT_SELECTORS {
        let content_selector = selector(css)?;
        if let Some(element) = doc.select(&content_selector).next() {
            return Ok(element.html());
        }
    }
    Ok(PLACEHOLDER_CONTENT.to_owned())
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("parse selector {css:?}: {err}"))
}
