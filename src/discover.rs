use scraper::{ElementRef, Html, Selector};
use url::Url;

/// A scheduled follow-up fetch: the absolute URL plus the traversal metadata
/// that ends up on the emitted record.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub url: Url,
    pub title: String,
    pub priority: u32,
    pub level: u32,
    pub parent: Option<String>,
}

/// Link groups scanned on the start page, in fixed order. Later groups may
/// repeat a URL; the visited index keeps only the first discovery.
const INDEX_LINK_SELECTORS: &[&str] = &[
    "div.sphinxsidebarwrapper a[href]",
    "table.contentstable a[href]",
    "div[role='main'] a[href]",
    "div.body a[href]",
    "nav a[href]",
];

/// Link groups re-scanned on every content page for same-page outbound links.
const CONTENT_LINK_SELECTORS: &[&str] = &[
    "div[role='main'] a[href]",
    "div.body a[href]",
    "div.sphinxsidebarwrapper a[href]",
];

const BINARY_EXTENSIONS: &[&str] = &[".pdf", ".zip", ".tar.bz2", ".epub", ".png", ".jpg", ".gif"];
const EXTERNAL_PREFIXES: &[&str] = &["javascript:", "http://", "https://", "mailto:"];
const SECTION_PATHS: &[&str] = &[
    "tutorial/",
    "whatsnew/",
    "howto/",
    "c-api/",
    "deprecations/",
    "library/",
    "reference/",
    "faq/",
];

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("parse selector {css:?}: {err}"))
}

/// Accepts only same-site relative links that point into the documentation
/// sections (or end in `.html`) and are not binary downloads.
pub fn is_valid_link(href: &str) -> bool {
    if href.is_empty() {
        return false;
    }
    if BINARY_EXTENSIONS.iter().any(|ext| href.ends_with(ext)) {
        return false;
    }
    if EXTERNAL_PREFIXES.iter().any(|prefix| href.starts_with(prefix)) {
        return false;
    }
    SECTION_PATHS.iter().any(|path| href.contains(path)) || href.ends_with(".html")
}

/// Title-keyword priority; lower sorts earlier in the final chapter order.
/// Evaluated in fixed order, first match wins.
pub fn priority_for_title(title: &str) -> u32 {
    let title = title.to_lowercase();
    if title.contains("tutorial") {
        return 1;
    }
    if title.contains("library") || title.contains("reference") {
        return 2;
    }
    if title.contains("howto") {
        return 3;
    }
    if title.contains("glossary") || title.contains("search") {
        return 100;
    }
    if title.contains("introduction") {
        return 5;
    }
    4
}

pub fn discover_index_links(base: &Url, doc: &Html) -> anyhow::Result<Vec<Discovery>> {
    collect_links(base, doc, INDEX_LINK_SELECTORS, None, 1)
}

/// Same-page outbound links found while extracting a content page. Scheduled
/// one priority step after the page that referenced them.
pub fn discover_content_links(
    base: &Url,
    doc: &Html,
    priority: u32,
    level: u32,
) -> anyhow::Result<Vec<Discovery>> {
    collect_links(
        base,
        doc,
        CONTENT_LINK_SELECTORS,
        Some(priority.saturating_add(1)),
        level,
    )
}

fn collect_links(
    base: &Url,
    doc: &Html,
    selectors: &[&str],
    fixed_priority: Option<u32>,
    level: u32,
) -> anyhow::Result<Vec<Discovery>> {
    let mut discoveries = Vec::new();
    for css in selectors {
        let link_selector = selector(css)?;
        for link in doc.select(&link_selector) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !is_valid_link(href) {
                continue;
            }
            let Ok(url) = base.join(href) else {
                continue;
            };
            let title = first_text(link).unwrap_or_else(|| "Untitled".to_owned());
            let priority = fixed_priority.unwrap_or_else(|| priority_for_title(&title));
            discoveries.push(Discovery {
                url,
                title,
                priority,
                level,
                parent: None,
            });
        }
    }
    Ok(discoveries)
}

/// The start page links its table of contents as `contents.html`.
pub fn find_toc_link(base: &Url, doc: &Html) -> anyhow::Result<Option<Url>> {
    let toc_selector = selector("a[href='contents.html']")?;
    let Some(link) = doc.select(&toc_selector).next() else {
        return Ok(None);
    };
    let Some(href) = link.value().attr("href") else {
        return Ok(None);
    };
    Ok(base.join(href).ok())
}

/// Enumerates `toctree-l<N>` entries of a TOC page. The nesting level is read
/// from the class name (default 1), the effective priority is the title
/// priority pushed down by `level - 1`, and the parent is the nearest
/// enclosing toctree entry's title.
pub fn discover_toc_entries(base: &Url, doc: &Html) -> anyhow::Result<Vec<Discovery>> {
    let item_selector = selector("div.toctree-wrapper li[class^='toctree-l']")?;
    let anchor_selector = selector("a.reference.internal")?;

    let mut discoveries = Vec::new();
    for item in doc.select(&item_selector) {
        let Some(anchor) = item.select(&anchor_selector).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href) else {
            continue;
        };

        let title = first_text(anchor).unwrap_or_else(|| "Untitled".to_owned());
        let level = toctree_level(item).unwrap_or(1);
        // Class names are crawled input; saturate instead of trusting `l<N>`.
        let priority = priority_for_title(&title).saturating_add(level.saturating_sub(1));
        let parent = find_parent(item, &anchor_selector);

        discoveries.push(Discovery {
            url,
            title,
            priority,
            level,
            parent,
        });
    }
    Ok(discoveries)
}

fn first_text(element: ElementRef<'_>) -> Option<String> {
    element.text().next().map(|text| text.trim().to_owned())
}

fn toctree_level(item: ElementRef<'_>) -> Option<u32> {
    item.value()
        .classes()
        .find_map(|class| class.strip_prefix("toctree-l"))
        .and_then(|digits| digits.parse().ok())
}

/// Walks up to the nearest enclosing `toctree-l*` list item and takes the
/// title of its own internal-reference anchor.
fn find_parent(item: ElementRef<'_>, anchor_selector: &Selector) -> Option<String> {
    for ancestor in item.ancestors() {
        let Some(element) = ElementRef::wrap(ancestor) else {
            continue;
        };
        if element.value().name() != "li" || toctree_level(element).is_none() {
            continue;
        }
        return element
            .select(anchor_selector)
            .next()
            .and_then(first_text);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_filter_matches_documented_cases() {
        assert!(is_valid_link("library/functions.html"));
        assert!(is_valid_link("glossary.html"));
        assert!(is_valid_link("tutorial/"));
        assert!(!is_valid_link("https://example.com/x"));
        assert!(!is_valid_link("http://example.com/x"));
        assert!(!is_valid_link("archive.tar.bz2"));
        assert!(!is_valid_link("mailto:docs@python.org"));
        assert!(!is_valid_link("javascript:void(0)"));
        assert!(!is_valid_link(""));
        assert!(!is_valid_link("genindex"));
    }

    #[test]
    fn priority_keywords_are_checked_in_fixed_order() {
        assert_eq!(priority_for_title("Python Tutorial"), 1);
        assert_eq!(priority_for_title("The Python Standard Library"), 2);
        assert_eq!(priority_for_title("The Python Language Reference"), 2);
        assert_eq!(priority_for_title("Socket HOWTO"), 3);
        assert_eq!(priority_for_title("Glossary"), 100);
        assert_eq!(priority_for_title("Search"), 100);
        assert_eq!(priority_for_title("Introduction"), 5);
        assert_eq!(priority_for_title("Appendix"), 4);
        // "Library Tutorial" hits the tutorial rule first.
        assert_eq!(priority_for_title("Library Tutorial"), 1);
    }

    #[test]
    fn toc_entries_carry_level_parent_and_adjusted_priority() -> anyhow::Result<()> {
        let base = Url::parse("https://docs.python.org/3/contents.html")?;
        let doc = Html::parse_document(
            r#"<div class="toctree-wrapper">
              <ul>
                <li class="toctree-l1">
                  <a class="reference internal" href="tutorial/index.html">The Python Tutorial</a>
                  <ul>
                    <li class="toctree-l2">
                      <a class="reference internal" href="tutorial/classes.html">Classes</a>
                    </li>
                  </ul>
                </li>
              </ul>
            </div>"#,
        );

        let entries = discover_toc_entries(&base, &doc)?;
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].title, "The Python Tutorial");
        assert_eq!(entries[0].level, 1);
        assert_eq!(entries[0].priority, 1);
        assert_eq!(entries[0].parent, None);
        assert_eq!(
            entries[0].url.as_str(),
            "https://docs.python.org/3/tutorial/index.html"
        );

        assert_eq!(entries[1].title, "Classes");
        assert_eq!(entries[1].level, 2);
        // Base priority 4 for an unmatched title, pushed down one level.
        assert_eq!(entries[1].priority, 5);
        assert_eq!(entries[1].parent.as_deref(), Some("The Python Tutorial"));
        Ok(())
    }

    #[test]
    fn index_links_scan_groups_in_order_and_filter_targets() -> anyhow::Result<()> {
        let base = Url::parse("https://docs.python.org/3/")?;
        let doc = Html::parse_document(
            r#"<html><body>
              <div class="sphinxsidebarwrapper">
                <a href="library/functions.html">Built-in Functions</a>
                <a href="https://peps.python.org/">PEP Index</a>
              </div>
              <div role="main">
                <a href="glossary.html">Glossary</a>
                <a href="archives.tar.bz2">Download</a>
              </div>
            </body></html>"#,
        );

        let links = discover_index_links(&base, &doc)?;
        let urls: Vec<&str> = links.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://docs.python.org/3/library/functions.html",
                "https://docs.python.org/3/glossary.html",
            ]
        );
        // Priority comes from the link text, not the href path.
        assert_eq!(links[0].priority, 4);
        assert_eq!(links[1].priority, 100);
        Ok(())
    }

    #[test]
    fn toctree_level_zero_saturates_instead_of_underflowing() -> anyhow::Result<()> {
        let base = Url::parse("https://docs.python.org/3/contents.html")?;
        let doc = Html::parse_document(
            r#"<div class="toctree-wrapper">
              <ul>
                <li class="toctree-l0">
                  <a class="reference internal" href="appendix.html">Appendix</a>
                </li>
              </ul>
            </div>"#,
        );

        let entries = discover_toc_entries(&base, &doc)?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, 0);
        assert_eq!(entries[0].priority, 4);
        Ok(())
    }

    #[test]
    fn content_links_inherit_level_and_bump_priority() -> anyhow::Result<()> {
        let base = Url::parse("https://docs.python.org/3/tutorial/index.html")?;
        let doc = Html::parse_document(
            r#"<div class="body"><a href="classes.html">Classes</a></div>"#,
        );

        let links = discover_content_links(&base, &doc, 1, 2)?;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].priority, 2);
        assert_eq!(links[0].level, 2);
        assert_eq!(
            links[0].url.as_str(),
            "https://docs.python.org/3/tutorial/classes.html"
        );
        Ok(())
    }

    #[test]
    fn untitled_links_fall_back_to_default_priority() -> anyhow::Result<()> {
        let base = Url::parse("https://docs.python.org/3/")?;
        let doc = Html::parse_document(
            r#"<div class="body"><a href="faq/index.html"><img src="x.png"/></a></div>"#,
        );

        let links = discover_index_links(&base, &doc)?;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Untitled");
        assert_eq!(links[0].priority, 4);
        Ok(())
    }
}
