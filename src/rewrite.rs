use std::collections::BTreeMap;

use lol_html::html_content::Element;
use scraper::{Html, Selector};

use crate::assemble::ChapterMapping;

/// Legacy anchor names still emitted by some cross-references, mapped to the
/// ids the current site generates. Applied as a last-resort fragment fix.
pub const ANCHOR_SEEDS: &[(&str, &str)] = &[
    ("library-index", "the-python-standard-library"),
    ("reference-index", "the-python-language-reference"),
    ("extending-index", "extending-and-embedding-the-python-interpreter"),
    ("c-api-index", "python-c-api-reference-manual"),
];

#[derive(Debug)]
pub struct RewriteOutcome {
    pub html: String,
    pub unresolved: Vec<UnresolvedLink>,
}

#[derive(Debug)]
pub struct UnresolvedLink {
    pub href: String,
    pub reason: &'static str,
}

/// Rewrites every internal-reference href in one chapter against the completed
/// chapter mapping. Unresolvable links keep their original href and are
/// reported; they never abort the run.
pub fn rewrite_chapter(
    content: &str,
    internal_links: &BTreeMap<String, String>,
    mapping: &ChapterMapping,
) -> anyhow::Result<RewriteOutcome> {
    let mut unresolved = Vec::new();

    let html = lol_html::rewrite_str(
        content,
        lol_html::RewriteStrSettings {
            element_content_handlers: vec![lol_html::element!("a.reference.internal", |el| {
                rewrite_anchor(el, internal_links, mapping, &mut unresolved);
                Ok(())
            })],
            ..lol_html::RewriteStrSettings::default()
        },
    )
    .map_err(|err| anyhow::anyhow!("rewrite chapter html: {err}"))?;

    Ok(RewriteOutcome { html, unresolved })
}

fn rewrite_anchor(
    el: &mut Element,
    internal_links: &BTreeMap<String, String>,
    mapping: &ChapterMapping,
    unresolved: &mut Vec<UnresolvedLink>,
) {
    let Some(href) = el.get_attribute("href") else {
        return;
    };
    // Same-page fragments and external targets stay untouched.
    if href.is_empty()
        || href.starts_with("http://")
        || href.starts_with("https://")
        || href.starts_with("mailto:")
        || href.starts_with('#')
    {
        return;
    }

    let (base, fragment) = match href.split_once('#') {
        Some((base, fragment)) => (base, format!("#{fragment}")),
        None => (href.as_str(), String::new()),
    };
    let fragment = remap_fragment(&fragment);

    let filename = mapping
        .substring_match(base)
        .or_else(|| mapping.suffix_match(base));

    if let Some(filename) = filename {
        set_href(el, &format!("{filename}{fragment}"));
        return;
    }

    // Title-based fallback via the extractor's internal-link table.
    let Some(target_title) = internal_links.get(&href) else {
        unresolved.push(UnresolvedLink {
            href,
            reason: "no match",
        });
        return;
    };
    match mapping.filename_for_title(target_title) {
        Some(filename) => set_href(el, &format!("{filename}{fragment}")),
        None => unresolved.push(UnresolvedLink {
            href,
            reason: "title not found",
        }),
    }
}

fn remap_fragment(fragment: &str) -> String {
    let Some(name) = fragment.strip_prefix('#') else {
        return fragment.to_owned();
    };
    match ANCHOR_SEEDS.iter().find(|(legacy, _)| *legacy == name) {
        Some((_, current)) => format!("#{current}"),
        None => fragment.to_owned(),
    }
}

fn set_href(el: &mut Element, value: &str) {
    if let Err(err) = el.set_attribute("href", value) {
        tracing::warn!(%value, ?err, "failed to set rewritten href");
    }
}

/// True when the chapter has at least one element with an `id` attribute.
/// Chapters with none cannot be targeted by any anchor link.
pub fn has_element_ids(html: &str) -> bool {
    let Ok(id_selector) = Selector::parse("[id]") else {
        return false;
    };
    Html::parse_fragment(html).select(&id_selector).next().is_some()
}
