use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use scraper::{Html, Selector};
use serde::Serialize;

use crate::cli::AuditArgs;

/// Post-hoc link-integrity result for one assembled EPUB. Broken links are
/// grouped by the file they point at.
#[derive(Debug, Default, Serialize)]
pub struct LinkAuditResult {
    pub total_broken: usize,
    pub chapters_checked: usize,
    pub broken_links: BTreeMap<String, Vec<BrokenLink>>,
}

#[derive(Debug, Serialize)]
pub struct BrokenLink {
    pub source_file: String,
    pub link_text: String,
    pub original_href: String,
    pub issue: String,
}

pub fn run(args: AuditArgs) -> anyhow::Result<()> {
    let epub_path = PathBuf::from(&args.epub);
    let result = check_epub_links(&epub_path);

    let report = render_report(&epub_path, &result);
    for line in report.lines() {
        tracing::info!("{line}");
    }

    let report_path = match &args.report {
        Some(path) => PathBuf::from(path),
        None => default_report_path(&epub_path),
    };
    fs::write(&report_path, &report)
        .with_context(|| format!("write audit report: {}", report_path.display()))?;
    tracing::info!(report = %report_path.display(), "audit report saved");

    Ok(())
}

/// Checks every internal hyperlink of the EPUB against the set of packaged
/// document files and their element anchors. Deliberately total: a missing or
/// corrupt EPUB is logged and yields an empty result instead of an error.
pub fn check_epub_links(epub_path: &Path) -> LinkAuditResult {
    if !epub_path.exists() {
        tracing::error!(path = %epub_path.display(), "epub file not found");
        return LinkAuditResult::default();
    }

    let documents = match read_documents(epub_path) {
        Ok(documents) => documents,
        Err(err) => {
            tracing::error!(path = %epub_path.display(), ?err, "failed to load epub");
            return LinkAuditResult::default();
        }
    };

    audit_documents(&documents)
}

/// Reads every `.xhtml` document from the EPUB container, keyed by its bare
/// filename (directories inside the package are not significant for links).
fn read_documents(epub_path: &Path) -> anyhow::Result<Vec<(String, String)>> {
    let file = fs::File::open(epub_path)
        .with_context(|| format!("open epub: {}", epub_path.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("read epub container")?;

    let names: Vec<String> = archive.file_names().map(str::to_owned).collect();
    let mut documents = Vec::new();
    for name in names {
        if !name.ends_with(".xhtml") {
            continue;
        }
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("open epub entry: {name}"))?;
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .with_context(|| format!("read epub entry: {name}"))?;

        let filename = name.rsplit('/').next().unwrap_or(&name).to_owned();
        documents.push((filename, content));
    }
    Ok(documents)
}

fn audit_documents(documents: &[(String, String)]) -> LinkAuditResult {
    let Ok(id_selector) = selector("[id]") else {
        return LinkAuditResult::default();
    };
    let Ok(link_selector) = selector("a[href]") else {
        return LinkAuditResult::default();
    };

    let mut valid_files: HashSet<&str> = HashSet::new();
    let mut file_anchors: HashMap<&str, HashSet<String>> = HashMap::new();
    for (filename, content) in documents {
        valid_files.insert(filename);
        let doc = Html::parse_document(content);
        let anchors = doc
            .select(&id_selector)
            .filter_map(|el| el.value().attr("id"))
            .map(str::to_owned)
            .collect();
        file_anchors.insert(filename, anchors);
    }

    let mut result = LinkAuditResult {
        chapters_checked: valid_files.len(),
        ..LinkAuditResult::default()
    };

    for (filename, content) in documents {
        let doc = Html::parse_document(content);
        for link in doc.select(&link_selector) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if href.is_empty()
                || href.starts_with("http://")
                || href.starts_with("https://")
                || href.starts_with("mailto:")
            {
                continue;
            }

            let (target_file, anchor) = split_target(href, filename);

            let issue = if target_file == *filename {
                match &anchor {
                    Some(anchor) if !has_anchor(&file_anchors, filename, anchor) => {
                        Some(format!("Anchor '{anchor}' not found in '{filename}'"))
                    }
                    _ => None,
                }
            } else if !valid_files.contains(target_file.as_str()) {
                Some(format!("Target file '{target_file}' not found"))
            } else {
                match &anchor {
                    Some(anchor) if !has_anchor(&file_anchors, &target_file, anchor) => {
                        Some(format!("Anchor '{anchor}' not found in '{target_file}'"))
                    }
                    _ => None,
                }
            };

            if let Some(issue) = issue {
                let text = link.text().collect::<String>();
                let text = text.trim();
                result.total_broken += 1;
                result
                    .broken_links
                    .entry(target_file.clone())
                    .or_default()
                    .push(BrokenLink {
                        source_file: filename.clone(),
                        link_text: if text.is_empty() {
                            "No text".to_owned()
                        } else {
                            text.to_owned()
                        },
                        original_href: href.to_owned(),
                        issue,
                    });
            }
        }
    }

    result
}

/// Splits an href into the bare target filename and optional fragment.
/// Fragment-only links target the current file; `href="#"` carries no anchor.
fn split_target(href: &str, current_file: &str) -> (String, Option<String>) {
    if let Some(fragment) = href.strip_prefix('#') {
        let anchor = if fragment.is_empty() {
            None
        } else {
            Some(fragment.to_owned())
        };
        return (current_file.to_owned(), anchor);
    }
    if let Some((path, fragment)) = href.split_once('#') {
        let target = path.rsplit('/').next().unwrap_or(path).to_owned();
        return (target, Some(fragment.to_owned()));
    }
    let target = href.rsplit('/').next().unwrap_or(href).to_owned();
    (target, None)
}

fn has_anchor(file_anchors: &HashMap<&str, HashSet<String>>, file: &str, anchor: &str) -> bool {
    file_anchors
        .get(file)
        .is_some_and(|anchors| anchors.contains(anchor))
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("parse selector {css:?}: {err}"))
}

fn default_report_path(epub_path: &Path) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let dir = epub_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("epub_link_check_{timestamp}.log"))
}

fn render_report(epub_path: &Path, result: &LinkAuditResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "EPUB Link Check Summary for: {}\n",
        epub_path.display()
    ));
    out.push_str(&format!(
        "Total chapters checked: {}\n",
        result.chapters_checked
    ));
    out.push_str(&format!(
        "Total broken links found: {}\n",
        result.total_broken
    ));

    if result.broken_links.is_empty() {
        out.push_str("\nNo broken links found! All links appear valid.\n");
        return out;
    }

    out.push_str("\nDetailed Report of Broken Links:\n");
    for (target_file, issues) in &result.broken_links {
        out.push_str(&format!("\nTarget File: '{target_file}'\n"));
        for issue in issues {
            out.push_str(&format!("  - Source File: {}\n", issue.source_file));
            out.push_str(&format!("    Link Text: {}\n", issue.link_text));
            out.push_str(&format!("    Original href: {}\n", issue.original_href));
            out.push_str(&format!("    Issue: {}\n", issue.issue));
        }
    }
    out
}
