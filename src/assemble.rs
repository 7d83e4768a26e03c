use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::Context as _;

use crate::cli::AssembleArgs;
use crate::epub::{self, BookMeta, Chapter};
use crate::formats::{self, PageRecord};
use crate::rewrite;

/// Insertion-ordered association of source URL and title to the assigned
/// chapter filename. Built once per assembly, after sorting and before any
/// rewriting; lookups that can be ambiguous resolve to the first entry in
/// chapter order.
#[derive(Debug)]
pub struct ChapterMapping {
    entries: Vec<MappingEntry>,
}

#[derive(Debug)]
struct MappingEntry {
    url: String,
    title: String,
    filename: String,
}

impl ChapterMapping {
    pub fn new(sorted_records: &[PageRecord]) -> Self {
        let entries = sorted_records
            .iter()
            .enumerate()
            .map(|(index, record)| MappingEntry {
                url: record.url.clone(),
                title: record.title.clone(),
                filename: chapter_filename(index),
            })
            .collect();
        Self { entries }
    }

    /// Loose resolution: the first known URL (in chapter order) that contains
    /// `base` as a substring. Intentionally not an exact match, to tolerate
    /// path-prefix variation between crawl-time and link-time URL forms.
    pub fn substring_match(&self, base: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.url.contains(base))
            .map(|entry| entry.filename.as_str())
    }

    /// Fallback resolution on the last path segment.
    pub fn suffix_match(&self, base: &str) -> Option<&str> {
        let last_segment = base.rsplit('/').next().unwrap_or(base);
        self.entries
            .iter()
            .find(|entry| entry.url.ends_with(last_segment))
            .map(|entry| entry.filename.as_str())
    }

    /// First chapter (in chapter order) whose title matches exactly.
    pub fn filename_for_title(&self, title: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.title == title)
            .map(|entry| entry.filename.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Filenames depend only on the sort position, never on URL or title.
fn chapter_filename(index: usize) -> String {
    format!("chapter_{}.xhtml", index + 1)
}

/// Stable sort by `(priority, level)`. Stability is a correctness requirement:
/// ties keep their input order, which fixes the final reading order.
pub fn sort_chapters(mut records: Vec<PageRecord>) -> Vec<PageRecord> {
    records.sort_by_key(|record| (record.priority, record.level));
    records
}

pub fn run(args: AssembleArgs) -> anyhow::Result<()> {
    let records_path = PathBuf::from(&args.records);
    if !records_path.exists() {
        anyhow::bail!(
            "records file not found: {} (run crawl first)",
            records_path.display()
        );
    }

    let records_file = OpenOptions::new()
        .read(true)
        .open(&records_path)
        .with_context(|| format!("open records: {}", records_path.display()))?;
    let records = formats::read_records(records_file).context("read page records")?;
    if records.is_empty() {
        anyhow::bail!("no page records in: {}", records_path.display());
    }

    let sorted = sort_chapters(records);
    let mapping = ChapterMapping::new(&sorted);

    let mut chapters = Vec::with_capacity(sorted.len());
    for (index, record) in sorted.iter().enumerate() {
        let outcome = rewrite::rewrite_chapter(&record.content, &record.internal_links, &mapping)
            .with_context(|| format!("rewrite links: {}", record.url))?;
        for unresolved in &outcome.unresolved {
            tracing::warn!(url = %record.url, link = %unresolved.href, reason = %unresolved.reason, "unmapped link");
        }
        if !rewrite::has_element_ids(&outcome.html) {
            tracing::warn!(url = %record.url, "no anchor ids found in chapter");
        }

        chapters.push(Chapter {
            filename: chapter_filename(index),
            title: record.title.clone(),
            html: outcome.html,
        });
    }

    let meta = BookMeta {
        identifier: args.identifier.clone(),
        title: args.title.clone(),
        lang: args.language.clone(),
        author: args.author.clone(),
    };

    let out_path = PathBuf::from(&args.out);
    epub::write_epub(&out_path, &meta, &chapters, args.force).context("write epub")?;

    tracing::info!(chapters = chapters.len(), out = %out_path.display(), "epub assembled");
    Ok(())
}
