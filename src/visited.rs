use std::collections::HashMap;

use sha2::Digest as _;

use crate::formats::PageRecord;

/// Process-lifetime map from URL to the last-seen content fingerprint.
///
/// Discovery reserves a slot with `None` before the page body is known, which
/// keeps concurrent discovery paths from scheduling the same URL twice.
/// Extraction finalizes the slot with the real fingerprint. The index lives for
/// one crawl; the only cross-run state is the optional seed read.
#[derive(Debug, Default)]
pub struct VisitedIndex {
    entries: HashMap<String, Option<String>>,
}

impl VisitedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed from a prior run's record stream so unchanged pages are not
    /// re-emitted.
    pub fn seed_from_records(records: &[PageRecord]) -> Self {
        let mut index = Self::new();
        for record in records {
            index
                .entries
                .insert(record.url.clone(), Some(fingerprint(&record.content)));
        }
        index
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// Check-and-set: claims the URL with a placeholder fingerprint. Returns
    /// false when the URL is already reserved or finalized.
    pub fn reserve(&mut self, url: &str) -> bool {
        if self.entries.contains_key(url) {
            return false;
        }
        self.entries.insert(url.to_owned(), None);
        true
    }

    pub fn finalize(&mut self, url: &str, fingerprint: String) {
        self.entries.insert(url.to_owned(), Some(fingerprint));
    }

    /// The dedup gate: true when the URL was already seen with this exact
    /// fingerprint.
    pub fn is_unchanged(&self, url: &str, fingerprint: &str) -> bool {
        matches!(self.entries.get(url), Some(Some(seen)) if seen == fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn fingerprint(content: &str) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
