use std::collections::BTreeMap;
use std::io::{BufRead as _, BufReader, Read};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// One crawled documentation page, as emitted to the `pages.jsonl` stream.
///
/// Records are append-only: a URL appears at most once per crawl because the
/// visited index gates re-emission of unchanged content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub title: String,
    pub url: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub content: String,
    #[serde(default)]
    pub internal_links: BTreeMap<String, String>,
}

fn default_priority() -> u32 {
    999
}

fn default_level() -> u32 {
    1
}

pub fn read_records<R: Read>(reader: R) -> anyhow::Result<Vec<PageRecord>> {
    let reader = BufReader::new(reader);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line.context("read page record line")?;
        if line.trim().is_empty() {
            continue;
        }
        let record: PageRecord = serde_json::from_str(&line).context("parse page record")?;
        records.push(record);
    }
    Ok(records)
}
