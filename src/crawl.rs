use std::collections::{HashMap, VecDeque};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{ACCEPT, USER_AGENT};
use scraper::Html;
use url::Url;

use crate::cli::CrawlArgs;
use crate::discover::{self, Discovery};
use crate::extract;
use crate::formats::{self, PageRecord};
use crate::visited::VisitedIndex;

#[derive(Debug, Clone)]
struct CrawlScope {
    scheme: String,
    host: String,
    port: Option<u16>,
    path_prefix: String,
}

impl CrawlScope {
    fn new(start_url: &Url) -> anyhow::Result<Self> {
        let scheme = start_url.scheme().to_owned();
        let host = start_url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("start url must have host: {start_url}"))?
            .to_owned();
        let port = start_url.port();
        let path_prefix = start_url.path().to_owned();

        Ok(Self {
            scheme,
            host,
            port,
            path_prefix,
        })
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.scheme() == self.scheme
            && url.host_str() == Some(self.host.as_str())
            && url.port() == self.port
    }

    fn is_under_path_prefix(&self, path: &str) -> bool {
        if self.path_prefix == "/" {
            return true;
        }

        if self.path_prefix.ends_with('/') {
            return path.starts_with(&self.path_prefix);
        }

        path == self.path_prefix || path.starts_with(&format!("{}/", self.path_prefix))
    }

    fn is_in_scope(&self, url: &Url) -> bool {
        self.is_same_origin(url) && self.is_under_path_prefix(url.path())
    }
}

pub async fn resolve_start_url_for_crawl(url: &Url, user_agent: &str) -> Url {
    let url = normalize_url(url);
    if !should_try_trailing_slash(&url) {
        return url;
    }

    let with_slash = url_with_trailing_slash(&url);
    match probe_html_url(&with_slash, user_agent).await {
        Ok(Some(resolved)) => resolved,
        Ok(None) => url,
        Err(err) => {
            tracing::debug!(?err, candidate = %with_slash, "start url probe failed; using input url");
            url
        }
    }
}

pub async fn run(args: CrawlArgs) -> anyhow::Result<()> {
    let out_path = PathBuf::from(&args.out);
    if out_path.exists() {
        anyhow::bail!("records output already exists: {}", out_path.display());
    }
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create records parent dir: {}", parent.display()))?;
    }

    let start_url = Url::parse(&args.url).context("parse --url")?;
    if start_url.scheme() != "http" && start_url.scheme() != "https" {
        anyhow::bail!("--url must be http/https: {start_url}");
    }
    let start_url = resolve_start_url_for_crawl(&start_url, &args.user_agent).await;
    let start_url_canonical = canonical_url(&start_url);

    let scope = CrawlScope::new(&start_url_canonical).context("build crawl scope")?;

    let mut visited = match &args.seed {
        Some(seed_path) => {
            let seed_file = OpenOptions::new()
                .read(true)
                .open(seed_path)
                .with_context(|| format!("open seed records: {seed_path}"))?;
            let seed_records = formats::read_records(seed_file).context("read seed records")?;
            let index = VisitedIndex::seed_from_records(&seed_records);
            tracing::info!(urls = index.len(), "seeded visited index from prior run");
            index
        }
        None => VisitedIndex::new(),
    };

    let mut website = spider::website::Website::new(start_url.as_str());
    website.configuration.respect_robots_txt = args.respect_robots;
    website.configuration.subdomains = false;
    website.configuration.tld = false;
    website.with_user_agent(Some(&args.user_agent));
    website.with_block_assets(true);
    website.with_return_page_links(true);
    website.with_delay(args.delay_ms);
    website.with_concurrency_limit(Some(args.concurrency.max(1)));
    website.with_limit(args.max_pages.min(u32::MAX as usize) as u32);
    website.with_depth(args.max_depth as usize);
    website.with_whitelist_url(Some(vec![build_whitelist_regex(&scope).into()]));

    let link_scope = scope.clone();
    website.on_link_find_callback = Some(Arc::new(move |url_ci, html| {
        let url_str = url_ci.to_string();
        let Ok(parsed) = Url::parse(&url_str) else {
            return (url_ci, html);
        };
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return (url_ci, html);
        }

        let normalized = normalize_url(&parsed);
        let canonical = canonical_url(&normalized);
        if !link_scope.is_in_scope(&canonical) {
            return (url_ci, html);
        }

        let normalized_str = normalized.to_string();
        (spider::CaseInsensitiveString::new(&normalized_str), html)
    }));

    website.scrape().await;

    let fetched = website.get_pages().cloned().unwrap_or_default();
    let mut pages: HashMap<String, String> = HashMap::new();
    for page in fetched.iter() {
        let Ok(url) = Url::parse(page.get_url()) else {
            continue;
        };
        let normalized = normalize_url(&url);
        let canonical = canonical_url(&normalized);
        if !scope.is_in_scope(&canonical) {
            continue;
        }
        if !(200..300).contains(&page.status_code.as_u16()) {
            continue;
        }
        pages
            .entry(canonical.to_string())
            .or_insert_with(|| page.get_html());
    }

    let records_file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&out_path)
        .with_context(|| format!("create records output: {}", out_path.display()))?;
    let mut writer = BufWriter::new(records_file);

    let emitted = traverse(&start_url, &pages, &mut visited, &mut writer)?;
    writer.flush().context("flush records output")?;

    tracing::info!(
        fetched = pages.len(),
        records = emitted,
        out = %out_path.display(),
        "crawl complete"
    );
    Ok(())
}

/// Deterministic replay of the discovery walk over the fetched page set. The
/// fetching library has already applied concurrency, delay and depth policy;
/// here the visited index is touched from a single thread only, so
/// reserve-on-discover is a plain map insert.
fn traverse(
    start_url: &Url,
    pages: &HashMap<String, String>,
    visited: &mut VisitedIndex,
    writer: &mut impl std::io::Write,
) -> anyhow::Result<usize> {
    let start_key = canonical_url(start_url).to_string();
    let Some(root_html) = pages.get(&start_key) else {
        anyhow::bail!("start page was not fetched: {start_key}");
    };
    let root_doc = Html::parse_document(root_html);

    let mut queue: VecDeque<Discovery> = VecDeque::new();
    for discovery in discover::discover_index_links(start_url, &root_doc)? {
        schedule(&mut queue, visited, discovery);
    }

    if let Some(toc_url) = discover::find_toc_link(start_url, &root_doc)? {
        let toc_key = canonical_url(&toc_url).to_string();
        if !visited.contains(&toc_key) {
            if let Some(toc_html) = pages.get(&toc_key) {
                tracing::info!(url = %toc_key, "parsing toc");
                let toc_doc = Html::parse_document(toc_html);
                for discovery in discover::discover_toc_entries(&toc_url, &toc_doc)? {
                    schedule(&mut queue, visited, discovery);
                }
            } else {
                tracing::debug!(url = %toc_key, "toc page was not fetched");
            }
        }
    }

    let mut emitted = 0_usize;
    while let Some(discovery) = queue.pop_front() {
        let key = canonical_url(&discovery.url).to_string();
        let Some(html) = pages.get(&key) else {
            tracing::debug!(url = %key, "scheduled page was not fetched; skipping");
            continue;
        };
        if extract::has_binary_extension(&key) {
            tracing::info!(url = %key, "skipping binary file");
            continue;
        }
        if !extract::looks_like_html(html) {
            tracing::info!(url = %key, "skipping non-text response");
            continue;
        }

        let doc = Html::parse_document(html);
        let page = extract::extract_page(&doc)?;
        if visited.is_unchanged(&key, &page.fingerprint) {
            tracing::debug!(url = %key, "skipping unchanged content");
            continue;
        }
        visited.finalize(&key, page.fingerprint.clone());

        let record = PageRecord {
            title: discovery.title.clone(),
            url: key.clone(),
            priority: discovery.priority,
            level: discovery.level,
            parent: discovery.parent.clone(),
            content: page.content,
            internal_links: page.internal_links,
        };
        serde_json::to_writer(&mut *writer, &record).context("write page record json")?;
        writer.write_all(b"\n").context("write page record newline")?;
        emitted += 1;

        for next in
            discover::discover_content_links(&discovery.url, &doc, discovery.priority, discovery.level)?
        {
            schedule(&mut queue, visited, next);
        }
    }

    Ok(emitted)
}

fn schedule(queue: &mut VecDeque<Discovery>, visited: &mut VisitedIndex, discovery: Discovery) {
    let key = canonical_url(&discovery.url).to_string();
    if visited.reserve(&key) {
        queue.push_back(discovery);
    }
}

fn build_whitelist_regex(scope: &CrawlScope) -> String {
    let port = match scope.port {
        Some(port) => format!(":{port}"),
        None => String::new(),
    };
    let origin = format!("{}://{}{port}", scope.scheme, scope.host);
    let prefix = format!("{origin}{}", scope.path_prefix);

    if scope.path_prefix == "/" {
        format!("^{}.*$", regex_escape(&origin))
    } else if scope.path_prefix.ends_with('/') {
        format!("^{}.*$", regex_escape(&prefix))
    } else {
        format!("^{}(?:/.*)?$", regex_escape(&prefix))
    }
}

fn regex_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '.' | '+' | '*' | '?' | '^' | '$' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

fn should_try_trailing_slash(url: &Url) -> bool {
    let path = url.path();
    if path.ends_with('/') {
        return false;
    }

    let last_segment = path.rsplit('/').next().unwrap_or_default();
    if last_segment.is_empty() {
        return false;
    }

    !last_segment.contains('.')
}

fn url_with_trailing_slash(url: &Url) -> Url {
    let mut out = url.clone();
    let path = out.path();
    if !path.ends_with('/') {
        out.set_path(&format!("{path}/"));
    }
    out
}

async fn probe_html_url(url: &Url, user_agent: &str) -> anyhow::Result<Option<Url>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build url probe http client")?;

    let response = client
        .get(url.clone())
        .header(USER_AGENT, user_agent)
        .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;

    if !response.status().is_success() {
        return Ok(None);
    }

    if let Some(content_type) = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        let content_type = content_type.to_ascii_lowercase();
        if !(content_type.starts_with("text/html")
            || content_type.starts_with("application/xhtml+xml"))
        {
            return Ok(None);
        }
    }

    Ok(Some(normalize_url(response.url())))
}

/// Strips fragment and query; those never distinguish documentation pages and
/// would defeat URL-keyed dedup.
pub(crate) fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized.set_query(None);
    normalized
}

/// Normalized URL with trailing slashes trimmed; the canonical dedup key.
pub(crate) fn canonical_url(url: &Url) -> Url {
    let mut canonical = normalize_url(url);
    let mut path = canonical.path().to_owned();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    canonical.set_path(&path);
    canonical
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs_scope() -> CrawlScope {
        CrawlScope {
            scheme: "https".to_owned(),
            host: "docs.python.org".to_owned(),
            port: None,
            path_prefix: "/3/".to_owned(),
        }
    }

    #[test]
    fn scope_rejects_other_origins_and_paths() -> anyhow::Result<()> {
        let scope = docs_scope();
        assert!(scope.is_in_scope(&Url::parse("https://docs.python.org/3/library/os.html")?));
        assert!(!scope.is_in_scope(&Url::parse("https://docs.python.org/2/library/os.html")?));
        assert!(!scope.is_in_scope(&Url::parse("https://peps.python.org/3/")?));
        assert!(!scope.is_in_scope(&Url::parse("http://docs.python.org/3/")?));
        Ok(())
    }

    #[test]
    fn canonical_url_strips_query_fragment_and_trailing_slash() -> anyhow::Result<()> {
        let url = Url::parse("https://docs.python.org/3/tutorial/?highlight=x#anchor")?;
        assert_eq!(
            canonical_url(&url).as_str(),
            "https://docs.python.org/3/tutorial"
        );
        Ok(())
    }

    #[test]
    fn traversal_emits_once_per_url_and_respects_the_dedup_gate() -> anyhow::Result<()> {
        let start_url = Url::parse("http://docs.local/3/")?;
        let root = r#"<html><body>
          <div class="sphinxsidebarwrapper">
            <a href="tutorial/index.html">Tutorial</a>
            <a href="tutorial/index.html">Tutorial (again)</a>
          </div>
        </body></html>"#;
        let tutorial = r#"<html><body>
          <div class="body">
            <p id="intro">Welcome.</p>
            <a href="../glossary.html">Glossary</a>
          </div>
        </body></html>"#;
        let glossary = r#"<html><body>
          <div class="body"><p id="term">Term.</p></div>
        </body></html>"#;

        let mut pages = HashMap::new();
        pages.insert("http://docs.local/3".to_owned(), root.to_owned());
        pages.insert(
            "http://docs.local/3/tutorial/index.html".to_owned(),
            tutorial.to_owned(),
        );
        pages.insert(
            "http://docs.local/3/glossary.html".to_owned(),
            glossary.to_owned(),
        );

        let mut visited = VisitedIndex::new();
        let mut out = Vec::new();
        let emitted = traverse(&start_url, &pages, &mut visited, &mut out)?;
        assert_eq!(emitted, 2);

        let records = formats::read_records(out.as_slice())?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].url, "http://docs.local/3/tutorial/index.html");
        assert_eq!(records[0].priority, 1);
        assert_eq!(records[1].url, "http://docs.local/3/glossary.html");
        // Discovered from the tutorial page, one priority step later.
        assert_eq!(records[1].priority, 2);
        Ok(())
    }

    #[test]
    fn seeded_unchanged_page_is_not_reemitted() -> anyhow::Result<()> {
        let start_url = Url::parse("http://docs.local/3/")?;
        let root = r#"<html><body>
          <div class="body"><a href="faq/index.html">FAQ</a></div>
        </body></html>"#;
        let faq = r#"<html><body>
          <div class="body"><p>Questions.</p></div>
        </body></html>"#;

        let mut pages = HashMap::new();
        pages.insert("http://docs.local/3".to_owned(), root.to_owned());
        pages.insert("http://docs.local/3/faq/index.html".to_owned(), faq.to_owned());

        // First crawl emits the page; a second crawl seeded from the first
        // emits nothing because the fingerprint is unchanged.
        let mut visited = VisitedIndex::new();
        let mut out = Vec::new();
        assert_eq!(traverse(&start_url, &pages, &mut visited, &mut out)?, 1);
        let records = formats::read_records(out.as_slice())?;

        let mut seeded = VisitedIndex::seed_from_records(&records);
        let mut out2 = Vec::new();
        assert_eq!(traverse(&start_url, &pages, &mut seeded, &mut out2)?, 0);
        Ok(())
    }

    #[test]
    fn toc_entries_are_scheduled_with_parent_metadata() -> anyhow::Result<()> {
        let start_url = Url::parse("http://docs.local/3/")?;
        // The contents link sits outside the scanned link groups, so it is
        // handled by the dedicated TOC branch instead of plain discovery.
        let root = r#"<html><body>
          <p><a href="contents.html">Contents</a></p>
        </body></html>"#;
        let contents = r#"<html><body>
          <div class="toctree-wrapper">
            <ul>
              <li class="toctree-l1">
                <a class="reference internal" href="howto/index.html">HOWTO Index</a>
                <ul>
                  <li class="toctree-l2">
                    <a class="reference internal" href="howto/sockets.html">Socket HOWTO</a>
                  </li>
                </ul>
              </li>
            </ul>
          </div>
        </body></html>"#;
        let howto_index = r#"<html><body><div class="body"><p id="a">i</p></div></body></html>"#;
        let sockets = r#"<html><body><div class="body"><p id="b">s</p></div></body></html>"#;

        let mut pages = HashMap::new();
        pages.insert("http://docs.local/3".to_owned(), root.to_owned());
        pages.insert("http://docs.local/3/contents.html".to_owned(), contents.to_owned());
        pages.insert("http://docs.local/3/howto/index.html".to_owned(), howto_index.to_owned());
        pages.insert("http://docs.local/3/howto/sockets.html".to_owned(), sockets.to_owned());

        let mut visited = VisitedIndex::new();
        let mut out = Vec::new();
        traverse(&start_url, &pages, &mut visited, &mut out)?;

        let records = formats::read_records(out.as_slice())?;
        let sockets_record = records
            .iter()
            .find(|r| r.url.ends_with("howto/sockets.html"))
            .expect("sockets record");
        assert_eq!(sockets_record.level, 2);
        assert_eq!(sockets_record.parent.as_deref(), Some("HOWTO Index"));
        // HOWTO priority 3, pushed down one toctree level.
        assert_eq!(sockets_record.priority, 4);
        Ok(())
    }
}
