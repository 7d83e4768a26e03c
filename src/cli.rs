use clap::{Args, Parser, Subcommand};

const DEFAULT_START_URL: &str = "https://docs.python.org/3/";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                                  (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
const DEFAULT_TITLE: &str = "Python 3.13.2 Documentation";
const DEFAULT_IDENTIFIER: &str = "python3docs";
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_AUTHOR: &str = "Python Software Foundation";

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Build(BuildArgs),
    Crawl(CrawlArgs),
    Assemble(AssembleArgs),
    Audit(AuditArgs),
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Start URL (must be http/https).
    #[arg(long, default_value = DEFAULT_START_URL)]
    pub url: String,

    /// Output file path for the page records (`pages.jsonl`).
    #[arg(long)]
    pub out: String,

    /// Maximum pages to retrieve.
    #[arg(long, default_value_t = 10_000)]
    pub max_pages: usize,

    /// Maximum link depth to traverse.
    #[arg(long, default_value_t = 10)]
    pub max_depth: u32,

    /// Maximum concurrent HTTP requests.
    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,

    /// Delay before each request (politeness).
    #[arg(long, default_value_t = 1000)]
    pub delay_ms: u64,

    /// User agent header sent with every request.
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Honor robots.txt (off by default).
    #[arg(long, default_value_t = false)]
    pub respect_robots: bool,

    /// Records file from a prior run; unchanged pages are not re-emitted.
    #[arg(long)]
    pub seed: Option<String>,
}

#[derive(Debug, Args)]
pub struct AssembleArgs {
    /// Input path to the page records (created by `crawl`).
    #[arg(long)]
    pub records: String,

    /// Output file path for the EPUB.
    #[arg(long)]
    pub out: String,

    /// Book title (written to the package metadata).
    #[arg(long, default_value = DEFAULT_TITLE)]
    pub title: String,

    /// Package identifier (`dc:identifier`).
    #[arg(long, default_value = DEFAULT_IDENTIFIER)]
    pub identifier: String,

    /// Book language (`dc:language`).
    #[arg(long, default_value = DEFAULT_LANGUAGE)]
    pub language: String,

    /// Book author (`dc:creator`).
    #[arg(long, default_value = DEFAULT_AUTHOR)]
    pub author: String,

    /// Overwrite the output file if it already exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Input path to the EPUB to check.
    #[arg(long)]
    pub epub: String,

    /// Report file path (default: `epub_link_check_<timestamp>.log` next to
    /// the EPUB).
    #[arg(long)]
    pub report: Option<String>,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Start URL (must be http/https).
    #[arg(long, default_value = DEFAULT_START_URL)]
    pub url: String,

    /// Output directory for workspace (`pages.jsonl`, `book.epub`).
    #[arg(long)]
    pub out: String,

    /// Book title (written to the package metadata).
    #[arg(long, default_value = DEFAULT_TITLE)]
    pub title: String,

    /// Package identifier (`dc:identifier`).
    #[arg(long, default_value = DEFAULT_IDENTIFIER)]
    pub identifier: String,

    /// Book language (`dc:language`).
    #[arg(long, default_value = DEFAULT_LANGUAGE)]
    pub language: String,

    /// Book author (`dc:creator`).
    #[arg(long, default_value = DEFAULT_AUTHOR)]
    pub author: String,

    /// Maximum pages to retrieve.
    #[arg(long, default_value_t = 10_000)]
    pub max_pages: usize,

    /// Maximum link depth to traverse.
    #[arg(long, default_value_t = 10)]
    pub max_depth: u32,

    /// Maximum concurrent HTTP requests.
    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,

    /// Delay before each request (politeness).
    #[arg(long, default_value_t = 1000)]
    pub delay_ms: u64,

    /// User agent header sent with every request.
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Honor robots.txt (off by default).
    #[arg(long, default_value_t = false)]
    pub respect_robots: bool,
}
