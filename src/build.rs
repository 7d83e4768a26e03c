use std::path::PathBuf;

use anyhow::Context as _;

use crate::cli::{AssembleArgs, BuildArgs, CrawlArgs};

pub async fn run(args: BuildArgs) -> anyhow::Result<()> {
    let workspace_dir = PathBuf::from(&args.out);
    if workspace_dir.exists() {
        anyhow::bail!(
            "workspace output directory already exists: {}",
            workspace_dir.display()
        );
    }
    std::fs::create_dir_all(&workspace_dir)
        .with_context(|| format!("create workspace dir: {}", workspace_dir.display()))?;

    let records_path = workspace_dir.join("pages.jsonl");
    let epub_path = workspace_dir.join("book.epub");

    tracing::info!(url = %args.url, out = %workspace_dir.display(), "build: crawl");
    crate::crawl::run(CrawlArgs {
        url: args.url.clone(),
        out: records_path.to_string_lossy().to_string(),
        max_pages: args.max_pages,
        max_depth: args.max_depth,
        concurrency: args.concurrency,
        delay_ms: args.delay_ms,
        user_agent: args.user_agent.clone(),
        respect_robots: args.respect_robots,
        seed: None,
    })
    .await
    .context("crawl")?;

    tracing::info!("build: assemble");
    crate::assemble::run(AssembleArgs {
        records: records_path.to_string_lossy().to_string(),
        out: epub_path.to_string_lossy().to_string(),
        title: args.title.clone(),
        identifier: args.identifier.clone(),
        language: args.language.clone(),
        author: args.author.clone(),
        force: false,
    })
    .context("assemble")?;

    tracing::info!(epub = %epub_path.display(), "build: done");
    Ok(())
}
