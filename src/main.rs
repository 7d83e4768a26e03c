use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    docbinder::logging::init().context("init logging")?;

    let cli = docbinder::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        docbinder::cli::Command::Build(args) => {
            docbinder::build::run(args).await.context("build")?;
        }
        docbinder::cli::Command::Crawl(args) => {
            docbinder::crawl::run(args).await.context("crawl")?;
        }
        docbinder::cli::Command::Assemble(args) => {
            docbinder::assemble::run(args).context("assemble")?;
        }
        docbinder::cli::Command::Audit(args) => {
            docbinder::audit::run(args).context("audit")?;
        }
    }

    Ok(())
}
