use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    webmirror::logging::init().context("init logging")?;

    let cli = webmirror::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        webmirror::cli::Command::Crawl(args) => {
            webmirror::crawl::run(args).await.context("crawl")?;
        }
    }

    Ok(())
}
