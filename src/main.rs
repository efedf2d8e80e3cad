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
    reviewscrape::logging::init().context("init logging")?;

    let cli = reviewscrape::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    reviewscrape::run::run(cli).await.context("scrape reviews")?;

    Ok(())
}
