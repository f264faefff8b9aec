//! # News Intel
//!
//! A multi-source news intelligence pipeline. Articles are scraped from
//! configured sources, analyzed one by one by an LLM (summary, sentiment,
//! entities, tags, bias), compared across sources in a single report, and
//! browsed in a read-only web dashboard.
//!
//! ## Usage
//!
//! ```sh
//! news_intel scrape && news_intel analyze && news_intel report
//! news_intel dashboard
//! ```
//!
//! ## Architecture
//!
//! The stages only talk to each other through JSON files in the data directory:
//! 1. **Scrape**: `source_urls.json` → `raw_articles.json`
//! 2. **Analyze**: `raw_articles.json` → `analyzed_articles.json`
//! 3. **Report**: `analyzed_articles.json` → `final_report.json`
//! 4. **Dashboard**: serves both analysis artifacts over HTTP

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod analyzer;
mod api;
mod cli;
mod config;
mod dashboard;
mod error;
mod models;
mod outputs;
mod report;
mod scrapers;
mod secrets;
mod utils;

#[cfg(test)]
mod test_support;

use cli::{Cli, Command};
use config::AppConfig;
use secrets::SecretsEnv;
use utils::ensure_writable_dir;

async fn dispatch(command: &Command, config: &AppConfig) -> error::Result<()> {
    match command {
        Command::Scrape => {
            scrapers::run(config).await?;
        }
        Command::Analyze => {
            analyzer::run(config).await?;
        }
        Command::Report => report::run(config).await?,
        Command::Dashboard { bind } => dashboard::serve(config, *bind).await?,
        Command::Run => {
            let scraped = scrapers::run(config).await?;
            info!(articles = scraped.succeeded, "Scrape stage done");
            let analyzed = analyzer::run(config).await?;
            info!(articles = analyzed.analyzed, "Analyze stage done");
            report::run(config).await?;
        }
    }
    Ok(())
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // a missing .env is fine
    dotenv::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_intel starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = AppConfig::load(&args.data_dir, args.config.as_deref(), SecretsEnv::from_process())?;

    // Early check: stages that write need a writable data dir
    if args.command.writes_data() {
        if let Err(e) = ensure_writable_dir(&config.paths.dir).await {
            error!(
                path = %config.paths.dir.display(),
                error = %e,
                "Data directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    if let Err(e) = dispatch(&args.command, &config).await {
        error!(command = ?args.command, error = %e, "Stage failed");
        return Err(e.into());
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
