//! Command-line interface definitions for News Intel.
//!
//! Global options can be given as flags or environment variables; each
//! pipeline stage is a subcommand.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Command-line arguments for the News Intel pipeline.
///
/// # Examples
///
/// ```sh
/// # One stage at a time
/// news_intel scrape
/// news_intel analyze
/// news_intel report
/// news_intel dashboard --bind 0.0.0.0:8501
///
/// # All three batch stages, with a settings file
/// news_intel --data-dir ./data --config ./config.yaml run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding source_urls.json and every stage artifact
    #[arg(short, long, env = "NEWS_INTEL_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Optional path to a config.yaml with pipeline settings
    #[arg(short, long, env = "NEWS_INTEL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Fetch every URL in source_urls.json and write raw_articles.json
    Scrape,
    /// Analyze raw_articles.json with the LLM and write analyzed_articles.json
    Analyze,
    /// Compare sources and write final_report.json
    Report,
    /// Serve the read-only dashboard
    Dashboard {
        /// Address to listen on
        #[arg(short, long, env = "NEWS_INTEL_BIND", default_value = "127.0.0.1:8501")]
        bind: SocketAddr,
    },
    /// Run scrape, analyze and report in order
    Run,
}

impl Command {
    /// Whether this command writes into the data directory.
    pub fn writes_data(&self) -> bool {
        !matches!(self, Command::Dashboard { .. })
    }
}
