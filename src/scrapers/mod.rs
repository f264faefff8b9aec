//! Scrape stage: turn `source_urls.json` into `raw_articles.json`.
//!
//! URLs are fetched strictly one after another. A failing URL is logged with
//! its failure kind and skipped; it never aborts the batch. The output file is
//! written once, after every URL has been attempted.

pub mod article;

use crate::config::AppConfig;
use crate::error::{Result, ScrapeError};
use crate::models::{RawArticle, SourceUrls};
use crate::outputs::json::{read_artifact, write_artifact};
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

pub use article::HttpExtractor;

/// What an extractor pulled out of one page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedArticle {
    pub headline: String,
    pub text: String,
    pub publication_date: Option<String>,
}

/// Download and parse a single article URL.
pub trait ArticleExtractor {
    async fn extract(&self, url: &str) -> std::result::Result<ExtractedArticle, ScrapeError>;
}

/// Counters for one scrape run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: BTreeMap<&'static str, usize>,
}

impl ScrapeSummary {
    pub fn failed(&self) -> usize {
        self.failures.values().sum()
    }
}

async fn scrape_one<E: ArticleExtractor>(
    extractor: &E,
    source: &str,
    url: &str,
) -> std::result::Result<RawArticle, ScrapeError> {
    let extracted = extractor.extract(url).await?;
    if extracted.text.trim().is_empty() {
        return Err(ScrapeError::EmptyContent);
    }
    Ok(RawArticle {
        source: source.to_string(),
        url: url.to_string(),
        headline: extracted.headline,
        content: extracted.text,
        publication_date: extracted.publication_date,
        scraped_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

/// Scrape every configured URL in order, keeping only successful extractions.
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub async fn scrape_sources<E: ArticleExtractor>(
    extractor: &E,
    sources: &SourceUrls,
) -> (Vec<RawArticle>, ScrapeSummary) {
    let mut summary = ScrapeSummary::default();
    let mut articles = Vec::new();
    for (source, urls) in sources {
        for url in urls {
            info!(%source, %url, "Scraping");
            summary.attempted += 1;
            match scrape_one(extractor, source, url).await {
                Ok(article) => {
                    summary.succeeded += 1;
                    articles.push(article);
                }
                Err(e) => {
                    warn!(%source, %url, kind = e.kind(), error = %e, "Failed to scrape article; skipping");
                    *summary.failures.entry(e.kind()).or_default() += 1;
                }
            }
        }
    }

    info!(
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        failed = summary.failed(),
        failures = ?summary.failures,
        "Scrape finished"
    );
    (articles, summary)
}

/// Scrape stage with an explicit extractor: read the URL map, scrape, write.
pub async fn run_with<E: ArticleExtractor>(config: &AppConfig, extractor: &E) -> Result<ScrapeSummary> {
    let sources: SourceUrls = read_artifact(&config.paths.source_urls).await?;
    let (articles, summary) = scrape_sources(extractor, &sources).await;
    write_artifact(&config.paths.raw_articles, &articles).await?;
    info!(
        count = articles.len(),
        path = %config.paths.raw_articles.display(),
        "Saved raw articles"
    );
    Ok(summary)
}

/// Scrape stage entry point.
#[instrument(level = "info", skip_all)]
pub async fn run(config: &AppConfig) -> Result<ScrapeSummary> {
    let extractor = HttpExtractor::new(&config.settings).map_err(|e| {
        crate::error::ConfigError::Invalid(format!("cannot build HTTP client: {e}"))
    })?;
    run_with(config, &extractor).await
}
