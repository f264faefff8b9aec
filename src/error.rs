//! Error types for every pipeline stage.
//!
//! Per-item failures ([`ScrapeError`], [`AnalysisError`]) are plain values the
//! stage loops inspect, log and skip. Everything else is fatal for the run and
//! bubbles up to `main` through [`Error`].

use std::path::PathBuf;

/// Why a single URL did not produce a raw article.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScrapeError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("could not parse page: {0}")]
    Parse(String),

    #[error("extracted content is empty")]
    EmptyContent,
}

impl ScrapeError {
    /// Short, stable label used in log fields and run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::InvalidUrl(_) => "invalid_url",
            ScrapeError::Network(_) => "network",
            ScrapeError::Parse(_) => "parse",
            ScrapeError::EmptyContent => "empty_content",
        }
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        ScrapeError::Network(err.to_string())
    }
}

/// Failures talking to the chat-completion endpoint.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate limited by endpoint (retry after {retry_after_secs:?}s)")]
    Throttled { retry_after_secs: Option<u64> },

    #[error("completion had no message content")]
    EmptyCompletion,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.to_string())
    }
}

/// Why a single article was dropped by the analyzer.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("llm call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("completion is not valid JSON (truncated: {truncated}): {message}")]
    MalformedJson { truncated: bool, message: String },

    #[error("completion does not match the analysis schema: {0}")]
    Schema(String),
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Llm(LlmError::Throttled { .. }) => "throttled",
            AnalysisError::Llm(_) => "llm",
            AnalysisError::MalformedJson { .. } => "malformed_json",
            AnalysisError::Schema(_) => "schema",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("no analyzed articles to report on; run the analyze stage first")]
    NoArticles,

    #[error("cannot serialize report dataset: {0}")]
    Dataset(#[source] serde_json::Error),

    #[error("llm call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("report completion was rejected ({reason}); raw text saved to {}", raw_path.display())]
    MalformedResponse { reason: String, raw_path: PathBuf },
}

/// Reading or writing one of the stage artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {message}")]
    File { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("token request failed: {0}")]
    Token(String),

    #[error("cannot read secret `{name}`: {message}")]
    Secret { name: String, message: String },
}

/// Top-level error returned by stage entry points.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Secrets(#[from] SecretsError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("dashboard server failed: {0}")]
    Server(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
