//! Run configuration.
//!
//! [`AppConfig`] is built once in `main` from the CLI, an optional YAML
//! settings file and the environment, then passed by reference into every
//! stage. Stages never read the environment on their own.

use crate::error::ConfigError;
use crate::secrets::SecretsEnv;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Locations of every stage input and artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
    pub dir: PathBuf,
    pub source_urls: PathBuf,
    pub raw_articles: PathBuf,
    pub analyzed_articles: PathBuf,
    pub final_report: PathBuf,
    pub final_report_raw: PathBuf,
}

impl DataPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        DataPaths {
            source_urls: dir.join("source_urls.json"),
            raw_articles: dir.join("raw_articles.json"),
            analyzed_articles: dir.join("analyzed_articles.json"),
            final_report: dir.join("final_report.json"),
            final_report_raw: dir.join("final_report_raw.txt"),
            dir,
        }
    }
}

/// Key Vault secret names holding the LLM connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SecretNames {
    pub api_key: String,
    pub endpoint: String,
    pub deployment: String,
    pub model: String,
}

impl Default for SecretNames {
    fn default() -> Self {
        SecretNames {
            api_key: "openai-model-api-key".to_string(),
            endpoint: "openai-model-endpoint".to_string(),
            deployment: "openai-deployment-name".to_string(),
            model: "openai-model-name".to_string(),
        }
    }
}

/// Tunables read from the optional `config.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub analysis_temperature: f32,
    pub report_temperature: f32,
    /// Characters of article content embedded in the analysis prompt.
    pub content_char_limit: usize,
    pub api_version: String,
    /// Retries after a throttled LLM call; `0` disables retrying.
    pub llm_max_retries: usize,
    pub llm_retry_base_delay_ms: u64,
    /// Per-request timeout for the LLM; `None` keeps the client default.
    pub llm_timeout_secs: Option<u64>,
    pub scrape_timeout_secs: u64,
    pub user_agent: String,
    pub secret_names: SecretNames,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            analysis_temperature: 0.3,
            report_temperature: 0.2,
            content_char_limit: 6000,
            api_version: "2024-02-01".to_string(),
            llm_max_retries: 0,
            llm_retry_base_delay_ms: 1000,
            llm_timeout_secs: None,
            scrape_timeout_secs: 30,
            user_agent: concat!("news_intel/", env!("CARGO_PKG_VERSION")).to_string(),
            secret_names: SecretNames::default(),
        }
    }
}

impl PipelineSettings {
    /// Load settings from a YAML file; unspecified keys keep their defaults.
    #[instrument(level = "info")]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let settings = Self::from_yaml(&text).map_err(|e| match e {
            ConfigError::Invalid(message) => ConfigError::File {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;
        info!(path = %path.display(), "Loaded pipeline settings");
        Ok(settings)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        // an empty document means "all defaults"
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: PipelineSettings =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, t) in [
            ("analysis_temperature", self.analysis_temperature),
            ("report_temperature", self.report_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!("{name} must be within 0.0..=2.0, got {t}")));
            }
        }
        if self.content_char_limit == 0 {
            return Err(ConfigError::Invalid("content_char_limit must be positive".into()));
        }
        Ok(())
    }
}

/// Everything a stage needs to run, built once at process start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: DataPaths,
    pub settings: PipelineSettings,
    /// Environment captured at start-up; only read by stages that call the LLM.
    pub secrets_env: SecretsEnv,
}

impl AppConfig {
    pub fn load(
        data_dir: &Path,
        settings_file: Option<&Path>,
        secrets_env: SecretsEnv,
    ) -> Result<Self, ConfigError> {
        let settings = match settings_file {
            Some(path) => PipelineSettings::from_file(path)?,
            None => PipelineSettings::default(),
        };
        let config = AppConfig {
            paths: DataPaths::new(data_dir),
            settings,
            secrets_env,
        };
        debug!(?config, "Resolved configuration");
        Ok(config)
    }
}
