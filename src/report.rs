//! Report stage: compare sources in `analyzed_articles.json` and write
//! `final_report.json`.
//!
//! One LLM call over a compact projection of every article. A completion that
//! is not a JSON object with all seven report keys is saved verbatim to
//! `final_report_raw.txt` and fails the run; `final_report.json` is only ever
//! written from an accepted completion.

use crate::api::{ChatCompletion, ChatRequest, build_client};
use crate::config::AppConfig;
use crate::error::{ConfigError, ReportError, Result};
use crate::models::{AnalyzedArticle, CompactArticle, REPORT_KEYS};
use crate::outputs::json::{read_artifact, write_artifact, write_text};
use crate::secrets;
use crate::utils::{strip_code_fence, truncate_for_log};
use itertools::Itertools;
use serde_json::Value;
use tracing::{error, info, instrument};

pub const SYSTEM_PROMPT: &str = "Return ONLY valid JSON. No markdown, no extra text.";

/// Build the report prompt around the serialized compact dataset.
pub fn build_prompt(compact: &[CompactArticle<'_>]) -> serde_json::Result<String> {
    let sources = compact.iter().map(|a| a.source).unique().count();
    let dataset = serde_json::to_string(compact)?;
    Ok(format!(
        r#"You are a Senior News Intelligence Analyst.

You are given news articles from {sources} sources on the SAME topic.
Generate an intelligence report by comparing sources.

Return STRICT JSON with the following keys:

1) executive_summary:
   - 100 to 150 words

2) bias_comparison_matrix:
   - list of objects like:
     {{
       "source": "...",
       "overall_tone": "neutral/critical/supportive/mixed",
       "bias_score_avg": number,
       "framing": "how they frame story in 1-2 lines",
       "what_they_emphasize": ["...","..."],
       "what_they_downplay": ["...","..."]
     }}

3) key_facts_chronology:
   - list of objects sorted by date
     {{
       "date": "YYYY-MM-DD or null",
       "fact": "...",
       "sources_supporting": ["source1","source2"]
     }}

4) contradictions_or_conflicts:
   - list of objects
     {{
       "issue": "...",
       "source_claims": {{
         "SourceA": "...",
         "SourceB": "..."
       }},
       "likely_reason": "missing data / different framing / different numbers / uncertainty"
     }}

5) consensus_summary:
   - 5-8 bullet points

6) unique_angles_by_source:
   - object/dict mapping source -> list of unique points

7) actionable_insights:
   - list of 5-8 items (what readers should know/do)

Use ONLY the given dataset. If something is unknown, say "unclear".

DATASET:
{dataset}
"#
    ))
}

/// Check that `completion` is a JSON object carrying every report key.
///
/// Returns the parsed object untouched, or the reason it was rejected.
pub fn validate_report(completion: &str) -> std::result::Result<Value, String> {
    let value: Value = serde_json::from_str(strip_code_fence(completion)).map_err(|e| e.to_string())?;
    let obj = value
        .as_object()
        .ok_or_else(|| "completion is not a JSON object".to_string())?;
    let missing = REPORT_KEYS.iter().filter(|k| !obj.contains_key(**k)).join(", ");
    if !missing.is_empty() {
        return Err(format!("missing report keys: {missing}"));
    }
    Ok(value)
}

/// Read the analyzed articles, refusing an empty set.
async fn load_articles(config: &AppConfig) -> Result<Vec<AnalyzedArticle>> {
    let articles: Vec<AnalyzedArticle> = read_artifact(&config.paths.analyzed_articles).await?;
    if articles.is_empty() {
        return Err(ReportError::NoArticles.into());
    }
    Ok(articles)
}

/// Ask for the report over `articles` and write the accepted result or the raw fallback.
#[instrument(level = "info", skip_all, fields(articles = articles.len()))]
pub async fn generate_report<C: ChatCompletion>(
    config: &AppConfig,
    client: &C,
    articles: &[AnalyzedArticle],
) -> Result<()> {
    let compact: Vec<CompactArticle<'_>> = articles.iter().map(CompactArticle::from).collect();
    let prompt = build_prompt(&compact).map_err(ReportError::Dataset)?;
    info!(prompt_chars = prompt.len(), "Generating report");

    let request = ChatRequest::new(SYSTEM_PROMPT, prompt, config.settings.report_temperature);
    let completion = client.complete(&request).await.map_err(ReportError::from)?;

    match validate_report(&completion) {
        Ok(report) => {
            write_artifact(&config.paths.final_report, &report).await?;
            info!(path = %config.paths.final_report.display(), "Saved final report");
            Ok(())
        }
        Err(reason) => {
            error!(
                %reason,
                response_preview = %truncate_for_log(&completion, 300),
                "Report completion rejected; saving raw text"
            );
            write_text(&config.paths.final_report_raw, &completion).await?;
            Err(ReportError::MalformedResponse {
                reason,
                raw_path: config.paths.final_report_raw.clone(),
            }
            .into())
        }
    }
}

/// Report stage with an explicit client.
pub async fn run_with<C: ChatCompletion>(config: &AppConfig, client: &C) -> Result<()> {
    let articles = load_articles(config).await?;
    generate_report(config, client, &articles).await
}

/// Report stage entry point.
pub async fn run(config: &AppConfig) -> Result<()> {
    // fail fast before touching Key Vault
    let articles = load_articles(config).await?;

    let secrets = secrets::resolve(&config.secrets_env, &config.settings.secret_names).await?;
    let client = build_client(&secrets, &config.settings)
        .map_err(|e| ConfigError::Invalid(format!("cannot build LLM client: {e}")))?;
    generate_report(config, &client, &articles).await
}
