//! Analyze stage: turn `raw_articles.json` into `analyzed_articles.json`.
//!
//! Each article gets one LLM call, made sequentially. The completion must be a
//! JSON object carrying at least `summary`, `sentiment` and `bias_score`;
//! anything else drops the article. There is no retry at this level and no
//! partial analysis.

use crate::api::{ChatCompletion, ChatRequest, build_client};
use crate::config::{AppConfig, PipelineSettings};
use crate::error::{AnalysisError, ConfigError, Result};
use crate::models::{Analysis, AnalyzedArticle, Entity, RawArticle, Sentiment, Summary};
use crate::outputs::json::{read_artifact, write_artifact};
use crate::secrets;
use crate::utils::{looks_truncated, strip_code_fence, truncate_chars, truncate_for_log};
use itertools::Itertools;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};

pub const SYSTEM_PROMPT: &str = "Respond ONLY in valid JSON. No markdown.";

const REQUIRED_KEYS: [&str; 3] = ["summary", "sentiment", "bias_score"];

/// Build the per-article instruction prompt.
pub fn build_prompt(article: &RawArticle, content_char_limit: usize) -> String {
    format!(
        r#"You are a news intelligence analyst.

Analyze this news article and return STRICT JSON with:
- summary (3-5 bullet points)
- sentiment: positive/neutral/negative
- entities: list of objects with keys (type, name)
- topic_tags: list of 3-7 short tags
- bias_score: number 0-10
- bias_notes: 2-4 lines explaining any framing/bias

ARTICLE:
Source: {source}
Headline: {headline}
Published: {published}
Content:
{content}
"#,
        source = article.source,
        headline = article.headline,
        published = article.publication_date.as_deref().unwrap_or("null"),
        content = truncate_chars(&article.content, content_char_limit),
    )
}

fn schema(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::Schema(msg.into())
}

fn entity_from_value(value: &Value) -> Option<Entity> {
    let entity = match value {
        Value::String(name) => Entity {
            kind: "other".to_string(),
            name: name.trim().to_string(),
        },
        Value::Object(obj) => Entity {
            kind: obj
                .get("type")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .unwrap_or("other")
                .to_string(),
            name: obj.get("name").and_then(Value::as_str).unwrap_or_default().trim().to_string(),
        },
        _ => return None,
    };
    (!entity.name.is_empty()).then_some(entity)
}

fn parse_entities(obj: &Map<String, Value>) -> std::result::Result<Vec<Entity>, AnalysisError> {
    match obj.get("entities") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(entity_from_value)
            .unique_by(|e| (e.kind.to_lowercase(), e.name.to_lowercase()))
            .collect()),
        Some(other) => Err(schema(format!("entities must be a list, got {other}"))),
    }
}

fn parse_tags(obj: &Map<String, Value>) -> std::result::Result<Vec<String>, AnalysisError> {
    let tags: Vec<String> = match obj.get("topic_tags") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unique()
            .collect(),
        Some(other) => return Err(schema(format!("topic_tags must be a list, got {other}"))),
    };
    if !(3..=7).contains(&tags.len()) {
        warn!(count = tags.len(), "Topic tag count outside the requested 3-7");
    }
    Ok(tags)
}

fn parse_notes(obj: &Map<String, Value>) -> String {
    match obj.get("bias_notes") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_str).join("\n"),
        _ => String::new(),
    }
}

/// Validate a completion into an [`Analysis`].
pub fn parse_analysis(completion: &str) -> std::result::Result<Analysis, AnalysisError> {
    let value: Value =
        serde_json::from_str(strip_code_fence(completion)).map_err(|e| AnalysisError::MalformedJson {
            truncated: looks_truncated(&e),
            message: e.to_string(),
        })?;
    let obj = value.as_object().ok_or_else(|| schema("expected a JSON object"))?;

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|k| obj.get(*k).is_none_or(Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(schema(format!("missing required keys: {}", missing.join(", "))));
    }

    let sentiment = obj["sentiment"]
        .as_str()
        .and_then(Sentiment::parse)
        .ok_or_else(|| schema(format!("unknown sentiment {}", obj["sentiment"])))?;

    let bias_score = obj["bias_score"]
        .as_f64()
        .ok_or_else(|| schema(format!("bias_score must be a number, got {}", obj["bias_score"])))?;
    if !(0.0..=10.0).contains(&bias_score) {
        return Err(schema(format!("bias_score {bias_score} outside 0-10")));
    }

    let summary = match serde_json::from_value::<Summary>(obj["summary"].clone()) {
        Ok(Summary::Text(text)) if !text.trim().is_empty() => Summary::Text(text.trim().to_string()),
        Ok(Summary::Points(points)) if !points.is_empty() => Summary::Points(points),
        _ => return Err(schema("summary must be a non-empty string or list of strings")),
    };

    Ok(Analysis {
        summary,
        sentiment: Some(sentiment),
        entities: parse_entities(obj)?,
        topic_tags: parse_tags(obj)?,
        bias_score: Some(bias_score),
        bias_notes: parse_notes(obj),
    })
}

/// Analyze one article with a single LLM call.
#[instrument(level = "info", skip_all, fields(source = %article.source))]
pub async fn analyze_article<C: ChatCompletion>(
    client: &C,
    settings: &PipelineSettings,
    article: &RawArticle,
) -> std::result::Result<Analysis, AnalysisError> {
    let request = ChatRequest::new(
        SYSTEM_PROMPT,
        build_prompt(article, settings.content_char_limit),
        settings.analysis_temperature,
    );
    let completion = client.complete(&request).await?;
    parse_analysis(&completion).inspect_err(|e| {
        debug!(
            error = %e,
            response_preview = %truncate_for_log(&completion, 300),
            "Rejected completion"
        );
    })
}

/// Counters for one analyze run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisSummary {
    pub attempted: usize,
    pub analyzed: usize,
    pub dropped: BTreeMap<&'static str, usize>,
}

/// Analyze every article in order; failures drop the article and move on.
#[instrument(level = "info", skip_all, fields(total = articles.len()))]
pub async fn analyze_articles<C: ChatCompletion>(
    client: &C,
    settings: &PipelineSettings,
    articles: Vec<RawArticle>,
) -> (Vec<AnalyzedArticle>, AnalysisSummary) {
    let total = articles.len();
    let mut summary = AnalysisSummary::default();
    let mut analyzed = Vec::with_capacity(total);

    for (i, article) in articles.into_iter().enumerate() {
        info!(index = i + 1, total, headline = %article.headline, "Analyzing article");
        summary.attempted += 1;
        match analyze_article(client, settings, &article).await {
            Ok(analysis) => {
                summary.analyzed += 1;
                analyzed.push(AnalyzedArticle { article, analysis });
            }
            Err(e) => {
                error!(
                    index = i + 1,
                    url = %article.url,
                    kind = e.kind(),
                    error = %e,
                    "Failed to analyze article; dropping it"
                );
                *summary.dropped.entry(e.kind()).or_default() += 1;
            }
        }
    }

    info!(
        attempted = summary.attempted,
        analyzed = summary.analyzed,
        dropped = ?summary.dropped,
        "Analysis finished"
    );
    (analyzed, summary)
}

/// Analyze stage with an explicit client.
pub async fn run_with<C: ChatCompletion>(config: &AppConfig, client: &C) -> Result<AnalysisSummary> {
    let articles: Vec<RawArticle> = read_artifact(&config.paths.raw_articles).await?;
    if articles.is_empty() {
        warn!(path = %config.paths.raw_articles.display(), "No articles to analyze");
    }

    let (analyzed, summary) = analyze_articles(client, &config.settings, articles).await;
    write_artifact(&config.paths.analyzed_articles, &analyzed).await?;
    info!(
        count = analyzed.len(),
        path = %config.paths.analyzed_articles.display(),
        "Saved analyzed articles"
    );
    Ok(summary)
}

/// Analyze stage entry point.
#[instrument(level = "info", skip_all)]
pub async fn run(config: &AppConfig) -> Result<AnalysisSummary> {
    let secrets = secrets::resolve(&config.secrets_env, &config.settings.secret_names).await?;
    let client = build_client(&secrets, &config.settings)
        .map_err(|e| ConfigError::Invalid(format!("cannot build LLM client: {e}")))?;
    run_with(config, &client).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::test_support::{ScriptedChat, config_in};

    fn raw(headline: &str, content: &str) -> RawArticle {
        RawArticle {
            source: "Reuters".into(),
            url: format!("https://reuters.example/{}", headline.len()),
            headline: headline.into(),
            content: content.into(),
            publication_date: None,
            scraped_at: "2025-05-06T10:00:00Z".into(),
        }
    }

    const GOOD: &str = r#"{
        "summary": ["Talks resumed", "No deal yet"],
        "sentiment": "Neutral",
        "entities": [{"type": "org", "name": "UN"}, {"type": "ORG", "name": "un"}, "Geneva"],
        "topic_tags": ["diplomacy", "talks", "diplomacy", "geneva"],
        "bias_score": 3,
        "bias_notes": ["Relies on official sources.", "Little dissent quoted."]
    }"#;

    #[test]
    fn test_prompt_embeds_fields_and_caps_content() {
        let content = "é".repeat(7000);
        let prompt = build_prompt(&raw("Talks resume", &content), 6000);
        assert!(prompt.contains("Source: Reuters"));
        assert!(prompt.contains("Headline: Talks resume"));
        assert!(prompt.contains("Published: null\n"));
        assert_eq!(prompt.matches('é').count(), 6000);
    }

    #[test]
    fn test_parse_normalizes_and_dedupes() {
        let analysis = parse_analysis(GOOD).unwrap();
        assert_eq!(analysis.sentiment, Some(Sentiment::Neutral));
        assert_eq!(analysis.bias_score, Some(3.0));
        assert_eq!(analysis.summary, Summary::Points(vec!["Talks resumed".into(), "No deal yet".into()]));
        assert_eq!(analysis.entities.len(), 2);
        assert_eq!(analysis.entities[1], Entity { kind: "other".into(), name: "Geneva".into() });
        assert_eq!(analysis.topic_tags, vec!["diplomacy", "talks", "geneva"]);
        assert_eq!(analysis.bias_notes, "Relies on official sources.\nLittle dissent quoted.");
    }

    #[test]
    fn test_parse_accepts_fenced_json_and_optional_defaults() {
        let analysis = parse_analysis(
            "```json\n{\"summary\": \"Short text\", \"sentiment\": \"negative\", \"bias_score\": 7.5}\n```",
        )
        .unwrap();
        assert_eq!(analysis.summary, Summary::Text("Short text".into()));
        assert!(analysis.entities.is_empty());
        assert!(analysis.topic_tags.is_empty());
        assert_eq!(analysis.bias_notes, "");
    }

    #[test]
    fn test_parse_rejections() {
        let malformed = parse_analysis("Sure! Here is the analysis you asked for.").unwrap_err();
        assert!(matches!(malformed, AnalysisError::MalformedJson { truncated: false, .. }));

        let truncated = parse_analysis(r#"{"summary": ["cut"#).unwrap_err();
        assert!(matches!(truncated, AnalysisError::MalformedJson { truncated: true, .. }));

        let missing = parse_analysis(r#"{"summary": "x", "sentiment": "positive"}"#).unwrap_err();
        assert!(missing.to_string().contains("bias_score"));

        let sentiment = parse_analysis(r#"{"summary": "x", "sentiment": "mixed", "bias_score": 1}"#).unwrap_err();
        assert_eq!(sentiment.kind(), "schema");

        let range = parse_analysis(r#"{"summary": "x", "sentiment": "positive", "bias_score": 11}"#).unwrap_err();
        assert!(range.to_string().contains("outside 0-10"));

        let summary = parse_analysis(r#"{"summary": 5, "sentiment": "positive", "bias_score": 1}"#).unwrap_err();
        assert_eq!(summary.kind(), "schema");

        let not_object = parse_analysis("[1, 2]").unwrap_err();
        assert_eq!(not_object.kind(), "schema");
    }

    #[tokio::test]
    async fn test_analyze_uses_configured_temperature_and_system_prompt() {
        let client = ScriptedChat::replying(&[GOOD]);
        let settings = PipelineSettings::default();
        analyze_article(&client, &settings, &raw("h", "c")).await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!((requests[0].temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(requests[0].messages[0].content, SYSTEM_PROMPT);
        assert!(requests[0].user_prompt().contains("Headline: h"));
    }

    #[tokio::test]
    async fn test_failed_articles_are_dropped_without_retry() {
        let client = ScriptedChat::new(vec![
            Ok(GOOD.to_string()),
            Ok("not json".to_string()),
            Err(LlmError::Status { status: 500, body: "boom".into() }),
            Ok(r#"{"summary": "x", "sentiment": "positive", "bias_score": 42}"#.to_string()),
            Ok(GOOD.to_string()),
        ]);
        let articles: Vec<_> = ["a", "bb", "ccc", "dddd", "eeeee"].iter().map(|h| raw(h, "body")).collect();

        let (analyzed, summary) = analyze_articles(&client, &PipelineSettings::default(), articles.clone()).await;

        assert_eq!(client.calls(), 5);
        assert!(analyzed.len() <= articles.len());
        let headlines: Vec<_> = analyzed.iter().map(|a| a.article.headline.as_str()).collect();
        assert_eq!(headlines, vec!["a", "eeeee"]);
        assert!(analyzed.iter().all(|a| a.analysis.sentiment.is_some()));
        assert_eq!(summary.analyzed, 2);
        assert_eq!(summary.dropped.get("malformed_json"), Some(&1));
        assert_eq!(summary.dropped.get("llm"), Some(&1));
        assert_eq!(summary.dropped.get("schema"), Some(&1));
    }

    #[tokio::test]
    async fn test_run_writes_analysis_field_for_every_article() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        write_artifact(&config.paths.raw_articles, &vec![raw("one", "x"), raw("two", "y")])
            .await
            .unwrap();

        let client = ScriptedChat::replying(&[GOOD, "oops"]);
        let summary = run_with(&config, &client).await.unwrap();
        assert_eq!(summary.analyzed, 1);

        let written: Vec<Value> = read_artifact(&config.paths.analyzed_articles).await.unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["headline"], "one");
        assert!(written[0]["analysis"].is_object());
        assert_eq!(written[0]["analysis"]["sentiment"], "neutral");
    }

    #[tokio::test]
    async fn test_rerun_with_same_replies_writes_identical_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        write_artifact(&config.paths.raw_articles, &vec![raw("one", "x"), raw("two", "y"), raw("three", "z")])
            .await
            .unwrap();
        let replies = [GOOD, "oops", GOOD];

        run_with(&config, &ScriptedChat::replying(&replies)).await.unwrap();
        let first = std::fs::read(&config.paths.analyzed_articles).unwrap();
        run_with(&config, &ScriptedChat::replying(&replies)).await.unwrap();
        let second = std::fs::read(&config.paths.analyzed_articles).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_prompt_shows_known_publication_date() {
        let mut article = raw("h", "c");
        article.publication_date = Some("2025-05-06".into());
        assert!(build_prompt(&article, 6000).contains("Published: 2025-05-06\n"));
    }

    #[tokio::test]
    async fn test_run_with_no_articles_writes_empty_list() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        write_artifact(&config.paths.raw_articles, &Vec::<RawArticle>::new()).await.unwrap();

        let client = ScriptedChat::replying(&[]);
        run_with(&config, &client).await.unwrap();
        assert_eq!(client.calls(), 0);
        let written: Vec<AnalyzedArticle> = read_artifact(&config.paths.analyzed_articles).await.unwrap();
        assert!(written.is_empty());
    }
}
