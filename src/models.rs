//! Data models shared by every stage.
//!
//! - [`RawArticle`]: what the scraper extracted from one URL
//! - [`Analysis`] / [`AnalyzedArticle`]: per-article LLM analysis
//! - [`CompactArticle`]: the reduced projection embedded in the report prompt
//! - [`Report`]: the cross-source comparison report
//!
//! Deserialization is deliberately forgiving: the artifacts are read back by
//! the report generator and the dashboard, and a field with an unexpected
//! shape falls back to its default instead of failing the whole file. The
//! strict checks on fresh LLM output live in `analyzer` and `report`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Input of the scraper: source name mapped to the article URLs to fetch.
///
/// A `BTreeMap` keeps the scrape order (and thus the output) deterministic.
pub type SourceUrls = BTreeMap<String, Vec<String>>;

/// Decode `T` from whatever JSON is present, or fall back to `T::default()`.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_sentiment<'de, D>(deserializer: D) -> Result<Option<Sentiment>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(Sentiment::parse))
}

/// A news article as extracted by the scraper.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawArticle {
    /// Name of the configured source (the key in `source_urls.json`).
    pub source: String,
    #[serde(default, deserialize_with = "lenient")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient")]
    pub headline: String,
    #[serde(default, deserialize_with = "lenient")]
    pub content: String,
    /// Publication date as found on the page, `None` when the page had none.
    #[serde(default, deserialize_with = "lenient")]
    pub publication_date: Option<String>,
    /// RFC 3339 UTC timestamp of the scrape.
    #[serde(default, deserialize_with = "lenient")]
    pub scraped_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    /// Case-insensitive parse; surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Sentiment> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An article summary: bullet points, a prose block, or something unusable.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Summary {
    Points(Vec<String>),
    Text(String),
    Other(Value),
}

impl Default for Summary {
    fn default() -> Self {
        Summary::Other(Value::Null)
    }
}

/// A named entity mentioned in an article.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub struct Entity {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

/// Per-article analysis produced by the LLM.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Analysis {
    #[serde(default)]
    pub summary: Summary,
    #[serde(default, deserialize_with = "lenient_sentiment")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, deserialize_with = "lenient")]
    pub entities: Vec<Entity>,
    #[serde(default, deserialize_with = "lenient")]
    pub topic_tags: Vec<String>,
    /// Perceived framing bias in `[0, 10]`.
    #[serde(default, deserialize_with = "lenient")]
    pub bias_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub bias_notes: String,
}

/// A raw article with its analysis attached; the analyzer's output record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnalyzedArticle {
    #[serde(flatten)]
    pub article: RawArticle,
    #[serde(default, deserialize_with = "lenient")]
    pub analysis: Analysis,
}

/// The per-article projection sent to the report prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompactArticle<'a> {
    pub source: &'a str,
    pub headline: &'a str,
    pub url: &'a str,
    pub publication_date: Option<&'a str>,
    pub summary: &'a Summary,
    pub sentiment: Option<Sentiment>,
    pub topic_tags: &'a [String],
    pub bias_score: Option<f64>,
    pub bias_notes: &'a str,
}

impl<'a> From<&'a AnalyzedArticle> for CompactArticle<'a> {
    fn from(a: &'a AnalyzedArticle) -> Self {
        CompactArticle {
            source: &a.article.source,
            headline: &a.article.headline,
            url: &a.article.url,
            publication_date: a.article.publication_date.as_deref(),
            summary: &a.analysis.summary,
            sentiment: a.analysis.sentiment,
            topic_tags: &a.analysis.topic_tags,
            bias_score: a.analysis.bias_score,
            bias_notes: &a.analysis.bias_notes,
        }
    }
}

/// Keys the report completion must contain.
pub const REPORT_KEYS: [&str; 7] = [
    "executive_summary",
    "bias_comparison_matrix",
    "key_facts_chronology",
    "contradictions_or_conflicts",
    "consensus_summary",
    "unique_angles_by_source",
    "actionable_insights",
];

/// Cross-source comparison report.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Report {
    #[serde(default, deserialize_with = "lenient")]
    pub executive_summary: String,
    #[serde(default, deserialize_with = "lenient")]
    pub bias_comparison_matrix: Vec<SourceBias>,
    #[serde(default, deserialize_with = "lenient")]
    pub key_facts_chronology: Vec<KeyFact>,
    #[serde(default, deserialize_with = "lenient")]
    pub contradictions_or_conflicts: Vec<Contradiction>,
    #[serde(default)]
    pub consensus_summary: Summary,
    #[serde(default, deserialize_with = "lenient")]
    pub unique_angles_by_source: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub actionable_insights: Vec<String>,
}

/// One row of the bias comparison matrix.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct SourceBias {
    #[serde(default, deserialize_with = "lenient")]
    pub source: String,
    #[serde(default, deserialize_with = "lenient")]
    pub overall_tone: String,
    #[serde(default, deserialize_with = "lenient")]
    pub bias_score_avg: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub framing: String,
    #[serde(default, deserialize_with = "lenient")]
    pub what_they_emphasize: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub what_they_downplay: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct KeyFact {
    #[serde(default, deserialize_with = "lenient")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub fact: String,
    #[serde(default, deserialize_with = "lenient")]
    pub sources_supporting: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Contradiction {
    #[serde(default, deserialize_with = "lenient")]
    pub issue: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub source_claims: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient")]
    pub likely_reason: Option<String>,
}
