//! Generic news article extraction.
//!
//! Works on any article page rather than one outlet's markup:
//!
//! - **Headline**: `og:title`, `twitter:title`, first `<h1>`, then `<title>`
//! - **Text**: `<p>` inside `<article>`, then `<main>`, then anywhere
//! - **Publish date**: meta tags, JSON-LD `datePublished`, `<time datetime>`,
//!   then a `/YYYY/MM/DD/` URL segment

use super::{ArticleExtractor, ExtractedArticle};
use crate::config::PipelineSettings;
use crate::error::ScrapeError;
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, ClientBuilder};
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

/// Paragraph text below this many characters is treated as a teaser, not a body.
const MIN_BODY_CHARS: usize = 200;

static ARTICLE_P: Lazy<Selector> = Lazy::new(|| Selector::parse("article p").expect("valid selector"));
static MAIN_P: Lazy<Selector> = Lazy::new(|| Selector::parse("main p").expect("valid selector"));
static ANY_P: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("valid selector"));
static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[content]").expect("valid selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static LD_JSON: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector"));
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").expect("valid selector"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static URL_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d{4})/(\d{2})/(\d{2})/").expect("valid regex"));

const DATE_META_KEYS: [&str; 7] = [
    "article:published_time",
    "og:article:published_time",
    "datepublished",
    "pubdate",
    "publishdate",
    "dc.date",
    "date",
];

fn collapse(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// `content` of the first `<meta>` whose property, name or itemprop is `key`.
fn meta_content(doc: &Html, key: &str) -> Option<String> {
    doc.select(&META).find_map(|el| {
        let v = el.value();
        let matched = ["property", "name", "itemprop"]
            .iter()
            .filter_map(|attr| v.attr(attr))
            .any(|a| a.eq_ignore_ascii_case(key));
        if !matched {
            return None;
        }
        v.attr("content").map(collapse).filter(|c| !c.is_empty())
    })
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .map(|el| collapse(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn extract_headline(doc: &Html) -> String {
    meta_content(doc, "og:title")
        .or_else(|| meta_content(doc, "twitter:title"))
        .or_else(|| first_text(doc, &H1))
        .or_else(|| first_text(doc, &TITLE))
        .unwrap_or_default()
}

fn paragraphs(doc: &Html, selector: &Selector) -> Vec<String> {
    doc.select(selector)
        .map(|el| collapse(&el.text().collect::<String>()))
        .filter(|p| !p.is_empty())
        .collect()
}

/// Main text as paragraphs separated by blank lines.
fn extract_text(doc: &Html) -> String {
    let mut best: Vec<String> = Vec::new();
    for selector in [&*ARTICLE_P, &*MAIN_P, &*ANY_P] {
        let found = paragraphs(doc, selector);
        let chars: usize = found.iter().map(|p| p.chars().count()).sum();
        if chars >= MIN_BODY_CHARS {
            return found.join("\n\n");
        }
        let best_chars: usize = best.iter().map(|p| p.chars().count()).sum();
        if chars > best_chars {
            best = found;
        }
    }
    best.join("\n\n")
}

/// Normalize a date string to ISO 8601, or `None` when it is not a date.
pub(crate) fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.to_rfc3339());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.to_rfc3339());
    }
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn find_date_published(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => map
            .get("datePublished")
            .and_then(Value::as_str)
            .or_else(|| map.values().find_map(find_date_published)),
        Value::Array(items) => items.iter().find_map(find_date_published),
        _ => None,
    }
}

fn extract_publish_date(doc: &Html, url: &Url) -> Option<String> {
    DATE_META_KEYS
        .iter()
        .find_map(|key| meta_content(doc, key).and_then(|d| normalize_date(&d)))
        .or_else(|| {
            doc.select(&LD_JSON).find_map(|el| {
                let json: Value = serde_json::from_str(&el.text().collect::<String>()).ok()?;
                find_date_published(&json).and_then(normalize_date)
            })
        })
        .or_else(|| {
            doc.select(&TIME)
                .find_map(|el| el.value().attr("datetime").and_then(normalize_date))
        })
        .or_else(|| {
            let caps = URL_DATE.captures(url.path())?;
            normalize_date(&format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]))
        })
}

/// Extract headline, text and publish date from an article page.
pub fn parse_article(html: &str, url: &Url) -> ExtractedArticle {
    let document = Html::parse_document(html);
    let extracted = ExtractedArticle {
        headline: extract_headline(&document),
        text: extract_text(&document),
        publication_date: extract_publish_date(&document, url),
    };
    debug!(
        %url,
        bytes = extracted.text.len(),
        has_date = extracted.publication_date.is_some(),
        "Parsed article"
    );
    extracted
}

/// Downloads pages over HTTP and runs [`parse_article`] on them.
#[derive(Debug, Clone)]
pub struct HttpExtractor {
    client: Client,
}

impl HttpExtractor {
    pub fn new(settings: &PipelineSettings) -> Result<Self, ScrapeError> {
        let client = ClientBuilder::new()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.scrape_timeout_secs))
            .build()?;
        Ok(HttpExtractor { client })
    }
}

impl ArticleExtractor for HttpExtractor {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn extract(&self, url: &str) -> Result<ExtractedArticle, ScrapeError> {
        let parsed = Url::parse(url).map_err(|e| ScrapeError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ScrapeError::InvalidUrl(format!("unsupported scheme in {url}")));
        }

        let body = self
            .client
            .get(parsed.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        if body.trim().is_empty() {
            return Err(ScrapeError::Parse("empty response body".to_string()));
        }

        let article = parse_article(&body, &parsed);
        info!(bytes = article.text.len(), "Extracted article");
        Ok(article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_stub;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::response::Html as HtmlResponse;
    use axum::routing::get;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    const LONG_PARAGRAPH: &str = "Officials confirmed on Tuesday that the bridge will reopen next month after \
        repairs that took nearly two years, citing structural upgrades, new lighting and a redesigned \
        pedestrian lane that residents had requested during public consultations.";

    #[test]
    fn test_prefers_article_paragraphs_over_page_chrome() {
        let html = format!(
            r#"<html><head><title>Bridge | City News</title></head><body>
            <nav><p>Subscribe now</p></nav>
            <article><h1>Bridge to reopen</h1><p>{LONG_PARAGRAPH}</p><p>  Traffic   will resume
            gradually. </p></article>
            <footer><p>Copyright</p></footer></body></html>"#
        );
        let article = parse_article(&html, &url("https://news.example/bridge"));
        assert_eq!(article.headline, "Bridge to reopen");
        assert!(article.text.starts_with("Officials confirmed"));
        assert!(article.text.ends_with("Traffic will resume gradually."));
        assert!(article.text.contains("\n\n"));
        assert!(!article.text.contains("Subscribe"));
        assert!(!article.text.contains("Copyright"));
    }

    #[test]
    fn test_falls_back_to_any_paragraph() {
        let html = format!("<html><body><div><p>{LONG_PARAGRAPH}</p></div></body></html>");
        let article = parse_article(&html, &url("https://news.example/x"));
        assert_eq!(article.text, collapse(LONG_PARAGRAPH));
        assert_eq!(article.headline, "");
    }

    #[test]
    fn test_page_without_paragraphs_has_empty_text() {
        let article = parse_article("<html><body><div>Only a div</div></body></html>", &url("https://a.example/"));
        assert!(article.text.is_empty());
    }

    #[test]
    fn test_headline_prefers_open_graph() {
        let html = r#"<html><head><meta property="og:title" content="OG Headline"><title>Doc</title></head>
            <body><h1>H1 Headline</h1></body></html>"#;
        assert_eq!(parse_article(html, &url("https://a.example/")).headline, "OG Headline");
    }

    #[test]
    fn test_publish_date_sources_in_order() {
        let meta = r#"<head><meta property="article:published_time" content="2025-03-01T08:30:00Z"></head>"#;
        assert_eq!(
            parse_article(meta, &url("https://a.example/")).publication_date.as_deref(),
            Some("2025-03-01T08:30:00+00:00")
        );

        let ld = r#"<script type="application/ld+json">
            {"@context": "https://schema.org", "@graph": [{"@type": "NewsArticle", "datePublished": "2025-02-14"}]}
            </script>"#;
        assert_eq!(parse_article(ld, &url("https://a.example/")).publication_date.as_deref(), Some("2025-02-14"));

        let time = r#"<body><time datetime="2025-01-20T12:00:00+01:00">Jan 20</time></body>"#;
        assert_eq!(
            parse_article(time, &url("https://a.example/")).publication_date.as_deref(),
            Some("2025-01-20T12:00:00+01:00")
        );

        let from_url = parse_article("<p>x</p>", &url("https://a.example/2024/11/05/story"));
        assert_eq!(from_url.publication_date.as_deref(), Some("2024-11-05"));

        let none = parse_article("<p>x</p>", &url("https://a.example/story"));
        assert_eq!(none.publication_date, None);
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("2025-05-06"), Some("2025-05-06".into()));
        assert_eq!(normalize_date("2025-05-06T10:00:00.000Z"), Some("2025-05-06T10:00:00+00:00".into()));
        assert_eq!(normalize_date("Tue, 6 May 2025 10:00:00 +0000"), Some("2025-05-06T10:00:00+00:00".into()));
        assert_eq!(normalize_date("yesterday"), None);
    }

    #[tokio::test]
    async fn test_http_extractor_fetches_and_classifies_failures() {
        let page = format!("<html><body><article><h1>Live</h1><p>{LONG_PARAGRAPH}</p></article></body></html>");
        let router = Router::new()
            .route("/ok", get(move || async move { HtmlResponse(page) }))
            .route("/gone", get(|| async { StatusCode::NOT_FOUND }));
        let base = spawn_stub(router).await;
        let extractor = HttpExtractor::new(&PipelineSettings::default()).unwrap();

        let ok = extractor.extract(&format!("{base}/ok")).await.unwrap();
        assert_eq!(ok.headline, "Live");

        let gone = extractor.extract(&format!("{base}/gone")).await.unwrap_err();
        assert_eq!(gone.kind(), "network");

        let invalid = extractor.extract("not a url").await.unwrap_err();
        assert_eq!(invalid.kind(), "invalid_url");

        let ftp = extractor.extract("ftp://files.example/a").await.unwrap_err();
        assert_eq!(ftp.kind(), "invalid_url");
    }
}
