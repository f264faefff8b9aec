//! Server-side HTML for the dashboard page.
//!
//! Sections are written in a fixed order: sidebar, executive summary, bias
//! comparison, chronology, conflicts, article cards, actionable insights.
//! Every piece of artifact text goes through [`escape`].

use super::AppState;
use super::filter::Selection;
use super::stats::{bias_scores_by_source, box_plot_svg};
use crate::models::{AnalyzedArticle, Contradiction, KeyFact, Sentiment, SourceBias, Summary};
use crate::utils::{slugify_title, upcase};
use itertools::Itertools;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt::{self, Write};

pub const PAGE_TITLE: &str = "Multi-Source News Intelligence Dashboard";

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:sans-serif;margin:0;display:flex}\
aside{width:240px;padding:1rem;background:#f4f4f4;min-height:100vh}\
main{flex:1;padding:1rem 2rem;max-width:1100px}\
section{border-top:1px solid #ddd;padding:.5rem 0}\
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:4px 8px;text-align:left}\
.card{border:1px solid #ddd;border-radius:6px;padding:.5rem 1rem;margin:.75rem 0}\
.meta{color:#666;font-size:.9em}.info{color:#31708f}.ok{color:#3c763d}";

fn section_open(out: &mut String, title: &str) -> fmt::Result {
    writeln!(out, r#"<section id="{}"><h2>{}</h2>"#, slugify_title(title), escape(title))
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.iter().map(|s| escape(s)).join(", ")
    }
}

fn score_label(score: Option<f64>) -> String {
    score.map_or_else(|| "n/a".to_string(), |s| format!("{s}"))
}

fn write_bullets<'a>(out: &mut String, items: impl Iterator<Item = Cow<'a, str>>) -> fmt::Result {
    out.push_str("<ul class=\"summary\">");
    for item in items {
        write!(out, "<li>{}</li>", escape(&item))?;
    }
    out.push_str("</ul>\n");
    Ok(())
}

/// Render an article summary: bullets for a list, one block for a string.
///
/// List items that are not strings are shown as their JSON text.
pub fn render_summary(out: &mut String, summary: &Summary) -> fmt::Result {
    match summary {
        Summary::Points(points) => write_bullets(out, points.iter().map(|p| Cow::Borrowed(p.as_str())))?,
        Summary::Other(Value::Array(items)) => write_bullets(
            out,
            items.iter().map(|item| match item {
                Value::String(s) => Cow::Borrowed(s.as_str()),
                other => Cow::Owned(other.to_string()),
            }),
        )?,
        Summary::Text(text) => writeln!(out, r#"<p class="summary">{}</p>"#, escape(text))?,
        Summary::Other(_) => out.push_str("<p class=\"summary\">Summary unavailable.</p>\n"),
    }
    Ok(())
}

fn render_sidebar(out: &mut String, state: &AppState, selection: &Selection, shown: usize) -> fmt::Result {
    out.push_str("<aside><h3>Filters</h3><form method=\"get\" action=\"/\">\n");
    out.push_str("<input type=\"hidden\" name=\"applied\" value=\"1\">\n<fieldset><legend>Select Sources</legend>\n");
    for source in &state.sources {
        let checked = if selection.sources.contains(source) { " checked" } else { "" };
        writeln!(
            out,
            r#"<label><input type="checkbox" name="source" value="{v}"{checked}> {v}</label><br>"#,
            v = escape(source)
        )?;
    }
    out.push_str("</fieldset>\n<fieldset><legend>Select Sentiment</legend>\n");
    for sentiment in Sentiment::ALL {
        let checked = if selection.sentiments.contains(&sentiment) { " checked" } else { "" };
        writeln!(
            out,
            r#"<label><input type="checkbox" name="sentiment" value="{}"{checked}> {}</label><br>"#,
            sentiment.as_str(),
            upcase(sentiment.as_str())
        )?;
    }
    out.push_str("</fieldset>\n<button type=\"submit\">Apply</button></form>\n");
    writeln!(out, r#"<p id="shown"><strong>Showing {shown} articles</strong></p></aside>"#)
}

fn render_overview(out: &mut String, state: &AppState, shown: usize) -> fmt::Result {
    section_open(out, "Executive Summary")?;
    let summary = state.report.executive_summary.trim();
    if summary.is_empty() {
        out.push_str("<p>No summary available.</p>\n");
    } else {
        writeln!(out, "<p>{}</p>", escape(summary))?;
    }
    writeln!(
        out,
        r#"<h3>Quick Stats</h3><dl class="stats"><dt>Total Articles</dt><dd>{}</dd><dt>Filtered Articles</dt><dd>{shown}</dd></dl></section>"#,
        state.articles.len()
    )
}

fn render_bias_row(out: &mut String, row: &SourceBias) -> fmt::Result {
    writeln!(
        out,
        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
        escape(&row.source),
        escape(&row.overall_tone),
        score_label(row.bias_score_avg),
        escape(&row.framing),
        list_or_dash(&row.what_they_emphasize),
        list_or_dash(&row.what_they_downplay),
    )
}

fn render_bias(out: &mut String, state: &AppState) -> fmt::Result {
    section_open(out, "Bias Comparison Across Sources")?;
    let matrix = &state.report.bias_comparison_matrix;
    if !matrix.is_empty() {
        out.push_str(
            "<table class=\"bias\"><tr><th>Source</th><th>Overall tone</th><th>Avg bias</th>\
             <th>Framing</th><th>Emphasizes</th><th>Downplays</th></tr>\n",
        );
        for row in matrix {
            render_bias_row(out, row)?;
        }
        out.push_str("</table>\n");
    }
    let groups = bias_scores_by_source(&state.articles);
    if !groups.is_empty() {
        out.push_str(&box_plot_svg(&groups)?);
        out.push('\n');
    }
    out.push_str("</section>\n");
    Ok(())
}

fn render_fact(out: &mut String, fact: &KeyFact) -> fmt::Result {
    let date = fact.date.as_deref().filter(|d| !d.trim().is_empty()).unwrap_or("Unknown");
    writeln!(
        out,
        r#"<div class="fact"><strong>{}</strong><ul><li>{}</li></ul><p class="meta">Sources: {}</p></div>"#,
        escape(date),
        escape(&fact.fact),
        fact.sources_supporting.iter().map(|s| escape(s)).join(", ")
    )
}

fn render_conflict(out: &mut String, conflict: &Contradiction) -> fmt::Result {
    let issue = conflict.issue.as_deref().filter(|i| !i.trim().is_empty()).unwrap_or("Conflict");
    writeln!(out, "<details><summary>{}</summary>", escape(issue))?;
    for (source, claim) in &conflict.source_claims {
        writeln!(out, "<p><strong>{}:</strong> {}</p>", escape(source), escape(claim))?;
    }
    writeln!(
        out,
        r#"<p class="meta">Likely reason: {}</p></details>"#,
        escape(conflict.likely_reason.as_deref().unwrap_or("unclear"))
    )
}

fn render_card(out: &mut String, a: &AnalyzedArticle) -> fmt::Result {
    let headline = a.article.headline.trim();
    let headline = if headline.is_empty() { "(No headline)" } else { headline };
    let date = a.article.publication_date.as_deref().unwrap_or("Unknown");
    writeln!(out, r#"<article class="card"><h3>{}</h3>"#, escape(headline))?;
    writeln!(
        out,
        r#"<p class="meta">{} | {}</p>"#,
        escape(&a.article.source),
        escape(date)
    )?;
    writeln!(
        out,
        "<p><strong>Sentiment:</strong> {} &middot; <strong>Bias Score:</strong> {} &middot; <strong>Tags:</strong> {}</p>",
        a.analysis.sentiment.map_or_else(|| "n/a".to_string(), |s| upcase(s.as_str())),
        score_label(a.analysis.bias_score),
        list_or_dash(&a.analysis.topic_tags)
    )?;
    out.push_str("<h4>Summary</h4>\n");
    render_summary(out, &a.analysis.summary)?;
    let url = a.article.url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        writeln!(
            out,
            r#"<p><a href="{}" target="_blank" rel="noopener">Open Article</a></p>"#,
            escape(url)
        )?;
    }
    out.push_str("</article>\n");
    Ok(())
}

/// Render the whole dashboard page for one selection.
pub fn render_page(state: &AppState, selection: &Selection) -> Result<String, fmt::Error> {
    let filtered = selection.apply(&state.articles);
    let report = &state.report;
    let mut out = String::with_capacity(16 * 1024);

    writeln!(
        out,
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\"><title>{PAGE_TITLE}</title><style>{STYLE}</style></head><body>"
    )?;
    render_sidebar(&mut out, state, selection, filtered.len())?;
    writeln!(out, "<main><h1>{PAGE_TITLE}</h1>")?;

    render_overview(&mut out, state, filtered.len())?;
    render_bias(&mut out, state)?;

    section_open(&mut out, "Chronological Key Facts")?;
    if report.key_facts_chronology.is_empty() {
        out.push_str("<p class=\"info\">No chronological facts available.</p>\n");
    }
    for fact in &report.key_facts_chronology {
        render_fact(&mut out, fact)?;
    }
    out.push_str("</section>\n");

    section_open(&mut out, "Conflicting Coverage")?;
    if report.contradictions_or_conflicts.is_empty() {
        out.push_str("<p class=\"ok\">No major contradictions detected.</p>\n");
    }
    for conflict in &report.contradictions_or_conflicts {
        render_conflict(&mut out, conflict)?;
    }
    out.push_str("</section>\n");

    section_open(&mut out, "Article Analysis")?;
    for a in &filtered {
        render_card(&mut out, a)?;
    }
    out.push_str("</section>\n");

    section_open(&mut out, "Actionable Insights")?;
    if report.actionable_insights.is_empty() {
        out.push_str("<p class=\"info\">No actionable insights available.</p>\n");
    } else {
        out.push_str("<ul class=\"insights\">");
        for insight in &report.actionable_insights {
            write!(out, "<li><strong>{}</strong></li>", escape(insight))?;
        }
        out.push_str("</ul>\n");
    }
    out.push_str("</section>\n</main></body></html>\n");
    Ok(out)
}
