//! Bias score distribution per source, drawn as an inline SVG box plot.

use crate::models::AnalyzedArticle;
use std::collections::BTreeMap;
use std::fmt::{self, Write};

/// Min, quartiles and max of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiveNumber {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Quantile of sorted data with linear interpolation between closest ranks.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl FiveNumber {
    /// `None` for an empty sample; NaN values are ignored.
    pub fn of(values: &[f64]) -> Option<FiveNumber> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        Some(FiveNumber {
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Bias scores of every article grouped by source; articles without a score are skipped.
pub fn bias_scores_by_source(articles: &[AnalyzedArticle]) -> BTreeMap<&str, Vec<f64>> {
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for a in articles {
        if let Some(score) = a.analysis.bias_score {
            groups.entry(a.article.source.as_str()).or_default().push(score);
        }
    }
    groups
}

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 260.0;
const PAD_LEFT: f64 = 40.0;
const PAD_BOTTOM: f64 = 40.0;
const PAD_TOP: f64 = 10.0;
const BOX_WIDTH: f64 = 36.0;

/// Vertical position of a score on the fixed 0-10 axis.
fn y(score: f64) -> f64 {
    let plot_h = HEIGHT - PAD_TOP - PAD_BOTTOM;
    PAD_TOP + plot_h * (1.0 - score.clamp(0.0, 10.0) / 10.0)
}

/// Render one box per source on a shared 0-10 axis.
pub fn box_plot_svg(groups: &BTreeMap<&str, Vec<f64>>) -> Result<String, fmt::Error> {
    let stats: Vec<(&str, FiveNumber)> = groups
        .iter()
        .filter_map(|(source, values)| FiveNumber::of(values).map(|s| (*source, s)))
        .collect();

    let mut svg = String::new();
    writeln!(
        svg,
        r#"<svg class="boxplot" viewBox="0 0 {WIDTH} {HEIGHT}" width="{WIDTH}" height="{HEIGHT}" role="img" aria-label="Bias score by source">"#
    )?;
    for tick in [0.0, 2.5, 5.0, 7.5, 10.0] {
        let ty = y(tick);
        writeln!(
            svg,
            r##"<line x1="{PAD_LEFT}" y1="{ty:.1}" x2="{WIDTH}" y2="{ty:.1}" stroke="#ddd"/><text x="{:.1}" y="{:.1}" font-size="10" text-anchor="end">{tick}</text>"##,
            PAD_LEFT - 6.0,
            ty + 3.0
        )?;
    }

    let slot = (WIDTH - PAD_LEFT) / stats.len().max(1) as f64;
    for (i, (source, s)) in stats.iter().enumerate() {
        let cx = PAD_LEFT + slot * (i as f64 + 0.5);
        let left = cx - BOX_WIDTH / 2.0;
        writeln!(
            svg,
            r##"<g class="box"><title>{source}: min {:.2}, Q1 {:.2}, median {:.2}, Q3 {:.2}, max {:.2}</title>"##,
            s.min,
            s.q1,
            s.median,
            s.q3,
            s.max,
            source = super::render::escape(source)
        )?;
        writeln!(
            svg,
            r##"<line x1="{cx:.1}" y1="{:.1}" x2="{cx:.1}" y2="{:.1}" stroke="#555"/>"##,
            y(s.max),
            y(s.min)
        )?;
        writeln!(
            svg,
            r##"<rect x="{left:.1}" y="{:.1}" width="{BOX_WIDTH}" height="{:.1}" fill="#9ecae1" stroke="#3182bd"/>"##,
            y(s.q3),
            (y(s.q1) - y(s.q3)).max(1.0)
        )?;
        writeln!(
            svg,
            r##"<line x1="{left:.1}" y1="{m:.1}" x2="{:.1}" y2="{m:.1}" stroke="#08519c" stroke-width="2"/>"##,
            left + BOX_WIDTH,
            m = y(s.median)
        )?;
        writeln!(
            svg,
            r#"<text x="{cx:.1}" y="{:.1}" font-size="11" text-anchor="middle">{}</text></g>"#,
            HEIGHT - PAD_BOTTOM + 16.0,
            super::render::escape(source)
        )?;
    }
    svg.push_str("</svg>");
    Ok(svg)
}
