//! Sidebar selection and the filtered article view.

use crate::models::{AnalyzedArticle, Sentiment};
use std::collections::BTreeSet;

/// Which sources and sentiments the reader selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub sources: BTreeSet<String>,
    pub sentiments: BTreeSet<Sentiment>,
}

impl Selection {
    /// Everything selected: every known source and all three sentiments.
    pub fn all(known_sources: &BTreeSet<String>) -> Self {
        Selection {
            sources: known_sources.clone(),
            sentiments: Sentiment::ALL.into_iter().collect(),
        }
    }

    /// Build a selection from a raw query string.
    ///
    /// `source` and `sentiment` may repeat. A parameter that is absent means
    /// "all" unless the form marker `applied=1` is present, in which case an
    /// absent parameter is an explicitly empty selection. Unknown sentiment
    /// values are ignored.
    pub fn from_query(query: Option<&str>, known_sources: &BTreeSet<String>) -> Self {
        let mut applied = false;
        let mut sources: Option<BTreeSet<String>> = None;
        let mut sentiments: Option<BTreeSet<Sentiment>> = None;

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match &*key {
                "applied" => applied = value == "1",
                "source" => {
                    sources.get_or_insert_with(BTreeSet::new).insert(value.into_owned());
                }
                "sentiment" => {
                    let set = sentiments.get_or_insert_with(BTreeSet::new);
                    if let Some(s) = Sentiment::parse(&value) {
                        set.insert(s);
                    }
                }
                _ => {}
            }
        }

        let all = Selection::all(known_sources);
        let fallback_sources = if applied { BTreeSet::new() } else { all.sources };
        let fallback_sentiments = if applied { BTreeSet::new() } else { all.sentiments };
        Selection {
            sources: sources.unwrap_or(fallback_sources),
            sentiments: sentiments.unwrap_or(fallback_sentiments),
        }
    }

    pub fn matches(&self, article: &AnalyzedArticle) -> bool {
        self.sources.contains(&article.article.source)
            && article
                .analysis
                .sentiment
                .is_some_and(|s| self.sentiments.contains(&s))
    }

    /// Articles kept by this selection, in their original order.
    pub fn apply<'a>(&self, articles: &'a [AnalyzedArticle]) -> Vec<&'a AnalyzedArticle> {
        articles.iter().filter(|a| self.matches(a)).collect()
    }
}

/// Distinct source names, sorted.
pub fn known_sources(articles: &[AnalyzedArticle]) -> BTreeSet<String> {
    articles.iter().map(|a| a.article.source.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Analysis, RawArticle};

    fn article(source: &str, headline: &str, sentiment: Option<Sentiment>) -> AnalyzedArticle {
        AnalyzedArticle {
            article: RawArticle {
                source: source.into(),
                url: String::new(),
                headline: headline.into(),
                content: String::new(),
                publication_date: None,
                scraped_at: String::new(),
            },
            analysis: Analysis {
                sentiment,
                ..Analysis::default()
            },
        }
    }

    fn corpus() -> Vec<AnalyzedArticle> {
        vec![
            article("A", "1", Some(Sentiment::Positive)),
            article("B", "2", Some(Sentiment::Negative)),
            article("A", "3", Some(Sentiment::Negative)),
            article("C", "4", None),
        ]
    }

    fn headlines(view: &[&AnalyzedArticle]) -> Vec<String> {
        view.iter().map(|a| a.article.headline.clone()).collect()
    }

    #[test]
    fn test_default_selection_keeps_every_scored_article() {
        let articles = corpus();
        let selection = Selection::from_query(None, &known_sources(&articles));
        assert_eq!(selection.sources.len(), 3);
        assert_eq!(headlines(&selection.apply(&articles)), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_source_and_sentiment_filter() {
        let articles = corpus();
        let selection = Selection::from_query(Some("source=A&sentiment=negative"), &known_sources(&articles));
        assert_eq!(headlines(&selection.apply(&articles)), vec!["3"]);
    }

    #[test]
    fn test_repeated_parameters_accumulate() {
        let articles = corpus();
        let selection = Selection::from_query(
            Some("source=A&source=B&sentiment=Negative&sentiment=bogus"),
            &known_sources(&articles),
        );
        assert_eq!(selection.sentiments, BTreeSet::from([Sentiment::Negative]));
        assert_eq!(headlines(&selection.apply(&articles)), vec!["2", "3"]);
    }

    #[test]
    fn test_applied_marker_makes_absent_parameter_empty() {
        let articles = corpus();
        let known = known_sources(&articles);

        let only_sources = Selection::from_query(Some("applied=1&source=A"), &known);
        assert!(only_sources.sentiments.is_empty());
        assert!(only_sources.apply(&articles).is_empty());

        let nothing = Selection::from_query(Some("applied=1"), &known);
        assert!(nothing.sources.is_empty());

        let untouched = Selection::from_query(Some("source=A"), &known);
        assert_eq!(untouched.sentiments.len(), 3);
    }

    #[test]
    fn test_filter_is_a_subset_in_original_order() {
        let articles = corpus();
        let selection = Selection::from_query(Some("sentiment=negative&sentiment=positive"), &known_sources(&articles));
        let view = selection.apply(&articles);
        assert!(view.len() <= articles.len());
        assert!(view.iter().all(|a| selection.matches(a)));
        assert_eq!(headlines(&view), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_url_encoded_source_names() {
        let articles = vec![article("Al Jazeera", "x", Some(Sentiment::Neutral))];
        let selection = Selection::from_query(Some("source=Al+Jazeera"), &known_sources(&articles));
        assert_eq!(selection.apply(&articles).len(), 1);
    }
}
