//! Data models shared by the scraping pipeline.
//!
//! - [`Source`]: one configured blog front page
//! - [`PostCandidate`] / [`ArticleDetails`]: what the extractor pulls out of HTML
//! - [`Enrichment`]: what the text-generation service tells us about a post
//! - [`EnrichedPost`]: a finished post as it appears in the output
//! - [`SourceResult`] / [`ResultTree`]: the per-run result payload
//! - [`KeywordSnapshot`]: keyword counts persisted between runs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel text when a post page has no paragraph content.
pub const NO_CONTENT: &str = "No content found.";

/// Sentinel publish date when a page carries no machine-readable date.
pub const UNKNOWN_DATE: &str = "unknown";

/// A configured blog. Identity is the front page URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
    pub category: String,
}

/// A post link found on a front page, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCandidate {
    pub title: String,
    /// Absolute URL, already resolved against the front page.
    pub url: String,
    pub image_url: Option<String>,
    pub publish_date: Option<String>,
}

/// Content pulled from an individual post page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDetails {
    /// Paragraph text, or [`NO_CONTENT`].
    pub text: String,
    pub image_url: Option<String>,
    /// `<time datetime>` value, or [`UNKNOWN_DATE`].
    pub publish_date: String,
}

impl ArticleDetails {
    pub fn has_content(&self) -> bool {
        self.text != NO_CONTENT
    }
}

/// Summary and classification returned by the text-generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub summary: String,
    pub category: String,
    pub subcategory: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// Reading-grade band of a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readability {
    #[serde(rename = "Easy to Read")]
    EasyToRead,
    #[serde(rename = "Middle School")]
    MiddleSchool,
    #[serde(rename = "High School")]
    HighSchool,
    #[serde(rename = "College Level")]
    CollegeLevel,
    #[serde(rename = "Post-Graduate")]
    PostGraduate,
    #[serde(rename = "N/A")]
    NotAvailable,
}

/// A finished post. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPost {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub image_url: String,
    pub publish_date: String,
    pub category: String,
    pub subcategory: String,
    pub sentiment: Sentiment,
    pub readability: Readability,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    New,
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTrend {
    pub keyword: String,
    pub trend: Trend,
}

/// Outcome of scraping one source: posts, or an error. Never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceOutcome {
    Scraped {
        posts: Vec<EnrichedPost>,
        keywords: Vec<KeywordTrend>,
    },
    Failed {
        error: String,
    },
}

/// One entry of the result tree, serialized as
/// `{name, url, category, posts, keywords}` or `{name, url, category, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    #[serde(flatten)]
    pub source: Source,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

impl SourceResult {
    pub fn scraped(source: Source, posts: Vec<EnrichedPost>) -> Self {
        Self {
            source,
            outcome: SourceOutcome::Scraped {
                posts,
                keywords: Vec::new(),
            },
        }
    }

    pub fn failed(source: Source, error: impl Into<String>) -> Self {
        Self {
            source,
            outcome: SourceOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn posts(&self) -> Option<&[EnrichedPost]> {
        match &self.outcome {
            SourceOutcome::Scraped { posts, .. } => Some(posts),
            SourceOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            SourceOutcome::Failed { error } => Some(error),
            SourceOutcome::Scraped { .. } => None,
        }
    }
}

/// Category name to the results of every source declared under it.
pub type ResultTree = BTreeMap<String, Vec<SourceResult>>;

/// Source name to keyword to count, as persisted in the history file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordSnapshot(pub BTreeMap<String, BTreeMap<String, u32>>);

impl KeywordSnapshot {
    pub fn counts_for(&self, source_name: &str) -> Option<&BTreeMap<String, u32>> {
        self.0.get(source_name)
    }

    /// Replace a source's entry wholesale.
    pub fn replace(&mut self, source_name: &str, counts: BTreeMap<String, u32>) {
        self.0.insert(source_name.to_string(), counts);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Source {
        Source {
            name: "Moz Blog".to_string(),
            url: "https://moz.com/blog".to_string(),
            category: "Digital Marketing".to_string(),
        }
    }

    fn post() -> EnrichedPost {
        EnrichedPost {
            title: "Seven Ways To Boost Organic Growth".to_string(),
            url: "https://moz.com/blog/organic-growth".to_string(),
            summary: "A short summary.".to_string(),
            image_url: "https://moz.com/hero.png".to_string(),
            publish_date: "2025-05-06".to_string(),
            category: "Marketing".to_string(),
            subcategory: "SEO".to_string(),
            sentiment: Sentiment::Positive,
            readability: Readability::MiddleSchool,
            keywords: vec!["seo".to_string()],
        }
    }

    #[test]
    fn test_failed_result_has_error_and_no_posts() {
        let result = SourceResult::failed(source(), "no post links found");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["name"], "Moz Blog");
        assert_eq!(json["url"], "https://moz.com/blog");
        assert_eq!(json["category"], "Digital Marketing");
        assert_eq!(json["error"], "no post links found");
        assert!(json.get("posts").is_none());
        assert!(result.posts().is_none());
    }

    #[test]
    fn test_scraped_result_has_posts_and_no_error() {
        let result = SourceResult::scraped(source(), vec![post()]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["posts"][0]["title"], "Seven Ways To Boost Organic Growth");
        assert_eq!(json["posts"][0]["sentiment"], "Positive");
        assert_eq!(json["posts"][0]["readability"], "Middle School");
        assert!(json.get("error").is_none());
        assert!(result.error().is_none());
    }

    #[test]
    fn test_source_result_deserializes_both_shapes() {
        let failed: SourceResult = serde_json::from_str(
            r#"{"name":"a","url":"https://a.example/","category":"c","error":"boom"}"#,
        )
        .unwrap();
        assert_eq!(failed.error(), Some("boom"));

        let scraped: SourceResult = serde_json::from_str(
            r#"{"name":"a","url":"https://a.example/","category":"c","posts":[],"keywords":[]}"#,
        )
        .unwrap();
        assert_eq!(scraped.posts().map(|p| p.len()), Some(0));
    }

    #[test]
    fn test_trend_serializes_lowercase() {
        let trend = KeywordTrend {
            keyword: "growth".to_string(),
            trend: Trend::Up,
        };
        let json = serde_json::to_string(&trend).unwrap();
        assert_eq!(json, r#"{"keyword":"growth","trend":"up"}"#);
    }

    #[test]
    fn test_snapshot_format() {
        let snapshot: KeywordSnapshot =
            serde_json::from_str(r#"{"Moz Blog":{"growth":2,"funnel":1}}"#).unwrap();
        assert_eq!(snapshot.counts_for("Moz Blog").unwrap()["growth"], 2);
        assert!(snapshot.counts_for("Neil Patel Blog").is_none());
    }

    #[test]
    fn test_article_details_sentinel() {
        let details = ArticleDetails {
            text: NO_CONTENT.to_string(),
            image_url: None,
            publish_date: UNKNOWN_DATE.to_string(),
        };
        assert!(!details.has_content());
    }
}
