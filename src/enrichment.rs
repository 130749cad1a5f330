//! Summarization and categorization of post text.
//!
//! [`EnrichmentClient`] builds the prompt, sends it through any
//! [`AskAsync`] backend, parses the JSON reply and checks the category pair
//! against the [`Taxonomy`]. An out-of-taxonomy pair is replaced by the
//! fallback pair; transport and parse failures are returned to the caller,
//! which turns them into [`EnrichmentClient::fallback`] so one bad call never
//! fails a scrape.

use crate::api::AskAsync;
use crate::config::Taxonomy;
use crate::error::EnrichmentError;
use crate::models::Enrichment;
use crate::utils::{looks_truncated, truncate_for_log};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
struct EnrichmentReply {
    summary: String,
    category: String,
    subcategory: String,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Cut `text` to at most `max_words` whitespace-separated words.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse the JSON object out of a model reply, tolerating text around it.
fn parse_reply(raw: &str) -> Result<EnrichmentReply, serde_json::Error> {
    let start = raw.find('{').unwrap_or(0);
    let end = raw.rfind('}').map(|i| i + 1).filter(|&e| e > start).unwrap_or(raw.len());
    serde_json::from_str(&raw[start..end])
}

pub struct EnrichmentClient<A> {
    asker: A,
    taxonomy: Taxonomy,
    max_words: usize,
}

impl<A> EnrichmentClient<A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(asker: A, taxonomy: Taxonomy, max_words: usize) -> Self {
        Self {
            asker,
            taxonomy,
            max_words,
        }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    #[cfg(test)]
    pub(crate) fn asker(&self) -> &A {
        &self.asker
    }

    fn build_prompt(&self, text: &str) -> String {
        format!(
            "Summarize the following article in one concise paragraph of 25 to 30 words, \
             classify it into exactly one category and subcategory from the list below, \
             and pick 3 or 4 keywords.\n\n\
             Allowed categories:\n{}\n\n\
             Answer with a JSON object: \
             {{\"summary\": string, \"category\": string, \"subcategory\": string, \"keywords\": [string]}}\n\n\
             Article:\n{}",
            self.taxonomy.describe(),
            truncate_words(text, self.max_words)
        )
    }

    /// Ask the model about `text`.
    ///
    /// A reply that was cut off mid-JSON is asked again once.
    #[instrument(level = "info", skip_all, fields(chars = text.len()))]
    pub async fn summarize_and_categorize(&self, text: &str) -> Result<Enrichment, EnrichmentError> {
        let prompt = self.build_prompt(text);
        let raw = self.asker.ask(&prompt).await?;

        let reply = match parse_reply(&raw) {
            Err(e) if looks_truncated(&e) => {
                warn!(error = %e, "EOF while parsing; re-asking once");
                let retry = self.asker.ask(&prompt).await?;
                parse_reply(&retry)
            }
            other => other,
        }
        .map_err(|e| {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&raw, 300),
                "Model returned non-conforming JSON"
            );
            EnrichmentError::Malformed(e)
        })?;

        if reply.summary.trim().is_empty() {
            return Err(EnrichmentError::EmptyResponse);
        }

        let pair = match self.taxonomy.lookup(&reply.category, &reply.subcategory) {
            Some(pair) => pair,
            None => {
                warn!(
                    category = %reply.category,
                    subcategory = %reply.subcategory,
                    "Classification outside taxonomy; using fallback"
                );
                self.taxonomy.fallback.clone()
            }
        };
        debug!(category = %pair.category, subcategory = %pair.subcategory, "Enriched post");

        Ok(Enrichment {
            summary: reply.summary.trim().to_string(),
            category: pair.category,
            subcategory: pair.subcategory,
            keywords: reply
                .keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        })
    }

    /// The deterministic stand-in used when enrichment failed.
    pub fn fallback(&self, reason: &EnrichmentError) -> Enrichment {
        Enrichment {
            summary: format!("AI summary failed: {reason}"),
            category: self.taxonomy.fallback.category.clone(),
            subcategory: self.taxonomy.fallback.subcategory.clone(),
            keywords: Vec::new(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with canned answers in order, repeating the last one.
    pub(crate) struct Canned {
        pub(crate) replies: Vec<Result<String, fn() -> EnrichmentError>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) prompts: Mutex<Vec<String>>,
    }

    impl Canned {
        pub(crate) fn ok(reply: &str) -> Self {
            Self::sequence(vec![Ok(reply.to_string())])
        }

        pub(crate) fn sequence(replies: Vec<Result<String, fn() -> EnrichmentError>>) -> Self {
            Self {
                replies,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AskAsync for Canned {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, EnrichmentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(text.to_string());
            let idx = n.min(self.replies.len() - 1);
            match &self.replies[idx] {
                Ok(reply) => Ok(reply.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    pub(crate) fn timeout() -> EnrichmentError {
        EnrichmentError::Timeout
    }

    fn client(asker: Canned) -> EnrichmentClient<Canned> {
        EnrichmentClient::new(asker, Taxonomy::default(), 1500)
    }

    #[tokio::test]
    async fn test_valid_reply_is_normalized() {
        let c = client(Canned::ok(
            r#"Sure! {"summary":" A tight summary. ","category":"marketing","subcategory":"seo","keywords":["SEO"," Links "]}"#,
        ));
        let e = c.summarize_and_categorize("some article").await.unwrap();
        assert_eq!(e.summary, "A tight summary.");
        assert_eq!(e.category, "Marketing");
        assert_eq!(e.subcategory, "SEO");
        assert_eq!(e.keywords, vec!["seo", "links"]);
    }

    #[tokio::test]
    async fn test_out_of_taxonomy_falls_back() {
        let c = client(Canned::ok(
            r#"{"summary":"Fine summary.","category":"Zzz","subcategory":"Whatever"}"#,
        ));
        let e = c.summarize_and_categorize("text").await.unwrap();
        assert_eq!(e.category, "Business");
        assert_eq!(e.subcategory, "Marketing");
        assert_eq!(e.summary, "Fine summary.");
        assert!(e.keywords.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_reply_is_asked_again_once() {
        let c = client(Canned::sequence(vec![
            Ok(r#"{"summary":"cut"#.to_string()),
            Ok(r#"{"summary":"Whole.","category":"AI","subcategory":"Tools"}"#.to_string()),
        ]));
        let e = c.summarize_and_categorize("text").await.unwrap();
        assert_eq!(e.category, "AI");
        assert_eq!(c.asker.calls(), 2);
    }

    #[tokio::test]
    async fn test_garbage_reply_is_malformed() {
        let c = client(Canned::ok("I cannot help with that."));
        let err = c.summarize_and_categorize("text").await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Malformed(_)));
        assert_eq!(c.asker.calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_propagates_and_fallback_is_deterministic() {
        let c = client(Canned::sequence(vec![Err(timeout as fn() -> EnrichmentError)]));
        let err = c.summarize_and_categorize("text").await.unwrap_err();
        let a = c.fallback(&err);
        let b = c.fallback(&EnrichmentError::Timeout);
        assert_eq!(a, b);
        assert_eq!(a.category, "Business");
        assert_eq!(a.subcategory, "Marketing");
        assert!(a.summary.starts_with("AI summary failed"));
    }

    #[tokio::test]
    async fn test_prompt_is_bounded_and_lists_taxonomy() {
        let c = EnrichmentClient::new(
            Canned::ok(r#"{"summary":"s","category":"AI","subcategory":"Tools"}"#),
            Taxonomy::default(),
            10,
        );
        let long_text = "lorem ".repeat(5000);
        c.summarize_and_categorize(&long_text).await.unwrap();
        let prompt = c.asker.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("- Marketing: Content Marketing, SEO"));
        assert_eq!(prompt.matches("lorem").count(), 10);
    }

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("a  b\nc d", 3), "a b c");
        assert_eq!(truncate_words("", 3), "");
    }
}
