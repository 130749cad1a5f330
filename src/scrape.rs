//! Scraping of a single source.
//!
//! # Flow
//!
//! 1. Fetch the front page and extract up to `post_limit` candidates
//! 2. For each candidate, in order: reuse the cached enrichment, or fetch the
//!    post page once, enrich it and cache the result
//! 3. Score sentiment from the title and readability from the summary
//!
//! Whatever goes wrong inside one source, including a panic, ends up as that
//! source's error entry and never reaches sibling sources.

use crate::api::AskAsync;
use crate::cache::{CachedEnrichment, SummaryCache};
use crate::enrichment::EnrichmentClient;
use crate::error::SourceError;
use crate::extract::{extract_article, extract_posts};
use crate::fetch::PageFetcher;
use crate::models::{EnrichedPost, Enrichment, PostCandidate, Source, SourceResult, UNKNOWN_DATE};
use crate::scoring::{readability, sentiment};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Summary used when a post page could not be downloaded or had no text.
pub const UNAVAILABLE_SUMMARY: &str = "Could not load article content.";

/// Per-run knobs for a scrape.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub post_limit: usize,
    pub front_page_timeout: Duration,
    pub post_timeout: Duration,
}

/// Placeholder hero image named after the source.
pub fn placeholder_image(source_name: &str) -> String {
    format!(
        "https://placehold.co/600x400/1a2b3c/ffffff?text={}",
        urlencoding::encode(source_name)
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

pub struct SourceScraper<'a, F, A> {
    fetcher: &'a F,
    enricher: &'a EnrichmentClient<A>,
    cache: &'a SummaryCache,
    settings: &'a ScrapeSettings,
}

impl<'a, F, A> SourceScraper<'a, F, A>
where
    F: PageFetcher,
    A: AskAsync<Response = String>,
{
    /// Borrow everything one source scrape needs.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Downloads front pages and post pages
    /// * `enricher` - Summarizes and categorizes uncached posts
    /// * `cache` - Summary cache shared with every other running scrape
    /// * `settings` - Post limit and per-request timeouts
    ///
    /// # Example
    ///
    /// ```ignore
    /// let scraper = SourceScraper::new(&fetcher, &enricher, &cache, &settings);
    /// let result = scraper.scrape(&source).await;
    /// ```
    pub fn new(
        fetcher: &'a F,
        enricher: &'a EnrichmentClient<A>,
        cache: &'a SummaryCache,
        settings: &'a ScrapeSettings,
    ) -> Self {
        Self {
            fetcher,
            enricher,
            cache,
            settings,
        }
    }

    /// Scrape one source. Never fails: errors become an error entry.
    #[instrument(level = "info", skip_all, fields(source = %source.name))]
    pub async fn scrape(&self, source: &Source) -> SourceResult {
        let outcome = AssertUnwindSafe(self.try_scrape(source)).catch_unwind().await;
        let error = match outcome {
            Ok(Ok(posts)) => {
                info!(posts = posts.len(), "Scraped source");
                return SourceResult::scraped(source.clone(), posts);
            }
            Ok(Err(e)) => e,
            Err(payload) => SourceError::Panicked(panic_message(payload.as_ref())),
        };
        warn!(url = %source.url, error = %error, "Source failed");
        SourceResult::failed(source.clone(), error.to_string())
    }

    async fn try_scrape(&self, source: &Source) -> Result<Vec<EnrichedPost>, SourceError> {
        let base_url = Url::parse(&source.url)?;
        let html = self
            .fetcher
            .fetch(&source.url, self.settings.front_page_timeout)
            .await?;

        let candidates = extract_posts(&html, &base_url, self.settings.post_limit);
        if candidates.is_empty() {
            return Err(SourceError::NoPostLinks);
        }

        let mut posts = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let resolved = self.resolve(&candidate).await;
            posts.push(self.build_post(source, candidate, resolved));
        }
        Ok(posts)
    }

    /// Cache first; on a miss the post page is fetched exactly once.
    /// Only successful enrichments are cached.
    async fn resolve(&self, candidate: &PostCandidate) -> CachedEnrichment {
        if let Some(hit) = self.cache.get(&candidate.url) {
            debug!(url = %candidate.url, "Cache hit");
            return hit;
        }
        debug!(url = %candidate.url, "Cache miss");

        let details = match self
            .fetcher
            .fetch(&candidate.url, self.settings.post_timeout)
            .await
        {
            Ok(html) => extract_article(&html),
            Err(e) => {
                warn!(url = %candidate.url, error = %e, "Post fetch failed");
                return self.unavailable(candidate);
            }
        };

        if !details.has_content() {
            warn!(url = %candidate.url, "Post page has no paragraph text");
            let mut entry = self.unavailable(candidate);
            entry.image_url = details.image_url;
            entry.publish_date = details.publish_date;
            return entry;
        }

        match self.enricher.summarize_and_categorize(&details.text).await {
            Ok(enrichment) => {
                let entry = CachedEnrichment {
                    enrichment,
                    image_url: details.image_url,
                    publish_date: details.publish_date,
                    cached_at: Utc::now(),
                };
                if !self.cache.put(candidate.url.clone(), entry.clone()) {
                    debug!(url = %candidate.url, "Another source cached this post first");
                }
                entry
            }
            Err(e) => {
                warn!(url = %candidate.url, error = %e, "Enrichment failed; using fallback");
                CachedEnrichment {
                    enrichment: self.enricher.fallback(&e),
                    image_url: details.image_url,
                    publish_date: details.publish_date,
                    cached_at: Utc::now(),
                }
            }
        }
    }

    fn unavailable(&self, candidate: &PostCandidate) -> CachedEnrichment {
        let fallback = &self.enricher.taxonomy().fallback;
        CachedEnrichment {
            enrichment: Enrichment {
                summary: UNAVAILABLE_SUMMARY.to_string(),
                category: fallback.category.clone(),
                subcategory: fallback.subcategory.clone(),
                keywords: Vec::new(),
            },
            image_url: None,
            publish_date: candidate
                .publish_date
                .clone()
                .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
            cached_at: Utc::now(),
        }
    }

    fn build_post(
        &self,
        source: &Source,
        candidate: PostCandidate,
        resolved: CachedEnrichment,
    ) -> EnrichedPost {
        let publish_date = if resolved.publish_date == UNKNOWN_DATE {
            candidate
                .publish_date
                .unwrap_or_else(|| UNKNOWN_DATE.to_string())
        } else {
            resolved.publish_date
        };
        let image_url = resolved
            .image_url
            .or(candidate.image_url)
            .unwrap_or_else(|| placeholder_image(&source.name));

        EnrichedPost {
            sentiment: sentiment(&candidate.title),
            readability: readability(&resolved.enrichment.summary),
            title: candidate.title,
            url: candidate.url,
            summary: resolved.enrichment.summary,
            image_url,
            publish_date,
            category: resolved.enrichment.category,
            subcategory: resolved.enrichment.subcategory,
            keywords: resolved.enrichment.keywords,
        }
    }
}
