//! Runs every configured source and assembles the result tree.
//!
//! Sources are scraped concurrently, at most `max_concurrency` at a time,
//! all sharing one HTTP client and one [`SummaryCache`]. The merge happens
//! only after every scrape has returned, so a slow source delays the run
//! but a failing one never shortens it.

use crate::api::AskAsync;
use crate::cache::SummaryCache;
use crate::enrichment::EnrichmentClient;
use crate::error::{ConfigError, PersistenceError, RunError};
use crate::fetch::PageFetcher;
use crate::models::{KeywordSnapshot, ResultTree, Source, SourceOutcome, SourceResult};
use crate::scrape::{ScrapeSettings, SourceScraper};
use crate::store::SnapshotStore;
use crate::trends::compute_trends;
use chrono::Duration;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use tracing::{info, instrument, warn};

/// Result tree plus the keyword snapshot to persist for the next run.
#[derive(Debug)]
pub struct RunOutput {
    pub tree: ResultTree,
    pub snapshot: KeywordSnapshot,
}

/// What a full pipeline run hands back to its caller.
#[derive(Debug)]
pub struct RunReport {
    pub tree: ResultTree,
    /// Persistence failures at the end of the run. The tree is still valid.
    pub warnings: Vec<PersistenceError>,
}

pub struct Orchestrator<F, A> {
    fetcher: F,
    enricher: EnrichmentClient<A>,
    settings: ScrapeSettings,
    max_concurrency: usize,
}

impl<F, A> Orchestrator<F, A>
where
    F: PageFetcher,
    A: AskAsync<Response = String>,
{
    /// # Arguments
    ///
    /// * `fetcher` - Page fetcher shared by all scrapes
    /// * `enricher` - Text-generation client shared by all scrapes
    /// * `settings` - Per-source post limit and timeouts
    /// * `max_concurrency` - Sources scraped at once; 0 is treated as 1
    pub fn new(
        fetcher: F,
        enricher: EnrichmentClient<A>,
        settings: ScrapeSettings,
        max_concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            enricher,
            settings,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Scrape all `sources` and build the result tree and next snapshot.
    ///
    /// Only an empty source list is an error; per-source failures become
    /// error entries in the tree.
    #[instrument(level = "info", skip_all, fields(sources = sources.len()))]
    pub async fn run_all(
        &self,
        sources: &[Source],
        cache: &SummaryCache,
        previous: &KeywordSnapshot,
    ) -> Result<RunOutput, RunError> {
        if sources.is_empty() {
            return Err(ConfigError::NoSources.into());
        }
        info!(max_concurrency = self.max_concurrency, "Starting scrape fan-out");

        let results: Vec<SourceResult> = stream::iter(sources)
            .map(|source| async move {
                SourceScraper::new(&self.fetcher, &self.enricher, cache, &self.settings)
                    .scrape(source)
                    .await
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut snapshot = carried_forward(previous, sources, &results);
        let results: Vec<SourceResult> = results
            .into_iter()
            .map(|result| with_trends(result, previous, &mut snapshot))
            .collect();

        let failed = results.iter().filter(|r| r.error().is_some()).count();
        info!(
            total = results.len(),
            succeeded = results.len() - failed,
            failed,
            "All sources finished"
        );

        Ok(RunOutput {
            tree: merge(results),
            snapshot,
        })
    }
}

/// Previous entries of configured sources that failed this run. Their
/// history is kept so the next successful run still has something to
/// compare against. Sources no longer configured are dropped.
fn carried_forward(
    previous: &KeywordSnapshot,
    sources: &[Source],
    results: &[SourceResult],
) -> KeywordSnapshot {
    let mut snapshot = KeywordSnapshot::default();
    for result in results.iter().filter(|r| r.error().is_some()) {
        let name = &result.source.name;
        if let Some(counts) = previous.counts_for(name)
            && sources.iter().any(|s| &s.name == name)
        {
            snapshot.replace(name, counts.clone());
        }
    }
    snapshot
}

fn with_trends(
    mut result: SourceResult,
    previous: &KeywordSnapshot,
    snapshot: &mut KeywordSnapshot,
) -> SourceResult {
    if let SourceOutcome::Scraped { posts, keywords } = &mut result.outcome {
        let (trends, counts) = compute_trends(&result.source.name, posts, previous);
        *keywords = trends;
        snapshot.replace(&result.source.name, counts);
    }
    result
}

/// Group results by category, sorted by source name within each.
fn merge(results: Vec<SourceResult>) -> ResultTree {
    results
        .into_iter()
        .sorted_by(|a, b| {
            a.source
                .name
                .cmp(&b.source.name)
                .then_with(|| a.source.url.cmp(&b.source.url))
        })
        .into_group_map_by(|r| r.source.category.clone())
        .into_iter()
        .collect()
}

/// Load state, run every source, persist state.
///
/// Expired and excess cache entries are dropped at load, before any new
/// entry is written. Failures to save are returned as warnings alongside
/// the tree rather than discarding it.
#[instrument(level = "info", skip_all)]
pub async fn run_pipeline<F, A>(
    orchestrator: &Orchestrator<F, A>,
    sources: &[Source],
    store: &SnapshotStore,
    max_cache_size: usize,
    cache_ttl: Option<Duration>,
) -> Result<RunReport, RunError>
where
    F: PageFetcher,
    A: AskAsync<Response = String>,
{
    if sources.is_empty() {
        return Err(ConfigError::NoSources.into());
    }

    let cache = store.load_cache(max_cache_size, cache_ttl).await;
    let previous = store.load_snapshot().await;
    if cache.is_empty() {
        info!("Summary cache is empty; every post will be enriched");
    }
    if previous.is_empty() {
        info!("No keyword history; every keyword will be new");
    }
    let cached_before = cache.len();

    let RunOutput { tree, snapshot } = orchestrator.run_all(sources, &cache, &previous).await?;
    info!(new_entries = cache.len() - cached_before, "Run complete; saving state");

    let mut warnings = Vec::new();
    if let Err(e) = store.save_cache(&cache).await {
        warn!(error = %e, "Failed to save summary cache");
        warnings.push(e);
    }
    if let Err(e) = store.save_snapshot(&snapshot).await {
        warn!(error = %e, "Failed to save keyword snapshot");
        warnings.push(e);
    }

    Ok(RunReport { tree, warnings })
}
