//! # Blog Pulse
//!
//! A batch pipeline that scrapes the front pages of a configured set of
//! marketing blogs, summarizes and categorizes their newest posts through an
//! OpenAI-compatible chat API, scores sentiment and readability, and tracks
//! keyword trends between runs.
//!
//! ## Usage
//!
//! ```sh
//! blog_pulse -c blogs.yaml -o ./output -s ./state
//! ```
//!
//! ## Architecture
//!
//! 1. **Load state**: summary cache and previous keyword snapshot
//! 2. **Scrape**: every source concurrently, bounded by `max_concurrency`
//! 3. **Enrich**: uncached posts go through the text-generation service
//! 4. **Trends**: keyword counts compared with the previous snapshot
//! 5. **Output**: result tree as JSON, cache and snapshot written back

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cache;
mod cli;
mod config;
mod enrichment;
mod error;
mod extract;
mod fetch;
mod models;
mod orchestrator;
mod outputs;
mod scoring;
mod scrape;
mod store;
mod trends;
mod utils;

use api::{ChatCompletionsClient, RetryAsk};
use cli::Cli;
use config::PipelineConfig;
use enrichment::EnrichmentClient;
use fetch::{HttpFetcher, build_http_client};
use orchestrator::{Orchestrator, run_pipeline};
use outputs::json;
use scrape::ScrapeSettings;
use store::SnapshotStore;
use utils::{ensure_writable_dir, time_of_day};

/// Fold CLI flags into the file (or built-in) configuration.
fn apply_overrides(config: &mut PipelineConfig, args: &Cli) {
    if let Some(limit) = args.post_limit {
        config.post_limit = limit;
    }
    if let Some(n) = args.max_concurrency {
        config.max_concurrency = n;
    }
    if let Some(base) = &args.api_base {
        config.enrichment.api_base = base.clone();
    }
    if let Some(model) = &args.model {
        config.enrichment.model = model.clone();
    }
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("blog_pulse starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.output_dir, ?args.state_dir, "Parsed CLI arguments");

    // ---- Configuration ----
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_yaml_file(path)?,
        None => {
            info!("No config file given; using built-in sources");
            PipelineConfig::default()
        }
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    for dir in [&args.output_dir, &args.state_dir] {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    // ---- Collaborators ----
    let http = build_http_client(&config.user_agent, config.max_concurrency)?;
    let chat = ChatCompletionsClient::new(
        http.clone(),
        &config.enrichment,
        args.openai_api_key.clone(),
    );
    if !chat.has_api_key() {
        warn!("No OPENAI_API_KEY set; every post will get the fallback summary");
    }
    let asker = RetryAsk::new(
        chat,
        config.enrichment.max_retries,
        std::time::Duration::from_millis(config.enrichment.base_delay_ms),
    );
    let enricher = EnrichmentClient::new(
        asker,
        config.taxonomy.clone(),
        config.enrichment.max_words,
    );
    let settings = ScrapeSettings {
        post_limit: config.post_limit,
        front_page_timeout: config.front_page_timeout(),
        post_timeout: config.post_timeout(),
    };
    let orchestrator = Orchestrator::new(
        HttpFetcher::new(http),
        enricher,
        settings,
        config.max_concurrency,
    );
    let store = SnapshotStore::in_dir(&args.state_dir);
    let sources = config.sources();

    // ---- Run ----
    let report = run_pipeline(
        &orchestrator,
        &sources,
        &store,
        config.max_cache_size,
        config.cache_ttl(),
    )
    .await?;

    for warning in &report.warnings {
        warn!(error = %warning, "Run state was not saved");
    }

    let (posts, failed) = report
        .tree
        .values()
        .flatten()
        .fold((0, 0), |(posts, failed), r| match r.posts() {
            Some(p) => (posts + p.len(), failed),
            None => (posts, failed + 1),
        });
    info!(sources = sources.len(), posts, failed_sources = failed, "Pipeline finished");

    // ---- Output ----
    let edition = time_of_day();
    let today = Local::now().date_naive();
    match json::write_results(&report.tree, &args.output_dir, today, &edition).await {
        Ok(path) => info!(path = %path.display(), %edition, "Results written"),
        Err(e) => {
            error!(error = %e, "Failed to write result JSON");
            return Err(e.into());
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_overrides() {
        let args = Cli::parse_from([
            "blog_pulse",
            "--post-limit",
            "3",
            "--model",
            "gpt-4o-mini",
            "--api-base",
            "http://localhost:8080/v1",
        ]);
        let mut config = PipelineConfig::default();
        let concurrency = config.max_concurrency;
        apply_overrides(&mut config, &args);

        assert_eq!(config.post_limit, 3);
        assert_eq!(config.enrichment.model, "gpt-4o-mini");
        assert_eq!(config.enrichment.api_base, "http://localhost:8080/v1");
        assert_eq!(config.max_concurrency, concurrency);
    }
}
