//! Command-line interface definitions for Blog Pulse.
//!
//! Every flag overrides the matching field of the YAML config. Secrets and
//! endpoints can also come from the environment.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for a Blog Pulse run.
///
/// # Examples
///
/// ```sh
/// # Built-in source list, results under ./output
/// blog_pulse
///
/// # Own config, state kept next to it
/// blog_pulse -c blogs.yaml -o /srv/pulse/json -s /srv/pulse/state
///
/// # Local OpenAI-compatible server
/// blog_pulse --api-base http://localhost:8080/v1 --model llama-3.1-8b
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML pipeline config
    #[arg(short, long)]
    pub config: Option<String>,

    /// Directory for result JSON files
    #[arg(short, long, default_value = "./output")]
    pub output_dir: PathBuf,

    /// Directory holding summary_cache.json and history.json
    #[arg(short, long, default_value = ".")]
    pub state_dir: PathBuf,

    /// Posts taken from each front page
    #[arg(long)]
    pub post_limit: Option<usize>,

    /// Sources scraped at the same time
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// API key for the text-generation service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "OPENAI_API_BASE")]
    pub api_base: Option<String>,

    /// Chat model used for summaries
    #[arg(long)]
    pub model: Option<String>,
}
