//! Pipeline configuration.
//!
//! Loaded once at startup from an optional YAML file, validated, and then
//! passed by reference to whatever needs it. Every field has a default, so a
//! partial file (or none at all) works.
//!
//! ```yaml
//! post_limit: 3
//! max_concurrency: 4
//! cache_ttl_days: 30
//! categories:
//!   - name: Digital Marketing
//!     sources:
//!       - name: Moz Blog
//!         url: https://moz.com/blog
//! ```

use crate::error::ConfigError;
use crate::models::Source;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyCategory {
    pub name: String,
    pub subcategories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPair {
    pub category: String,
    pub subcategory: String,
}

/// Allowed main categories and their subcategories, plus the pair used
/// whenever a classification can't be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Taxonomy {
    pub categories: Vec<TaxonomyCategory>,
    pub fallback: CategoryPair,
}

impl Default for Taxonomy {
    fn default() -> Self {
        let category = |name: &str, subs: &[&str]| TaxonomyCategory {
            name: name.to_string(),
            subcategories: subs.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            categories: vec![
                category(
                    "Business",
                    &["Marketing", "Strategy", "Sales", "Finance", "Leadership"],
                ),
                category(
                    "Marketing",
                    &[
                        "Content Marketing",
                        "SEO",
                        "Social Media",
                        "Email Marketing",
                        "Demand Generation",
                        "Analytics",
                    ],
                ),
                category(
                    "AI",
                    &["Generative AI", "Machine Learning", "Automation", "Tools"],
                ),
            ],
            fallback: CategoryPair {
                category: "Business".to_string(),
                subcategory: "Marketing".to_string(),
            },
        }
    }
}

impl Taxonomy {
    /// Canonical spelling of a category/subcategory pair, matched
    /// case-insensitively. `None` if the pair is not allowed.
    pub fn lookup(&self, category: &str, subcategory: &str) -> Option<CategoryPair> {
        let category = category.trim();
        let subcategory = subcategory.trim();
        let main = self
            .categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(category))?;
        let sub = main
            .subcategories
            .iter()
            .find(|s| s.eq_ignore_ascii_case(subcategory))?;
        Some(CategoryPair {
            category: main.name.clone(),
            subcategory: sub.clone(),
        })
    }

    /// Prompt-friendly listing, one main category per line.
    pub fn describe(&self) -> String {
        self.categories
            .iter()
            .map(|c| format!("- {}: {}", c.name, c.subcategories.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub api_base: String,
    pub model: String,
    /// Article text is cut to this many words before it is sent.
    pub max_words: usize,
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_words: 1500,
            max_retries: 5,
            base_delay_ms: 1000,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub categories: Vec<CategoryConfig>,
    pub post_limit: usize,
    pub front_page_timeout_secs: u64,
    pub post_timeout_secs: u64,
    pub user_agent: String,
    pub max_concurrency: usize,
    pub max_cache_size: usize,
    /// Entries older than this are re-enriched. `None` caches forever.
    pub cache_ttl_days: Option<u32>,
    pub taxonomy: Taxonomy,
    pub enrichment: EnrichmentConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let category = |name: &str, sources: &[(&str, &str)]| CategoryConfig {
            name: name.to_string(),
            sources: sources
                .iter()
                .map(|(name, url)| SourceConfig {
                    name: name.to_string(),
                    url: url.to_string(),
                })
                .collect(),
        };
        Self {
            categories: vec![
                category(
                    "B2B Marketing",
                    &[
                        ("Animalz Blog", "https://www.animalz.co/blog/"),
                        ("SaaStr", "https://www.saastr.com/"),
                        ("B2B Marketing Blog", "https://www.b2bmarketing.net/en-gb/resources/blog"),
                        ("Superpath Blog", "https://superpath.co/blog"),
                    ],
                ),
                category(
                    "Digital Marketing",
                    &[
                        ("HubSpot Marketing Blog", "https://blog.hubspot.com/marketing"),
                        ("Neil Patel Blog", "https://neilpatel.com/blog/"),
                        ("Moz Blog", "https://moz.com/blog"),
                        ("MarketingProfs Blog", "https://www.marketingprofs.com/articles"),
                        ("Search Engine Land", "https://searchengineland.com/"),
                    ],
                ),
                category(
                    "Specialized Marketing",
                    &[
                        ("Litmus Blog", "https://www.litmus.com/blog/"),
                        ("Hootsuite Blog", "https://blog.hootsuite.com/"),
                        ("Content Marketing Institute", "https://contentmarketinginstitute.com/blog/"),
                        ("Convince & Convert Blog", "https://www.convinceandconvert.com/blog/"),
                        ("Unbounce Blog", "https://unbounce.com/blog/"),
                    ],
                ),
            ],
            post_limit: 2,
            front_page_timeout_secs: 15,
            post_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrency: 8,
            max_cache_size: 1000,
            cache_ttl_days: None,
            taxonomy: Taxonomy::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a YAML config file.
    #[instrument(level = "info")]
    pub fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        info!(
            categories = config.categories.len(),
            sources = config.sources().len(),
            "Loaded pipeline configuration"
        );
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Flat list of sources, in configuration order.
    pub fn sources(&self) -> Vec<Source> {
        self.categories
            .iter()
            .flat_map(|c| {
                c.sources.iter().map(|s| Source {
                    name: s.name.clone(),
                    url: s.url.clone(),
                    category: c.name.clone(),
                })
            })
            .collect()
    }

    pub fn front_page_timeout(&self) -> Duration {
        Duration::from_secs(self.front_page_timeout_secs)
    }

    pub fn post_timeout(&self) -> Duration {
        Duration::from_secs(self.post_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Option<chrono::Duration> {
        self.cache_ttl_days.map(|d| chrono::Duration::days(i64::from(d)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sources = self.sources();
        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        // Keyword history is keyed by name, so names must be unique too.
        let mut seen = HashSet::new();
        let mut names = HashSet::new();
        for source in &sources {
            Url::parse(&source.url).map_err(|e| ConfigError::InvalidSourceUrl {
                name: source.name.clone(),
                url: source.url.clone(),
                source: e,
            })?;
            if !seen.insert(source.url.as_str()) {
                return Err(ConfigError::DuplicateSource(source.url.clone()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSourceName(source.name.clone()));
            }
        }

        let fallback = &self.taxonomy.fallback;
        if self
            .taxonomy
            .lookup(&fallback.category, &fallback.subcategory)
            .is_none()
        {
            return Err(ConfigError::FallbackNotInTaxonomy {
                category: fallback.category.clone(),
                subcategory: fallback.subcategory.clone(),
            });
        }

        if self.post_limit == 0 {
            return Err(ConfigError::ZeroLimit("post_limit"));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroLimit("max_concurrency"));
        }
        if self.enrichment.max_words == 0 {
            return Err(ConfigError::ZeroLimit("enrichment.max_words"));
        }
        Ok(())
    }
}
