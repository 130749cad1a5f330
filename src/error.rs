//! Error taxonomy for the pipeline.
//!
//! Only [`ConfigError`], [`RunError`] and [`PersistenceError`] ever reach the
//! caller of a run. Fetch, enrichment and source errors are recovered where
//! they happen and end up as data in the result tree.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A page could not be downloaded.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// The text-generation service did not give us a usable answer.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("no API key configured for the text-generation service")]
    MissingApiKey,

    #[error("text-generation request timed out")]
    Timeout,

    #[error("text-generation request failed: {0}")]
    Transport(String),

    #[error("text-generation service answered HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("text-generation service returned an empty reply")]
    EmptyResponse,

    #[error("malformed reply: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl EnrichmentError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            EnrichmentError::Timeout | EnrichmentError::Transport(_) => true,
            EnrichmentError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for EnrichmentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EnrichmentError::Timeout
        } else {
            EnrichmentError::Transport(e.to_string())
        }
    }
}

/// A whole source produced nothing usable.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("front page fetch failed: {0}")]
    FrontPage(#[from] FetchError),

    #[error("invalid source url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("no post links found")]
    NoPostLinks,

    #[error("scraper panicked: {0}")]
    Panicked(String),
}

/// Reading or writing one of the state files failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not serialize {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no sources configured")]
    NoSources,

    #[error("source {name} has an invalid url {url}: {source}")]
    InvalidSourceUrl {
        name: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("source url {0} is configured more than once")]
    DuplicateSource(String),

    #[error("source name {0} is used more than once")]
    DuplicateSourceName(String),

    #[error("fallback {category} / {subcategory} is not part of the taxonomy")]
    FallbackNotInTaxonomy {
        category: String,
        subcategory: String,
    },

    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

/// Run-level failure reported to whoever started the run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let rate_limited = EnrichmentError::HttpStatus {
            status: 429,
            body: String::new(),
        };
        let server = EnrichmentError::HttpStatus {
            status: 503,
            body: String::new(),
        };
        let bad_request = EnrichmentError::HttpStatus {
            status: 400,
            body: String::new(),
        };
        assert!(rate_limited.is_retryable());
        assert!(server.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!EnrichmentError::MissingApiKey.is_retryable());
        assert!(EnrichmentError::Timeout.is_retryable());
    }

    #[test]
    fn test_persistence_error_names_the_file() {
        let err = PersistenceError::Write {
            path: PathBuf::from("/state/history.json"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("could not write /state/history.json: "));
    }

    #[test]
    fn test_source_error_messages() {
        assert_eq!(SourceError::NoPostLinks.to_string(), "no post links found");
        let fetch = FetchError::Status {
            url: "https://example.com/".to_string(),
            status: 404,
        };
        assert_eq!(
            SourceError::from(fetch).to_string(),
            "front page fetch failed: https://example.com/ answered HTTP 404"
        );
    }
}
