//! Persistence of the summary cache and the keyword snapshot.
//!
//! Both are single JSON files read once at the start of a run and written
//! once at the end. Reads are permissive: a missing or unreadable file
//! gives empty state. Writes go to a sibling temp file that is renamed into
//! place, so a crash never leaves a half-written file behind.

use crate::cache::{CachedEnrichment, SummaryCache};
use crate::error::PersistenceError;
use crate::models::KeywordSnapshot;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

pub const CACHE_FILE: &str = "summary_cache.json";
pub const HISTORY_FILE: &str = "history.json";

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| PersistenceError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, json).await.map_err(write_err)?;
    fs::rename(&tmp, path).await.map_err(write_err)?;
    Ok(())
}

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| PersistenceError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    cache_path: PathBuf,
    history_path: PathBuf,
}

impl SnapshotStore {
    pub fn new(cache_path: impl Into<PathBuf>, history_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            history_path: history_path.into(),
        }
    }

    /// Store using the standard file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(CACHE_FILE), dir.join(HISTORY_FILE))
    }

    /// Load the cache, drop expired entries, then prune to `max_size`.
    ///
    /// Both steps happen before the run inserts anything, so nothing
    /// written during the run is ever evicted.
    #[instrument(level = "info", skip_all, fields(path = %self.cache_path.display()))]
    pub async fn load_cache(&self, max_size: usize, ttl: Option<Duration>) -> SummaryCache {
        let raw: serde_json::Map<String, serde_json::Value> = match read_json(&self.cache_path).await {
            Ok(Some(map)) => map,
            Ok(None) => {
                info!("No summary cache found; starting empty");
                return SummaryCache::new();
            }
            Err(e) => {
                warn!(error = %e, "Summary cache unreadable; starting empty");
                return SummaryCache::new();
            }
        };

        let total = raw.len();
        let entries = raw.into_iter().filter_map(|(url, value)| {
            match serde_json::from_value::<CachedEnrichment>(value) {
                Ok(entry) => Some((url, entry)),
                Err(e) => {
                    warn!(%url, error = %e, "Skipping malformed cache entry");
                    None
                }
            }
        });
        let cache = SummaryCache::from_entries(entries);

        if let Some(ttl) = ttl {
            cache.expire_older_than(ttl, Utc::now());
        }
        cache.prune(max_size);
        info!(total, loaded = cache.len(), "Loaded summary cache");
        cache
    }

    #[instrument(level = "info", skip_all, fields(path = %self.history_path.display()))]
    pub async fn load_snapshot(&self) -> KeywordSnapshot {
        match read_json::<KeywordSnapshot>(&self.history_path).await {
            Ok(Some(snapshot)) => {
                info!(sources = snapshot.len(), "Loaded keyword snapshot");
                snapshot
            }
            Ok(None) => {
                info!("No keyword snapshot found; every keyword starts as new");
                KeywordSnapshot::default()
            }
            Err(e) => {
                warn!(error = %e, "Keyword snapshot unreadable; starting empty");
                KeywordSnapshot::default()
            }
        }
    }

    #[instrument(level = "info", skip_all, fields(path = %self.cache_path.display()))]
    pub async fn save_cache(&self, cache: &SummaryCache) -> Result<(), PersistenceError> {
        write_json_atomic(&self.cache_path, cache).await?;
        info!(entries = cache.len(), "Saved summary cache");
        Ok(())
    }

    #[instrument(level = "info", skip_all, fields(path = %self.history_path.display()))]
    pub async fn save_snapshot(&self, snapshot: &KeywordSnapshot) -> Result<(), PersistenceError> {
        write_json_atomic(&self.history_path, snapshot).await?;
        info!(sources = snapshot.len(), "Saved keyword snapshot");
        Ok(())
    }
}
