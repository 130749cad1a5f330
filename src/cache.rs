//! Summary cache keyed by post URL.
//!
//! The cache is shared by every concurrently running source scrape. A
//! lookup and the later insert are not atomic together: two scrapes that
//! hit the same uncached URL at the same time will both call the
//! text-generation service. The second insert is a no-op, so the worst case
//! is duplicate work, never a wrong entry.
//!
//! Insertion order is kept so the oldest entries can be evicted first and
//! so the persisted JSON lists entries in the order they were written.

use crate::models::Enrichment;
use chrono::{DateTime, Duration, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Everything we need to rebuild a post without fetching it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEnrichment {
    #[serde(flatten)]
    pub enrichment: Enrichment,
    pub image_url: Option<String>,
    pub publish_date: String,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    order: Vec<String>,
    entries: HashMap<String, CachedEnrichment>,
}

#[derive(Debug, Default)]
pub struct SummaryCache {
    state: Mutex<CacheState>,
}

impl SummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from entries listed oldest first. Later duplicates of a
    /// key are ignored.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, CachedEnrichment)>,
    {
        let cache = Self::new();
        for (key, value) in entries {
            cache.put(key, value);
        }
        cache
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Nothing panics while holding the lock; recover the data anyway.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<CachedEnrichment> {
        self.lock().entries.get(key).cloned()
    }

    /// Insert unless the key is already present. Returns whether it inserted.
    pub fn put(&self, key: impl Into<String>, value: CachedEnrichment) -> bool {
        let key = key.into();
        let mut state = self.lock();
        if state.entries.contains_key(&key) {
            return false;
        }
        state.order.push(key.clone());
        state.entries.insert(key, value);
        true
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys, oldest first.
    #[cfg(test)]
    pub fn keys(&self) -> Vec<String> {
        self.lock().order.clone()
    }

    /// Keep only the `max_size` most recently inserted entries.
    /// Returns how many were evicted.
    pub fn prune(&self, max_size: usize) -> usize {
        let mut state = self.lock();
        let len = state.order.len();
        if len <= max_size {
            return 0;
        }
        let evicted: Vec<String> = state.order.drain(..len - max_size).collect();
        for key in &evicted {
            state.entries.remove(key);
        }
        info!(evicted = evicted.len(), remaining = state.order.len(), "Pruned summary cache");
        evicted.len()
    }

    /// Drop entries cached before `now - ttl`. Returns how many were dropped.
    pub fn expire_older_than(&self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - ttl;
        let mut state = self.lock();
        let CacheState { order, entries } = &mut *state;
        let before = order.len();
        order.retain(|key| {
            let stale = entries.get(key).is_none_or(|e| e.cached_at < cutoff);
            if stale {
                entries.remove(key);
            }
            !stale
        });
        let expired = before - order.len();
        if expired > 0 {
            info!(expired, remaining = order.len(), "Expired stale cache entries");
        }
        expired
    }
}

/// Serializes as a JSON object in insertion order.
impl Serialize for SummaryCache {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let state = self.lock();
        let mut map = serializer.serialize_map(Some(state.order.len()))?;
        for key in &state.order {
            if let Some(value) = state.entries.get(key) {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn entry(summary: &str) -> CachedEnrichment {
        CachedEnrichment {
            enrichment: Enrichment {
                summary: summary.to_string(),
                category: "Marketing".to_string(),
                subcategory: "SEO".to_string(),
                keywords: vec!["seo".to_string()],
            },
            image_url: None,
            publish_date: "unknown".to_string(),
            cached_at: Utc::now(),
        }
    }

    #[test]
    fn test_get_after_put() {
        let cache = SummaryCache::new();
        assert!(cache.get("https://a.example/1").is_none());
        let value = entry("one");
        assert!(cache.put("https://a.example/1", value.clone()));
        assert_eq!(cache.get("https://a.example/1"), Some(value));
    }

    #[test]
    fn test_put_is_first_write_wins() {
        let cache = SummaryCache::new();
        assert!(cache.put("k", entry("first")));
        assert!(!cache.put("k", entry("second")));
        assert_eq!(cache.get("k").unwrap().enrichment.summary, "first");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_prune_keeps_most_recent_in_order() {
        let cache = SummaryCache::from_entries(
            (1..=5).map(|i| (format!("k{i}"), entry(&format!("s{i}")))),
        );
        assert_eq!(cache.prune(3), 2);
        assert_eq!(cache.keys(), vec!["k3", "k4", "k5"]);
        assert!(cache.get("k1").is_none());
        assert!(cache.get("k2").is_none());
        assert_eq!(cache.get("k5").unwrap().enrichment.summary, "s5");
    }

    #[test]
    fn test_prune_under_limit_is_noop() {
        let cache = SummaryCache::from_entries([("a".to_string(), entry("a"))]);
        assert_eq!(cache.prune(10), 0);
        assert_eq!(cache.prune(1), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expire_older_than() {
        let now = Utc::now();
        let mut old = entry("old");
        old.cached_at = now - Duration::days(40);
        let fresh = entry("fresh");
        let cache = SummaryCache::from_entries([
            ("old".to_string(), old),
            ("fresh".to_string(), fresh),
        ]);
        assert_eq!(cache.expire_older_than(Duration::days(30), now), 1);
        assert_eq!(cache.keys(), vec!["fresh"]);
    }

    #[test]
    fn test_serializes_in_insertion_order() {
        let cache = SummaryCache::from_entries([
            ("https://z.example/".to_string(), entry("z")),
            ("https://a.example/".to_string(), entry("a")),
        ]);
        let json = serde_json::to_string(&cache).unwrap();
        let z = json.find("https://z.example/").unwrap();
        let a = json.find("https://a.example/").unwrap();
        assert!(z < a);
        assert!(json.contains(r#""summary":"z""#));
        assert!(json.contains(r#""category":"Marketing""#));
    }
}
