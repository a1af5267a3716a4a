//! In-memory markup cache keyed by content hash.

use std::sync::{Arc, RwLock};

use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;

use crate::domain::ContentHash;
use crate::infra::telemetry::{METRIC_CACHE_EVICT, METRIC_CACHE_HIT, METRIC_CACHE_MISS};
use crate::util::lock::{rw_read, rw_write};

use super::RenderCache;
use super::config::CacheConfig;

const SOURCE: &str = "cache::store";

/// Markup produced by one completed render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub content_hash: ContentHash,
    pub markup: Arc<str>,
    pub created_at: OffsetDateTime,
}

impl CacheEntry {
    pub fn new(content_hash: ContentHash, markup: impl Into<Arc<str>>) -> Self {
        Self {
            content_hash,
            markup: markup.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn bytes(&self) -> usize {
        self.markup.len()
    }
}

struct Entries {
    lru: LruCache<ContentHash, CacheEntry>,
    bytes: usize,
}

impl Entries {
    fn remove(&mut self, hash: &ContentHash) -> Option<CacheEntry> {
        let entry = self.lru.pop(hash)?;
        self.bytes -= entry.bytes();
        Some(entry)
    }

    fn pop_lru(&mut self) -> Option<CacheEntry> {
        let (_, entry) = self.lru.pop_lru()?;
        self.bytes -= entry.bytes();
        Some(entry)
    }
}

/// LRU cache bounded by entry count, total markup bytes and entry age.
///
/// Entries are immutable once written; a second `put` for the same hash
/// replaces the entry and refreshes its age.
pub struct MarkupCache {
    config: CacheConfig,
    entries: RwLock<Entries>,
}

impl MarkupCache {
    pub fn new(config: CacheConfig) -> Self {
        let lru = LruCache::new(config.max_entries_non_zero());
        Self {
            config,
            entries: RwLock::new(Entries { lru, bytes: 0 }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store a prepared entry, evicting as needed. Returns the number evicted.
    pub fn insert(&self, entry: CacheEntry) -> usize {
        if !self.config.enabled {
            return 0;
        }
        if entry.bytes() > self.config.max_bytes {
            debug!(
                target: SOURCE,
                hash = entry.content_hash.short(),
                bytes = entry.bytes(),
                "Markup larger than cache ceiling, not stored"
            );
            return 0;
        }

        let mut entries = rw_write(&self.entries, SOURCE, "insert");
        entries.remove(&entry.content_hash);
        entries.bytes += entry.bytes();
        let mut evicted = 0;
        // The key was removed above, so `push` only returns the evicted LRU entry.
        if let Some((_, old)) = entries.lru.push(entry.content_hash.clone(), entry) {
            entries.bytes -= old.bytes();
            evicted += 1;
        }
        while entries.bytes > self.config.max_bytes && entries.pop_lru().is_some() {
            evicted += 1;
        }
        drop(entries);

        if evicted > 0 {
            counter!(METRIC_CACHE_EVICT).increment(evicted as u64);
        }
        evicted
    }

    /// Entry for `hash` without touching its recency or checking its age.
    pub fn peek(&self, hash: &ContentHash) -> Option<CacheEntry> {
        rw_read(&self.entries, SOURCE, "peek").lru.peek(hash).cloned()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summed markup size of all entries, in bytes.
    pub fn total_bytes(&self) -> usize {
        rw_read(&self.entries, SOURCE, "total_bytes").bytes
    }

    fn is_expired(&self, entry: &CacheEntry, now: OffsetDateTime) -> bool {
        self.config
            .max_age()
            .is_some_and(|max_age| now - entry.created_at >= max_age)
    }
}

impl RenderCache for MarkupCache {
    fn get(&self, hash: &ContentHash) -> Option<Arc<str>> {
        if !self.config.enabled {
            return None;
        }

        let now = OffsetDateTime::now_utc();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.lru.get(hash) {
            Some(entry) if !self.is_expired(entry, now) => {
                let markup = Arc::clone(&entry.markup);
                drop(entries);
                counter!(METRIC_CACHE_HIT).increment(1);
                return Some(markup);
            }
            Some(_) => entries.remove(hash).is_some(),
            None => false,
        };
        drop(entries);

        if expired {
            counter!(METRIC_CACHE_EVICT).increment(1);
        }
        counter!(METRIC_CACHE_MISS).increment(1);
        None
    }

    fn put(&self, hash: ContentHash, markup: String) {
        self.insert(CacheEntry::new(hash, markup));
    }

    fn clear(&self) {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        entries.lru.clear();
        entries.bytes = 0;
    }

    /// Drop the least recently used half of the entries.
    fn shed(&self) {
        let mut entries = rw_write(&self.entries, SOURCE, "shed");
        let target = entries.lru.len().div_ceil(2);
        let mut dropped = 0;
        while dropped < target && entries.pop_lru().is_some() {
            dropped += 1;
        }
        let remaining = entries.lru.len();
        drop(entries);

        if dropped > 0 {
            counter!(METRIC_CACHE_EVICT).increment(dropped as u64);
            debug!(target: SOURCE, dropped, remaining, "Shed markup cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::time::Duration;

    use super::*;

    fn cache(max_entries: usize, max_bytes: usize) -> MarkupCache {
        MarkupCache::new(CacheConfig {
            max_entries,
            max_bytes,
            max_age_secs: None,
            ..CacheConfig::default()
        })
    }

    fn hash(text: &str) -> ContentHash {
        ContentHash::of(text)
    }

    #[test]
    fn put_then_get_returns_markup() {
        let cache = cache(4, 1024);
        assert!(cache.get(&hash("a")).is_none());
        cache.put(hash("a"), "<p>a</p>".to_string());
        assert_eq!(cache.get(&hash("a")).as_deref(), Some("<p>a</p>"));
        assert_eq!(cache.total_bytes(), 8);
    }

    #[test]
    fn evicts_least_recently_used_by_count() {
        let cache = cache(2, 1024);
        cache.put(hash("a"), "a".into());
        cache.put(hash("b"), "b".into());
        assert!(cache.get(&hash("a")).is_some());
        assert_eq!(cache.insert(CacheEntry::new(hash("c"), "c")), 1);

        assert!(cache.peek(&hash("b")).is_none());
        assert!(cache.peek(&hash("a")).is_some());
        assert!(cache.peek(&hash("c")).is_some());
        assert_eq!(cache.total_bytes(), 2);
    }

    #[test]
    fn evicts_until_under_byte_ceiling() {
        let cache = cache(10, 10);
        cache.put(hash("a"), "aaaa".into());
        cache.put(hash("b"), "bbbb".into());
        let evicted = cache.insert(CacheEntry::new(hash("c"), "cccc"));
        assert_eq!(evicted, 1);
        assert_eq!(cache.len(), 2);
        assert!(cache.total_bytes() <= 10);
        assert!(cache.peek(&hash("a")).is_none());
    }

    #[test]
    fn oversized_markup_is_not_stored() {
        let cache = cache(10, 4);
        cache.put(hash("a"), "too large".into());
        assert!(cache.is_empty());
    }

    #[test]
    fn replacing_an_entry_keeps_byte_count_exact() {
        let cache = cache(4, 1024);
        cache.put(hash("a"), "first".into());
        cache.put(hash("a"), "second!".into());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 7);
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = MarkupCache::new(CacheConfig {
            max_age_secs: Some(60),
            ..CacheConfig::default()
        });
        let mut entry = CacheEntry::new(hash("old"), "stale");
        entry.created_at -= Duration::from_secs(61);
        cache.insert(entry);
        cache.put(hash("new"), "fresh".into());

        assert!(cache.get(&hash("old")).is_none());
        assert!(cache.peek(&hash("old")).is_none());
        assert_eq!(cache.get(&hash("new")).as_deref(), Some("fresh"));
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = MarkupCache::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        cache.put(hash("a"), "a".into());
        assert!(cache.is_empty());
        assert!(cache.get(&hash("a")).is_none());
    }

    #[test]
    fn shed_drops_least_recent_half() {
        let cache = cache(10, 1024);
        for key in ["a", "b", "c", "d"] {
            cache.put(hash(key), key.into());
        }
        assert!(cache.get(&hash("a")).is_some());
        cache.shed();

        assert_eq!(cache.len(), 2);
        assert!(cache.peek(&hash("a")).is_some());
        assert!(cache.peek(&hash("d")).is_some());
        assert!(cache.peek(&hash("b")).is_none());
    }

    #[test]
    fn clear_empties_cache() {
        let cache = cache(4, 1024);
        cache.put(hash("a"), "a".into());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn recovers_from_poisoned_lock() {
        let cache = cache(4, 1024);
        cache.put(hash("a"), "a".into());
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache.entries.write().expect("lock");
            panic!("poison the cache lock");
        }));
        assert_eq!(cache.get(&hash("a")).as_deref(), Some("a"));
    }
}
