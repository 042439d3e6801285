//! Shared cache of crawled payloads
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
    /// How long a failed crawl URL is remembered.
    pub failed_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            ttl: Duration::from_secs(60 * 60),
            failed_ttl: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Arc<Vec<u8>>,
    stored_at: Instant,
}

/// URL (or info-hash) keyed payload cache, shared by every performer.
///
/// Entries are evicted least-recently-used beyond `capacity` and expire
/// after `ttl`. Failed downloads are remembered separately.
pub struct CrawlCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    failed: Mutex<LruCache<String, Instant>>,
    config: CacheConfig,
}

impl Default for CrawlCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn non_zero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

impl CrawlCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(non_zero(config.capacity))),
            failed: Mutex::new(LruCache::new(non_zero(config.capacity))),
            config,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.config.ttl => {
                return Some(Arc::clone(&entry.data))
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn put(&self, key: impl Into<String>, data: Arc<Vec<u8>>) {
        self.entries.lock().put(
            key.into(),
            CacheEntry {
                data,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.lock().pop(key);
    }

    pub fn mark_failed(&self, url: impl Into<String>) {
        self.failed.lock().put(url.into(), Instant::now());
    }

    /// Whether `url` failed to download within the failed-URL window.
    pub fn recently_failed(&self, url: &str) -> bool {
        let mut failed = self.failed.lock();
        match failed.get(url) {
            Some(at) if at.elapsed() < self.config.failed_ttl => true,
            Some(_) => {
                failed.pop(url);
                false
            }
            None => false,
        }
    }

    /// Clear all caches
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.failed.lock().clear();
    }

    /// Bytes held, counting a payload cached under several keys once.
    pub fn size_bytes(&self) -> usize {
        let entries = self.entries.lock();
        let mut seen = HashSet::new();
        entries
            .iter()
            .filter(|(_, entry)| seen.insert(Arc::as_ptr(&entry.data)))
            .map(|(_, entry)| entry.data.len())
            .sum()
    }

    /// Get cache statistics
    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.lock().len(),
            failed_urls: self.failed.lock().len(),
            bytes: self.size_bytes(),
            capacity: self.config.capacity,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub failed_urls: usize,
    pub bytes: usize,
    pub capacity: usize,
}
