use anyhow::Result;
use chrono::TimeDelta;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::entry::{CacheEntry, cache_key};
use super::stats::AccessTracker;
use super::store::{CacheStore, StoreWriter};

/// Point-in-time counters for a [`TranslationCache`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: Option<f64>,
    pub evictions: u64,
    pub expirations: u64,
    pub estimated_bytes: usize,
}

/// Concurrent `(text, language) → translation` map with TTL expiry.
///
/// Reads and writes are per-key atomic; only iteration (eviction, snapshots)
/// walks the whole map. When backed by a [`CacheStore`] every mutation is
/// written behind on the store's own thread.
pub struct TranslationCache {
    entries: DashMap<String, CacheEntry>,
    tracker: Arc<AccessTracker>,
    clock: Arc<dyn Clock>,
    ttl_ms: AtomicI64,
    writer: Option<StoreWriter>,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl TranslationCache {
    /// Creates a memory-only cache.
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            tracker: Arc::new(AccessTracker::new()),
            clock,
            ttl_ms: AtomicI64::new(ttl.num_milliseconds()),
            writer: None,
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Creates a cache warm-loaded from `store`.
    ///
    /// A store that cannot be read leaves the cache empty. Only failing to
    /// start the writer thread is an error.
    pub fn with_store(
        ttl: TimeDelta,
        clock: Arc<dyn Clock>,
        mut store: Box<dyn CacheStore>,
    ) -> Result<Self> {
        let mut cache = Self::new(ttl, clock);

        match store.load_all() {
            Ok(entries) => {
                let now = cache.clock.now();
                let total = entries.len();
                for entry in entries {
                    if !entry.is_expired(now, ttl) {
                        cache.entries.insert(entry.key(), entry);
                    }
                }
                info!(
                    loaded = cache.entries.len(),
                    expired = total - cache.entries.len(),
                    "Loaded translation cache"
                );
            }
            Err(e) => warn!(error = %e, "Failed to load translation cache, starting empty"),
        }

        cache.writer = Some(StoreWriter::spawn(store)?);
        Ok(cache)
    }

    pub fn tracker(&self) -> &Arc<AccessTracker> {
        &self.tracker
    }

    pub fn ttl(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.ttl_ms.load(Ordering::Relaxed))
    }

    pub fn set_ttl(&self, ttl: TimeDelta) {
        self.ttl_ms.store(ttl.num_milliseconds(), Ordering::Relaxed);
    }

    pub const fn is_persistent(&self) -> bool {
        self.writer.is_some()
    }

    /// Looks up a translation, recording a hit or miss.
    ///
    /// An expired entry counts as a miss and is removed.
    pub fn get(&self, text: &str, target_language: &str) -> Option<String> {
        let key = cache_key(text, target_language);
        let now = self.clock.now();
        let ttl = self.ttl();

        let found = self
            .entries
            .get(&key)
            .map(|entry| (entry.is_expired(now, ttl), entry.translated_text.clone()));

        match found {
            Some((false, translated)) => {
                self.tracker.record_hit(&key, now);
                Some(translated)
            }
            Some((true, _)) => {
                if self
                    .entries
                    .remove_if(&key, |_, entry| entry.is_expired(now, ttl))
                    .is_some()
                {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                    self.persist_remove(&key);
                    debug!(key = %key, "Cache entry expired");
                }
                self.tracker.record_miss(&key, now);
                None
            }
            None => {
                self.tracker.record_miss(&key, now);
                None
            }
        }
    }

    /// Looks up a translation without touching statistics or removing anything.
    pub fn peek(&self, text: &str, target_language: &str) -> Option<String> {
        let key = cache_key(text, target_language);
        let now = self.clock.now();
        let ttl = self.ttl();
        self.entries
            .get(&key)
            .filter(|entry| !entry.is_expired(now, ttl))
            .map(|entry| entry.translated_text.clone())
    }

    /// Stores a translation, replacing any previous entry with a fresh timestamp.
    pub fn put(&self, text: &str, target_language: &str, translated_text: &str) {
        let entry = CacheEntry::new(
            text.trim(),
            translated_text,
            target_language,
            self.clock.now(),
        );
        self.insert_entry(entry);
    }

    /// Inserts an entry as-is, keeping its timestamp.
    pub fn insert_entry(&self, entry: CacheEntry) {
        let key = entry.key();
        if let Some(writer) = &self.writer {
            writer.upsert(key.clone(), entry.clone());
        }
        self.entries.insert(key, entry);
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes the entry stored under `key`.
    pub fn evict(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.tracker.forget(key);
            self.persist_remove(key);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.tracker.reset();
        if let Some(writer) = &self.writer {
            writer.clear();
        }
        info!("Translation cache cleared");
    }

    /// Removes every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now, ttl))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if self
                .entries
                .remove_if(&key, |_, entry| entry.is_expired(now, ttl))
                .is_some()
            {
                removed += 1;
                self.tracker.forget(&key);
                self.persist_remove(&key);
            }
        }
        if removed > 0 {
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "Purged expired cache entries");
        }
        removed
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn estimated_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.value().estimated_size()).sum()
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.size(),
            hits: self.tracker.hits(),
            misses: self.tracker.misses(),
            hit_rate: self.tracker.hit_rate(),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            estimated_bytes: self.estimated_bytes(),
        }
    }

    /// Waits for pending writes to reach the store.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    /// Saves a full snapshot and stops the store writer.
    pub async fn close(&self) {
        if let Some(writer) = &self.writer {
            let snapshot = self
                .entries
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect();
            writer.snapshot(snapshot);
            writer.close().await;
            info!(entries = self.size(), "Translation cache saved");
        }
    }

    fn persist_remove(&self, key: &str) {
        if let Some(writer) = &self.writer {
            writer.remove(key.to_string());
        }
    }
}
