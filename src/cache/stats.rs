//! Per-key access statistics shared by the cache and its optimizer.
//!
//! The data is advisory: losing it only makes eviction choices worse.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessStats {
    pub access_count: u64,
    pub hit_count: u64,
    pub last_access_at: DateTime<Utc>,
}

impl AccessStats {
    pub fn hit_rate(&self) -> f64 {
        if self.access_count == 0 {
            0.0
        } else {
            self.hit_count as f64 / self.access_count as f64
        }
    }

    /// `(accesses per hour) × hit rate × exp(-hours idle / 24)`, lower evicts first.
    pub fn eviction_score(&self, now: DateTime<Utc>) -> f64 {
        let idle_hours = now
            .signed_duration_since(self.last_access_at)
            .num_milliseconds()
            .max(0) as f64
            / 3_600_000.0;
        let frequency = self.access_count as f64 / idle_hours.max(1.0);
        frequency * self.hit_rate() * (-idle_hours / 24.0).exp()
    }
}

#[derive(Debug, Default)]
pub struct AccessTracker {
    stats: DashMap<String, AccessStats>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, key: &str, now: DateTime<Utc>) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.record(key, now, true);
    }

    pub fn record_miss(&self, key: &str, now: DateTime<Utc>) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.record(key, now, false);
    }

    fn record(&self, key: &str, now: DateTime<Utc>, hit: bool) {
        let mut entry = self.stats.entry(key.to_string()).or_insert(AccessStats {
            access_count: 0,
            hit_count: 0,
            last_access_at: now,
        });
        entry.access_count += 1;
        if hit {
            entry.hit_count += 1;
        }
        entry.last_access_at = now;
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate since the last [`reset`](Self::reset), `None` before any lookup.
    pub fn hit_rate(&self) -> Option<f64> {
        let hits = self.hits();
        let total = hits + self.misses();
        (total > 0).then(|| hits as f64 / total as f64)
    }

    pub fn get(&self, key: &str) -> Option<AccessStats> {
        self.stats.get(key).map(|s| *s)
    }

    pub fn forget(&self, key: &str) {
        self.stats.remove(key);
    }

    pub fn tracked(&self) -> usize {
        self.stats.len()
    }

    /// Drops statistics for keys idle longer than `idle`.
    pub fn purge_idle(&self, now: DateTime<Utc>, idle: TimeDelta) -> usize {
        let before = self.stats.len();
        self.stats
            .retain(|_, s| now.signed_duration_since(s.last_access_at) <= idle);
        before - self.stats.len()
    }

    pub fn reset(&self) {
        self.stats.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
