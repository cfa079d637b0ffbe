//! Periodic resize and eviction policy for the translation cache.

use chrono::TimeDelta;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info};

use super::entry::ENTRY_OVERHEAD_BYTES;
use super::memory::TranslationCache;

const GROW_BELOW_HIT_RATE: f64 = 0.70;
const GROW_BELOW_PRESSURE: f64 = 0.80;
const SHRINK_ABOVE_PRESSURE: f64 = 0.90;

/// Reports memory pressure as a fraction of the allowed budget.
pub trait PressureGauge: Send + Sync {
    fn pressure(&self, cache: &TranslationCache) -> f64;
}

/// Estimates pressure from the cache's own footprint against a byte budget.
#[derive(Debug, Clone, Copy)]
pub struct BudgetGauge {
    budget_bytes: usize,
}

impl BudgetGauge {
    pub const fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }
}

impl PressureGauge for BudgetGauge {
    fn pressure(&self, cache: &TranslationCache) -> f64 {
        if self.budget_bytes == 0 {
            return 1.0;
        }
        cache.estimated_bytes() as f64 / self.budget_bytes as f64
    }
}

/// A gauge pinned to one value.
#[derive(Debug, Clone, Copy)]
pub struct FixedGauge(pub f64);

impl PressureGauge for FixedGauge {
    fn pressure(&self, _cache: &TranslationCache) -> f64 {
        self.0
    }
}

/// Hard limits the target capacity is kept within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityBounds {
    pub min: usize,
    pub max: usize,
}

impl CapacityBounds {
    pub const fn clamp(&self, capacity: usize) -> usize {
        if capacity < self.min {
            self.min
        } else if capacity > self.max {
            self.max
        } else {
            capacity
        }
    }
}

/// Initial capacity derived from a memory budget: 2% of it at ~200 bytes an entry.
pub fn adaptive_capacity(budget_bytes: usize, bounds: CapacityBounds) -> usize {
    bounds.clamp(budget_bytes / 50 / ENTRY_OVERHEAD_BYTES)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resize {
    Grow { from: usize, to: usize },
    Shrink { from: usize, to: usize },
    Keep,
}

/// Outcome of one [`CacheOptimizer::run_cycle`].
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub hit_rate: Option<f64>,
    pub pressure: f64,
    pub resize: Resize,
    pub evicted: usize,
    pub stats_purged: usize,
    pub target_capacity: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizerStats {
    pub target_capacity: usize,
    pub cycles: u64,
    pub evicted: u64,
    pub last_pressure: f64,
}

/// Keeps the cache within a target capacity that follows hit rate and memory pressure.
pub struct CacheOptimizer {
    cache: Arc<TranslationCache>,
    gauge: Box<dyn PressureGauge>,
    target: AtomicUsize,
    bounds: std::sync::RwLock<CapacityBounds>,
    stats_idle: std::sync::RwLock<TimeDelta>,
    cycles: AtomicU64,
    evicted: AtomicU64,
    last_pressure_bits: AtomicU64,
}

impl CacheOptimizer {
    pub fn new(
        cache: Arc<TranslationCache>,
        gauge: Box<dyn PressureGauge>,
        initial_target: usize,
        bounds: CapacityBounds,
    ) -> Self {
        Self {
            cache,
            gauge,
            target: AtomicUsize::new(initial_target),
            bounds: std::sync::RwLock::new(bounds),
            stats_idle: std::sync::RwLock::new(TimeDelta::days(7)),
            cycles: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            last_pressure_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn target_capacity(&self) -> usize {
        self.target.load(Ordering::Relaxed)
    }

    /// Overrides the target, for an explicitly configured size.
    pub fn set_target_capacity(&self, target: usize) {
        self.target.store(target, Ordering::Relaxed);
    }

    pub fn set_bounds(&self, bounds: CapacityBounds) {
        if let Ok(mut current) = self.bounds.write() {
            *current = bounds;
        }
    }

    pub fn set_stats_idle(&self, idle: TimeDelta) {
        if let Ok(mut current) = self.stats_idle.write() {
            *current = idle;
        }
    }

    fn bounds(&self) -> CapacityBounds {
        self.bounds.read().map_or_else(|p| *p.into_inner(), |b| *b)
    }

    fn stats_idle(&self) -> TimeDelta {
        self.stats_idle.read().map_or_else(|p| *p.into_inner(), |d| *d)
    }

    /// Runs one resize-and-evict pass.
    pub fn run_cycle(&self) -> CycleReport {
        let now = self.cache.now();
        let tracker = Arc::clone(self.cache.tracker());
        let hit_rate = tracker.hit_rate();
        let pressure = self.gauge.pressure(&self.cache);
        self.last_pressure_bits
            .store(pressure.to_bits(), Ordering::Relaxed);

        let resize = self.resize(hit_rate, pressure);
        let target = self.target_capacity();
        let evicted = self.evict_to(target, now);
        let stats_purged = tracker.purge_idle(now, self.stats_idle());

        self.cycles.fetch_add(1, Ordering::Relaxed);
        let report = CycleReport {
            hit_rate,
            pressure,
            resize,
            evicted,
            stats_purged,
            target_capacity: target,
        };

        if evicted > 0 || report.resize != Resize::Keep {
            info!(
                hit_rate = ?report.hit_rate,
                pressure = report.pressure,
                target = report.target_capacity,
                evicted = report.evicted,
                "Cache optimized"
            );
        } else {
            debug!(size = self.cache.size(), target, "Cache within bounds");
        }
        report
    }

    fn resize(&self, hit_rate: Option<f64>, pressure: f64) -> Resize {
        let bounds = self.bounds();
        let from = self.target_capacity();

        // Grow by 20%, shrink by 15%.
        let to = if pressure > SHRINK_ABOVE_PRESSURE {
            (from * 17 / 20).max(bounds.min)
        } else if hit_rate.is_some_and(|rate| rate < GROW_BELOW_HIT_RATE)
            && pressure < GROW_BELOW_PRESSURE
        {
            (from + from / 5).min(bounds.max)
        } else {
            from
        };

        self.target.store(to, Ordering::Relaxed);
        match to.cmp(&from) {
            std::cmp::Ordering::Greater => Resize::Grow { from, to },
            std::cmp::Ordering::Less => Resize::Shrink { from, to },
            std::cmp::Ordering::Equal => Resize::Keep,
        }
    }

    /// Evicts lowest-scoring entries until the cache holds at most `target`.
    fn evict_to(&self, target: usize, now: chrono::DateTime<chrono::Utc>) -> usize {
        let size = self.cache.size();
        if size <= target {
            return 0;
        }

        let tracker = self.cache.tracker();
        let mut scored: Vec<(f64, String)> = self
            .cache
            .keys()
            .into_iter()
            .map(|key| {
                let score = tracker
                    .get(&key)
                    .map_or(0.0, |stats| stats.eviction_score(now));
                (score, key)
            })
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut evicted = 0;
        for (_, key) in scored {
            if self.cache.size() <= target {
                break;
            }
            if self.cache.evict(&key) {
                evicted += 1;
            }
        }

        self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    pub fn stats(&self) -> OptimizerStats {
        OptimizerStats {
            target_capacity: self.target_capacity(),
            cycles: self.cycles.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            last_pressure: f64::from_bits(self.last_pressure_bits.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::entry::cache_key;
    use chrono::Utc;

    const BOUNDS: CapacityBounds = CapacityBounds {
        min: 10,
        max: 100_000,
    };

    fn filled_cache(entries: usize) -> (Arc<TranslationCache>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Arc::new(TranslationCache::new(TimeDelta::days(30), clock.clone()));
        for i in 0..entries {
            cache.put(&format!("text {i}"), "ja", &format!("訳 {i}"));
        }
        (cache, clock)
    }

    /// Records `hits` hits and `misses` misses spread over the first keys.
    fn drive_hit_rate(cache: &TranslationCache, hits: usize, misses: usize) {
        for i in 0..hits {
            assert!(cache.get(&format!("text {}", i % 40), "ja").is_some());
        }
        for i in 0..misses {
            assert!(cache.get(&format!("absent {i}"), "ja").is_none());
        }
    }

    #[test]
    fn test_low_hit_rate_grows_then_evicts_to_target() {
        let (cache, _) = filled_cache(150);
        drive_hit_rate(&cache, 60, 40);
        let optimizer =
            CacheOptimizer::new(Arc::clone(&cache), Box::new(FixedGauge(0.5)), 100, BOUNDS);

        let report = optimizer.run_cycle();

        assert_eq!(report.resize, Resize::Grow { from: 100, to: 120 });
        assert_eq!(optimizer.target_capacity(), 120);
        assert_eq!(report.evicted, 30);
        assert!(cache.size() <= optimizer.target_capacity());
    }

    #[test]
    fn test_eviction_keeps_accessed_entries() {
        let (cache, _) = filled_cache(150);
        drive_hit_rate(&cache, 60, 40);
        let optimizer =
            CacheOptimizer::new(Arc::clone(&cache), Box::new(FixedGauge(0.5)), 100, BOUNDS);

        optimizer.run_cycle();

        for i in 0..40 {
            assert!(cache.contains_key(&cache_key(&format!("text {i}"), "ja")));
        }
    }

    #[test]
    fn test_high_pressure_shrinks() {
        let (cache, _) = filled_cache(100);
        let optimizer =
            CacheOptimizer::new(Arc::clone(&cache), Box::new(FixedGauge(0.95)), 100, BOUNDS);

        let report = optimizer.run_cycle();

        assert_eq!(report.resize, Resize::Shrink { from: 100, to: 85 });
        assert_eq!(cache.size(), 85);
    }

    #[test]
    fn test_shrink_respects_floor() {
        let (cache, _) = filled_cache(5);
        let optimizer =
            CacheOptimizer::new(Arc::clone(&cache), Box::new(FixedGauge(0.99)), 11, BOUNDS);

        optimizer.run_cycle();
        assert_eq!(optimizer.target_capacity(), 10);
        optimizer.run_cycle();
        assert_eq!(optimizer.target_capacity(), 10);
    }

    #[test]
    fn test_growth_respects_ceiling() {
        let (cache, _) = filled_cache(0);
        drive_hit_rate(&cache, 0, 10);
        let bounds = CapacityBounds { min: 10, max: 110 };
        let optimizer =
            CacheOptimizer::new(Arc::clone(&cache), Box::new(FixedGauge(0.1)), 100, bounds);

        optimizer.run_cycle();
        assert_eq!(optimizer.target_capacity(), 110);
    }

    #[test]
    fn test_good_hit_rate_keeps_target() {
        let (cache, _) = filled_cache(50);
        drive_hit_rate(&cache, 90, 10);
        let optimizer =
            CacheOptimizer::new(Arc::clone(&cache), Box::new(FixedGauge(0.5)), 100, BOUNDS);

        let report = optimizer.run_cycle();
        assert_eq!(report.resize, Resize::Keep);
        assert_eq!(report.evicted, 0);
    }

    #[test]
    fn test_no_traffic_keeps_target() {
        let (cache, _) = filled_cache(10);
        let optimizer =
            CacheOptimizer::new(Arc::clone(&cache), Box::new(FixedGauge(0.1)), 100, BOUNDS);
        assert_eq!(optimizer.run_cycle().resize, Resize::Keep);
    }

    #[test]
    fn test_idle_stats_are_purged() {
        let (cache, clock) = filled_cache(5);
        drive_hit_rate(&cache, 5, 0);
        clock.advance(TimeDelta::days(8));
        let optimizer =
            CacheOptimizer::new(Arc::clone(&cache), Box::new(FixedGauge(0.1)), 100, BOUNDS);

        let report = optimizer.run_cycle();
        assert_eq!(report.stats_purged, 5);
        assert_eq!(cache.tracker().tracked(), 0);
    }

    #[test]
    fn test_budget_gauge() {
        let (cache, _) = filled_cache(10);
        let bytes = cache.estimated_bytes();
        assert!((BudgetGauge::new(bytes * 2).pressure(&cache) - 0.5).abs() < 1e-9);
        assert!((BudgetGauge::new(0).pressure(&cache) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_adaptive_capacity() {
        let bounds = CapacityBounds {
            min: 1000,
            max: 100_000,
        };
        assert_eq!(adaptive_capacity(64 * 1024 * 1024, bounds), 6710);
        assert_eq!(adaptive_capacity(1024, bounds), 1000);
        assert_eq!(adaptive_capacity(usize::MAX / 2, bounds), 100_000);
    }
}
