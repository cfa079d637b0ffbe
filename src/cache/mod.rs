//! Translation cache, its durable store and the optimizer that sizes it.

mod clock;
mod entry;
mod memory;
mod optimizer;
mod stats;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, cache_key, normalize};
pub use memory::{CacheStats, TranslationCache};
pub use optimizer::{
    BudgetGauge, CacheOptimizer, CapacityBounds, CycleReport, FixedGauge, OptimizerStats,
    PressureGauge, Resize, adaptive_capacity,
};
pub use stats::{AccessStats, AccessTracker};
pub use store::{CacheStore, SqliteStore, StoreWriter};
