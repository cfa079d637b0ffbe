//! Priority-ordered task queue and the worker pool draining it.

mod pool;
mod priority;

pub use pool::{PoolSettings, QueueStats, TaskHandle, TaskQueue, TaskRunner};
pub use priority::Priority;
