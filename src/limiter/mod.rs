//! Outbound traffic shaping: a token bucket and a de-duplicating throttler.

mod throttler;
mod token_bucket;

pub use throttler::{RequestThrottler, ThrottleSettings, ThrottlerStats};
pub use token_bucket::{LimiterStats, RateLimiter};
