use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::RateLimitError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub waiting: usize,
    pub available_tokens: u32,
    pub capacity: u32,
}

/// Token bucket guarding outbound provider calls.
///
/// Tokens are added in whole seconds' worth (`floor(elapsed) × rate`), both
/// lazily on every attempt and from a periodic [`refill`](Self::refill). The
/// count never leaves `0..=capacity`.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: AtomicU32,
    refill_per_second: AtomicU32,
    tokens: AtomicU32,
    epoch: Instant,
    /// Milliseconds since `epoch` covered by refills so far.
    refilled_until_ms: AtomicU64,
    total_requests: AtomicU64,
    rejected_requests: AtomicU64,
    waiting: AtomicUsize,
}

impl RateLimiter {
    /// Creates a full bucket.
    pub fn new(capacity: u32, refill_per_second: u32) -> Self {
        Self {
            capacity: AtomicU32::new(capacity),
            refill_per_second: AtomicU32::new(refill_per_second),
            tokens: AtomicU32::new(capacity),
            epoch: Instant::now(),
            refilled_until_ms: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            waiting: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity.load(Ordering::Acquire)
    }

    pub fn available_tokens(&self) -> u32 {
        self.tokens.load(Ordering::Acquire)
    }

    /// Applies new limits, trimming the current count to the new capacity.
    pub fn set_limits(&self, capacity: u32, refill_per_second: u32) {
        self.capacity.store(capacity, Ordering::Release);
        self.refill_per_second
            .store(refill_per_second, Ordering::Release);
        let _ = self
            .tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                (t > capacity).then_some(capacity)
            });
    }

    /// Adds the tokens earned since the last refill.
    pub fn refill(&self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let last = self.refilled_until_ms.load(Ordering::Acquire);
        let whole_seconds = now_ms.saturating_sub(last) / 1000;
        if whole_seconds == 0 {
            return;
        }

        // Only one caller may claim a given interval; the remainder carries over.
        if self
            .refilled_until_ms
            .compare_exchange(
                last,
                last + whole_seconds * 1000,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let capacity = self.capacity();
        let rate = u64::from(self.refill_per_second.load(Ordering::Acquire));
        let earned = whole_seconds.saturating_mul(rate);
        let _ = self
            .tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                let refilled = (u64::from(t) + earned).min(u64::from(capacity)) as u32;
                (refilled != t).then_some(refilled)
            });
    }

    fn take_token(&self) -> bool {
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| t.checked_sub(1))
            .is_ok()
    }

    /// Takes a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.refill();
        if self.take_token() {
            true
        } else {
            self.rejected_requests.fetch_add(1, Ordering::Relaxed);
            debug!("Rate limit reached, request rejected");
            false
        }
    }

    /// Waits up to `timeout` for a token, polling every 50ms.
    pub async fn acquire(&self, timeout: Duration) -> Result<(), RateLimitError> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + timeout;
        let _waiting = WaitingGuard::enter(&self.waiting);

        loop {
            self.refill();
            if self.take_token() {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                self.rejected_requests.fetch_add(1, Ordering::Relaxed);
                debug!(?timeout, "Timed out waiting for a rate limit token");
                return Err(RateLimitError::Timeout(timeout));
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Fills the bucket back to capacity.
    pub fn reset(&self) {
        self.tokens.store(self.capacity(), Ordering::Release);
        self.refilled_until_ms.store(
            self.epoch.elapsed().as_millis() as u64,
            Ordering::Release,
        );
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            waiting: self.waiting.load(Ordering::Relaxed),
            available_tokens: self.available_tokens(),
            capacity: self.capacity(),
        }
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_twenty_first_request_is_rejected() {
        let limiter = RateLimiter::new(20, 10);

        for i in 0..20 {
            assert!(limiter.try_acquire(), "request {i} should be admitted");
        }
        assert!(!limiter.try_acquire());

        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 21);
        assert_eq!(stats.rejected_requests, 1);
        assert_eq!(stats.available_tokens, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_adds_whole_seconds_only() {
        let limiter = RateLimiter::new(20, 10);
        for _ in 0..20 {
            limiter.try_acquire();
        }

        tokio::time::advance(Duration::from_millis(900)).await;
        limiter.refill();
        assert_eq!(limiter.available_tokens(), 0);

        tokio::time::advance(Duration::from_millis(600)).await;
        limiter.refill();
        assert_eq!(limiter.available_tokens(), 10);

        // The 500ms left over from the first window still counts.
        tokio::time::advance(Duration::from_millis(500)).await;
        limiter.refill();
        assert_eq!(limiter.available_tokens(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_exceed_capacity() {
        let limiter = RateLimiter::new(5, 100);
        for step in 0..50u64 {
            if step % 3 == 0 {
                limiter.try_acquire();
            }
            tokio::time::advance(Duration::from_millis(370)).await;
            limiter.refill();
            assert!(limiter.available_tokens() <= limiter.capacity());
        }

        limiter.set_limits(2, 100);
        assert!(limiter.available_tokens() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.try_acquire());

        let result = limiter.acquire(Duration::from_millis(200)).await;
        assert_eq!(
            result,
            Err(RateLimitError::Timeout(Duration::from_millis(200)))
        );
        assert_eq!(limiter.stats().waiting, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.try_acquire());

        let started = Instant::now();
        limiter.acquire(Duration::from_secs(3)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_capacity() {
        let limiter = Arc::new(RateLimiter::new(20, 1));
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.try_acquire() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_refills() {
        let limiter = RateLimiter::new(3, 1);
        for _ in 0..3 {
            limiter.try_acquire();
        }
        limiter.reset();
        assert_eq!(limiter.available_tokens(), 3);
    }
}
