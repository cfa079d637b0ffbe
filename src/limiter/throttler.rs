//! In-flight de-duplication and burst smoothing in front of the provider.
//!
//! Concurrent requests for the same text share one call. A leader runs the
//! work; everyone else (the leader included) waits on a `watch` slot that is
//! settled exactly once, either with the work's result, or with nothing if
//! the work failed, timed out, or the throttler shut down. An unsettled slot
//! resolves to the caller's own text.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSettings {
    pub max_concurrent: usize,
    pub min_interval: Duration,
    pub batch_delay: Duration,
    pub request_timeout: Duration,
    pub history_expiry: Duration,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            min_interval: Duration::from_millis(100),
            batch_delay: Duration::from_millis(50),
            request_timeout: Duration::from_secs(10),
            history_expiry: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThrottlerStats {
    pub in_flight: usize,
    pub tracked_keys: usize,
    pub deduplicated: u64,
    pub deferred: u64,
    pub forced_timeouts: u64,
}

#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Settled(Option<String>),
}

struct InFlight {
    id: u64,
    tx: watch::Sender<Slot>,
    started_at: Instant,
}

pub struct RequestThrottler {
    in_flight: DashMap<String, InFlight>,
    history: DashMap<String, Instant>,
    settings: RwLock<ThrottleSettings>,
    next_id: AtomicU64,
    deduplicated: AtomicU64,
    deferred: AtomicU64,
    forced_timeouts: AtomicU64,
}

impl RequestThrottler {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self {
            in_flight: DashMap::new(),
            history: DashMap::new(),
            settings: RwLock::new(settings),
            next_id: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            deferred: AtomicU64::new(0),
            forced_timeouts: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> ThrottleSettings {
        self.settings.read().map_or_else(|p| *p.into_inner(), |s| *s)
    }

    pub fn set_settings(&self, settings: ThrottleSettings) {
        if let Ok(mut current) = self.settings.write() {
            *current = settings;
        }
    }

    /// Runs `work` for `text` unless an identical request is already in flight.
    ///
    /// `work` returns `None` to signal failure; every waiter then gets its own
    /// `text` back.
    pub async fn throttled_translate<F, Fut>(self: &Arc<Self>, text: &str, work: F) -> String
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let key = normalize(text);
        if key.is_empty() {
            return text.to_string();
        }

        let (mut rx, leader_id) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(flight) => {
                self.deduplicated.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Joining in-flight request");
                (flight.get().tx.subscribe(), None)
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(Slot::Pending);
                slot.insert(InFlight {
                    id,
                    tx,
                    started_at: Instant::now(),
                });
                (rx, Some(id))
            }
        };

        if let Some(id) = leader_id {
            let delay = self.admission_delay(&key);
            let throttler = Arc::clone(self);
            let text = text.to_string();
            tokio::spawn(async move {
                let mut guard = SettleGuard {
                    throttler: &throttler,
                    key: &key,
                    id,
                    settled: false,
                };
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                throttler.history.insert(key.clone(), Instant::now());
                let result = work(text).await;
                guard.settle(result);
            });
        }

        match rx.wait_for(|slot| matches!(slot, Slot::Settled(_))).await {
            Ok(slot) => match &*slot {
                Slot::Settled(Some(translated)) => translated.clone(),
                Slot::Settled(None) | Slot::Pending => text.to_string(),
            },
            Err(_) => text.to_string(),
        }
    }

    fn admission_delay(&self, key: &str) -> Duration {
        let settings = self.settings();

        if let Some(last) = self.history.get(key).map(|t| *t) {
            let since = last.elapsed();
            if since < settings.min_interval {
                self.deferred.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Repeat request deferred");
                return settings.min_interval - since;
            }
        }

        // The caller's own entry is already in the map.
        if self.in_flight.len() > settings.max_concurrent {
            self.deferred.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Concurrency limit reached, request deferred");
            return settings.batch_delay;
        }

        Duration::ZERO
    }

    /// Settles and removes the flight `id` if it is still the one under `key`.
    fn settle(&self, key: &str, id: u64, result: Option<String>) -> bool {
        self.in_flight
            .remove_if(key, |_, flight| flight.id == id)
            .is_some_and(|(_, flight)| {
                matches!(flight.tx.send_replace(Slot::Settled(result)), Slot::Pending)
            })
    }

    /// Drops stale history and force-completes flights older than the request timeout.
    pub fn cleanup(&self) -> usize {
        let settings = self.settings();
        self.history
            .retain(|_, last| last.elapsed() <= settings.history_expiry);

        let stuck: Vec<(String, u64)> = self
            .in_flight
            .iter()
            .filter(|f| f.started_at.elapsed() > settings.request_timeout)
            .map(|f| (f.key().clone(), f.id))
            .collect();

        let mut forced = 0;
        for (key, id) in stuck {
            if self.settle(&key, id, None) {
                forced += 1;
                warn!(key = %key, timeout = ?settings.request_timeout, "In-flight request timed out");
            }
        }
        self.forced_timeouts
            .fetch_add(forced as u64, Ordering::Relaxed);
        forced
    }

    /// Completes every pending flight with its original text.
    pub fn shutdown(&self) -> usize {
        let pending: Vec<(String, u64)> = self
            .in_flight
            .iter()
            .map(|f| (f.key().clone(), f.id))
            .collect();
        let completed = pending
            .into_iter()
            .filter(|(key, id)| self.settle(key, *id, None))
            .count();
        self.history.clear();
        if completed > 0 {
            debug!(completed, "Completed pending requests on shutdown");
        }
        completed
    }

    pub fn stats(&self) -> ThrottlerStats {
        ThrottlerStats {
            in_flight: self.in_flight.len(),
            tracked_keys: self.history.len(),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            forced_timeouts: self.forced_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Settles the flight on drop if the work never got to, e.g. after a panic.
struct SettleGuard<'a> {
    throttler: &'a RequestThrottler,
    key: &'a str,
    id: u64,
    settled: bool,
}

impl SettleGuard<'_> {
    fn settle(&mut self, result: Option<String>) {
        self.settled = true;
        self.throttler.settle(self.key, self.id, result);
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.throttler.settle(self.key, self.id, None);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn throttler() -> Arc<RequestThrottler> {
        Arc::new(RequestThrottler::new(ThrottleSettings::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_requests_share_one_call() {
        let throttler = throttler();
        let calls = Arc::new(AtomicUsize::new(0));

        let make_work = |calls: Arc<AtomicUsize>| {
            move |text: String| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                Some(format!("translated {text}"))
            }
        };

        let (a, b) = tokio::join!(
            throttler.throttled_translate("X", make_work(Arc::clone(&calls))),
            throttler.throttled_translate("X", make_work(Arc::clone(&calls))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, "translated X");
        assert_eq!(a, b);
        assert_eq!(throttler.stats().deduplicated, 1);
        assert_eq!(throttler.stats().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_work_returns_original_text() {
        let throttler = throttler();
        let result = throttler
            .throttled_translate("Hello", |_| async { None })
            .await;
        assert_eq!(result, "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_text_bypasses_throttle() {
        let throttler = throttler();
        let result = throttler
            .throttled_translate("   ", |_| async { Some("never".to_string()) })
            .await;
        assert_eq!(result, "   ");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_within_min_interval_is_deferred() {
        let throttler = throttler();
        throttler
            .throttled_translate("Hi", |_| async { Some("やあ".to_string()) })
            .await;

        let started = Instant::now();
        throttler
            .throttled_translate("Hi", |_| async { Some("やあ".to_string()) })
            .await;

        assert!(started.elapsed() >= Duration::from_millis(90));
        assert_eq!(throttler.stats().deferred, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_defers_new_keys() {
        let throttler = Arc::new(RequestThrottler::new(ThrottleSettings {
            max_concurrent: 1,
            ..ThrottleSettings::default()
        }));

        let slow = {
            let throttler = Arc::clone(&throttler);
            tokio::spawn(async move {
                throttler
                    .throttled_translate("first", |_| async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Some("一".to_string())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let second = throttler
            .throttled_translate("second", |_| async { Some("二".to_string()) })
            .await;

        assert_eq!(second, "二");
        assert_eq!(throttler.stats().deferred, 1);
        assert_eq!(slow.await.unwrap(), "一");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_force_completes_stuck_requests() {
        let throttler = Arc::new(RequestThrottler::new(ThrottleSettings {
            request_timeout: Duration::from_secs(1),
            ..ThrottleSettings::default()
        }));

        let waiter = {
            let throttler = Arc::clone(&throttler);
            tokio::spawn(async move {
                throttler
                    .throttled_translate("stuck", |_| async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Some("never".to_string())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(throttler.cleanup(), 1);
        assert_eq!(waiter.await.unwrap(), "stuck");
        assert_eq!(throttler.stats().forced_timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expires_history() {
        let throttler = throttler();
        throttler
            .throttled_translate("Hi", |_| async { Some("やあ".to_string()) })
            .await;
        assert_eq!(throttler.stats().tracked_keys, 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        throttler.cleanup();
        assert_eq!(throttler.stats().tracked_keys, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_completes_pending() {
        let throttler = throttler();
        let waiter = {
            let throttler = Arc::clone(&throttler);
            tokio::spawn(async move {
                throttler
                    .throttled_translate("pending", |_| async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Some("never".to_string())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert_eq!(throttler.shutdown(), 1);
        assert_eq!(waiter.await.unwrap(), "pending");
    }
}
