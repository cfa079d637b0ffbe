//! Host-facing facade, constructed once and shared by reference.

use anyhow::Result;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::orchestrator::{Orchestrator, PipelineStats, Translation};
use crate::cache::{
    BudgetGauge, CacheOptimizer, CacheStats, CacheStore, Clock, OptimizerStats, PressureGauge,
    SystemClock, TranslationCache,
};
use crate::config::{ConfigSource, Settings};
use crate::error::QueueError;
use crate::limiter::{LimiterStats, RateLimiter, RequestThrottler, ThrottlerStats};
use crate::provider::{ProviderRegistry, TranslationProvider};
use crate::queue::{Priority, QueueStats, TaskHandle, TaskQueue};
use crate::scheduler::{Scheduler, SchedulerHandle, SchedulerStats};

/// How often settings are pushed into components that keep their own copy.
const CONFIG_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

const BATCH_CATEGORY: &str = "batch";
const PRELOAD_CATEGORY: &str = "preload";

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub provider: String,
    pub cache: CacheStats,
    pub optimizer: OptimizerStats,
    pub limiter: LimiterStats,
    pub throttler: ThrottlerStats,
    pub queue: QueueStats,
    pub pipeline: PipelineStats,
    pub scheduler: SchedulerStats,
}

/// Assembles a [`TranslationService`].
pub struct ServiceBuilder {
    config: Arc<dyn ConfigSource>,
    registry: ProviderRegistry,
    provider: Option<Arc<dyn TranslationProvider>>,
    store: Option<Box<dyn CacheStore>>,
    clock: Arc<dyn Clock>,
    gauge: Option<Box<dyn PressureGauge>>,
}

impl ServiceBuilder {
    #[must_use]
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Uses `provider` instead of building the configured one.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn TranslationProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Persists the cache in `store`. Without one the cache is memory-only.
    #[must_use]
    pub fn store(mut self, store: Box<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the default memory-budget gauge.
    #[must_use]
    pub fn gauge(mut self, gauge: Box<dyn PressureGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Builds the service and starts its workers and scheduler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<TranslationService> {
        let settings = self.config.settings();

        let cache = Arc::new(match self.store {
            Some(store) => TranslationCache::with_store(settings.cache.ttl(), self.clock, store)?,
            None => TranslationCache::new(settings.cache.ttl(), self.clock),
        });

        let gauge = self
            .gauge
            .unwrap_or_else(|| Box::new(BudgetGauge::new(settings.cache.memory_budget_bytes())));
        let optimizer = Arc::new(CacheOptimizer::new(
            Arc::clone(&cache),
            gauge,
            settings.cache.initial_capacity(),
            settings.cache.bounds(),
        ));
        optimizer.set_stats_idle(settings.cache.stats_idle());

        let limiter = Arc::new(RateLimiter::new(
            settings.rate_limit.capacity,
            settings.rate_limit.refill_per_second,
        ));
        let throttler = Arc::new(RequestThrottler::new(settings.throttle.to_settings()));

        let provider = match self.provider {
            Some(provider) => provider,
            None => {
                let name = &settings.translation.provider;
                self.registry.create(name, &settings.provider(name))?
            }
        };
        if !provider.is_available() {
            warn!(provider = provider.name(), "Provider is not fully configured; requests will fall back to the original text");
        }

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&self.config),
            Arc::clone(&cache),
            Arc::clone(&limiter),
            Arc::clone(&throttler),
            provider,
        ));

        let queue = Arc::new(TaskQueue::new(settings.workers.to_pool_settings()));
        queue.start(orchestrator.clone());

        let scheduler = maintenance_jobs(&MaintenanceTargets {
            config: Arc::clone(&self.config),
            registry: self.registry.clone(),
            cache: Arc::clone(&cache),
            optimizer: Arc::clone(&optimizer),
            limiter: Arc::clone(&limiter),
            throttler: Arc::clone(&throttler),
            orchestrator: Arc::clone(&orchestrator),
        })
        .start();

        info!(
            provider = orchestrator.provider().name(),
            target_language = %settings.translation.target_language,
            cached = cache.size(),
            "Translation service started"
        );

        Ok(TranslationService {
            config: self.config,
            registry: self.registry,
            cache,
            optimizer,
            limiter,
            throttler,
            orchestrator,
            queue,
            scheduler,
            shut_down: AtomicBool::new(false),
        })
    }
}

struct MaintenanceTargets {
    config: Arc<dyn ConfigSource>,
    registry: ProviderRegistry,
    cache: Arc<TranslationCache>,
    optimizer: Arc<CacheOptimizer>,
    limiter: Arc<RateLimiter>,
    throttler: Arc<RequestThrottler>,
    orchestrator: Arc<Orchestrator>,
}

/// Registers every periodic job on one scheduler.
fn maintenance_jobs(targets: &MaintenanceTargets) -> Scheduler {
    let interval = |pick: fn(&Settings) -> Duration| {
        let config = Arc::clone(&targets.config);
        move || pick(&config.settings())
    };

    let optimize = {
        let cache = Arc::clone(&targets.cache);
        let optimizer = Arc::clone(&targets.optimizer);
        move || {
            let expired = cache.purge_expired();
            let report = optimizer.run_cycle();
            debug!(expired, ?report.resize, evicted = report.evicted, "Cache maintenance finished");
        }
    };

    let refill = {
        let limiter = Arc::clone(&targets.limiter);
        move || limiter.refill()
    };

    let cleanup = {
        let throttler = Arc::clone(&targets.throttler);
        move || {
            throttler.cleanup();
        }
    };

    let refresh = {
        let config = Arc::clone(&targets.config);
        let registry = targets.registry.clone();
        let cache = Arc::clone(&targets.cache);
        let optimizer = Arc::clone(&targets.optimizer);
        let limiter = Arc::clone(&targets.limiter);
        let throttler = Arc::clone(&targets.throttler);
        let orchestrator = Arc::clone(&targets.orchestrator);
        let initial = config.settings();
        let mut last_size = initial.cache.max_size;
        let mut last_provider = initial.translation.provider.clone();

        move || {
            let settings = config.settings();
            cache.set_ttl(settings.cache.ttl());
            optimizer.set_bounds(settings.cache.bounds());
            optimizer.set_stats_idle(settings.cache.stats_idle());
            limiter.set_limits(
                settings.rate_limit.capacity,
                settings.rate_limit.refill_per_second,
            );
            throttler.set_settings(settings.throttle.to_settings());

            if settings.cache.max_size != last_size {
                last_size = settings.cache.max_size;
                optimizer.set_target_capacity(settings.cache.initial_capacity());
                info!(target = optimizer.target_capacity(), "Cache size changed");
            }

            // Only a change in the file switches providers, so a runtime
            // switch_provider() is not undone by the next refresh.
            let name = &settings.translation.provider;
            if *name != last_provider {
                match registry.create(name, &settings.provider(name)) {
                    Ok(provider) => {
                        orchestrator.set_provider(provider);
                        last_provider.clone_from(name);
                    }
                    Err(e) => warn!(provider = %name, error = %e, "Failed to switch provider"),
                }
            }
        }
    };

    Scheduler::new()
        .every(
            "cache-optimizer",
            interval(|s| s.cache.optimize_interval()),
            optimize,
        )
        .every(
            "limiter-refill",
            interval(|s| s.rate_limit.refill_interval()),
            refill,
        )
        .every(
            "throttler-cleanup",
            interval(|s| s.throttle.cleanup_interval()),
            cleanup,
        )
        .every("config-refresh", || CONFIG_REFRESH_INTERVAL, refresh)
}

/// The translation pipeline as seen by a host application.
///
/// Every translating call is infallible from the caller's point of view:
/// anything that goes wrong yields the input text.
pub struct TranslationService {
    config: Arc<dyn ConfigSource>,
    registry: ProviderRegistry,
    cache: Arc<TranslationCache>,
    optimizer: Arc<CacheOptimizer>,
    limiter: Arc<RateLimiter>,
    throttler: Arc<RequestThrottler>,
    orchestrator: Arc<Orchestrator>,
    queue: Arc<TaskQueue>,
    scheduler: SchedulerHandle,
    shut_down: AtomicBool,
}

impl TranslationService {
    pub fn builder(config: Arc<dyn ConfigSource>) -> ServiceBuilder {
        ServiceBuilder {
            config,
            registry: ProviderRegistry::default(),
            provider: None,
            store: None,
            clock: Arc::new(SystemClock),
            gauge: None,
        }
    }

    /// Translates directly on the caller's task, bypassing the queue.
    pub async fn translate(&self, text: &str) -> String {
        self.orchestrator.translate(text).await
    }

    pub async fn translate_detailed(&self, text: &str) -> Translation {
        self.orchestrator.translate_detailed(text).await
    }

    /// Queues `text` at normal priority.
    ///
    /// The returned future owns everything it needs and can be moved to
    /// another task.
    pub fn translate_async(&self, text: &str) -> impl Future<Output = String> + Send + 'static {
        let fallback = text.to_string();
        let handle = self.submit(text, Priority::Normal, None);
        async move {
            match handle {
                Ok(handle) => handle.await.unwrap_or(fallback),
                Err(_) => fallback,
            }
        }
    }

    /// Queues `text` and blocks the current thread until it is translated.
    ///
    /// For host threads outside the async runtime; calling it from a runtime
    /// worker thread panics.
    pub fn translate_blocking(&self, text: &str) -> String {
        match self.submit(text, Priority::Normal, None) {
            Ok(handle) => handle.wait_blocking().unwrap_or_else(|_| text.to_string()),
            Err(_) => text.to_string(),
        }
    }

    pub fn submit(
        &self,
        text: &str,
        priority: Priority,
        category: Option<&str>,
    ) -> Result<TaskHandle, QueueError> {
        self.queue.submit(text, priority, category)
    }

    /// Fails every queued task of `category` that has not started yet.
    pub fn cancel_category(&self, category: &str) -> usize {
        self.queue.cancel_category(category)
    }

    /// Translates many texts, returning results in input order.
    ///
    /// Duplicates are translated once, cached texts are answered without
    /// queueing, and the rest run at low priority.
    pub async fn translate_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<String> {
        let mut unique: Vec<&str> = Vec::new();
        let mut slot_of: HashMap<&str, usize> = HashMap::new();
        for text in texts {
            let text = text.as_ref();
            slot_of.entry(text).or_insert_with(|| {
                unique.push(text);
                unique.len() - 1
            });
        }

        let mut results: Vec<Option<String>> =
            unique.iter().map(|text| self.orchestrator.lookup(text)).collect();

        let pending: Vec<(usize, TaskHandle)> = results
            .iter()
            .enumerate()
            .filter(|(_, result)| result.is_none())
            .filter_map(|(slot, _)| {
                self.submit(unique[slot], Priority::Low, Some(BATCH_CATEGORY))
                    .ok()
                    .map(|handle| (slot, handle))
            })
            .collect();
        debug!(
            total = texts.len(),
            unique = unique.len(),
            queued = pending.len(),
            "Translating batch"
        );

        for (slot, result) in join_all(
            pending
                .into_iter()
                .map(|(slot, handle)| async move { (slot, handle.await) }),
        )
        .await
        {
            results[slot] = result.ok();
        }

        texts
            .iter()
            .map(|text| {
                let text = text.as_ref();
                results[slot_of[text]]
                    .clone()
                    .unwrap_or_else(|| text.to_string())
            })
            .collect()
    }

    /// Queues uncached texts at background priority to warm the cache.
    ///
    /// Returns how many were queued.
    pub fn preload<S: AsRef<str>>(&self, texts: &[S]) -> usize {
        let mut seen = std::collections::HashSet::new();
        texts
            .iter()
            .map(AsRef::as_ref)
            .filter(|text| seen.insert(*text))
            .filter(|text| self.orchestrator.cached_translation(text).is_none())
            .filter(|text| {
                self.submit(text, Priority::Background, Some(PRELOAD_CATEGORY))
                    .is_ok()
            })
            .count()
    }

    /// Cached translation of `text`, if any. Never calls the provider.
    pub fn cached_translation(&self, text: &str) -> Option<String> {
        self.orchestrator.cached_translation(text)
    }

    /// Replaces the provider with a fresh one from the registry.
    pub fn switch_provider(&self, name: &str) -> Result<()> {
        let settings = self.config.settings();
        let provider = self.registry.create(name, &settings.provider(name))?;
        if !provider.is_available() {
            warn!(provider = name, "Switched to a provider that is not fully configured");
        }
        self.orchestrator.set_provider(provider);
        info!(provider = name, "Provider switched");
        Ok(())
    }

    pub fn provider_name(&self) -> String {
        self.orchestrator.provider().name().to_string()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    /// Runs one optimizer pass now instead of waiting for the scheduler.
    pub fn optimize_cache(&self) -> crate::cache::CycleReport {
        self.cache.purge_expired();
        self.optimizer.run_cycle()
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            provider: self.provider_name(),
            cache: self.cache.stats(),
            optimizer: self.optimizer.stats(),
            limiter: self.limiter.stats(),
            throttler: self.throttler.stats(),
            queue: self.queue.stats(),
            pipeline: self.orchestrator.stats(),
            scheduler: self.scheduler.stats(),
        }
    }

    /// Stops background work, fails queued tasks and saves the cache.
    ///
    /// Later calls do nothing.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scheduler.shutdown().await;
        // Release workers parked on in-flight requests before joining them.
        let completed = self.throttler.shutdown();
        self.queue.shutdown().await;
        self.cache.close().await;
        info!(completed, "Translation service stopped");
    }
}
