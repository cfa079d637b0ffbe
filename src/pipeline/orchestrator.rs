//! Per-request state machine tying the codec, cache, limiter, throttler and
//! provider together.
//!
//! ```text
//! encode ─► filters ─► cache ─┬─ hit ──────────────────────────────► decode ─► format
//!                             └─ miss ─► throttle ─► rate gate ─► provider ─► cache put ─┘
//! ```
//!
//! Every failure along the way ends in the original text.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use super::filters::{SkipReason, TextFilter};
use super::format::format_translation;
use crate::cache::TranslationCache;
use crate::codec::{self, MarkerTable};
use crate::config::{ConfigSource, FilterConfig, Settings};
use crate::error::ProviderError;
use crate::limiter::{RateLimiter, RequestThrottler};
use crate::provider::TranslationProvider;
use crate::queue::TaskRunner;

/// Attempts per request, including the first.
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    CacheHit,
    Translated,
    /// The provider was not reached or did not produce a translation.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub requests: u64,
    pub skipped: u64,
    pub cache_hits: u64,
    pub translated: u64,
    pub fallbacks: u64,
    pub provider_calls: u64,
    pub provider_errors: u64,
    pub retries: u64,
    pub rate_limited: u64,
    pub codec_anomalies: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    skipped: AtomicU64,
    cache_hits: AtomicU64,
    translated: AtomicU64,
    fallbacks: AtomicU64,
    provider_calls: AtomicU64,
    provider_errors: AtomicU64,
    retries: AtomicU64,
    rate_limited: AtomicU64,
    codec_anomalies: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            requests: load(&self.requests),
            skipped: load(&self.skipped),
            cache_hits: load(&self.cache_hits),
            translated: load(&self.translated),
            fallbacks: load(&self.fallbacks),
            provider_calls: load(&self.provider_calls),
            provider_errors: load(&self.provider_errors),
            retries: load(&self.retries),
            rate_limited: load(&self.rate_limited),
            codec_anomalies: load(&self.codec_anomalies),
        }
    }
}

/// Filters compiled from the config they were built from.
struct CompiledFilter {
    source: FilterConfig,
    filter: Arc<TextFilter>,
}

/// Everything a single provider round trip needs, owned so it can run on
/// the throttler's task.
struct ProviderCall {
    provider: Arc<dyn TranslationProvider>,
    limiter: Arc<RateLimiter>,
    cache: Arc<TranslationCache>,
    counters: Arc<Counters>,
    target_language: String,
    acquire_timeout: Duration,
    timeout: Duration,
}

impl ProviderCall {
    async fn run(self, text: String) -> Option<String> {
        if !self.admit().await {
            Counters::bump(&self.counters.rate_limited);
            debug!(provider = self.provider.name(), "Rate limited, using original text");
            return None;
        }

        match self.call_with_retry(&text).await {
            Ok(translated) if translated.trim() != text.trim() => {
                self.cache.put(&text, &self.target_language, &translated);
                Some(translated)
            }
            Ok(_) => None,
            Err(e) => {
                Counters::bump(&self.counters.provider_errors);
                warn!(provider = self.provider.name(), error = %e, "Translation failed, using original text");
                None
            }
        }
    }

    async fn admit(&self) -> bool {
        if self.acquire_timeout.is_zero() {
            self.limiter.try_acquire()
        } else {
            self.limiter.acquire(self.acquire_timeout).await.is_ok()
        }
    }

    async fn call_with_retry(&self, text: &str) -> Result<String, ProviderError> {
        let mut attempt = 1;
        loop {
            Counters::bump(&self.counters.provider_calls);
            let result = tokio::time::timeout(
                self.timeout,
                self.provider.translate(text, &self.target_language),
            )
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Timeout {
                    provider: self.provider.name().to_string(),
                    timeout: self.timeout,
                })
            });

            match result {
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    debug!(provider = self.provider.name(), attempt, error = %e, ?delay, "Retrying translation");
                    Counters::bump(&self.counters.retries);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Runs single translation requests end to end.
pub struct Orchestrator {
    config: Arc<dyn ConfigSource>,
    cache: Arc<TranslationCache>,
    limiter: Arc<RateLimiter>,
    throttler: Arc<RequestThrottler>,
    provider: RwLock<Arc<dyn TranslationProvider>>,
    filter: RwLock<Option<CompiledFilter>>,
    counters: Arc<Counters>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        cache: Arc<TranslationCache>,
        limiter: Arc<RateLimiter>,
        throttler: Arc<RequestThrottler>,
        provider: Arc<dyn TranslationProvider>,
    ) -> Self {
        Self {
            config,
            cache,
            limiter,
            throttler,
            provider: RwLock::new(provider),
            filter: RwLock::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn provider(&self) -> Arc<dyn TranslationProvider> {
        Arc::clone(&self.provider.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swaps the provider used by requests that have not reached it yet.
    pub fn set_provider(&self, provider: Arc<dyn TranslationProvider>) {
        debug!(provider = provider.name(), "Switching provider");
        *self.provider.write().unwrap_or_else(PoisonError::into_inner) = provider;
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Returns the filter for `config`, recompiling only when it changed.
    fn filter(&self, config: &FilterConfig) -> Arc<TextFilter> {
        if let Some(compiled) = &*self.filter.read().unwrap_or_else(PoisonError::into_inner)
            && compiled.source == *config
        {
            return Arc::clone(&compiled.filter);
        }

        let filter = Arc::new(TextFilter::new(config));
        *self.filter.write().unwrap_or_else(PoisonError::into_inner) = Some(CompiledFilter {
            source: config.clone(),
            filter: Arc::clone(&filter),
        });
        filter
    }

    /// Encodes `text` and decides whether it needs the provider at all.
    fn prepare(&self, text: &str, settings: &Settings) -> Result<MarkerTable, SkipReason> {
        if !settings.translation.enabled {
            return Err(SkipReason::Disabled);
        }
        if text.trim().is_empty() {
            return Err(SkipReason::Blank);
        }

        let table = codec::encode(text, settings.codec.symbol_mode);
        if !table.has_translatable_text() {
            return Err(SkipReason::NonLinguistic);
        }
        let filter = self.filter(&settings.filters);
        match filter.skip_reason(&table.clean_text, &settings.translation.target_language) {
            Some(reason) => Err(reason),
            None => Ok(table),
        }
    }

    /// Restores markers and applies display formatting.
    fn finish(&self, translated: &str, table: &MarkerTable, settings: &Settings) -> String {
        let decoded = codec::decode(translated, table);
        if !decoded.is_complete() {
            Counters::bump(&self.counters.codec_anomalies);
            warn!(
                original = %table.original_text,
                leftover = ?decoded.leftover,
                missing = ?decoded.missing,
                "Markers could not be fully restored"
            );
        }
        format_translation(&decoded.text, &table.original_text, &settings.display)
    }

    /// Translates `text`, falling back to it unchanged on any failure.
    pub async fn translate(&self, text: &str) -> String {
        self.translate_detailed(text).await.text
    }

    pub async fn translate_detailed(&self, text: &str) -> Translation {
        Counters::bump(&self.counters.requests);
        let settings = self.config.settings();
        let target_language = settings.translation.target_language.clone();

        let table = match self.prepare(text, &settings) {
            Ok(table) => table,
            Err(reason) => {
                Counters::bump(&self.counters.skipped);
                debug!(?reason, "Text not sent for translation");
                return Translation {
                    text: text.to_string(),
                    outcome: Outcome::Skipped(reason),
                };
            }
        };

        if let Some(cached) = self.cache.get(&table.clean_text, &target_language) {
            Counters::bump(&self.counters.cache_hits);
            return Translation {
                text: self.finish(&cached, &table, &settings),
                outcome: Outcome::CacheHit,
            };
        }

        let provider = self.provider();
        let call = ProviderCall {
            timeout: settings.provider(provider.name()).timeout(),
            provider,
            limiter: Arc::clone(&self.limiter),
            cache: Arc::clone(&self.cache),
            counters: Arc::clone(&self.counters),
            acquire_timeout: settings.rate_limit.acquire_timeout(),
            target_language,
        };

        let translated = self
            .throttler
            .throttled_translate(&table.clean_text, move |clean| call.run(clean))
            .await;

        if translated.trim() == table.clean_text.trim() {
            Counters::bump(&self.counters.fallbacks);
            return Translation {
                text: text.to_string(),
                outcome: Outcome::Fallback,
            };
        }

        Counters::bump(&self.counters.translated);
        Translation {
            text: self.finish(&translated, &table, &settings),
            outcome: Outcome::Translated,
        }
    }

    /// Serves `text` from the cache without touching statistics or the provider.
    ///
    /// Texts the filters would skip come back unchanged; misses are `None`.
    pub fn cached_translation(&self, text: &str) -> Option<String> {
        let settings = self.config.settings();
        match self.prepare(text, &settings) {
            Ok(table) => self
                .cache
                .peek(&table.clean_text, &settings.translation.target_language)
                .map(|cached| self.finish(&cached, &table, &settings)),
            Err(_) => Some(text.to_string()),
        }
    }

    /// Like [`cached_translation`](Self::cached_translation), but a hit counts
    /// towards cache statistics.
    pub fn lookup(&self, text: &str) -> Option<String> {
        let settings = self.config.settings();
        match self.prepare(text, &settings) {
            Ok(table) => {
                let cached = self
                    .cache
                    .get(&table.clean_text, &settings.translation.target_language)?;
                Counters::bump(&self.counters.cache_hits);
                Some(self.finish(&cached, &table, &settings))
            }
            Err(_) => Some(text.to_string()),
        }
    }
}

#[async_trait]
impl TaskRunner for Orchestrator {
    async fn run(&self, text: &str) -> String {
        self.translate(text).await
    }
}
