use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::cache::CapacityBounds;
use crate::codec::SymbolMode;
use crate::limiter::ThrottleSettings;
use crate::queue::PoolSettings;

/// Every tunable the pipeline reads, as stored in `config.toml`.
///
/// Each section falls back to its defaults, so a partial file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub translation: TranslationConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub throttle: ThrottleConfig,
    pub workers: WorkerConfig,
    pub display: DisplayConfig,
    pub codec: CodecConfig,
    pub filters: FilterConfig,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Settings {
    /// Returns the `[providers.<name>]` table, or an empty one.
    pub fn provider(&self, name: &str) -> ProviderConfig {
        self.providers.get(name).cloned().unwrap_or_default()
    }
}

/// The `[translation]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Target language code, e.g. `zh-TW`.
    pub target_language: String,
    /// Name of the provider in the registry.
    pub provider: String,
    /// When `false` every request returns its input untouched.
    pub enabled: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            target_language: "zh-TW".to_string(),
            provider: "google".to_string(),
            enabled: true,
        }
    }
}

/// Cache capacity: a fixed entry count or derived from the memory budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CacheSizeRepr", into = "CacheSizeRepr")]
pub enum CacheSize {
    #[default]
    Adaptive,
    Fixed(usize),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CacheSizeRepr {
    Entries(usize),
    Keyword(String),
}

impl TryFrom<CacheSizeRepr> for CacheSize {
    type Error = String;

    fn try_from(repr: CacheSizeRepr) -> Result<Self, Self::Error> {
        match repr {
            CacheSizeRepr::Entries(n) => Ok(Self::Fixed(n)),
            CacheSizeRepr::Keyword(word) if word.eq_ignore_ascii_case("adaptive") => {
                Ok(Self::Adaptive)
            }
            CacheSizeRepr::Keyword(word) => Err(format!(
                "invalid cache max_size '{word}': expected an entry count or \"adaptive\""
            )),
        }
    }
}

impl From<CacheSize> for CacheSizeRepr {
    fn from(size: CacheSize) -> Self {
        match size {
            CacheSize::Adaptive => Self::Keyword("adaptive".to_string()),
            CacheSize::Fixed(n) => Self::Entries(n),
        }
    }
}

/// The `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: CacheSize,
    pub ttl_days: u32,
    pub memory_budget_mb: u64,
    pub min_capacity: usize,
    pub max_capacity: usize,
    pub optimize_interval_secs: u64,
    pub stats_idle_days: u32,
    /// Keep the cache in a SQLite file under the cache directory.
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: CacheSize::Adaptive,
            ttl_days: 30,
            memory_budget_mb: 64,
            min_capacity: 1000,
            max_capacity: 100_000,
            optimize_interval_secs: 30,
            stats_idle_days: 7,
            persist: true,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::days(i64::from(self.ttl_days))
    }

    pub fn stats_idle(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::days(i64::from(self.stats_idle_days))
    }

    pub fn memory_budget_bytes(&self) -> usize {
        (self.memory_budget_mb as usize).saturating_mul(1024 * 1024)
    }

    pub const fn bounds(&self) -> CapacityBounds {
        CapacityBounds {
            min: self.min_capacity,
            max: self.max_capacity,
        }
    }

    /// Entry count the optimizer starts from.
    pub fn initial_capacity(&self) -> usize {
        match self.max_size {
            CacheSize::Adaptive => {
                crate::cache::adaptive_capacity(self.memory_budget_bytes(), self.bounds())
            }
            CacheSize::Fixed(n) => n,
        }
    }

    pub const fn optimize_interval(&self) -> Duration {
        Duration::from_secs(self.optimize_interval_secs)
    }
}

/// The `[rate_limit]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub refill_per_second: u32,
    /// How long a request may wait for a token; `0` rejects immediately.
    pub acquire_timeout_ms: u64,
    pub refill_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            refill_per_second: 10,
            acquire_timeout_ms: 0,
            refill_interval_ms: 1000,
        }
    }
}

impl RateLimitConfig {
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub const fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}

/// The `[throttle]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub max_concurrent_requests: usize,
    pub min_request_interval_ms: u64,
    pub batch_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub history_expiry_ms: u64,
    pub cleanup_interval_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 5,
            min_request_interval_ms: 100,
            batch_delay_ms: 50,
            request_timeout_ms: 10_000,
            history_expiry_ms: 30_000,
            cleanup_interval_ms: 5_000,
        }
    }
}

impl ThrottleConfig {
    pub const fn to_settings(&self) -> ThrottleSettings {
        ThrottleSettings {
            max_concurrent: self.max_concurrent_requests,
            min_interval: Duration::from_millis(self.min_request_interval_ms),
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            history_expiry: Duration::from_millis(self.history_expiry_ms),
        }
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

/// The `[workers]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub pool_size: usize,
    pub poll_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            poll_interval_ms: 1000,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl WorkerConfig {
    pub const fn to_pool_settings(&self) -> PoolSettings {
        PoolSettings {
            pool_size: self.pool_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        }
    }
}

/// The `[display]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Append ` (original)` after a translated line.
    pub show_original: bool,
    /// Put `prefix` in front of a translated line.
    pub show_status: bool,
    pub prefix: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_original: false,
            show_status: false,
            prefix: "[T] ".to_string(),
        }
    }
}

/// The `[codec]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub symbol_mode: SymbolMode,
}

/// The `[filters]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Exact texts never sent for translation, compared case-insensitively.
    pub skip_words: Vec<String>,
    /// Regular expressions; a text matching any of them is left alone.
    pub skip_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            skip_words: Vec::new(),
            skip_patterns: vec![
                r"^[a-z0-9_.-]+:[a-z0-9_./-]+$".to_string(),
                r"^\[.*\]$".to_string(),
                r"^<.*>$".to_string(),
            ],
        }
    }
}

/// A `[providers.<name>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL; each provider has its own default.
    pub endpoint: Option<String>,
    /// API key stored directly in config (not recommended).
    pub api_key: Option<String>,
    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_key_env: None,
            model: None,
            timeout_secs: 10,
        }
    }
}

impl ProviderConfig {
    /// Gets the API key, preferring environment variable over config file.
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(env_var) = &self.api_key_env
            && let Ok(key) = std::env::var(env_var)
            && !key.is_empty()
        {
            return Some(key);
        }
        self.api_key.clone()
    }

    /// Returns `true` if this provider requires an API key.
    pub const fn requires_api_key(&self) -> bool {
        self.api_key.is_some() || self.api_key_env.is_some()
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.translation.target_language, "zh-TW");
        assert_eq!(settings.rate_limit.capacity, 20);
        assert_eq!(settings.throttle.max_concurrent_requests, 5);
        assert_eq!(settings.workers.pool_size, 4);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [cache]
            ttl_days = 7

            [display]
            show_original = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.cache.ttl_days, 7);
        assert_eq!(settings.cache.max_capacity, 100_000);
        assert!(settings.display.show_original);
        assert_eq!(settings.display.prefix, "[T] ");
    }

    #[test]
    fn test_cache_size_forms() {
        let fixed: CacheConfig = toml::from_str("max_size = 5000").unwrap();
        assert_eq!(fixed.max_size, CacheSize::Fixed(5000));
        assert_eq!(fixed.initial_capacity(), 5000);

        let adaptive: CacheConfig = toml::from_str(r#"max_size = "adaptive""#).unwrap();
        assert_eq!(adaptive.max_size, CacheSize::Adaptive);
        // 64 MiB budget: 2% / 200 bytes.
        assert_eq!(adaptive.initial_capacity(), 6710);

        assert!(toml::from_str::<CacheConfig>(r#"max_size = "huge""#).is_err());
    }

    #[test]
    fn test_settings_round_trip_through_toml() {
        let mut settings = Settings::default();
        settings.cache.max_size = CacheSize::Fixed(123);
        settings.codec.symbol_mode = SymbolMode::PreserveAll;
        settings.providers.insert(
            "openai".to_string(),
            ProviderConfig {
                endpoint: Some("http://localhost:11434".to_string()),
                model: Some("gemma3:12b".to_string()),
                ..ProviderConfig::default()
            },
        );

        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_throttle_conversion() {
        let throttle = ThrottleConfig::default().to_settings();
        assert_eq!(throttle.max_concurrent, 5);
        assert_eq!(throttle.min_interval, Duration::from_millis(100));
        assert_eq!(throttle.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_provider_requires_api_key() {
        let with_env = ProviderConfig {
            api_key_env: Some("API_KEY".to_string()),
            ..ProviderConfig::default()
        };
        assert!(with_env.requires_api_key());
        assert!(!ProviderConfig::default().requires_api_key());
    }
}
