//! Settings file, its runtime view and CLI override resolution.

mod manager;
mod settings;
mod source;

pub use manager::{ConfigManager, ResolveOptions, resolve_settings};
pub use settings::{
    CacheConfig, CacheSize, CodecConfig, DisplayConfig, FilterConfig, ProviderConfig,
    RateLimitConfig, Settings, ThrottleConfig, TranslationConfig, WorkerConfig,
};
pub use source::{ConfigSource, SharedConfig};
