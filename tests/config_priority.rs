#![allow(clippy::unwrap_used)]
//! Config priority contract tests.
//!
//! These tests verify that CLI options take priority over config file settings.
//! Priority order (highest to lowest):
//! 1. CLI arguments
//! 2. Config file values
//! 3. Built-in defaults

use tl_pipeline::config::{CacheSize, ProviderConfig, ResolveOptions, Settings, resolve_settings};

fn make_file_settings() -> Settings {
    let mut settings: Settings = toml::from_str(
        r#"
        [translation]
        target_language = "ko"
        provider = "openai"

        [cache]
        max_size = 5000
        persist = true

        [display]
        show_original = false
        prefix = ">> "
        "#,
    )
    .unwrap();
    settings.providers.insert(
        "openai".to_string(),
        ProviderConfig {
            endpoint: Some("http://localhost:11434".to_string()),
            api_key: Some("file-key".to_string()),
            ..ProviderConfig::default()
        },
    );
    settings
}

#[test]
fn test_cli_language_overrides_file() {
    let options = ResolveOptions {
        to: Some("ja".to_string()),
        ..ResolveOptions::default()
    };

    let resolved = resolve_settings(&options, &make_file_settings()).unwrap();

    assert_eq!(resolved.translation.target_language, "ja");
    assert_eq!(resolved.translation.provider, "openai");
}

#[test]
fn test_cli_provider_overrides_file() {
    let options = ResolveOptions {
        provider: Some("mock".to_string()),
        ..ResolveOptions::default()
    };

    let resolved = resolve_settings(&options, &make_file_settings()).unwrap();

    assert_eq!(resolved.translation.provider, "mock");
    assert_eq!(resolved.translation.target_language, "ko");
}

#[test]
fn test_cli_flags_only_turn_things_on() {
    let options = ResolveOptions {
        no_cache: true,
        show_original: true,
        ..ResolveOptions::default()
    };

    let resolved = resolve_settings(&options, &make_file_settings()).unwrap();

    assert!(!resolved.cache.persist);
    assert!(resolved.display.show_original);

    let untouched = resolve_settings(&ResolveOptions::default(), &make_file_settings()).unwrap();
    assert!(untouched.cache.persist);
    assert!(!untouched.display.show_original);
}

#[test]
fn test_file_values_override_defaults() {
    let resolved = resolve_settings(&ResolveOptions::default(), &make_file_settings()).unwrap();

    assert_eq!(resolved.cache.max_size, CacheSize::Fixed(5000));
    assert_eq!(resolved.display.prefix, ">> ");
}

#[test]
fn test_missing_sections_use_defaults() {
    let resolved = resolve_settings(&ResolveOptions::default(), &make_file_settings()).unwrap();
    let defaults = Settings::default();

    assert_eq!(resolved.cache.ttl_days, defaults.cache.ttl_days);
    assert_eq!(resolved.rate_limit, defaults.rate_limit);
    assert_eq!(resolved.throttle, defaults.throttle);
    assert_eq!(resolved.workers, defaults.workers);
}

#[test]
fn test_empty_provider_is_rejected() {
    let options = ResolveOptions {
        provider: Some("  ".to_string()),
        ..ResolveOptions::default()
    };

    let err = resolve_settings(&options, &make_file_settings()).unwrap_err();
    assert!(err.to_string().contains("provider"));
}

#[test]
fn test_invalid_file_language_is_rejected() {
    let mut settings = make_file_settings();
    settings.translation.target_language = "xx-invalid".to_string();

    let err = resolve_settings(&ResolveOptions::default(), &settings).unwrap_err();
    assert!(err.to_string().contains("Invalid language code"));
}
