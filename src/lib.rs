//! # tlp - Game Text Translation Pipeline
//!
//! `tlp` translates short, formatting-heavy game text (item names, chat
//! lines, tooltips) through a pipeline that protects markup, caches results,
//! and keeps request volume within provider limits.
//!
//! ## Pipeline
//!
//! - **Marker codec**: formatting codes, glyphs and symbols are swapped for
//!   numbered markers before translation and restored afterwards
//! - **Translation cache**: TTL-bound, optionally persisted to `SQLite`,
//!   sized by an adaptive optimizer
//! - **Rate limiter and throttler**: a token bucket plus in-flight
//!   deduplication of identical texts
//! - **Priority queue**: a worker pool serving critical text before
//!   background preloads
//! - **Providers**: Google, OpenAI-compatible, Gemini, and a mock for tests
//!
//! ## Quick Start
//!
//! ```bash
//! # Translate a file line by line
//! tlp ./lore.txt
//!
//! # Translate from stdin
//! cat chat.log | tlp --to ja
//!
//! # Inspect the persistent cache
//! tlp cache stats
//! ```
//!
//! ## Configuration
//!
//! Settings are stored in `~/.config/tlp/config.toml`:
//!
//! ```toml
//! [translation]
//! target_language = "zh-TW"
//! provider = "openai"
//!
//! [cache]
//! max_size = "adaptive"
//! ttl_days = 30
//!
//! [providers.openai]
//! endpoint = "http://localhost:11434"
//! model = "gemma3:12b"
//! ```
//!
//! ## Library use
//!
//! ```no_run
//! use std::sync::Arc;
//! use tl_pipeline::config::{Settings, SharedConfig};
//! use tl_pipeline::pipeline::TranslationService;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Arc::new(SharedConfig::new(Settings::default()));
//! let service = TranslationService::builder(config).build()?;
//! let text = service.translate("§6Sword of Light").await;
//! service.shutdown().await;
//! # let _ = text;
//! # Ok(())
//! # }
//! ```

/// Translation cache, persistence and capacity optimizer.
pub mod cache;

/// Command-line interface definitions and handlers.
pub mod cli;

/// Marker encoding of formatting codes, glyphs and symbols.
pub mod codec;

/// Configuration file management and runtime settings.
pub mod config;

/// Error types shared across the pipeline.
pub mod error;

/// File system utilities.
pub mod fs;

/// Input reading from files and stdin.
pub mod input;

/// Supported languages and script detection.
pub mod language;

/// Token-bucket rate limiting and request throttling.
pub mod limiter;

/// Diagnostic logging setup.
pub mod logging;

/// XDG-style path utilities for configuration and cache.
pub mod paths;

/// Request orchestration and the host-facing service.
pub mod pipeline;

/// Translation backends.
pub mod provider;

/// Priority task queue and worker pool.
pub mod queue;

/// Periodic maintenance jobs.
pub mod scheduler;

/// Terminal UI components (spinner, colors).
pub mod ui;
