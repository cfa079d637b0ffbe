//! Subcommand implementations.

/// Persistent cache inspection.
pub mod cache;

/// Config file display and creation.
pub mod config;

/// Provider listing.
pub mod providers;

/// Line-by-line translation of a file or stdin.
pub mod translate;
