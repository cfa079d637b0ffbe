//! XDG-style path utilities for configuration and cache directories.
//!
//! XDG Base Directory conventions are preferred over OS-specific locations
//! on every platform.

use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "tlp";

/// Returns the configuration directory.
///
/// Resolution order:
/// 1. `$XDG_CONFIG_HOME/tlp` if `XDG_CONFIG_HOME` is set
/// 2. `~/.config/tlp` otherwise
pub fn config_dir() -> Result<PathBuf> {
    match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => Ok(PathBuf::from(xdg).join(APP_DIR)),
        _ => Ok(home_dir()?.join(".config").join(APP_DIR)),
    }
}

/// Returns the cache directory.
///
/// Resolution order:
/// 1. `$XDG_CACHE_HOME/tlp` if `XDG_CACHE_HOME` is set
/// 2. `~/.cache/tlp` otherwise
pub fn cache_dir() -> Result<PathBuf> {
    match std::env::var("XDG_CACHE_HOME") {
        Ok(xdg) if !xdg.is_empty() => Ok(PathBuf::from(xdg).join(APP_DIR)),
        _ => Ok(home_dir()?.join(".cache").join(APP_DIR)),
    }
}

/// Path of the durable translation cache.
pub fn cache_db_path() -> Result<PathBuf> {
    Ok(cache_dir()?.join("translations.db"))
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context(
        "Failed to determine home directory\n\n\
         Set XDG_CONFIG_HOME and XDG_CACHE_HOME to choose the directories explicitly.",
    )
}
