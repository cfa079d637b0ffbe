//! Persistent cache inspection without starting the pipeline.

use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;

use crate::cache::{CacheEntry, CacheStore, SqliteStore};
use crate::config::ConfigManager;
use crate::paths;
use crate::ui::Style;

/// Counts of stored entries, overall and per target language.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub total: usize,
    pub expired: usize,
    pub bytes: usize,
    pub by_language: BTreeMap<String, usize>,
}

impl StoreSummary {
    pub fn from_entries(entries: &[CacheEntry], ttl: chrono::TimeDelta) -> Self {
        let now = Utc::now();
        let mut summary = Self {
            total: entries.len(),
            ..Self::default()
        };
        for entry in entries {
            if entry.is_expired(now, ttl) {
                summary.expired += 1;
            }
            summary.bytes += entry.estimated_size();
            *summary
                .by_language
                .entry(entry.target_language.clone())
                .or_default() += 1;
        }
        summary
    }
}

pub fn print_stats() -> Result<()> {
    let db_path = paths::cache_db_path()?;
    if !db_path.exists() {
        println!("No cache database at {}", Style::secondary(db_path.display()));
        return Ok(());
    }

    let settings = ConfigManager::new()?.load_or_default()?;
    let summary = summarize(&db_path, settings.cache.ttl())?;

    println!("{}", Style::header("Cache"));
    println!("  {} {}", Style::label("path:   "), Style::secondary(db_path.display()));
    println!("  {} {}", Style::label("entries:"), Style::value(summary.total));
    println!("  {} {}", Style::label("expired:"), Style::value(summary.expired));
    println!("  {} {}", Style::label("size:   "), Style::value(format_bytes(summary.bytes)));

    if !summary.by_language.is_empty() {
        println!();
        println!("{}", Style::header("By language"));
        for (language, count) in &summary.by_language {
            println!("  {}  {}", Style::code(format!("{language:<6}")), Style::value(count));
        }
    }

    Ok(())
}

pub fn clear() -> Result<()> {
    let db_path = paths::cache_db_path()?;
    if !db_path.exists() {
        println!("Cache is already empty");
        return Ok(());
    }

    let mut store = SqliteStore::open(&db_path)?;
    let removed = store.load_all()?.len();
    store.clear()?;
    println!("{}", Style::success(format!("Removed {removed} cached translations")));
    Ok(())
}

pub fn print_path() -> Result<()> {
    println!("{}", paths::cache_db_path()?.display());
    Ok(())
}

fn summarize(db_path: &Path, ttl: chrono::TimeDelta) -> Result<StoreSummary> {
    let mut store = SqliteStore::open(db_path)?;
    Ok(StoreSummary::from_entries(&store.load_all()?, ttl))
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / 1024.0 / 1024.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    fn entry(text: &str, lang: &str, age_days: i64) -> CacheEntry {
        let mut entry = CacheEntry::new(text, &format!("[{lang}] {text}"), lang, Utc::now());
        entry.created_at -= TimeDelta::days(age_days);
        entry
    }

    #[test]
    fn test_summary_counts_languages_and_expired() {
        let entries = vec![
            entry("Sword", "ja", 1),
            entry("Shield", "ja", 40),
            entry("Bow", "ko", 2),
        ];

        let summary = StoreSummary::from_entries(&entries, TimeDelta::days(30));

        assert_eq!(summary.total, 3);
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.by_language["ja"], 2);
        assert_eq!(summary.by_language["ko"], 1);
        assert!(summary.bytes > 0);
    }

    #[test]
    fn test_summarize_reads_store() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("translations.db");
        {
            let mut store = SqliteStore::open(&db_path).unwrap();
            let e = entry("Sword", "ja", 0);
            store.upsert(&e.key(), &e).unwrap();
        }

        let summary = summarize(&db_path, TimeDelta::days(30)).unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.expired, 0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
