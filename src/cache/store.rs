use anyhow::{Context, Result};
use chrono::DateTime;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::entry::CacheEntry;

/// Durable backing storage for the translation cache.
pub trait CacheStore: Send + 'static {
    fn load_all(&mut self) -> Result<Vec<CacheEntry>>;
    fn upsert(&mut self, key: &str, entry: &CacheEntry) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
    /// Replaces the stored contents with `entries`.
    fn replace_all(&mut self, entries: &[(String, CacheEntry)]) -> Result<()>;
}

/// `SQLite` table of cache entries.
pub struct SqliteStore {
    db_path: PathBuf,
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database at `db_path`.
    ///
    /// A file that is not a usable database is moved aside to
    /// `<name>.corrupt` and replaced by an empty one.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        match Self::connect_and_init(&db_path) {
            Ok(conn) => Ok(Self { db_path, conn }),
            Err(e) => {
                let quarantine = quarantine_path(&db_path);
                warn!(
                    path = %db_path.display(),
                    error = %e,
                    "Cache database is unreadable, starting with an empty cache"
                );
                std::fs::rename(&db_path, &quarantine).with_context(|| {
                    format!("Failed to move corrupt cache aside: {}", db_path.display())
                })?;
                let conn = Self::connect_and_init(&db_path)?;
                Ok(Self { db_path, conn })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect_and_init(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open cache database: {}", db_path.display()))?;

        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to configure cache database")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS translations (
                cache_key TEXT PRIMARY KEY NOT NULL,
                source_text TEXT NOT NULL,
                translated_text TEXT NOT NULL,
                target_language TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )
        .context("Failed to create translations table")?;

        Ok(conn)
    }
}

impl CacheStore for SqliteStore {
    fn load_all(&mut self) -> Result<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_text, translated_text, target_language, created_at FROM translations",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (source_text, translated_text, target_language, created_at) =
                row.context("Failed to read cached translation")?;
            let Some(created_at) = DateTime::from_timestamp_millis(created_at) else {
                debug!(created_at, "Skipping cache row with invalid timestamp");
                continue;
            };
            entries.push(CacheEntry {
                source_text,
                translated_text,
                target_language,
                created_at,
            });
        }

        Ok(entries)
    }

    fn upsert(&mut self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO translations
                 (cache_key, source_text, translated_text, target_language, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    key,
                    entry.source_text,
                    entry.translated_text,
                    entry.target_language,
                    entry.created_at.timestamp_millis(),
                ],
            )
            .context("Failed to insert translation into cache")?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM translations WHERE cache_key = ?1", [key])
            .context("Failed to delete cached translation")?;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.conn
            .execute("DELETE FROM translations", [])
            .context("Failed to clear cache")?;
        Ok(())
    }

    fn replace_all(&mut self, entries: &[(String, CacheEntry)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM translations", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO translations
                 (cache_key, source_text, translated_text, target_language, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (key, entry) in entries {
                stmt.execute(params![
                    key,
                    entry.source_text,
                    entry.translated_text,
                    entry.target_language,
                    entry.created_at.timestamp_millis(),
                ])?;
            }
        }
        tx.commit().context("Failed to save cache snapshot")?;
        Ok(())
    }
}

fn quarantine_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    db_path.with_file_name(name)
}

enum StoreOp {
    Upsert(String, CacheEntry),
    Remove(String),
    Clear,
    Snapshot(Vec<(String, CacheEntry)>),
    Flush(oneshot::Sender<()>),
}

/// Applies store mutations on a dedicated thread so cache calls never wait on disk.
///
/// Failures are logged and the mutation is dropped; the in-memory cache stays authoritative.
pub struct StoreWriter {
    tx: Mutex<Option<mpsc::UnboundedSender<StoreOp>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StoreWriter {
    pub fn spawn(mut store: Box<dyn CacheStore>) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<StoreOp>();

        let handle = std::thread::Builder::new()
            .name("tl-cache-writer".to_string())
            .spawn(move || {
                while let Some(op) = rx.blocking_recv() {
                    let result = match op {
                        StoreOp::Upsert(key, entry) => store.upsert(&key, &entry),
                        StoreOp::Remove(key) => store.remove(&key),
                        StoreOp::Clear => store.clear(),
                        StoreOp::Snapshot(entries) => store.replace_all(&entries),
                        StoreOp::Flush(done) => {
                            let _ = done.send(());
                            Ok(())
                        }
                    };
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to persist cache change");
                    }
                }
                debug!("Cache writer stopped");
            })
            .context("Failed to start cache writer thread")?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    fn send(&self, op: StoreOp) {
        let sent = self
            .tx
            .lock()
            .ok()
            .and_then(|tx| tx.as_ref().map(|tx| tx.send(op).is_ok()));
        if sent != Some(true) {
            debug!("Cache writer already stopped, dropping change");
        }
    }

    pub fn upsert(&self, key: String, entry: CacheEntry) {
        self.send(StoreOp::Upsert(key, entry));
    }

    pub fn remove(&self, key: String) {
        self.send(StoreOp::Remove(key));
    }

    pub fn clear(&self) {
        self.send(StoreOp::Clear);
    }

    pub fn snapshot(&self, entries: Vec<(String, CacheEntry)>) {
        self.send(StoreOp::Snapshot(entries));
    }

    /// Waits until every change sent so far has been applied.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.send(StoreOp::Flush(done));
        let _ = wait.await;
    }

    /// Applies pending changes and stops the writer thread. Later changes are dropped.
    pub async fn close(&self) {
        // Dropping the sender ends the thread's receive loop once the queue drains.
        let tx = self.tx.lock().ok().and_then(|mut tx| tx.take());
        drop(tx);

        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle
            && tokio::task::spawn_blocking(move || handle.join())
                .await
                .is_err()
        {
            warn!("Cache writer thread did not stop cleanly");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn create_test_store(temp_dir: &TempDir) -> SqliteStore {
        SqliteStore::open(temp_dir.path().join("translations.db")).unwrap()
    }

    fn create_test_entry(source: &str, lang: &str) -> CacheEntry {
        let created_at = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
        CacheEntry::new(source, format!("{source} ({lang})"), lang, created_at)
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = create_test_store(&temp_dir);
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_round_trips_every_field() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = create_test_store(&temp_dir);
        let entry = create_test_entry("Hello, World!", "ja");

        store.upsert(&entry.key(), &entry).unwrap();

        let mut reopened = create_test_store(&temp_dir);
        assert_eq!(reopened.load_all().unwrap(), vec![entry]);
    }

    #[test]
    fn test_upsert_replaces_existing_key() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = create_test_store(&temp_dir);
        let first = create_test_entry("Hello", "ja");
        let mut second = first.clone();
        second.translated_text = "やあ".to_string();

        store.upsert(&first.key(), &first).unwrap();
        store.upsert(&second.key(), &second).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].translated_text, "やあ");
    }

    #[test]
    fn test_remove_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = create_test_store(&temp_dir);
        let a = create_test_entry("a", "ja");
        let b = create_test_entry("b", "ja");
        store.upsert(&a.key(), &a).unwrap();
        store.upsert(&b.key(), &b).unwrap();

        store.remove(&a.key()).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![b]);

        store.clear().unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_replace_all() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = create_test_store(&temp_dir);
        let stale = create_test_entry("stale", "ja");
        store.upsert(&stale.key(), &stale).unwrap();

        let fresh = create_test_entry("fresh", "zh");
        store.replace_all(&[(fresh.key(), fresh.clone())]).unwrap();

        assert_eq!(store.load_all().unwrap(), vec![fresh]);
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("translations.db");
        std::fs::write(&db_path, "this is not a sqlite database, just some text padding it out")
            .unwrap();

        let mut store = SqliteStore::open(&db_path).unwrap();

        assert!(store.load_all().unwrap().is_empty());
        assert!(temp_dir.path().join("translations.db.corrupt").exists());
    }

    #[tokio::test]
    async fn test_writer_applies_changes_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);
        let writer = StoreWriter::spawn(Box::new(store)).unwrap();

        let a = create_test_entry("a", "ja");
        let b = create_test_entry("b", "ja");
        writer.upsert(a.key(), a.clone());
        writer.upsert(b.key(), b);
        writer.remove(a.key());
        writer.close().await;

        let loaded = create_test_store(&temp_dir).load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].source_text, "b");
    }
}
