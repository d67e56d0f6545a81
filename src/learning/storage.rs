//! Dictionary persistence
//!
//! Entries are stored one record per key so no single value grows with the
//! size of the dictionary.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

use super::dictionary::PersonalDictionaryEntry;
use crate::error::{MixError, MixResult};

/// Backing store for the personal dictionary
#[async_trait]
pub trait DictionaryStorage: Send + Sync {
    /// Every decodable entry with its key
    async fn load_all(&self) -> MixResult<Vec<(String, PersonalDictionaryEntry)>>;

    /// Insert or replace one entry
    async fn put(&self, key: &str, entry: &PersonalDictionaryEntry) -> MixResult<()>;

    async fn delete(&self, key: &str) -> MixResult<()>;

    async fn clear(&self) -> MixResult<()>;

    /// Short name for logs
    fn name(&self) -> &str;
}

fn decode(key: &str, payload: &str) -> Option<PersonalDictionaryEntry> {
    match serde_json::from_str(payload) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("⚠️ Skipping undecodable dictionary entry {}: {}", key, e);
            None
        }
    }
}

fn encode(entry: &PersonalDictionaryEntry) -> MixResult<String> {
    serde_json::to_string(entry)
        .map_err(|e| MixError::Persistence(format!("could not encode entry {}: {}", entry.id, e)))
}

/// SQLite-backed storage, one row per dictionary key
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Open (and create if needed) the dictionary database
    pub fn new(db_path: impl AsRef<Path>) -> MixResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let storage = Self { db_path };
        storage.init_schema()?;
        info!("📖 Personal dictionary at {}", storage.db_path.display());
        Ok(storage)
    }

    fn init_schema(&self) -> MixResult<()> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS dictionary_entries (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run a blocking database operation off the async runtime
    async fn with_connection<T, F>(&self, op: F) -> MixResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> MixResult<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            op(&conn)
        })
        .await?
    }
}

#[async_trait]
impl DictionaryStorage for SqliteStorage {
    async fn load_all(&self) -> MixResult<Vec<(String, PersonalDictionaryEntry)>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key, payload FROM dictionary_entries")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (key, payload) = row?;
                if let Some(entry) = decode(&key, &payload) {
                    entries.push((key, entry));
                }
            }
            Ok(entries)
        })
        .await
    }

    async fn put(&self, key: &str, entry: &PersonalDictionaryEntry) -> MixResult<()> {
        let key = key.to_string();
        let payload = encode(entry)?;
        let updated_at = entry.last_used.to_rfc3339();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO dictionary_entries (key, payload, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![key, payload, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> MixResult<()> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM dictionary_entries WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> MixResult<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM dictionary_entries", [])?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// In-process storage for tests and `--memory` sessions
#[derive(Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store a raw payload, bypassing encoding
    pub fn insert_raw(&self, key: &str, payload: &str) -> MixResult<()> {
        self.records
            .lock()?
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn check_writable(&self) -> MixResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MixError::Persistence("storage rejected write".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DictionaryStorage for MemoryStorage {
    async fn load_all(&self) -> MixResult<Vec<(String, PersonalDictionaryEntry)>> {
        let records = self.records.lock()?;
        Ok(records
            .iter()
            .filter_map(|(key, payload)| decode(key, payload).map(|e| (key.clone(), e)))
            .collect())
    }

    async fn put(&self, key: &str, entry: &PersonalDictionaryEntry) -> MixResult<()> {
        self.check_writable()?;
        let payload = encode(entry)?;
        self.records.lock()?.insert(key.to_string(), payload);
        Ok(())
    }

    async fn delete(&self, key: &str) -> MixResult<()> {
        self.check_writable()?;
        self.records.lock()?.remove(key);
        Ok(())
    }

    async fn clear(&self) -> MixResult<()> {
        self.check_writable()?;
        self.records.lock()?.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
