#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

use mixvoice::config::Config;
use mixvoice::learning::{DictionaryStorage, LearningEvent, MemoryStorage, SqliteStorage};
use mixvoice::VoiceEngine;

/// Config isolated to a temp dir, with a short prompt debounce
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.audit_dir = dir.join("audit").to_string_lossy().into_owned();
    config.dictionary_db_path = dir.join("dictionary.db").to_string_lossy().into_owned();
    config.prompt_debounce_ms = 10;
    config.prompt_timeout_ms = 5000;
    config
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub engine: VoiceEngine,
}

impl TestContext {
    /// Engine backed by an in-memory dictionary
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let storage: Arc<dyn DictionaryStorage> = Arc::new(MemoryStorage::new());
        let engine = VoiceEngine::new(test_config(temp_dir.path()), storage)
            .await
            .expect("Failed to create engine");
        Self { temp_dir, engine }
    }

    pub fn audit_log(&self) -> String {
        let path = self.temp_dir.path().join("audit").join("audit.log");
        std::fs::read_to_string(path).unwrap_or_default()
    }
}

/// Engine persisting to the SQLite file configured for `dir`
pub async fn sqlite_engine(dir: &Path) -> VoiceEngine {
    let config = test_config(dir);
    let storage: Arc<dyn DictionaryStorage> =
        Arc::new(SqliteStorage::new(&config.dictionary_db_path).expect("Failed to open storage"));
    VoiceEngine::new(config, storage)
        .await
        .expect("Failed to create engine")
}

/// Wait for the first event matching `pick`
pub async fn wait_for<T>(
    events: &mut broadcast::Receiver<LearningEvent>,
    mut pick: impl FnMut(LearningEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(5), async move {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if let Some(found) = pick(event) {
                return found;
            }
        }
    })
    .await
    .expect("timed out waiting for learning event")
}
