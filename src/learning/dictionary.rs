//! Personal Dictionary
//!
//! Learned original -> corrected command pairs. Entries are keyed by a
//! SHA-256 of the normalized original text, cached in memory and written
//! through to a `DictionaryStorage`. The cache stays authoritative for the
//! session when a write fails.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::similarity::{SimilarityEngine, SimilarityResult};
use super::storage::DictionaryStorage;
use crate::config::Config;
use crate::error::{MixError, MixResult};

/// Format version written into exports
pub const EXPORT_VERSION: u32 = 1;

lazy_static! {
    static ref KEY_PUNCTUATION: Regex = Regex::new(r"[^a-z0-9\s\-.%+]").unwrap();
    static ref KEY_WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// How the user answered a learning prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserResponse {
    Accepted,
    Rejected,
    Ignored,
}

/// Conflict policy for bulk imports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    KeepExisting,
    KeepIncoming,
    #[default]
    KeepNewer,
    MergeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalDictionaryEntry {
    pub id: Uuid,
    pub original_command: String,
    pub corrected_command: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub use_count: u32,
    pub last_used: DateTime<Utc>,
    pub was_console_connected: bool,
    pub user_response: Option<UserResponse>,
}

impl PersonalDictionaryEntry {
    pub fn new(original: &str, corrected: &str, confidence: f64, console_connected: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            original_command: original.trim().to_string(),
            corrected_command: corrected.trim().to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            created_at: now,
            use_count: 1,
            last_used: now,
            was_console_connected: console_connected,
            user_response: None,
        }
    }

    pub fn with_response(mut self, response: UserResponse) -> Self {
        self.user_response = Some(response);
        self
    }

    pub fn key(&self) -> String {
        dictionary_key(&self.original_command)
    }

    /// Higher is more worth keeping
    pub fn eviction_score(&self, now: DateTime<Utc>) -> f64 {
        let days = (now - self.last_used).num_seconds().max(0) as f64 / 86_400.0;
        self.use_count as f64 * self.confidence / (1.0 + days)
    }

    /// Repeat of the same original: latest correction wins, usage accumulates
    fn absorb(&mut self, newer: &PersonalDictionaryEntry) {
        self.corrected_command = newer.corrected_command.clone();
        self.confidence = self.confidence.max(newer.confidence);
        self.use_count = self.use_count.saturating_add(1);
        self.was_console_connected |= newer.was_console_connected;
        if newer.user_response.is_some() {
            self.user_response = newer.user_response;
        }
        self.last_used = self.last_used.max(newer.last_used);
    }

    /// Bulk merge: usage counts are summed
    fn merge(&mut self, other: &PersonalDictionaryEntry) {
        let other_is_newer = other.last_used > self.last_used;
        if other_is_newer {
            self.corrected_command = other.corrected_command.clone();
            if other.user_response.is_some() {
                self.user_response = other.user_response;
            }
        }
        self.confidence = self.confidence.max(other.confidence);
        self.use_count = self.use_count.saturating_add(other.use_count);
        self.was_console_connected |= other.was_console_connected;
        self.created_at = self.created_at.min(other.created_at);
        self.last_used = self.last_used.max(other.last_used);
    }

    /// Repair invariants on entries from outside this process
    fn sanitized(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.use_count = self.use_count.max(1);
        self
    }
}

/// Lowercase, punctuation-free, single-spaced form used for keys
pub fn normalize_key(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = KEY_PUNCTUATION.replace_all(&lower, " ");
    KEY_WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Storage key for an original command
pub fn dictionary_key(original: &str) -> String {
    format!("{:x}", Sha256::digest(normalize_key(original).as_bytes()))
}

/// Backup / sync payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub entries: Vec<PersonalDictionaryEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DictionaryStatistics {
    pub total_entries: usize,
    pub total_uses: u64,
    pub average_confidence: f64,
    pub most_used: Option<PersonalDictionaryEntry>,
    pub console_connected_entries: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct DictionarySettings {
    pub max_entries: usize,
    /// Minimum confidence for a learned correction to be applied
    pub min_lookup_confidence: f64,
}

impl From<&Config> for DictionarySettings {
    fn from(config: &Config) -> Self {
        Self {
            max_entries: config.dictionary_max_entries.max(1),
            min_lookup_confidence: config.learned_correction_min_confidence,
        }
    }
}

impl Default for DictionarySettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Concurrency-safe personal dictionary with write-through persistence
pub struct PersonalDictionary {
    storage: Arc<dyn DictionaryStorage>,
    cache: RwLock<HashMap<String, PersonalDictionaryEntry>>,
    /// Serializes writers; readers only take the cache lock
    writer: Mutex<()>,
    similarity: Arc<SimilarityEngine>,
    settings: DictionarySettings,
}

impl PersonalDictionary {
    /// Load every stored entry into the cache
    pub async fn open(
        storage: Arc<dyn DictionaryStorage>,
        similarity: Arc<SimilarityEngine>,
        settings: DictionarySettings,
    ) -> MixResult<Self> {
        let loaded = storage.load_all().await?;
        let mut cache = HashMap::with_capacity(loaded.len());
        for (_, entry) in loaded {
            let entry = entry.sanitized();
            // Keys are recomputed so a changed normalization never strands entries
            cache.insert(entry.key(), entry);
        }
        info!(
            "📚 Loaded {} learned corrections from {} storage",
            cache.len(),
            storage.name()
        );

        Ok(Self {
            storage,
            cache: RwLock::new(cache),
            writer: Mutex::new(()),
            similarity,
            settings,
        })
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Add a correction, merging with an existing entry for the same original
    pub async fn add_entry(
        &self,
        entry: PersonalDictionaryEntry,
    ) -> MixResult<PersonalDictionaryEntry> {
        let _writer = self.writer.lock().await;
        let entry = entry.sanitized();
        let key = entry.key();

        let stored = {
            let mut cache = self.cache.write().await;
            match cache.get_mut(&key) {
                Some(existing) => {
                    existing.absorb(&entry);
                    existing.clone()
                }
                None => {
                    cache.insert(key.clone(), entry.clone());
                    entry
                }
            }
        };

        info!(
            "📚 Learned: '{}' -> '{}' (used {}x)",
            stored.original_command, stored.corrected_command, stored.use_count
        );

        let persisted = self.storage.put(&key, &stored).await;
        let evicted = self.evict_overflow(Some(&key)).await;
        persisted?;
        evicted?;
        Ok(stored)
    }

    pub async fn get_entry(&self, original: &str) -> Option<PersonalDictionaryEntry> {
        self.cache.read().await.get(&dictionary_key(original)).cloned()
    }

    /// Learned correction for an exact original, if confident enough
    pub async fn lookup_correction(&self, text: &str) -> Option<String> {
        let entry = self.get_entry(text).await?;
        if entry.confidence < self.settings.min_lookup_confidence {
            debug!(
                "Learned correction for '{}' below threshold ({:.2})",
                text, entry.confidence
            );
            return None;
        }
        if entry.user_response == Some(UserResponse::Rejected) {
            return None;
        }
        Some(entry.corrected_command)
    }

    /// Stored entries whose original is similar to `command`, best first
    pub async fn find_similar_entries(
        &self,
        command: &str,
    ) -> Vec<(PersonalDictionaryEntry, SimilarityResult)> {
        let cache = self.cache.read().await;
        let mut matches: Vec<(PersonalDictionaryEntry, SimilarityResult)> = cache
            .values()
            .filter_map(|entry| {
                let result = self
                    .similarity
                    .calculate_similarity(&entry.original_command, command);
                result.is_match().then(|| (entry.clone(), result))
            })
            .collect();
        matches.sort_by(|a, b| b.1.similarity().total_cmp(&a.1.similarity()));
        matches
    }

    /// Record another use of a learned correction
    pub async fn increment_usage(
        &self,
        original: &str,
    ) -> MixResult<Option<PersonalDictionaryEntry>> {
        let _writer = self.writer.lock().await;
        let key = dictionary_key(original);

        let updated = {
            let mut cache = self.cache.write().await;
            match cache.get_mut(&key) {
                Some(entry) => {
                    entry.use_count = entry.use_count.saturating_add(1);
                    entry.last_used = Utc::now();
                    entry.clone()
                }
                None => return Ok(None),
            }
        };

        self.storage.put(&key, &updated).await?;
        Ok(Some(updated))
    }

    pub async fn remove_entry(&self, original: &str) -> MixResult<bool> {
        let _writer = self.writer.lock().await;
        let key = dictionary_key(original);
        let removed = self.cache.write().await.remove(&key).is_some();
        if removed {
            self.storage.delete(&key).await?;
            info!("🗑️ Forgot correction for '{}'", original);
        }
        Ok(removed)
    }

    /// Remove everything; returns how many entries were dropped
    pub async fn clear_all(&self) -> MixResult<usize> {
        let _writer = self.writer.lock().await;
        let count = {
            let mut cache = self.cache.write().await;
            let count = cache.len();
            cache.clear();
            count
        };
        self.storage.clear().await?;
        warn!("🗑️ Personal dictionary cleared ({} entries)", count);
        Ok(count)
    }

    pub async fn export_data(&self) -> DictionaryExport {
        let cache = self.cache.read().await;
        let mut entries: Vec<PersonalDictionaryEntry> = cache.values().cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        DictionaryExport {
            version: EXPORT_VERSION,
            exported_at: Utc::now(),
            entries,
        }
    }

    /// Merge a backup into the dictionary under the given conflict strategy
    pub async fn import_data(
        &self,
        data: DictionaryExport,
        strategy: ConflictStrategy,
    ) -> MixResult<ImportSummary> {
        if data.version > EXPORT_VERSION {
            return Err(MixError::Persistence(format!(
                "unsupported dictionary export version {}",
                data.version
            )));
        }

        let _writer = self.writer.lock().await;
        let mut summary = ImportSummary::default();
        let mut changed: Vec<(String, PersonalDictionaryEntry)> = Vec::new();

        {
            let mut cache = self.cache.write().await;
            for incoming in data.entries {
                let incoming = incoming.sanitized();
                let key = incoming.key();

                let Some(existing) = cache.get_mut(&key) else {
                    cache.insert(key.clone(), incoming.clone());
                    changed.push((key, incoming));
                    summary.inserted += 1;
                    continue;
                };

                let replace = match strategy {
                    ConflictStrategy::KeepExisting => false,
                    ConflictStrategy::KeepIncoming => true,
                    ConflictStrategy::KeepNewer => incoming.last_used > existing.last_used,
                    ConflictStrategy::MergeData => {
                        existing.merge(&incoming);
                        changed.push((key, existing.clone()));
                        summary.updated += 1;
                        continue;
                    }
                };

                if replace {
                    *existing = incoming.clone();
                    changed.push((key, incoming));
                    summary.updated += 1;
                } else {
                    summary.skipped += 1;
                }
            }
        }

        let mut failures = 0;
        for (key, entry) in &changed {
            if let Err(e) = self.storage.put(key, entry).await {
                warn!("⚠️ Failed to persist imported entry {}: {}", entry.id, e);
                failures += 1;
            }
        }

        summary.evicted = self.evict_overflow(None).await?;
        info!(
            "📥 Imported dictionary ({:?}): {} new, {} updated, {} skipped, {} evicted",
            strategy, summary.inserted, summary.updated, summary.skipped, summary.evicted
        );

        if failures > 0 {
            return Err(MixError::Persistence(format!(
                "{} of {} imported entries were not persisted",
                failures,
                changed.len()
            )));
        }
        Ok(summary)
    }

    pub async fn statistics(&self) -> DictionaryStatistics {
        let cache = self.cache.read().await;
        if cache.is_empty() {
            return DictionaryStatistics::default();
        }

        let total_entries = cache.len();
        let total_uses = cache.values().map(|e| e.use_count as u64).sum();
        let average_confidence =
            cache.values().map(|e| e.confidence).sum::<f64>() / total_entries as f64;

        DictionaryStatistics {
            total_entries,
            total_uses,
            average_confidence,
            most_used: cache.values().max_by_key(|e| e.use_count).cloned(),
            console_connected_entries: cache.values().filter(|e| e.was_console_connected).count(),
            oldest_entry: cache.values().map(|e| e.created_at).min(),
            newest_entry: cache.values().map(|e| e.created_at).max(),
        }
    }

    /// Drop the lowest-scoring entries once above the cap, plus a buffer.
    /// `keep` is never evicted.
    async fn evict_overflow(&self, keep: Option<&str>) -> MixResult<usize> {
        let max = self.settings.max_entries;
        let victims: Vec<String> = {
            let mut cache = self.cache.write().await;
            if cache.len() <= max {
                return Ok(0);
            }

            let buffer = (max / 10).max(1);
            let count = (cache.len() - max + buffer).min(cache.len());
            let now = Utc::now();

            let mut scored: Vec<(String, f64)> = cache
                .iter()
                .filter(|(key, _)| Some(key.as_str()) != keep)
                .map(|(key, entry)| (key.clone(), entry.eviction_score(now)))
                .collect();
            scored.sort_by(|a, b| a.1.total_cmp(&b.1));

            let victims: Vec<String> = scored.into_iter().take(count).map(|(k, _)| k).collect();
            for key in &victims {
                cache.remove(key);
            }
            victims
        };

        info!("🧹 Evicted {} stale dictionary entries", victims.len());
        for key in &victims {
            self.storage.delete(key).await?;
        }
        Ok(victims.len())
    }
}
