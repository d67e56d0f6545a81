//! Voice Engine
//!
//! Facade used by the speech, console and UI collaborators. Owns every
//! component and passes configuration to each one explicitly.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::commands::Command;
use crate::config::Config;
use crate::core::parser::CommandParser;
use crate::error::MixResult;
use crate::learning::dictionary::{
    normalize_key, ConflictStrategy, DictionaryExport, DictionarySettings, DictionaryStatistics,
    ImportSummary, PersonalDictionary, UserResponse,
};
use crate::learning::history::{CommandHistory, ExecutedCommand};
use crate::learning::prompts::{
    LearningPromptData, LearningPromptOrchestrator, OrchestratorSettings, PromptAnalytics,
    PromptResponse,
};
use crate::learning::similarity::{SimilarCommand, SimilarityEngine};
use crate::learning::storage::DictionaryStorage;
use crate::mixer::{ChannelStateStore, ExecutionResult, MixerLimits, MixerStatistics};

/// Everything that happened for one finalized transcript
#[derive(Debug, Clone)]
pub struct TranscriptOutcome {
    pub transcript: String,
    /// Learned correction substituted before parsing
    pub applied_correction: Option<String>,
    pub commands: Vec<Command>,
    pub results: Vec<ExecutionResult>,
    /// Earlier failures this transcript appears to correct
    pub corrections: Vec<SimilarCommand>,
}

impl TranscriptOutcome {
    pub fn success(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.success)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatistics {
    pub processed: u64,
    pub successful: u64,
    pub mixer: MixerStatistics,
    pub dictionary: DictionaryStatistics,
    pub prompts: PromptAnalytics,
    pub similarity_budget_overruns: u64,
}

pub struct VoiceEngine {
    config: Config,
    parser: CommandParser,
    mixer: ChannelStateStore,
    similarity: Arc<SimilarityEngine>,
    history: Mutex<CommandHistory>,
    dictionary: Arc<PersonalDictionary>,
    prompts: LearningPromptOrchestrator,
    audit: AuditLog,
    console_connected: AtomicBool,
    /// One finalized transcript at a time
    transcript_gate: tokio::sync::Mutex<()>,
    processed: AtomicU64,
    successful: AtomicU64,
}

impl VoiceEngine {
    /// Build the engine; spawns the prompt orchestrator on the current runtime
    pub async fn new(config: Config, storage: Arc<dyn DictionaryStorage>) -> MixResult<Self> {
        config.validate()?;
        let similarity = Arc::new(SimilarityEngine::new(Duration::from_millis(
            config.similarity_budget_ms,
        )));
        let dictionary = Arc::new(
            PersonalDictionary::open(
                storage,
                similarity.clone(),
                DictionarySettings::from(&config),
            )
            .await?,
        );
        let prompts =
            LearningPromptOrchestrator::spawn(dictionary.clone(), OrchestratorSettings::from(&config));

        info!(
            "🎛️ Voice engine ready: {} channels, {} learned corrections",
            config.channel_count,
            dictionary.len().await
        );

        Ok(Self {
            parser: CommandParser::new(&config),
            mixer: ChannelStateStore::new(MixerLimits::from(&config)),
            history: Mutex::new(CommandHistory::new(config.history_size)),
            audit: AuditLog::from_config(&config),
            similarity,
            dictionary,
            prompts,
            console_connected: AtomicBool::new(false),
            transcript_gate: tokio::sync::Mutex::new(()),
            processed: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mixer(&self) -> &ChannelStateStore {
        &self.mixer
    }

    pub fn dictionary(&self) -> &Arc<PersonalDictionary> {
        &self.dictionary
    }

    pub fn prompts(&self) -> &LearningPromptOrchestrator {
        &self.prompts
    }

    /// Spoken label -> channel, including names given by voice
    pub fn target_labels(&self) -> HashMap<String, u32> {
        self.parser.resolver().labels()
    }

    pub fn parse_transcript(&self, text: &str, confidence: f64) -> Vec<Command> {
        self.parser.parse(text, confidence)
    }

    /// Execute against the console; a successful label makes the name a target
    pub fn execute_command(&self, command: &Command) -> ExecutionResult {
        let result = self.mixer.execute(command);
        if result.success {
            self.parser.remember_label(command);
        }
        result
    }

    pub fn record_attempt(&self, attempt: ExecutedCommand) {
        match self.history.lock() {
            Ok(mut history) => history.push(attempt),
            Err(e) => warn!("⚠️ Command history unavailable: {}", e),
        }
    }

    pub fn recent_attempts(&self) -> Vec<ExecutedCommand> {
        self.history
            .lock()
            .map(|h| h.entries())
            .unwrap_or_default()
    }

    /// Detect corrections for the latest attempt and queue prompts for them
    pub async fn check_for_corrections(&self) -> MixResult<Vec<SimilarCommand>> {
        let attempts = self.history.lock()?.entries();
        let window = Duration::from_secs(self.config.correction_window_secs);
        let candidates = self.similarity.find_corrections(&attempts, window);

        let mut corrections = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if self.already_learned(&candidate).await {
                debug!(
                    "Already learned '{}' -> '{}'",
                    candidate.original.text, candidate.corrected.text
                );
                continue;
            }
            corrections.push(candidate);
        }

        if !corrections.is_empty() {
            let prompts = corrections.iter().map(LearningPromptData::from).collect();
            self.prompts.enqueue(prompts).await?;
        }
        Ok(corrections)
    }

    async fn already_learned(&self, candidate: &SimilarCommand) -> bool {
        self.dictionary
            .get_entry(&candidate.original.text)
            .await
            .map_or(false, |entry| {
                normalize_key(&entry.corrected_command) == normalize_key(&candidate.corrected.text)
            })
    }

    pub async fn resolve_prompt(&self, id: Uuid, response: PromptResponse) -> MixResult<UserResponse> {
        self.prompts.respond(id, response).await
    }

    pub async fn export_dictionary(&self) -> DictionaryExport {
        self.dictionary.export_data().await
    }

    pub async fn import_dictionary(
        &self,
        data: DictionaryExport,
        strategy: ConflictStrategy,
    ) -> MixResult<ImportSummary> {
        let incoming = data.entries.len();
        let result = self.dictionary.import_data(data, strategy).await;
        match &result {
            Ok(summary) => self.audit.record(&format!(
                "DICTIONARY IMPORT ({:?}): {} entries, {} new, {} updated, {} skipped, {} evicted",
                strategy, incoming, summary.inserted, summary.updated, summary.skipped, summary.evicted
            )),
            Err(e) => self.audit.record(&format!(
                "DICTIONARY IMPORT ({:?}) FAILED: {}",
                strategy, e
            )),
        }
        result
    }

    pub async fn clear_dictionary(&self) -> MixResult<usize> {
        let removed = self.dictionary.clear_all().await?;
        self.audit
            .record(&format!("DICTIONARY CLEAR: {} entries removed", removed));
        Ok(removed)
    }

    /// Recorded on attempts and prompts as metadata only
    pub fn set_console_connected(&self, connected: bool) {
        let previous = self.console_connected.swap(connected, Ordering::Relaxed);
        if previous != connected {
            info!(
                "🔌 Console {}",
                if connected { "connected" } else { "disconnected" }
            );
        }
    }

    pub fn console_connected(&self) -> bool {
        self.console_connected.load(Ordering::Relaxed)
    }

    pub async fn statistics(&self) -> MixResult<EngineStatistics> {
        Ok(EngineStatistics {
            processed: self.processed.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            mixer: self.mixer.statistics(),
            dictionary: self.dictionary.statistics().await,
            prompts: self.prompts.state().await?.analytics,
            similarity_budget_overruns: self.similarity.budget_overruns(),
        })
    }

    /// Full pipeline for one finalized transcript
    pub async fn process_transcript(
        &self,
        transcript: &str,
        confidence: f64,
    ) -> MixResult<TranscriptOutcome> {
        let _gate = self.transcript_gate.lock().await;

        let applied_correction = self.dictionary.lookup_correction(transcript).await;
        let effective = match &applied_correction {
            Some(corrected) => {
                info!("📖 Using learned correction '{}' -> '{}'", transcript, corrected);
                if let Err(e) = self.dictionary.increment_usage(transcript).await {
                    warn!("⚠️ Could not record dictionary usage: {}", e);
                }
                corrected.as_str()
            }
            None => transcript,
        };

        let commands = self.parse_transcript(effective, confidence);
        let results: Vec<ExecutionResult> =
            commands.iter().map(|cmd| self.execute_command(cmd)).collect();

        let outcome_success = !results.is_empty() && results.iter().all(|r| r.success);
        self.processed.fetch_add(1, Ordering::Relaxed);
        if outcome_success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        }

        self.record_attempt(
            ExecutedCommand::new(transcript, outcome_success, confidence)
                .connected(self.console_connected()),
        );
        let corrections = self.check_for_corrections().await?;

        Ok(TranscriptOutcome {
            transcript: transcript.to_string(),
            applied_correction,
            commands,
            results,
            corrections,
        })
    }

    pub async fn shutdown(&self) -> MixResult<()> {
        self.prompts.shutdown().await
    }
}
