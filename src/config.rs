use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{MixError, MixResult};

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Console
    pub channel_count: u32,
    pub max_scene: u32,
    pub fader_min_db: f64,
    pub fader_max_db: f64,
    pub gain_min_db: f64,
    pub gain_max_db: f64,
    pub send_min_db: f64,
    pub send_max_db: f64,
    pub fader_step_db: f64,
    pub gain_step_db: f64,
    pub pan_step: f64,
    pub dca_count: u32,
    pub eq_step_db: f64,

    // Parser
    pub min_command_confidence: f64,
    pub max_transcript_length: usize,
    pub channel_labels: HashMap<String, u32>,
    pub voice_corrections: HashMap<String, String>,

    // Learning
    pub history_size: usize,
    pub correction_window_secs: u64,
    pub similarity_budget_ms: u64,
    pub prompt_timeout_ms: u64,
    pub prompt_debounce_ms: u64,
    pub dictionary_max_entries: usize,
    pub dictionary_db_path: String,
    pub learned_correction_min_confidence: f64,

    // Audit
    pub audit_enabled: bool,
    pub audit_dir: String,

    // Meta
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_count: 64,
            max_scene: 100,
            fader_min_db: -60.0,
            fader_max_db: 10.0,
            gain_min_db: -6.0,
            gain_max_db: 66.0,
            send_min_db: -60.0,
            send_max_db: 10.0,
            fader_step_db: 3.0,
            gain_step_db: 3.0,
            pan_step: 25.0,
            dca_count: 8,
            eq_step_db: 3.0,

            min_command_confidence: 0.3,
            max_transcript_length: 200,
            channel_labels: HashMap::new(),
            voice_corrections: HashMap::from([
                ("too".to_string(), "to".to_string()),
                ("mutes".to_string(), "mute".to_string()),
                ("chanel".to_string(), "channel".to_string()),
                ("fate".to_string(), "fader".to_string()),
            ]),

            history_size: 20,
            correction_window_secs: 30,
            similarity_budget_ms: 100,
            prompt_timeout_ms: 3000,
            prompt_debounce_ms: 300,
            dictionary_max_entries: 500,
            dictionary_db_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mixvoice/dictionary.db")
                .to_string_lossy()
                .to_string(),
            learned_correction_min_confidence: 0.6,

            audit_enabled: true,
            audit_dir: dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from(".config"))
                .join("mixvoice")
                .to_string_lossy()
                .to_string(),

            log_level: "INFO".to_string(),
        }
    }
}

impl Config {
    /// Load config from the default location, or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load config from an explicit path with graceful degradation
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Config>(&content) {
            Ok(config) => {
                config.validate()?;
                Ok(config)
            }
            Err(e) => {
                tracing::warn!("⚠️ Config file corrupted or invalid, using defaults: {}", e);
                let backup_path = path.with_extension("json.corrupt");
                let _ = std::fs::rename(path, &backup_path);
                Ok(Self::default())
            }
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject ranges and steps that would make clamping meaningless
    pub fn validate(&self) -> MixResult<()> {
        let ranges = [
            ("fader", self.fader_min_db, self.fader_max_db),
            ("gain", self.gain_min_db, self.gain_max_db),
            ("send", self.send_min_db, self.send_max_db),
        ];
        for (name, min, max) in ranges {
            if !(min.is_finite() && max.is_finite() && min < max) {
                return Err(MixError::Config(format!(
                    "{} range is empty or not finite: {} .. {}",
                    name, min, max
                )));
            }
        }

        let steps = [
            ("fader_step_db", self.fader_step_db),
            ("gain_step_db", self.gain_step_db),
            ("pan_step", self.pan_step),
            ("eq_step_db", self.eq_step_db),
        ];
        for (name, step) in steps {
            if !(step.is_finite() && step >= 0.0) {
                return Err(MixError::Config(format!("{} must be finite and not negative", name)));
            }
        }

        if self.channel_count == 0 {
            return Err(MixError::Config("channel_count must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mixvoice")
        .join("config.json")
}
