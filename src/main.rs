//! MixVoice - Voice Control for Mixing Consoles
//!
//! Reads finalized transcripts from stdin, one per line, and drives the
//! voice engine against a simulated console.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mixvoice::config::Config;
use mixvoice::learning::{
    ConflictStrategy, DictionaryExport, DictionaryStorage, LearningEvent, MemoryStorage,
    PromptResponse, SqliteStorage,
};
use mixvoice::VoiceEngine;

/// Confidence assumed for typed transcripts
const TYPED_CONFIDENCE: f64 = 0.9;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to an alternate config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep the personal dictionary in memory only
    #[arg(long)]
    memory: bool,

    /// Mark attempts as made while a console is connected
    #[arg(long)]
    connected: bool,
}

fn init_logging(verbose: bool, config: &Config) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(());
    }

    let level = if verbose {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    init_logging(args.verbose, &config)?;

    info!("🎛️ MixVoice v{} starting...", env!("CARGO_PKG_VERSION"));

    let storage: Arc<dyn DictionaryStorage> = if args.memory {
        info!("💾 Using in-memory dictionary");
        Arc::new(MemoryStorage::new())
    } else {
        Arc::new(SqliteStorage::new(&config.dictionary_db_path)?)
    };

    let engine = VoiceEngine::new(config, storage).await?;
    engine.set_console_connected(args.connected);

    // Render prompts as they come and go
    let mut events = engine.prompts().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                LearningEvent::PromptShown(prompt) => println!(
                    "💡 Did you mean '{}' when you said '{}'? (:accept / :reject / :ignore)",
                    prompt.corrected, prompt.original
                ),
                LearningEvent::PromptResolved { prompt, outcome, .. } => {
                    println!("   '{}' -> {:?}", prompt.original, outcome)
                }
                LearningEvent::EntryLearned(entry) => println!(
                    "📖 Learned '{}' -> '{}'",
                    entry.original_command, entry.corrected_command
                ),
                LearningEvent::LearningFailed { error, .. } => {
                    warn!("⚠️ Could not learn correction: {}", error)
                }
            }
        }
    });

    info!("✅ MixVoice ready - type a command");
    info!("   Try: 'mute channel 3', 'set channel 2 to -6 db', 'recall scene 4'");
    info!("        'label channel 5 as choir', 'mute dca 2', 'boost the highs on the vocals'");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":quit" {
            break;
        }
        if let Err(e) = handle_line(&engine, line).await {
            error!("❌ {}", e);
        }
    }

    engine.shutdown().await?;
    info!("👋 MixVoice stopped");
    Ok(())
}

async fn handle_line(engine: &VoiceEngine, line: &str) -> Result<()> {
    let mut parts = line.splitn(2, ' ');
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();

    match head {
        ":accept" | ":reject" | ":ignore" => {
            let response = match head {
                ":accept" => PromptResponse::Accept,
                ":reject" => PromptResponse::Reject,
                _ => PromptResponse::Ignore,
            };
            match engine.prompts().state().await?.showing {
                Some(prompt) => {
                    engine.resolve_prompt(prompt.id, response).await?;
                }
                None => println!("No prompt showing"),
            }
        }
        ":state" => {
            let channel: u32 = rest.parse().context("usage: :state <channel>")?;
            match engine.mixer().snapshot(channel) {
                Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
                None => println!("Channel {} is out of range", channel),
            }
        }
        ":dca" => {
            let dca: u32 = rest.parse().context("usage: :dca <number>")?;
            match engine.mixer().dca_snapshot(dca) {
                Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
                None => println!("Dca {} is out of range", dca),
            }
        }
        ":labels" => {
            let mut labels: Vec<(String, u32)> = engine.target_labels().into_iter().collect();
            labels.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            for (label, channel) in labels {
                println!("ch {:>2}  {}", channel, label);
            }
        }
        ":stats" => {
            let stats = engine.statistics().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        ":export" => {
            let export = engine.export_dictionary().await;
            println!("{}", serde_json::to_string_pretty(&export)?);
        }
        ":import" => {
            let content = std::fs::read_to_string(rest)
                .with_context(|| format!("could not read '{}'", rest))?;
            let data: DictionaryExport = serde_json::from_str(&content)?;
            let summary = engine
                .import_dictionary(data, ConflictStrategy::KeepNewer)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        ":clear" => {
            let removed = engine.clear_dictionary().await?;
            println!("Removed {} learned corrections", removed);
        }
        _ => {
            let outcome = engine.process_transcript(line, TYPED_CONFIDENCE).await?;
            if let Some(corrected) = &outcome.applied_correction {
                println!("📖 '{}' -> '{}'", outcome.transcript, corrected);
            }
            for result in &outcome.results {
                let marker = if result.success { "✅" } else { "❌" };
                println!("{} {}", marker, result.message);
            }
        }
    }
    Ok(())
}
