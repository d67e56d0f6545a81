mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use common::{sqlite_engine, test_config, wait_for, TestContext};
use mixvoice::commands::ChannelOperation;
use mixvoice::learning::{
    ConflictStrategy, DictionaryStorage, ExecutedCommand, LearningEvent, MemoryStorage,
    PersonalDictionaryEntry, PromptResponse, UserResponse,
};
use mixvoice::{MixError, VoiceEngine};

const MISHEARD: &str = "sit channel 3 to -6 db";
const CORRECTED: &str = "set channel 3 to -6 db";

#[tokio::test]
async fn test_fader_command_end_to_end() {
    let ctx = TestContext::new().await;
    let outcome = ctx.engine.process_transcript(CORRECTED, 0.9).await.unwrap();

    assert!(outcome.success());
    assert!(outcome.applied_correction.is_none());
    assert_eq!(outcome.commands.len(), 1);
    assert!(outcome.results[0].message.contains("-6.0 dB"));

    let state = ctx.engine.mixer().snapshot(3).unwrap();
    assert_eq!(state.fader_level, -6.0);
    assert_eq!(ctx.engine.recent_attempts().last().map(|a| a.success), Some(true));
}

#[tokio::test]
async fn test_compound_command_shares_group() {
    let ctx = TestContext::new().await;
    let outcome = ctx
        .engine
        .process_transcript("mute channel 3 and solo", 0.9)
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.success());
    let group = outcome.commands[0].compound_group_id;
    assert!(group.is_some());
    assert!(outcome.commands.iter().all(|c| c.compound_group_id == group));

    let state = ctx.engine.mixer().snapshot(3).unwrap();
    assert!(state.is_muted);
    assert!(state.is_soloed);
}

#[tokio::test]
async fn test_failed_attempt_is_recorded() {
    let ctx = TestContext::new().await;
    let outcome = ctx.engine.process_transcript(MISHEARD, 0.9).await.unwrap();

    assert!(!outcome.success());
    let last = ctx.engine.recent_attempts().pop().unwrap();
    assert_eq!(last.text, MISHEARD);
    assert!(!last.success);
}

#[tokio::test]
async fn test_correction_is_learned_and_applied() {
    let ctx = TestContext::new().await;
    let engine = &ctx.engine;
    let mut events = engine.prompts().subscribe();

    let now = Utc::now();
    engine.record_attempt(
        ExecutedCommand::new(MISHEARD, false, 0.9).at(now - ChronoDuration::seconds(5)),
    );
    engine.record_attempt(ExecutedCommand::new(CORRECTED, true, 0.9).at(now));

    let corrections = engine.check_for_corrections().await.unwrap();
    assert_eq!(corrections.len(), 1);
    assert_eq!(corrections[0].original.text, MISHEARD);
    assert_eq!(corrections[0].distance, 1);

    let prompt = wait_for(&mut events, |event| match event {
        LearningEvent::PromptShown(prompt) => Some(prompt),
        _ => None,
    })
    .await;
    assert_eq!(prompt.original, MISHEARD);
    assert_eq!(prompt.corrected, CORRECTED);

    let response = engine
        .resolve_prompt(prompt.id, PromptResponse::Accept)
        .await
        .unwrap();
    assert_eq!(response, UserResponse::Accepted);

    let entry = engine.dictionary().get_entry(MISHEARD).await.unwrap();
    assert_eq!(entry.corrected_command, CORRECTED);
    assert_eq!(entry.user_response, Some(UserResponse::Accepted));

    // Already learned, so no second prompt for the same pair
    assert!(engine.check_for_corrections().await.unwrap().is_empty());

    let outcome = engine.process_transcript(MISHEARD, 0.9).await.unwrap();
    assert_eq!(outcome.applied_correction.as_deref(), Some(CORRECTED));
    assert!(outcome.success());
    assert_eq!(engine.mixer().snapshot(3).unwrap().fader_level, -6.0);
    assert_eq!(engine.recent_attempts().pop().unwrap().text, MISHEARD);

    let used = engine.dictionary().get_entry(MISHEARD).await.unwrap();
    assert_eq!(used.use_count, entry.use_count + 1);
}

#[tokio::test]
async fn test_rejected_correction_is_not_learned() {
    let ctx = TestContext::new().await;
    let engine = &ctx.engine;
    let mut events = engine.prompts().subscribe();

    let now = Utc::now();
    engine.record_attempt(
        ExecutedCommand::new(MISHEARD, false, 0.9).at(now - ChronoDuration::seconds(3)),
    );
    engine.record_attempt(ExecutedCommand::new(CORRECTED, true, 0.9).at(now));
    engine.check_for_corrections().await.unwrap();

    let prompt = wait_for(&mut events, |event| match event {
        LearningEvent::PromptShown(prompt) => Some(prompt),
        _ => None,
    })
    .await;
    engine
        .resolve_prompt(prompt.id, PromptResponse::Reject)
        .await
        .unwrap();

    assert!(engine.dictionary().get_entry(MISHEARD).await.is_none());
    let again = engine.resolve_prompt(prompt.id, PromptResponse::Accept).await;
    assert!(matches!(again, Err(MixError::PromptNotShowing(_))));

    let stats = engine.statistics().await.unwrap();
    assert_eq!(stats.prompts.rejected, 1);
}

#[tokio::test]
async fn test_same_utterance_is_not_a_correction() {
    let ctx = TestContext::new().await;
    let engine = &ctx.engine;

    let now = Utc::now();
    engine.record_attempt(
        ExecutedCommand::new(MISHEARD, false, 0.9).at(now - ChronoDuration::milliseconds(200)),
    );
    engine.record_attempt(ExecutedCommand::new(CORRECTED, true, 0.9).at(now));
    assert!(engine.check_for_corrections().await.unwrap().is_empty());

    // Outside the correction window
    engine.record_attempt(
        ExecutedCommand::new(MISHEARD, false, 0.9).at(now - ChronoDuration::seconds(120)),
    );
    engine.record_attempt(ExecutedCommand::new(CORRECTED, true, 0.9).at(now));
    assert!(engine.check_for_corrections().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_spoken_correction_end_to_end() {
    let ctx = TestContext::new().await;
    let engine = &ctx.engine;
    let mut events = engine.prompts().subscribe();

    let first = engine.process_transcript(MISHEARD, 0.9).await.unwrap();
    assert!(first.corrections.is_empty());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let second = engine.process_transcript(CORRECTED, 0.9).await.unwrap();
    assert!(second.success());
    assert_eq!(second.corrections.len(), 1);

    let prompt = wait_for(&mut events, |event| match event {
        LearningEvent::PromptShown(prompt) => Some(prompt),
        _ => None,
    })
    .await;
    assert_eq!(prompt.original, MISHEARD);
    assert!(prompt.matching_words.contains(&"channel".to_string()));
}

#[tokio::test]
async fn test_import_and_clear_are_audited() {
    let source = TestContext::new().await;
    source
        .engine
        .dictionary()
        .add_entry(PersonalDictionaryEntry::new(MISHEARD, CORRECTED, 0.9, true))
        .await
        .unwrap();
    source
        .engine
        .dictionary()
        .add_entry(PersonalDictionaryEntry::new(
            "mute the gitar now",
            "mute the guitar now",
            0.8,
            false,
        ))
        .await
        .unwrap();
    let export = source.engine.export_dictionary().await;
    assert_eq!(export.entries.len(), 2);

    let ctx = TestContext::new().await;
    let summary = ctx
        .engine
        .import_dictionary(export, ConflictStrategy::KeepNewer)
        .await
        .unwrap();
    assert_eq!(summary.inserted, 2);
    assert_eq!(ctx.engine.dictionary().len().await, 2);

    let removed = ctx.engine.clear_dictionary().await.unwrap();
    assert_eq!(removed, 2);
    assert!(ctx.engine.dictionary().is_empty().await);

    let log = ctx.audit_log();
    assert!(log.contains("DICTIONARY IMPORT"));
    assert!(log.contains("DICTIONARY CLEAR: 2 entries removed"));
}

#[tokio::test]
async fn test_learned_corrections_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let engine = sqlite_engine(dir.path()).await;
        engine
            .dictionary()
            .add_entry(
                PersonalDictionaryEntry::new(MISHEARD, CORRECTED, 0.85, false)
                    .with_response(UserResponse::Accepted),
            )
            .await
            .unwrap();
        engine.shutdown().await.unwrap();
    }

    let engine = sqlite_engine(dir.path()).await;
    assert_eq!(engine.dictionary().len().await, 1);

    let outcome = engine.process_transcript(MISHEARD, 0.9).await.unwrap();
    assert_eq!(outcome.applied_correction.as_deref(), Some(CORRECTED));
    let cmd = outcome.commands[0].as_channel().unwrap();
    assert_eq!(cmd.operation, ChannelOperation::FaderSet);
    assert_eq!(cmd.parameter_value, Some(-6.0));
}

#[tokio::test]
async fn test_console_connection_is_metadata_only() {
    let ctx = TestContext::new().await;
    let engine = &ctx.engine;

    engine.set_console_connected(true);
    assert!(engine.console_connected());
    let outcome = engine.process_transcript("mute channel 1", 0.9).await.unwrap();
    assert!(outcome.success());
    assert!(engine.recent_attempts().pop().unwrap().console_connected);

    engine.set_console_connected(false);
    let outcome = engine.process_transcript("unmute channel 1", 0.9).await.unwrap();
    assert!(outcome.success());
    assert!(!engine.recent_attempts().pop().unwrap().console_connected);
}

#[tokio::test]
async fn test_statistics_track_outcomes() {
    let ctx = TestContext::new().await;
    let engine = &ctx.engine;

    engine.process_transcript("mute channel 1", 0.9).await.unwrap();
    engine.process_transcript("flibber the wobble", 0.9).await.unwrap();

    let stats = engine.statistics().await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.successful, 1);
    assert!(stats.mixer.failed >= 1);
    assert_eq!(stats.dictionary.total_entries, 0);
}

#[tokio::test]
async fn test_engine_rejects_inverted_fader_range() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.fader_min_db = 10.0;
    config.fader_max_db = -60.0;

    let storage: Arc<dyn DictionaryStorage> = Arc::new(MemoryStorage::new());
    let result = VoiceEngine::new(config, storage).await;
    assert!(matches!(result, Err(MixError::Config(_))));
}

#[tokio::test]
async fn test_spoken_label_becomes_a_target() {
    let ctx = TestContext::new().await;
    let engine = &ctx.engine;

    let outcome = engine
        .process_transcript("label channel 5 as choir", 0.9)
        .await
        .unwrap();
    assert!(outcome.success());
    assert_eq!(outcome.results[0].message, "ch 5: label none -> 'choir'");

    let outcome = engine
        .process_transcript("mute the choir and boost the highs on it", 0.9)
        .await
        .unwrap();
    assert!(outcome.success());
    assert_eq!(outcome.commands[1].as_channel().unwrap().operation, ChannelOperation::EqBoost);

    let state = engine.mixer().snapshot(5).unwrap();
    assert!(state.is_muted);
    assert_eq!(state.eq_high_db, 3.0);
    assert_eq!(state.label.as_deref(), Some("choir"));
}

#[tokio::test]
async fn test_named_dca_end_to_end() {
    let ctx = TestContext::new().await;
    let engine = &ctx.engine;

    assert!(!engine
        .process_transcript("drums dca down 6", 0.9)
        .await
        .unwrap()
        .success());

    engine
        .process_transcript("name dca 1 as drums", 0.9)
        .await
        .unwrap();
    let outcome = engine
        .process_transcript("drums dca down 6", 0.9)
        .await
        .unwrap();
    assert!(outcome.success());
    assert_eq!(outcome.results[0].message, "dca 1: fader 0.0 dB -> -6.0 dB");

    engine.process_transcript("mute group 1", 0.9).await.unwrap();
    let dca = engine.mixer().dca_snapshot(1).unwrap();
    assert!(dca.is_muted);
    assert_eq!(dca.label.as_deref(), Some("drums"));
}
