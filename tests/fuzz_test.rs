mod common;

use std::sync::Arc;
use tokio::time::Instant;

use common::TestContext;
use mixvoice::commands::CommandKind;

#[tokio::test]
async fn test_transcript_flood_fuzz() {
    let ctx = TestContext::new().await;
    let engine = &ctx.engine;

    // Simulate a flood of random garbage text
    let long = "channel ".repeat(60);
    let garbage = [
        "asdfghjkl",
        "!!! @@@ ###",
        "1234567890",
        "set channel to db",
        "and and and",
        long.as_str(),
        "",
        " ",
    ];

    for text in garbage {
        let outcome = engine
            .process_transcript(text, 0.9)
            .await
            .expect("garbage must not fail the pipeline");
        assert!(
            outcome
                .commands
                .iter()
                .all(|c| matches!(c.kind, CommandKind::Unknown { .. })),
            "'{}' produced {:?}",
            text,
            outcome.commands
        );
        assert!(!outcome.success());
    }
    assert!(engine.mixer().snapshot_all().iter().all(|s| !s.is_muted));

    // High-frequency valid commands
    let commands = [
        "mute channel 1",
        "unmute channel 1",
        "raise channel 2",
        "pan channel 4 left",
    ];

    let start = Instant::now();
    for i in 0..100 {
        let cmd = commands[i % commands.len()];
        let _ = engine.process_transcript(cmd, 0.9).await;
    }
    let elapsed = start.elapsed();
    println!("Processed 100 commands in {:?}", elapsed);

    // Stability check: engine should still be functional
    let outcome = engine.process_transcript("mute channel 7", 0.9).await.unwrap();
    assert!(outcome.success(), "Engine died after flood test");
    assert!(engine.mixer().snapshot(7).unwrap().is_muted);
}

#[tokio::test]
async fn test_out_of_range_values_are_clamped() {
    let ctx = TestContext::new().await;
    let engine = &ctx.engine;
    let max = engine.config().fader_max_db;
    let min = engine.config().fader_min_db;

    engine
        .process_transcript("set channel 2 to 1000 db", 0.9)
        .await
        .unwrap();
    assert_eq!(engine.mixer().snapshot(2).unwrap().fader_level, max);

    engine
        .process_transcript("set channel 2 to -inf", 0.9)
        .await
        .unwrap();
    assert_eq!(engine.mixer().snapshot(2).unwrap().fader_level, min);

    for _ in 0..50 {
        engine.process_transcript("raise channel 2", 0.9).await.unwrap();
    }
    assert_eq!(engine.mixer().snapshot(2).unwrap().fader_level, max);
}

#[tokio::test]
async fn test_concurrent_transcripts_are_serialized() {
    let ctx = TestContext::new().await;
    let engine = Arc::new(ctx.engine);

    let mut handles = Vec::new();
    for channel in 1..=8u32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .process_transcript(&format!("mute channel {}", channel), 0.9)
                .await
                .map(|o| o.success())
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    let stats = engine.statistics().await.unwrap();
    assert_eq!(stats.processed, 8);
    assert_eq!(stats.successful, 8);
    assert!((1..=8).all(|ch| engine.mixer().snapshot(ch).unwrap().is_muted));
}
