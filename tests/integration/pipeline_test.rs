// tests/integration/pipeline_test.rs

//! End-to-end translation and delivery through a fully assembled bridge.

use super::test_helpers::{
    DuplexConnector, RecordingFrameHandler, RecordingTranslator, init_tracing, test_config,
};
use bedrock_bridge::config::IntegrationConfig;
use bedrock_bridge::connection::{ConnectionState, SendOutcome};
use bedrock_bridge::core::scheduler::Scheduler;
use bedrock_bridge::core::state::{BridgeComponents, BridgeState};
use bedrock_bridge::core::subject::{SubjectId, SubjectKind};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn integration(id: &str, enabled: bool, pairs: &[(&str, &str)]) -> IntegrationConfig {
    IntegrationConfig {
        id: id.to_string(),
        enabled,
        mappings: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    }
}

#[tokio::test]
async fn test_translate_and_send_delivers_framed_artifact() {
    init_tracing();
    let (connector, mut remotes) = DuplexConnector::new();
    let translator = Arc::new(
        RecordingTranslator::new().with_mapping("minecraft:grass_block", "minecraft:grass"),
    );
    let state = BridgeState::with_components(
        test_config(),
        BridgeComponents {
            connector,
            frame_handler: Arc::new(RecordingFrameHandler::default()),
            translator: translator.clone(),
        },
        None,
    )
    .unwrap();

    state.start().await.unwrap();
    let mut remote = remotes.recv().await.unwrap();

    let subject = SubjectId::from("minecraft:grass_block");
    for _ in 0..3 {
        let outcome = state.translate_and_send(SubjectKind::Block, &subject).await;
        assert_eq!(outcome, SendOutcome::Submitted);
    }

    for _ in 0..3 {
        let frame = tokio::time::timeout(Duration::from_secs(1), remote.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..], b"minecraft:grass");
    }

    // Computed once, then served from the cache.
    assert_eq!(translator.calls(), 1);
    let status = state.status();
    assert!(status.is_connected());
    assert_eq!(status.translations, 3);
    assert_eq!(status.connection.packets_sent, 3);
    let blocks = status
        .tiers
        .iter()
        .find(|t| t.kind == SubjectKind::Block)
        .unwrap();
    assert_eq!(blocks.stats.hits, 2);
    assert_eq!(blocks.stats.misses, 1);

    state.shutdown().await;
}

#[tokio::test]
async fn test_translation_is_cached_even_when_disconnected() {
    init_tracing();
    let (connector, _remotes) = DuplexConnector::failing_first(usize::MAX);
    let translator = Arc::new(RecordingTranslator::new());
    let state = BridgeState::with_components(
        test_config(),
        BridgeComponents {
            connector,
            frame_handler: Arc::new(RecordingFrameHandler::default()),
            translator: translator.clone(),
        },
        None,
    )
    .unwrap();
    state.start().await.unwrap();
    assert_eq!(state.status().state, ConnectionState::Disconnected);

    let subject = SubjectId::from("minecraft:cow");
    let outcome = state.translate_and_send(SubjectKind::Entity, &subject).await;
    assert_eq!(outcome, SendOutcome::Dropped);
    assert!(state.engine.cache(SubjectKind::Entity).contains(&subject));
    assert_eq!(state.status().connection.packets_dropped, 1);

    state.shutdown().await;
}

#[tokio::test]
async fn test_failing_translation_sends_fallback() {
    init_tracing();
    let (connector, mut remotes) = DuplexConnector::new();
    let translator = Arc::new(RecordingTranslator::new().failing_for("mod:broken"));
    let state = BridgeState::with_components(
        test_config(),
        BridgeComponents {
            connector,
            frame_handler: Arc::new(RecordingFrameHandler::default()),
            translator: translator.clone(),
        },
        None,
    )
    .unwrap();
    state.start().await.unwrap();
    let mut remote = remotes.recv().await.unwrap();

    let subject = SubjectId::from("mod:broken");
    state.translate_and_send(SubjectKind::Item, &subject).await;
    state.translate_and_send(SubjectKind::Item, &subject).await;

    for _ in 0..2 {
        let frame = remote.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"fallback");
    }
    // Failures are not cached, so each request tried again.
    assert_eq!(translator.calls(), 2);

    state.shutdown().await;
}

#[tokio::test]
async fn test_configured_integrations_override_translation() {
    init_tracing();
    let mut config = test_config();
    config.integrations = vec![
        integration("extra", true, &[("extra:ruby", "minecraft:emerald")]),
        integration("dormant", false, &[("dormant:ore", "minecraft:coal_ore")]),
        // Declares nothing, so it is not loaded.
        integration("empty", true, &[]),
    ];
    let (connector, _remotes) = DuplexConnector::new();
    let translator = Arc::new(RecordingTranslator::new());
    let state = BridgeState::with_components(
        config,
        BridgeComponents {
            connector,
            frame_handler: Arc::new(RecordingFrameHandler::default()),
            translator: translator.clone(),
        },
        None,
    )
    .unwrap();

    let status = state.status();
    assert_eq!(status.integrations.len(), 2);
    assert_eq!(status.overrides, 2);

    let ruby = SubjectId::from("extra:ruby");
    assert_eq!(
        state.engine.translate(SubjectKind::Item, &ruby).await,
        Bytes::from("minecraft:emerald")
    );
    // The disabled integration leaves the subject to the translator.
    let ore = SubjectId::from("dormant:ore");
    assert_eq!(
        state.engine.translate(SubjectKind::Block, &ore).await,
        Bytes::from("translated:dormant:ore")
    );
    assert_eq!(translator.calls(), 1);

    assert!(state.toggle_integration("dormant").unwrap());
    assert_eq!(
        state.engine.translate(SubjectKind::Block, &ore).await,
        Bytes::from("minecraft:coal_ore")
    );
    assert!(state.toggle_integration("missing").is_err());

    state.shutdown().await;
}

#[tokio::test]
async fn test_debug_toggle_without_log_control() {
    init_tracing();
    let (connector, _remotes) = DuplexConnector::new();
    let state = BridgeState::with_components(
        test_config(),
        BridgeComponents {
            connector,
            frame_handler: Arc::new(RecordingFrameHandler::default()),
            translator: Arc::new(RecordingTranslator::new()),
        },
        None,
    )
    .unwrap();

    assert!(!state.is_debug());
    assert!(state.toggle_debug().unwrap());
    assert!(state.status().debug);
    state.set_debug(false).unwrap();
    assert!(!state.is_debug());
}

#[tokio::test]
async fn test_reload_reconnects() {
    init_tracing();
    let (connector, _remotes) = DuplexConnector::new();
    let state = BridgeState::with_components(
        test_config(),
        BridgeComponents {
            connector: connector.clone(),
            frame_handler: Arc::new(RecordingFrameHandler::default()),
            translator: Arc::new(RecordingTranslator::new()),
        },
        None,
    )
    .unwrap();
    state.start().await.unwrap();
    assert_eq!(connector.calls(), 1);

    state.reload().await.unwrap();
    assert!(state.connection.is_connected());
    assert_eq!(connector.calls(), 2);
    assert_eq!(state.status().connection.reconnects, 1);

    state.shutdown().await;
}

#[tokio::test]
async fn test_status_report_lists_every_section() {
    init_tracing();
    let (connector, _remotes) = DuplexConnector::new();
    let state = BridgeState::with_components(
        test_config(),
        BridgeComponents {
            connector,
            frame_handler: Arc::new(RecordingFrameHandler::default()),
            translator: Arc::new(RecordingTranslator::new()),
        },
        None,
    )
    .unwrap();
    state.start().await.unwrap();

    let report = state.status().to_string();
    for needle in [
        "# Connection",
        "state:connected",
        "target:127.0.0.1:19132",
        "# Translation",
        "cache_blocks:",
        "cache_items:",
        "cache_entities:",
        "# Integrations",
        "# Runtime",
    ] {
        assert!(report.contains(needle), "missing '{needle}' in:\n{report}");
    }
    let pool = format!("pool_size:{}", Scheduler::pool_size_for(4));
    assert!(report.contains(&pool));

    state.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_engine_warm_up_fills_tier_after_delay() {
    init_tracing();
    let (connector, _remotes) = DuplexConnector::new();
    let translator = Arc::new(RecordingTranslator::new());
    let state = BridgeState::with_components(
        test_config(),
        BridgeComponents {
            connector,
            frame_handler: Arc::new(RecordingFrameHandler::default()),
            translator: translator.clone(),
        },
        None,
    )
    .unwrap();

    let subjects = vec![SubjectId::from("minecraft:stone"), SubjectId::from("minecraft:dirt")];
    state
        .engine
        .warm_up(&state.scheduler, SubjectKind::Block, subjects, Duration::from_secs(2))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(state.engine.cache(SubjectKind::Block).is_empty());
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(state.engine.cache(SubjectKind::Block).len(), 2);
    assert_eq!(translator.calls(), 2);

    state.shutdown().await;
}
