// tests/integration/shutdown_test.rs

//! Ordered, bounded shutdown of a running bridge.

use super::test_helpers::{
    DuplexConnector, RecordingFrameHandler, RecordingTranslator, RefusingConnector,
    StalledConnector, init_tracing, test_config,
};
use bedrock_bridge::connection::{ConnectionEvent, Connector, SendOutcome};
use bedrock_bridge::core::errors::BridgeError;
use bedrock_bridge::core::state::{BridgeComponents, BridgeState};
use bedrock_bridge::core::subject::{SubjectId, SubjectKind};
use bedrock_bridge::core::tasks::cache_maintenance::CacheMaintenanceTask;
use bedrock_bridge::core::translation::Translator;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn bridge(connector: Arc<dyn Connector>) -> Arc<BridgeState> {
    BridgeState::with_components(
        test_config(),
        BridgeComponents {
            connector,
            frame_handler: Arc::new(RecordingFrameHandler::default()),
            translator: Arc::new(RecordingTranslator::new()),
        },
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn test_shutdown_stops_everything_in_order() {
    init_tracing();
    let (connector, _remotes) = DuplexConnector::new();
    let state = bridge(connector);
    state.start().await.unwrap();

    let maintenance = CacheMaintenanceTask::new(state.engine.clone(), Duration::from_secs(60));
    let handle = state.scheduler.schedule_periodic(maintenance).unwrap();
    let mut events = state.connection.subscribe();

    let report = state.shutdown().await;
    assert_eq!(report.forced, 0);
    // Health monitor and maintenance were both running.
    assert!(report.drained >= 2);
    assert!(handle.is_finished());

    assert!(matches!(
        events.recv().await.unwrap(),
        ConnectionEvent::Lost { .. }
    ));
    assert!(!state.connection.is_connected());
    assert!(state.scheduler.is_closed());
    assert_eq!(state.scheduler.active_tasks(), 0);

    // Nothing new can be scheduled or sent.
    let err = state
        .engine
        .warm_up(
            &state.scheduler,
            SubjectKind::Block,
            vec![SubjectId::from("minecraft:stone")],
            Duration::ZERO,
        )
        .unwrap_err();
    assert_eq!(err, BridgeError::SchedulerClosed);
    assert_eq!(
        state.connection.send(Bytes::from_static(b"late")),
        SendOutcome::Dropped
    );
    assert_eq!(state.reload().await.unwrap_err(), BridgeError::ShutDown);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    init_tracing();
    let (connector, _remotes) = DuplexConnector::new();
    let state = bridge(connector);
    state.start().await.unwrap();

    state.shutdown().await;
    let again = state.shutdown().await;
    assert_eq!(again.drained, 0);
    assert_eq!(again.forced, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_reconnects() {
    init_tracing();
    let connector = RefusingConnector::new();
    let state = bridge(connector.clone());
    state.start().await.unwrap();
    assert_eq!(connector.calls.load(Ordering::SeqCst), 1);

    // A reconnect is now pending behind the default 5s delay.
    let report = state.shutdown().await;
    assert_eq!(report.forced, 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_bounded_by_grace_period() {
    init_tracing();
    let (connector, _remotes) = DuplexConnector::new();
    let state = bridge(connector);

    // A warm-up whose translations take far longer than the grace period.
    let slow = Arc::new(RecordingTranslator::new().with_delay(Duration::from_secs(3600)));
    let cache = state.engine.cache(SubjectKind::Item).clone();
    let translator = slow.clone();
    cache
        .warm_up(
            &state.scheduler,
            vec![SubjectId::from("minecraft:apple")],
            move |subject: SubjectId| {
                let translator = translator.clone();
                async move { translator.translate(SubjectKind::Item, &subject).await }
            },
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(slow.calls(), 1);

    let started = tokio::time::Instant::now();
    let report = state.shutdown().await;
    // Cancellation reaches the sleeping translation, so the wait ends well
    // within the configured grace period.
    assert!(started.elapsed() <= state.config.scheduler.shutdown_grace);
    assert_eq!(report.forced, 0);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_shutdown_with_writes_in_flight_is_bounded() {
    init_tracing();
    let connector = StalledConnector::new();
    let state = bridge(connector.clone());
    state.start().await.unwrap();
    assert!(state.connection.is_connected());

    // The writer blocks on the first frame; the rest wait in the queue.
    for _ in 0..16 {
        let outcome = state.connection.send(Bytes::from(vec![1u8; 4096]));
        assert_eq!(outcome, SendOutcome::Submitted);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(state.connection.is_connected());
    assert_eq!(state.status().connection.write_failures, 0);

    let started = std::time::Instant::now();
    let report = state.shutdown().await;
    assert!(started.elapsed() <= state.config.scheduler.shutdown_grace);
    assert_eq!(report.forced, 0);
    assert!(!state.connection.is_connected());
    assert_eq!(state.scheduler.active_tasks(), 0);
    assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
}
