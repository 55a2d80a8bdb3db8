// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bedrock_bridge::config::Config;
use bedrock_bridge::connection::{
    ConnectionManager, ConnectionSettings, Connector, FrameHandler, Target, Transport, frame_codec,
};
use bedrock_bridge::core::errors::BridgeError;
use bedrock_bridge::core::scheduler::Scheduler;
use bedrock_bridge::core::subject::{Artifact, SubjectId, SubjectKind};
use bedrock_bridge::core::translation::Translator;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, reload};

/// The remote end of a connection handed out by `DuplexConnector`.
pub type RemoteEnd = Framed<DuplexStream, LengthDelimitedCodec>;

/// Sets up minimal tracing for tests. Safe to call from every test.
pub fn init_tracing() {
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new("warn"));
    // Ignore the error if another test already installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A configuration that never touches the network or the host memory probe.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.connection.host = "127.0.0.1".to_string();
    config.connection.port = 19132;
    config.metrics.enabled = false;
    config.scheduler.threads = 4;
    config.scheduler.shutdown_grace = Duration::from_secs(1);
    config.available_memory = 1024 * 1024 * 1024;
    config
}

/// A connector backed by in-memory duplex pipes. Every successful connect
/// hands the remote end to the test through `remotes`.
pub struct DuplexConnector {
    remotes: mpsc::UnboundedSender<RemoteEnd>,
    pub calls: AtomicUsize,
    fail_first: AtomicUsize,
}

impl DuplexConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        Self::failing_first(0)
    }

    /// The first `n` connects fail with `ConnectFailure`.
    pub fn failing_first(n: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            remotes: tx,
            calls: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(n),
        });
        (connector, rx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn connect(&self, target: &Target) -> Result<Transport, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(BridgeError::ConnectFailure {
                target: target.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let _ = self
            .remotes
            .send(Framed::new(remote, frame_codec(1024 * 1024)));
        Ok(Transport::from_stream(local, format!("duplex:{target}")))
    }
}

/// A connector whose connects block until the test opens the gate.
pub struct GatedConnector {
    gate: Semaphore,
    pub calls: AtomicUsize,
    remotes: Mutex<Vec<DuplexStream>>,
}

impl GatedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            remotes: Mutex::new(Vec::new()),
        })
    }

    /// Lets `n` pending or future connects complete.
    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for GatedConnector {
    async fn connect(&self, target: &Target) -> Result<Transport, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| BridgeError::Internal(e.to_string()))?;
        permit.forget();
        let (local, remote) = tokio::io::duplex(64 * 1024);
        // Keep the remote end alive so the session stays open.
        self.remotes.lock().push(remote);
        Ok(Transport::from_stream(local, format!("gated:{target}")))
    }
}

/// A connector whose remote end never reads. The pipe holds only a few bytes,
/// so writes stall as soon as it is full.
pub struct StalledConnector {
    pub calls: AtomicUsize,
    remotes: Mutex<Vec<DuplexStream>>,
}

impl StalledConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            remotes: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Connector for StalledConnector {
    async fn connect(&self, target: &Target) -> Result<Transport, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (local, remote) = tokio::io::duplex(64);
        self.remotes.lock().push(remote);
        Ok(Transport::from_stream(local, format!("stalled:{target}")))
    }
}

/// A connector that never succeeds.
pub struct RefusingConnector {
    pub calls: AtomicUsize,
}

impl RefusingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(&self, target: &Target) -> Result<Transport, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BridgeError::ConnectFailure {
            target: target.to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

/// Collects inbound frames.
#[derive(Default)]
pub struct RecordingFrameHandler {
    pub frames: Mutex<Vec<Bytes>>,
}

impl FrameHandler for RecordingFrameHandler {
    fn on_frame(&self, frame: Bytes) {
        self.frames.lock().push(frame);
    }
}

/// A translator that counts calls, can be slowed down and can fail for
/// selected subjects.
pub struct RecordingTranslator {
    pub calls: AtomicUsize,
    pub delay: Duration,
    mappings: HashMap<String, String>,
    failing: HashSet<String>,
}

impl RecordingTranslator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            mappings: HashMap::new(),
            failing: HashSet::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_mapping(mut self, source: &str, target: &str) -> Self {
        self.mappings.insert(source.to_string(), target.to_string());
        self
    }

    pub fn failing_for(mut self, subject: &str) -> Self {
        self.failing.insert(subject.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for RecordingTranslator {
    async fn translate(
        &self,
        _kind: SubjectKind,
        subject: &SubjectId,
    ) -> Result<Artifact, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(subject.as_str()) {
            return Err(BridgeError::NotMapped(subject.to_string()));
        }
        let target = self
            .mappings
            .get(subject.as_str())
            .cloned()
            .unwrap_or_else(|| format!("translated:{subject}"));
        Ok(Bytes::from(target))
    }

    fn fallback(&self, _kind: SubjectKind, _subject: &SubjectId) -> Artifact {
        Bytes::from_static(b"fallback")
    }
}

/// Fast settings for connection tests.
pub fn test_settings() -> ConnectionSettings {
    ConnectionSettings {
        connect_timeout: Duration::from_millis(1000),
        write_timeout: Duration::from_secs(1),
        send_queue_capacity: 64,
        max_frame_length: 1024 * 1024,
        reconnect: bedrock_bridge::connection::ReconnectPolicy {
            delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(100),
            jitter: Duration::ZERO,
        },
        health_interval: Duration::from_secs(30),
        inactivity_threshold: Duration::from_secs(30),
    }
}

/// Builds a manager on its own scheduler.
pub fn manager_with(
    connector: Arc<dyn Connector>,
    settings: ConnectionSettings,
    handler: Arc<dyn FrameHandler>,
) -> Arc<ConnectionManager> {
    let scheduler = Scheduler::new(4).expect("scheduler requires a runtime");
    ConnectionManager::new(
        Target::new("127.0.0.1", 19132),
        settings,
        connector,
        scheduler,
        handler,
    )
}

/// Polls `cond` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
