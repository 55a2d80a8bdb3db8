// src/connection/mod.rs

//! Owns the lifecycle of the single outbound connection.
//!
//! `ConnectionManager` connects to the configured target, keeps the link alive
//! through transient failures and exposes a best-effort `send`. Connection
//! attempts are serialized by an atomic flag, so concurrent connect and
//! reconnect requests collapse into one attempt. Reconnects after a loss, and
//! the periodic health check, run on the `Scheduler` and never on the I/O path.

mod connector;
mod guard;
mod session;
mod stats;

pub use connector::{Connector, TcpConnector, Target, Transport};
pub use session::{FrameHandler, LoggingFrameHandler, frame_codec};
pub use stats::ConnectionStats;

use crate::config::Config;
use crate::core::errors::BridgeError;
use crate::core::metrics;
use crate::core::scheduler::{Scheduler, ShutdownReport, TaskHandle};
use crate::core::tasks::health::HealthMonitor;
use bytes::Bytes;
use guard::ConnectingGuard;
use parking_lot::Mutex;
use rand::Rng;
use session::{Activity, Enqueue, Session, SessionContext};
use stats::ConnectionCounters;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// The externally visible state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

/// The result of `ConnectionManager::send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The packet was queued for writing.
    Submitted,
    /// The packet was released without being written.
    Dropped,
}

/// Lifecycle notifications published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Established { peer: String },
    Lost { reason: String },
}

/// Delay policy between failed connection attempts.
///
/// The delay doubles after every consecutive failure, up to `max_delay`, and
/// resets after a successful connect. With `max_delay == delay` the delay is
/// fixed. A random `jitter` in `[0, jitter]` is added to every delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
            jitter: Duration::ZERO,
        }
    }
}

impl ReconnectPolicy {
    /// The delay before the next attempt after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures.min(16)).unwrap_or(u32::MAX);
        let base = self
            .delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay.max(self.delay));
        if self.jitter.is_zero() {
            return base;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }
}

/// Tunables of the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub send_queue_capacity: usize,
    pub max_frame_length: usize,
    pub reconnect: ReconnectPolicy,
    pub health_interval: Duration,
    pub inactivity_threshold: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
            write_timeout: Duration::from_secs(10),
            send_queue_capacity: 1024,
            max_frame_length: 1024 * 1024,
            reconnect: ReconnectPolicy::default(),
            health_interval: Duration::from_secs(30),
            inactivity_threshold: Duration::from_secs(30),
        }
    }
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        let c = &config.connection;
        Self {
            connect_timeout: c.connect_timeout(),
            write_timeout: c.write_timeout,
            send_queue_capacity: c.send_queue_capacity,
            max_frame_length: c.max_frame_length,
            reconnect: ReconnectPolicy {
                delay: c.reconnect_delay,
                max_delay: c.reconnect_max_delay,
                jitter: c.reconnect_jitter,
            },
            health_interval: config.health.interval,
            inactivity_threshold: config.health.inactivity_threshold,
        }
    }
}

pub struct ConnectionManager {
    me: Weak<ConnectionManager>,
    target: Target,
    settings: ConnectionSettings,
    connector: Arc<dyn Connector>,
    scheduler: Arc<Scheduler>,
    handler: Arc<dyn FrameHandler>,
    session: Mutex<Option<Session>>,
    connecting: AtomicBool,
    reconnect_pending: AtomicBool,
    shut_down: AtomicBool,
    failures: AtomicU32,
    next_session_id: AtomicU64,
    activity: Arc<Activity>,
    counters: Arc<ConnectionCounters>,
    events: broadcast::Sender<ConnectionEvent>,
    health: Mutex<Option<TaskHandle>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.target)
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(
        target: Target,
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
        scheduler: Arc<Scheduler>,
        handler: Arc<dyn FrameHandler>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            target,
            settings,
            connector,
            scheduler,
            handler,
            session: Mutex::new(None),
            connecting: AtomicBool::new(false),
            reconnect_pending: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            next_session_id: AtomicU64::new(0),
            activity: Arc::new(Activity::new()),
            counters: Arc::new(ConnectionCounters::default()),
            events,
            health: Mutex::new(None),
        })
    }

    /// Starts the health monitor and makes the first connection attempt.
    ///
    /// A failed first attempt is not an error: it is retried in the background.
    /// Only a scheduler that cannot accept work is reported.
    pub async fn initialize(&self) -> Result<(), BridgeError> {
        let monitor = HealthMonitor::new(
            self.me.clone(),
            self.settings.health_interval,
            self.settings.inactivity_threshold,
        );
        let handle = self.scheduler.schedule_periodic(monitor)?;
        if let Some(previous) = self.health.lock().replace(handle) {
            previous.cancel();
        }
        info!(
            "Health monitor started (interval {:?}, inactivity threshold {:?}).",
            self.settings.health_interval, self.settings.inactivity_threshold
        );

        if let Err(e) = self.connect().await {
            debug!("Initial connection attempt failed: {}", e);
        }
        Ok(())
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.session.lock().as_ref().is_some_and(|s| s.is_open())
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else if self.is_connecting() {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn stats(&self) -> ConnectionStats {
        self.counters.snapshot()
    }

    /// The printable address of the connected peer.
    pub fn peer(&self) -> Option<String> {
        self.session.lock().as_ref().map(|s| s.peer().to_string())
    }

    /// How long the current session has been connected.
    pub fn uptime(&self) -> Option<Duration> {
        self.session.lock().as_ref().map(|s| s.uptime())
    }

    /// Time since the last successful send or receive.
    pub fn last_activity_age(&self) -> Duration {
        self.activity.age()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Submits `payload` for writing and returns immediately.
    ///
    /// While disconnected, or when the write queue is full, the payload is
    /// released and `SendOutcome::Dropped` is returned. Nothing is retried.
    pub fn send(&self, payload: Bytes) -> SendOutcome {
        if payload.len() > self.settings.max_frame_length {
            warn!(
                "Dropping {} byte packet: larger than the {} byte frame limit.",
                payload.len(),
                self.settings.max_frame_length
            );
            return self.drop_packet();
        }

        let outcome = match self.session.lock().as_ref() {
            Some(session) => session.enqueue(payload),
            None => Enqueue::Closed,
        };

        match outcome {
            Enqueue::Queued => {
                self.activity.touch();
                self.counters.increment_packets_sent();
                metrics::PACKETS_SENT_TOTAL.inc();
                SendOutcome::Submitted
            }
            Enqueue::Full => {
                warn!("Write queue to {} is full. Packet dropped.", self.target);
                self.drop_packet()
            }
            Enqueue::Closed => {
                trace!("Not connected to {}. Packet dropped.", self.target);
                self.drop_packet()
            }
        }
    }

    fn drop_packet(&self) -> SendOutcome {
        self.counters.increment_packets_dropped();
        metrics::PACKETS_DROPPED_TOTAL.inc();
        SendOutcome::Dropped
    }

    /// Connects if not already connected. A call made while another attempt is
    /// in flight returns immediately without starting a second one.
    ///
    /// On failure a reconnect is scheduled after the policy delay and the error
    /// is returned for logging; callers need not retry.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        if self.is_shut_down() {
            return Err(BridgeError::ShutDown);
        }
        let Some(_guard) = ConnectingGuard::try_acquire(&self.connecting) else {
            debug!("Connection attempt already in flight; request collapsed.");
            return Ok(());
        };
        if self.is_connected() {
            return Ok(());
        }
        self.attempt().await
    }

    /// Drops the current connection, if any, and connects again. Concurrent
    /// calls collapse into the single attempt that holds the connecting flag.
    pub async fn reconnect(&self) -> Result<(), BridgeError> {
        if self.is_shut_down() {
            return Err(BridgeError::ShutDown);
        }
        let Some(_guard) = ConnectingGuard::try_acquire(&self.connecting) else {
            debug!("Reconnect requested while an attempt is in flight; request collapsed.");
            return Ok(());
        };
        self.counters.increment_reconnects();
        metrics::RECONNECTS_TOTAL.inc();
        self.close_session("reconnect requested");
        self.attempt().await
    }

    // Runs one bounded connection attempt. The caller holds the connecting flag.
    async fn attempt(&self) -> Result<(), BridgeError> {
        self.counters.increment_connect_attempts();
        metrics::CONNECT_ATTEMPTS_TOTAL.inc();
        info!("Connecting to {}...", self.target);

        let result =
            match tokio::time::timeout(self.settings.connect_timeout, self.connector.connect(&self.target))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(BridgeError::Timeout(format!(
                    "connecting to {} took longer than {:?}",
                    self.target, self.settings.connect_timeout
                ))),
            };

        match result {
            Ok(transport) => self.install(transport),
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                warn!(
                    "Failed to connect to {} (attempt {}): {}",
                    self.target, failures, e
                );
                self.schedule_reconnect();
                Err(e)
            }
        }
    }

    // Installs a new session. `shutdown` raises its flag before it takes the
    // session lock, so checking the flag under that lock means a session is
    // either closed by `shutdown` or never installed.
    fn install(&self, transport: Transport) -> Result<(), BridgeError> {
        let mut current = self.session.lock();
        if self.is_shut_down() {
            drop(current);
            debug!(
                "Connected to {} after shutdown began; discarding the transport.",
                transport.peer
            );
            return Err(BridgeError::ShutDown);
        }

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed) + 1;
        let peer = transport.peer.clone();
        let session = Session::start(
            id,
            transport,
            SessionContext {
                manager: self.me.clone(),
                activity: Arc::clone(&self.activity),
                counters: Arc::clone(&self.counters),
                handler: Arc::clone(&self.handler),
                queue_capacity: self.settings.send_queue_capacity,
                max_frame_length: self.settings.max_frame_length,
                write_timeout: self.settings.write_timeout,
            },
        );
        self.activity.touch();
        if let Some(previous) = current.replace(session) {
            previous.close();
        }
        drop(current);

        self.failures.store(0, Ordering::Release);
        self.counters.increment_connects();
        metrics::CONNECTED.set(1.0);
        info!("Connected to {} (session {}).", peer, id);
        let _ = self.events.send(ConnectionEvent::Established { peer });
        Ok(())
    }

    // Closes the current session. Returns true if one was open.
    fn close_session(&self, reason: &str) -> bool {
        let Some(session) = self.session.lock().take() else {
            return false;
        };
        session.close();
        metrics::CONNECTED.set(0.0);
        info!("Closed connection to {}: {}.", session.peer(), reason);
        let _ = self.events.send(ConnectionEvent::Lost {
            reason: reason.to_string(),
        });
        true
    }

    /// Called by a session's I/O task when the link breaks on its own.
    pub(crate) fn on_session_lost(&self, session_id: u64, reason: &str) {
        let lost = {
            let mut current = self.session.lock();
            if current.as_ref().is_some_and(|s| s.id() == session_id) {
                current.take()
            } else {
                None
            }
        };
        let Some(session) = lost else {
            return;
        };
        session.close();
        metrics::CONNECTED.set(0.0);
        warn!("Connection to {} lost: {}", session.peer(), reason);
        let _ = self.events.send(ConnectionEvent::Lost {
            reason: reason.to_string(),
        });
        self.counters.increment_reconnects();
        metrics::RECONNECTS_TOTAL.inc();
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&self) {
        if self.is_shut_down() {
            return;
        }
        if self.reconnect_pending.swap(true, Ordering::AcqRel) {
            debug!("A reconnect is already scheduled.");
            return;
        }

        let delay = self
            .settings
            .reconnect
            .delay_for(self.failures.load(Ordering::Acquire).saturating_sub(1));
        let me = self.me.clone();
        let scheduled = self.scheduler.schedule_once("reconnect", delay, async move {
            let Some(manager) = me.upgrade() else {
                return;
            };
            manager.reconnect_pending.store(false, Ordering::Release);
            if !manager.is_connected()
                && let Err(e) = manager.connect().await
            {
                debug!("Scheduled reconnect did not succeed: {}", e);
            }
        });

        match scheduled {
            Ok(_) => info!("Reconnecting to {} in {:?}.", self.target, delay),
            Err(e) => {
                self.reconnect_pending.store(false, Ordering::Release);
                debug!("Reconnect not scheduled: {}", e);
            }
        }
    }

    /// Closes the link and stops all background work with a bounded wait.
    /// Idempotent: later calls return an empty report.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            debug!("Connection manager already shut down.");
            return ShutdownReport::default();
        }
        info!("Shutting down connection manager.");
        self.scheduler.close();
        if let Some(health) = self.health.lock().take() {
            health.cancel();
        }
        self.close_session("shutdown");
        let report = self.scheduler.shutdown(grace).await;
        info!("Connection manager stopped.");
        report
    }
}
