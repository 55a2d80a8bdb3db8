// src/connection/session.rs

//! Defines the state and I/O tasks of a single connected session.
//!
//! A session owns two tasks on the I/O path: a reader that decodes
//! length-prefixed frames and hands them to the `FrameHandler`, and a writer
//! that drains a bounded queue into the socket. Either task ending on its own
//! (remote close, read error, write failure) reports the loss to the manager.

use super::ConnectionManager;
use super::connector::Transport;
use super::stats::ConnectionCounters;
use crate::core::errors::BridgeError;
use crate::core::metrics;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Receives every inbound frame, without its length prefix.
pub trait FrameHandler: Send + Sync + 'static {
    fn on_frame(&self, frame: Bytes);
}

impl<F> FrameHandler for F
where
    F: Fn(Bytes) + Send + Sync + 'static,
{
    fn on_frame(&self, frame: Bytes) {
        self(frame)
    }
}

/// The default handler, which only logs what arrives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFrameHandler;

impl FrameHandler for LoggingFrameHandler {
    fn on_frame(&self, frame: Bytes) {
        debug!("Received {} byte frame.", frame.len());
    }
}

/// Builds the 4-byte big-endian length-prefixed codec used on the wire.
pub fn frame_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(max_frame_length)
        .new_codec()
}

/// Tracks the time of the last successful send or receive.
///
/// Stored as milliseconds since creation so it can be shared without a lock.
/// The value only moves forward.
#[derive(Debug)]
pub(crate) struct Activity {
    origin: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    pub(crate) fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(now, Ordering::AcqRel);
    }

    /// The time elapsed since the last recorded activity.
    pub(crate) fn age(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Acquire));
        self.origin.elapsed().saturating_sub(last)
    }
}

/// Everything a session needs from its manager.
pub(crate) struct SessionContext {
    pub(crate) manager: Weak<ConnectionManager>,
    pub(crate) activity: Arc<Activity>,
    pub(crate) counters: Arc<ConnectionCounters>,
    pub(crate) handler: Arc<dyn FrameHandler>,
    pub(crate) queue_capacity: usize,
    pub(crate) max_frame_length: usize,
    pub(crate) write_timeout: Duration,
}

/// The result of submitting a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueue {
    Queued,
    Full,
    Closed,
}

/// A live connection to the remote endpoint.
#[derive(Debug)]
pub(crate) struct Session {
    id: u64,
    peer: String,
    outbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    created_at: Instant,
}

impl Session {
    /// Spawns the reader and writer tasks for `transport`.
    pub(crate) fn start(id: u64, transport: Transport, ctx: SessionContext) -> Self {
        let Transport {
            reader,
            writer,
            peer,
        } = transport;
        let (outbound, rx) = mpsc::channel(ctx.queue_capacity.max(1));
        let cancel = CancellationToken::new();

        let reader_task = tokio::spawn(read_loop(
            id,
            FramedRead::new(reader, frame_codec(ctx.max_frame_length)),
            cancel.clone(),
            Arc::clone(&ctx.activity),
            Arc::clone(&ctx.counters),
            Arc::clone(&ctx.handler),
            ctx.manager.clone(),
        ));
        let writer_task = tokio::spawn(write_loop(
            id,
            FramedWrite::new(writer, frame_codec(ctx.max_frame_length)),
            rx,
            cancel.clone(),
            ctx.write_timeout,
            Arc::clone(&ctx.counters),
            ctx.manager,
        ));

        Self {
            id,
            peer,
            outbound,
            cancel,
            tasks: vec![reader_task, writer_task],
            created_at: Instant::now(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn peer(&self) -> &str {
        &self.peer
    }

    pub(crate) fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Queues a packet without waiting.
    pub(crate) fn enqueue(&self, payload: Bytes) -> Enqueue {
        if !self.is_open() {
            return Enqueue::Closed;
        }
        match self.outbound.try_send(payload) {
            Ok(()) => Enqueue::Queued,
            Err(TrySendError::Full(_)) => Enqueue::Full,
            Err(TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    /// Stops both I/O tasks. Queued packets that were not written are dropped.
    pub(crate) fn close(&self) {
        self.cancel.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn report_loss(manager: &Weak<ConnectionManager>, id: u64, reason: String) {
    if let Some(manager) = manager.upgrade() {
        manager.on_session_lost(id, &reason);
    }
}

async fn read_loop(
    id: u64,
    mut frames: FramedRead<Box<dyn tokio::io::AsyncRead + Send + Unpin>, LengthDelimitedCodec>,
    cancel: CancellationToken,
    activity: Arc<Activity>,
    counters: Arc<ConnectionCounters>,
    handler: Arc<dyn FrameHandler>,
    manager: Weak<ConnectionManager>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            frame = frames.next() => match frame {
                Some(Ok(frame)) => {
                    activity.touch();
                    counters.increment_frames_received();
                    metrics::FRAMES_RECEIVED_TOTAL.inc();
                    handler.on_frame(frame.freeze());
                }
                Some(Err(e)) => {
                    report_loss(&manager, id, format!("read error: {e}"));
                    return;
                }
                None => {
                    report_loss(&manager, id, "closed by remote peer".to_string());
                    return;
                }
            }
        }
    }
}

async fn write_loop(
    id: u64,
    mut sink: FramedWrite<Box<dyn tokio::io::AsyncWrite + Send + Unpin>, LengthDelimitedCodec>,
    mut rx: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
    write_timeout: Duration,
    counters: Arc<ConnectionCounters>,
    manager: Weak<ConnectionManager>,
) {
    loop {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            payload = rx.recv() => match payload {
                Some(payload) => payload,
                None => return,
            },
        };

        let len = payload.len();
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            res = tokio::time::timeout(write_timeout, sink.send(payload)) => res,
        };

        let failure = match written {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => BridgeError::WriteFailure(format!("{len} byte packet: {e}")),
            Err(_) => BridgeError::WriteFailure(format!(
                "{len} byte packet timed out after {write_timeout:?}"
            )),
        };
        counters.increment_write_failures();
        metrics::WRITE_FAILURES_TOTAL.inc();
        warn!("Session {}: {}. Packet dropped.", id, failure);
        report_loss(&manager, id, failure.to_string());
        return;
    }
}
