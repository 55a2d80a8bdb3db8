// src/core/scheduler.rs

//! A bounded pool for delayed and fixed-interval background work.
//!
//! Every task the bridge runs outside the I/O path goes through the `Scheduler`:
//! the health monitor, reconnect attempts, cache maintenance and warm-up. The
//! pool size caps how many task bodies execute at the same time, and every task
//! is tied to a root cancellation token so shutdown can stop all of them with
//! a bounded wait.

use crate::core::errors::BridgeError;
use crate::core::metrics;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The upper bound for an automatically sized pool.
const MAX_AUTO_POOL_SIZE: usize = 16;
/// The lower bound for an automatically sized pool.
const MIN_AUTO_POOL_SIZE: usize = 2;

/// Work that runs on a fixed interval.
///
/// Executions of one periodic task never overlap: if a run outlasts the period,
/// the next run is delayed until it finishes.
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    /// A short name used in logs.
    fn name(&self) -> &'static str;

    /// The time between the start of two consecutive runs.
    fn period(&self) -> Duration;

    /// The delay before the first run. Defaults to one full period.
    fn initial_delay(&self) -> Duration {
        self.period()
    }

    async fn run_once(&self);
}

/// A handle to a scheduled task that can be used to cancel it.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: &'static str,
    token: CancellationToken,
    finished: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Cancels the task. Pending runs never start; a run in progress is dropped
    /// at its next suspension point.
    pub fn cancel(&self) {
        debug!("Cancelling scheduled task '{}'.", self.name);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns true once the task has exited, for any reason.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// The outcome of `Scheduler::shutdown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that exited on their own within the grace period.
    pub drained: usize,
    /// Tasks that had to be aborted after the grace period elapsed.
    pub forced: usize,
}

impl ShutdownReport {
    pub fn timed_out(&self) -> bool {
        self.forced > 0
    }
}

// Tracks a live task and marks its handle finished when dropped.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
}

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>, finished: Arc<AtomicBool>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        metrics::SCHEDULED_TASKS.inc();
        Self { active, finished }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        metrics::SCHEDULED_TASKS.dec();
        self.finished.store(true, Ordering::Release);
    }
}

/// A fixed-size pool executing delayed and periodic tasks.
pub struct Scheduler {
    handle: Handle,
    pool_size: usize,
    permits: Arc<Semaphore>,
    root: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
    closed: AtomicBool,
    active: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pool_size", &self.pool_size)
            .field("active", &self.active_tasks())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Scheduler {
    /// Computes the pool size from a configured hint.
    ///
    /// A positive hint is clamped to `[1, cores * 2]`. Zero selects an automatic
    /// size of `max(2, min(16, cores))`.
    pub fn pool_size_for(hint: usize) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if hint > 0 {
            hint.clamp(1, cores * 2)
        } else {
            cores.clamp(MIN_AUTO_POOL_SIZE, MAX_AUTO_POOL_SIZE)
        }
    }

    /// Creates a scheduler on the ambient Tokio runtime.
    ///
    /// Fails with `BridgeError::Startup` when called outside a runtime.
    pub fn new(pool_size: usize) -> Result<Arc<Self>, BridgeError> {
        let handle = Handle::try_current().map_err(|e| {
            BridgeError::Startup(format!("no async runtime available for the scheduler: {e}"))
        })?;
        Ok(Self::with_handle(handle, pool_size))
    }

    pub fn with_handle(handle: Handle, pool_size: usize) -> Arc<Self> {
        let pool_size = pool_size.max(1);
        info!("Scheduler started with a pool of {} workers.", pool_size);
        Arc::new(Self {
            handle,
            pool_size,
            permits: Arc::new(Semaphore::new(pool_size)),
            root: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// The number of tasks that are scheduled or running.
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops accepting new work. Already scheduled tasks keep running.
    pub fn close(&self) {
        let _tasks = self.tasks.lock();
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Scheduler closed to new work.");
        }
    }

    /// Runs `fut` once as soon as a worker is free.
    pub fn spawn<F>(&self, name: &'static str, fut: F) -> Result<TaskHandle, BridgeError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.schedule_once(name, Duration::ZERO, fut)
    }

    /// Runs `fut` once after `delay`.
    pub fn schedule_once<F>(
        &self,
        name: &'static str,
        delay: Duration,
        fut: F,
    ) -> Result<TaskHandle, BridgeError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.submit(name, move |token| async move {
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Task '{}' cancelled before it ran.", name);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let _permit = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            tokio::select! {
                biased;
                _ = token.cancelled() => debug!("Task '{}' cancelled while running.", name),
                _ = fut => {}
            }
        })
    }

    /// Runs `task` every `task.period()`, starting after `task.initial_delay()`.
    pub fn schedule_periodic<T>(&self, task: T) -> Result<TaskHandle, BridgeError>
    where
        T: PeriodicTask,
    {
        let name = task.name();
        let period = task.period();
        if period.is_zero() {
            return Err(BridgeError::Internal(format!(
                "periodic task '{name}' requires a non-zero period"
            )));
        }
        let permits = Arc::clone(&self.permits);
        self.submit(name, move |token| async move {
            let start = Instant::now() + task.initial_delay();
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("Periodic task '{}' started with a period of {:?}.", name, period);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let _permit = tokio::select! {
                            biased;
                            _ = token.cancelled() => break,
                            permit = Arc::clone(&permits).acquire_owned() => match permit {
                                Ok(permit) => permit,
                                Err(_) => break,
                            },
                        };
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => break,
                            _ = task.run_once() => {}
                        }
                    }
                }
            }
            debug!("Periodic task '{}' stopped.", name);
        })
    }

    // Registers a task body with the join set under a fresh child token.
    fn submit<B, Fut>(&self, name: &'static str, body: B) -> Result<TaskHandle, BridgeError>
    where
        B: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::SchedulerClosed);
        }

        // Reap finished tasks so the join set does not grow without bound.
        while let Some(res) = tasks.try_join_next() {
            if let Err(e) = res
                && e.is_panic()
            {
                error!("A scheduled task panicked: {e:?}");
            }
        }

        let token = self.root.child_token();
        let finished = Arc::new(AtomicBool::new(false));
        let guard = ActiveGuard::new(Arc::clone(&self.active), Arc::clone(&finished));
        let fut = body(token.clone());
        tasks.spawn_on(
            async move {
                let _guard = guard;
                fut.await;
            },
            &self.handle,
        );

        Ok(TaskHandle {
            name,
            token,
            finished,
        })
    }

    /// Cancels every task and waits up to `grace` for them to exit, then aborts
    /// whatever is left. Idempotent.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let mut tasks = {
            let mut tasks = self.tasks.lock();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *tasks)
        };
        self.root.cancel();

        let total = tasks.len();
        if total == 0 {
            return ShutdownReport::default();
        }
        info!("Scheduler shutting down. Waiting for {} tasks.", total);

        match tokio::time::timeout(grace, drain(&mut tasks)).await {
            Ok(drained) => {
                info!("All scheduled tasks have stopped.");
                ShutdownReport { drained, forced: 0 }
            }
            Err(_) => {
                let forced = tasks.len();
                let err = BridgeError::ShutdownTimeout(grace);
                warn!("{}. Force-cancelling {} remaining tasks.", err, forced);
                tasks.abort_all();
                // An aborted task that is blocking its thread only stops once it
                // yields, so the join set is reaped in the background.
                self.handle.spawn(async move {
                    while let Some(res) = tasks.join_next().await {
                        if let Err(e) = res
                            && e.is_panic()
                        {
                            error!("A force-cancelled task panicked: {e:?}");
                        }
                    }
                });
                ShutdownReport {
                    drained: total - forced,
                    forced,
                }
            }
        }
    }
}

async fn drain(tasks: &mut JoinSet<()>) -> usize {
    let mut drained = 0;
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res
            && e.is_panic()
        {
            error!("A scheduled task panicked during shutdown: {e:?}");
        }
        drained += 1;
    }
    drained
}
