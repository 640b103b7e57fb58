//! # Executor Pool
//!
//! Every accepted connection runs as its own `may` coroutine. The coroutines
//! are multiplexed over a fixed set of scheduler worker threads, so a session
//! blocked on a socket read only parks its coroutine, never a thread.
//!
//! The pool keeps the join handle of every live session so shutdown can
//! drain them: first by waiting for sessions to notice the cleared run flag,
//! then by cancelling whatever is still parked once the grace period ends.
//!
//! ## Metrics
//!
//! [`SessionMetrics`] counts accepted, active, completed, failed and panicked
//! sessions. A session *fails* when it ends with a transport error; it
//! *panics* when its coroutine unwinds. Panics make shutdown ungraceful.

use crate::runtime_config::RuntimeConfig;
use crate::server::session::CloseReason;
use may::coroutine::JoinHandle;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Configuration for the executor pool
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Scheduler worker threads
    pub workers: usize,
    /// Stack size for session coroutines
    pub stack_size: usize,
    /// How long shutdown waits before cancelling sessions
    pub shutdown_grace: Duration,
}

impl PoolConfig {
    #[must_use]
    pub fn new(workers: usize, runtime: &RuntimeConfig) -> Self {
        Self {
            workers: workers.max(1),
            stack_size: runtime.stack_size,
            shutdown_grace: runtime.shutdown_grace,
        }
    }
}

/// Session counters
#[derive(Debug, Default)]
pub struct SessionMetrics {
    accepted: AtomicU64,
    active: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

impl SessionMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accept(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    fn record_exit(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get_accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_completed_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_panicked_count(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }
}

/// Decrements the active count however the session coroutine exits,
/// including unwinding from a panic or a cancellation.
struct ActiveGuard(Arc<SessionMetrics>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.record_exit();
    }
}

/// Outcome of [`ExecutorPool::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Sessions still tracked when draining started
    pub joined: usize,
    /// Sessions cut off at their suspension point after the grace period
    pub cancelled: usize,
    /// Session panics over the pool's lifetime
    pub panicked: u64,
}

impl DrainReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.panicked == 0
    }
}

/// Spawns and tracks session coroutines.
pub struct ExecutorPool {
    config: PoolConfig,
    metrics: Arc<SessionMetrics>,
    sessions: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutorPool {
    /// Configure the `may` scheduler and create the pool.
    ///
    /// The scheduler reads its configuration when the first coroutine is
    /// spawned, so this must run before anything else touches `may`.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        may::config().set_workers(config.workers);
        may::config().set_stack_size(config.stack_size);
        info!(
            workers = config.workers,
            stack_size = config.stack_size,
            shutdown_grace_ms = u64::try_from(config.shutdown_grace.as_millis()).unwrap_or(u64::MAX),
            "Creating executor pool"
        );
        Self {
            config,
            metrics: Arc::new(SessionMetrics::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }

    /// Number of session coroutines currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Run `session` on its own coroutine.
    pub fn spawn<F>(&self, peer: SocketAddr, session: F) -> io::Result<()>
    where
        F: FnOnce() -> io::Result<CloseReason> + Send + 'static,
    {
        self.reap();
        self.metrics.record_accept();
        let guard = ActiveGuard(Arc::clone(&self.metrics));
        let metrics = Arc::clone(&self.metrics);

        let builder = may::coroutine::Builder::new()
            .name(format!("session-{peer}"))
            .stack_size(self.config.stack_size);
        // SAFETY: `Builder::spawn` is unsafe because a coroutine must not hold
        // thread-local borrows across suspension points. Sessions own all of
        // their state and only suspend inside socket calls.
        let spawned = unsafe {
            builder.spawn(move || {
                let _guard = guard;
                match session() {
                    Ok(_) => metrics.record_completion(),
                    Err(e) => {
                        metrics.record_failure();
                        error!(%peer, error = %e, "Session ended with a transport error");
                    }
                }
            })
        };

        match spawned {
            Ok(handle) => {
                self.lock_sessions().push(handle);
                Ok(())
            }
            Err(e) => {
                // The closure, and with it the guard, was dropped by the failed spawn.
                error!(%peer, error = %e, "Failed to spawn session coroutine");
                Err(e)
            }
        }
    }

    /// Join sessions that already finished so the handle list stays small.
    pub fn reap(&self) {
        let finished: Vec<JoinHandle<()>> = {
            let mut sessions = self.lock_sessions();
            let (done, live): (Vec<_>, Vec<_>) = sessions.drain(..).partition(|h| h.is_done());
            *sessions = live;
            done
        };
        for handle in finished {
            self.join_session(handle, false);
        }
    }

    /// Wait up to `grace` for sessions to finish, cancel the rest, and join
    /// every one of them.
    ///
    /// Callers must have cleared the run flag the sessions watch, otherwise
    /// keep-alive connections will simply be cancelled at the deadline.
    pub fn drain(&self, grace: Duration) -> DrainReport {
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && self.lock_sessions().iter().any(|h| !h.is_done()) {
            thread::sleep(DRAIN_POLL);
        }

        let handles: Vec<JoinHandle<()>> = self.lock_sessions().drain(..).collect();
        let joined = handles.len();
        let mut cancelled = 0;
        for handle in handles {
            let cancel = !handle.is_done();
            if cancel {
                // SAFETY: cancellation unwinds the coroutine from its current
                // suspension point; sessions hold no locks across socket calls.
                unsafe { handle.coroutine().cancel() };
                cancelled += 1;
            }
            self.join_session(handle, cancel);
        }

        if cancelled > 0 {
            warn!(cancelled, "Cancelled sessions still running after the grace period");
        }
        DrainReport {
            joined,
            cancelled,
            panicked: self.metrics.get_panicked_count(),
        }
    }

    fn join_session(&self, handle: JoinHandle<()>, cancelled: bool) {
        if let Err(panic) = handle.join() {
            if cancelled {
                debug!("Session cancelled");
            } else {
                self.metrics.record_panic();
                error!(panic_message = ?panic, "Session coroutine panicked");
            }
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
