//! Start/stop state machine for background workers.
//!
//! A worker owns one [`LifecycleManager`]. The method that starts the work
//! calls [`begin_initialization`](LifecycleManager::begin_initialization),
//! the worker flips to running with
//! [`initialization_complete`](LifecycleManager::initialization_complete) and
//! watches [`shutdown_requested`](LifecycleManager::shutdown_requested) in its
//! `select!` loop. Whatever way the worker exits, it must end with
//! [`shutdown_complete`](LifecycleManager::shutdown_complete); holding a
//! [`CompletionGuard`] does that on drop.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tracing::debug;

/// Lifecycle status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// No work in progress. The only state from which work may start.
    Idle = 0,
    /// Work was requested and is being set up.
    Starting = 1,
    /// Work is in progress.
    Running = 2,
    /// Work is winding down.
    Stopping = 3,
}

impl Status {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Status::Starting,
            2 => Status::Running,
            3 => Status::Stopping,
            _ => Status::Idle,
        }
    }

    /// Get the status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Starting => "starting",
            Status::Running => "running",
            Status::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reusable start/stop state machine.
///
/// The status lives in one atomic word and is only ever changed through
/// compare-and-swap, except for the final return to [`Status::Idle`].
/// At most one shutdown signal is pending at any time.
#[derive(Debug)]
pub struct LifecycleManager {
    status: AtomicU8,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: AsyncMutex<mpsc::Receiver<()>>,
    /// Serializes queueing a signal against draining it on completion.
    signal_lock: Mutex<()>,
    idle_lock: Mutex<()>,
    idle_cond: Condvar,
    idle_notify: Notify,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Self {
            status: AtomicU8::new(Status::Idle as u8),
            shutdown_tx,
            shutdown_rx: AsyncMutex::new(shutdown_rx),
            signal_lock: Mutex::new(()),
            idle_lock: Mutex::new(()),
            idle_cond: Condvar::new(),
            idle_notify: Notify::new(),
        }
    }
}

impl LifecycleManager {
    /// Create a new manager in the [`Status::Idle`] state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current status.
    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Returns `true` while the work is in [`Status::Running`].
    pub fn is_running(&self) -> bool {
        self.status() == Status::Running
    }

    fn transition(&self, from: Status, to: Status) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move from idle to starting.
    ///
    /// Returns `false` if the work is not idle. When several callers race,
    /// exactly one gets `true`.
    pub fn begin_initialization(&self) -> bool {
        self.transition(Status::Idle, Status::Starting)
    }

    /// Move from starting to running.
    ///
    /// Returns `false` when called outside of [`Status::Starting`], which
    /// also happens when a shutdown was requested during startup. The
    /// worker should then exit without doing any work.
    pub fn initialization_complete(&self) -> bool {
        self.transition(Status::Starting, Status::Running)
    }

    /// Request the work to stop.
    ///
    /// Succeeds from [`Status::Running`] or [`Status::Starting`] and queues
    /// exactly one shutdown signal. Any other state is a no-op returning
    /// `false`, so repeated requests never stack signals.
    pub fn begin_shutdown(&self) -> bool {
        let _signal = self.signal_lock.lock();
        let won = self.transition(Status::Running, Status::Stopping)
            || self.transition(Status::Starting, Status::Stopping);
        if !won {
            debug!(status = %self.status(), "Shutdown requested while not running, ignoring");
            return false;
        }

        if self.shutdown_tx.try_send(()).is_err() {
            debug!("Shutdown signal already pending");
        }
        true
    }

    /// Wait until a shutdown signal arrives.
    ///
    /// Meant to be one branch of the worker's `select!` loop. The future is
    /// cancel safe: dropping it before completion does not consume a signal.
    pub async fn shutdown_requested(&self) {
        let mut rx = self.shutdown_rx.lock().await;
        // The sender lives in `self`, so `recv` only yields on a real signal.
        let _ = rx.recv().await;
    }

    /// Record that the work is stopping on its own (error, timeout, EOF).
    ///
    /// No signal is queued. Returns `false` if the work was not running.
    pub fn abnormal_shutdown(&self) -> bool {
        self.transition(Status::Running, Status::Stopping)
    }

    /// Mark the work as finished and wake every waiter.
    ///
    /// Moves to [`Status::Idle`] from any state and discards a stale
    /// shutdown signal left behind by a stop that raced the worker's own
    /// exit. A stop racing this call either queues its signal before the
    /// drain or finds the work idle; no signal outlives the run.
    pub fn shutdown_complete(&self) {
        {
            let _signal = self.signal_lock.lock();
            self.drain_shutdown_signal();
            self.status.store(Status::Idle as u8, Ordering::Release);
        }

        {
            let _guard = self.idle_lock.lock();
            self.idle_cond.notify_all();
        }
        self.idle_notify.notify_waiters();
    }

    fn drain_shutdown_signal(&self) {
        if let Ok(mut rx) = self.shutdown_rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
    }

    /// Wait asynchronously until the work is back to [`Status::Idle`].
    pub async fn wait_shutdown_complete(&self) {
        loop {
            let notified = self.idle_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.status() == Status::Idle {
                return;
            }
            notified.await;
        }
    }

    /// Block the current thread until the work is back to [`Status::Idle`].
    ///
    /// Must not be called from inside an async task; use
    /// [`wait_shutdown_complete`](Self::wait_shutdown_complete) there.
    pub fn block_until_shutdown_complete(&self) {
        let mut guard = self.idle_lock.lock();
        while self.status() != Status::Idle {
            self.idle_cond.wait(&mut guard);
        }
    }

    /// Create a guard that calls [`shutdown_complete`](Self::shutdown_complete)
    /// when dropped.
    pub fn completion_guard(&self) -> CompletionGuard<'_> {
        CompletionGuard { lifecycle: self }
    }
}

/// Calls [`LifecycleManager::shutdown_complete`] on drop.
#[derive(Debug)]
#[must_use = "the lifecycle returns to idle as soon as the guard is dropped"]
pub struct CompletionGuard<'a> {
    lifecycle: &'a LifecycleManager,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.shutdown_complete();
    }
}
