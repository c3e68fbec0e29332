//! Callback delivery off the dispatch task.
//!
//! The dispatcher never runs the user callback itself. Every invocation
//! happens on a blocking task tracked in a [`JoinSet`], so a panicking
//! callback cannot take the stream down, and [`Delivery::finish`] joins all
//! of them before the stream call returns.
//!
//! Both modes are bounded by the configured capacity: the ordered queue
//! holds at most that many events and the concurrent mode runs at most that
//! many callbacks at once. When the bound is reached [`Delivery::deliver`]
//! waits, which stalls the dispatcher and, through the event channel, the
//! reader, so a slow callback slows the stream down instead of growing a
//! backlog.
//!
//! Dropping a [`Delivery`] without calling `finish` cancels it: callbacks
//! that have not started yet are skipped. Callbacks already running on a
//! blocking thread cannot be interrupted and run to completion.

use crate::config::DeliveryMode;
use crate::event::Event;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error};

enum Lane {
    /// Feeds the single worker that invokes callbacks in order.
    Ordered(mpsc::Sender<Event>),
    /// Limits how many callbacks run at once.
    Concurrent(Arc<Semaphore>),
}

pub(crate) struct Delivery<F> {
    callback: Arc<F>,
    lane: Option<Lane>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl<F> Delivery<F>
where
    F: Fn(Event) + Send + Sync + 'static,
{
    /// Start delivering with at most `capacity` events pending.
    pub(crate) fn start(mode: DeliveryMode, capacity: usize, callback: Arc<F>) -> Self {
        let capacity = capacity.max(1);
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let lane = match mode {
            DeliveryMode::Ordered => {
                let (tx, mut rx) = mpsc::channel::<Event>(capacity);
                let callback = Arc::clone(&callback);
                let cancel = cancel.clone();
                tasks.spawn_blocking(move || {
                    while let Some(event) = rx.blocking_recv() {
                        if cancel.is_cancelled() {
                            debug!(id = event.id(), "Delivery cancelled, skipping queued events");
                            break;
                        }
                        invoke(callback.as_ref(), event);
                    }
                });
                Lane::Ordered(tx)
            }
            DeliveryMode::Concurrent => {
                let permits = capacity.min(Semaphore::MAX_PERMITS);
                Lane::Concurrent(Arc::new(Semaphore::new(permits)))
            }
        };

        Self {
            callback,
            lane: Some(lane),
            tasks,
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
        }
    }

    /// Hand `event` to the callback, waiting while the bound is reached.
    ///
    /// Cancel safe: dropping the future drops the event.
    pub(crate) async fn deliver(&mut self, event: Event) {
        match &self.lane {
            Some(Lane::Ordered(queue)) => {
                if let Err(mpsc::error::SendError(event)) = queue.send(event).await {
                    // The worker only stops once the queue is closed.
                    error!(id = event.id(), "Ordered delivery worker is gone, dropping event");
                }
            }
            Some(Lane::Concurrent(permits)) => {
                let permits = Arc::clone(permits);
                while let Some(result) = self.tasks.try_join_next() {
                    reap(result);
                }
                let Ok(permit) = permits.acquire_owned().await else {
                    error!(id = event.id(), "Delivery limiter closed, dropping event");
                    return;
                };
                let callback = Arc::clone(&self.callback);
                let cancel = self.cancel.clone();
                self.tasks.spawn_blocking(move || {
                    let _permit = permit;
                    if !cancel.is_cancelled() {
                        invoke(callback.as_ref(), event);
                    }
                });
            }
            None => debug!(id = event.id(), "Delivery finished, dropping event"),
        }
    }

    /// Returns `true` when finished callback tasks should be collected while
    /// the stream is running.
    pub(crate) fn needs_reaping(&self) -> bool {
        matches!(self.lane, Some(Lane::Concurrent(_))) && !self.tasks.is_empty()
    }

    pub(crate) async fn join_next(&mut self) -> Option<Result<(), JoinError>> {
        self.tasks.join_next().await
    }

    /// Close the queue and wait for every callback to return.
    pub(crate) async fn finish(mut self) {
        self.lane = None;
        while let Some(result) = self.tasks.join_next().await {
            reap(result);
        }
    }
}

/// Log the outcome of a finished callback task.
pub(crate) fn reap(result: Result<(), JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            error!(message = %panic_message(&*err.into_panic()), "Event callback task panicked");
        } else {
            debug!(error = %err, "Event callback task cancelled");
        }
    }
}

fn invoke<F: Fn(Event)>(callback: &F, event: Event) {
    let id = event.id().to_owned();
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
        error!(id = %id, message = %panic_message(&*panic), "Event callback panicked");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
