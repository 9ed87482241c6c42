//! Dispatcher: the submission API usable from any thread.
//!
//! Every forward call goes through the one shared queue, so sync and async
//! submissions execute in a single global FIFO order.
//!
//! # Usage constraint
//!
//! `submit_sync` parks the calling thread until the worker has run the
//! task. If that task then waits on the same thread, for example by
//! calling [`MainThreadMailbox::post_sync`](crate::MainThreadMailbox::post_sync)
//! while the main thread is the one parked here, neither side can make
//! progress. Whichever side arrives second diagnoses the cycle (see
//! [`ReentrancyPolicy`](crate::ReentrancyPolicy)) but nothing resolves it:
//! worker tasks that may run while the main thread is parked should use
//! `post_async` or an event channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{DispatchError, DispatchResult, QueueError};
use crate::queue::BoundedTaskQueue;
use crate::reentrancy::{ReentrancyMonitor, ReentrancyPolicy};
use crate::stats::{DispatchStats, StatsSnapshot};
use crate::task::{Reply, SyncCompletion, Task};
use crate::worker::{self, EngineId, StateCell, WorkerState};

/// Called with `true` when the first `submit_sync` caller parks and with
/// `false` when the last one returns. Calls are serialized with the count
/// change that triggers them; the hook must not submit work itself.
pub type BusyHook = Box<dyn Fn(bool) + Send + Sync + 'static>;

/// State shared by the dispatcher handles, the worker and the shutdown path.
pub(crate) struct Shared<R> {
    pub(crate) id: EngineId,
    pub(crate) queue: BoundedTaskQueue<Task<R>>,
    pub(crate) stats: DispatchStats,
    pub(crate) state: StateCell,
    pub(crate) monitor: Arc<ReentrancyMonitor>,
    in_flight_sync: AtomicUsize,
    /// Held across a count change and the hook call it triggers, so
    /// transitions reach the hook in the order they happened.
    busy_lock: Mutex<()>,
    busy_hook: Option<BusyHook>,
}

impl<R> Shared<R> {
    pub(crate) fn new(
        capacity: usize,
        monitor: Arc<ReentrancyMonitor>,
        busy_hook: Option<BusyHook>,
    ) -> Self {
        Self {
            id: EngineId::next(),
            queue: BoundedTaskQueue::new(capacity),
            stats: DispatchStats::default(),
            state: StateCell::new(WorkerState::Running),
            monitor,
            in_flight_sync: AtomicUsize::new(0),
            busy_lock: Mutex::new(()),
            busy_hook,
        }
    }

    fn enter_sync(&self) {
        let _busy = self.busy_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.in_flight_sync.fetch_add(1, Ordering::AcqRel) == 0 {
            if let Some(hook) = &self.busy_hook {
                hook(true);
            }
        }
    }

    fn leave_sync(&self) {
        let _busy = self.busy_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.in_flight_sync.fetch_sub(1, Ordering::AcqRel) == 1 {
            if let Some(hook) = &self.busy_hook {
                hook(false);
            }
        }
    }
}

struct InFlight<'a, R>(&'a Shared<R>);

impl<R> Drop for InFlight<'_, R> {
    fn drop(&mut self) {
        self.0.leave_sync();
    }
}

/// Cloneable handle for submitting tasks against the protected resource `R`.
pub struct Dispatcher<R> {
    shared: Arc<Shared<R>>,
}

impl<R> Clone for Dispatcher<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: 'static> Dispatcher<R> {
    pub(crate) fn new(shared: Arc<Shared<R>>) -> Self {
        Self { shared }
    }

    /// Queue `task` and return without waiting for it to run.
    ///
    /// The task runs after everything already queued and before anything
    /// queued later. Blocks only while the queue is full.
    pub fn submit_async(&self, task: Task<R>) -> DispatchResult {
        log::debug!(target: "dispatch", "async {}", task.label());
        self.enqueue(task)
    }

    /// Shorthand for `submit_async(Task::new(label, body))`.
    pub fn call_async<F>(&self, label: &'static str, body: F) -> DispatchResult
    where
        F: FnOnce(&R) + Send + 'static,
    {
        self.submit_async(Task::new(label, body))
    }

    /// Run `body` on the worker and block until it has finished, returning
    /// its output.
    ///
    /// On the worker thread itself the body runs in place and the queue is
    /// never touched. Returns [`DispatchError::QueueRejected`] if the engine
    /// shuts down before the task runs, and under
    /// [`ReentrancyPolicy::Reject`] returns [`DispatchError::DeadlockHazard`]
    /// when called on the main thread while a worker waits on it.
    pub fn submit_sync<T, F>(&self, label: &'static str, body: F) -> DispatchResult<T>
    where
        F: FnOnce(&R) -> T + Send + 'static,
        T: Send + 'static,
    {
        let body = match worker::with_active::<R, T, F>(self.shared.id, body) {
            Ok(output) => {
                self.shared.stats.record_inline();
                log::debug!(target: "dispatch", "sync {} ran inline on worker", label);
                return Ok(output);
            }
            Err(body) => body,
        };

        log::debug!(target: "dispatch", "sync {}", label);
        let (_blocked, waiting_post) = self.shared.monitor.enter_sync(label);
        if let Some(post) = waiting_post {
            self.shared.monitor.record_hazard();
            log::error!(
                target: "dispatch",
                "deadlock hazard: main thread enters submit_sync({}) while a worker waits on it in {}",
                label,
                post
            );
            if self.shared.monitor.policy() == ReentrancyPolicy::Reject {
                return Err(DispatchError::DeadlockHazard { label });
            }
        }

        let (completion, waiter) = SyncCompletion::pair();
        let task = Task::sync(label, move |resource: &R| {
            completion.complete_with(|| body(resource))
        });

        self.shared.enter_sync();
        let _in_flight = InFlight(&self.shared);

        self.enqueue(task)?;
        match waiter.wait() {
            Ok(Reply::Done(output)) => Ok(output),
            Ok(Reply::Panicked) => Err(DispatchError::TaskPanicked { label }),
            Err(_) => {
                log::warn!(target: "dispatch", "sync {} dropped unrun at shutdown", label);
                Err(DispatchError::QueueRejected)
            }
        }
    }

    fn enqueue(&self, task: Task<R>) -> DispatchResult {
        // The worker must never wait for a slot only it can free.
        let result = if worker::is_worker_thread(self.shared.id) {
            self.shared.queue.enqueue_unbounded(task)
        } else {
            self.shared.queue.enqueue(task)
        };

        match result {
            Ok(()) => {
                self.shared.stats.record_enqueued();
                Ok(())
            }
            Err(QueueError::Closed(task)) => {
                self.shared.stats.record_rejected();
                log::warn!(target: "dispatch", "rejected {}: engine is shutting down", task.label());
                Err(DispatchError::QueueRejected)
            }
        }
    }
}

impl<R> Dispatcher<R> {
    /// Number of callers currently parked in `submit_sync`.
    pub fn in_flight_sync(&self) -> usize {
        self.shared.in_flight_sync.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight_sync() > 0
    }

    pub fn is_worker_thread(&self) -> bool {
        worker::is_worker_thread(self.shared.id)
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state.get()
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            deadlock_hazards: self.shared.monitor.hazards(),
            queue_len: self.shared.queue.len(),
            queue_high_water: self.shared.queue.high_water(),
            ..self.shared.stats.snapshot()
        }
    }
}
