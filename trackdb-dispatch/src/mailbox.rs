//! Single-slot handoff from worker-side code back to the main thread.
//!
//! At most one callback occupies the slot. Posters queue behind the gate
//! until the main thread has run the previous callback and freed the
//! slot. The main thread learns about new work through a wake channel it
//! can `select!` on alongside its other event sources, then calls
//! [`MainThreadMailbox::run_pending`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::config::DispatchConfig;
use crate::error::MailboxError;
use crate::reentrancy::{PostingGuard, ReentrancyMonitor, ReentrancyPolicy};
use crate::task::{Reply, SyncCompletion};
use crate::worker::panic_message;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Payload {
    label: &'static str,
    callback: Callback,
}

#[derive(Default)]
struct Gate {
    occupied: bool,
    closed: bool,
}

pub struct MainThreadMailbox {
    main_thread: ThreadId,
    gate: Mutex<Gate>,
    /// Signalled when the slot is freed or the mailbox closes.
    freed: Condvar,
    slot: Mutex<Option<Payload>>,
    /// Set when a payload is stored, cleared by the main thread that takes it.
    pending: AtomicBool,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    monitor: Arc<ReentrancyMonitor>,
}

impl MainThreadMailbox {
    /// Create the mailbox. The calling thread becomes the main thread.
    pub fn new() -> Self {
        Self::with_policy(ReentrancyPolicy::default())
    }

    pub fn with_policy(policy: ReentrancyPolicy) -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
        let main_thread = thread::current().id();
        Self {
            main_thread,
            gate: Mutex::new(Gate::default()),
            freed: Condvar::new(),
            slot: Mutex::new(None),
            pending: AtomicBool::new(false),
            wake_tx,
            wake_rx,
            monitor: Arc::new(ReentrancyMonitor::for_main_thread(main_thread, policy)),
        }
    }

    /// Mailbox using the reentrancy policy from `config`.
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::with_policy(config.reentrancy)
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Payload>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.main_thread
    }

    pub fn main_thread(&self) -> ThreadId {
        self.main_thread
    }

    /// Monitor shared with every engine using this mailbox, so waits in
    /// either direction are visible to the other side.
    pub fn monitor(&self) -> Arc<ReentrancyMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Receiver that yields one message per stored callback.
    pub fn wake_receiver(&self) -> Receiver<()> {
        self.wake_rx.clone()
    }

    /// Schedule `callback` on the main thread without waiting for it to run.
    ///
    /// Waits only while another callback occupies the slot. On the main
    /// thread the callback runs immediately.
    pub fn post_async<F>(&self, label: &'static str, callback: F) -> Result<(), MailboxError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_main_thread() {
            callback();
            return Ok(());
        }
        log::debug!(target: "dispatch::mailbox", "post_async {}", label);
        self.deliver(
            Payload {
                label,
                callback: Box::new(callback),
            },
            false,
        )
    }

    /// Run `callback` on the main thread and wait for its result.
    ///
    /// The slot stays occupied until the callback has returned, so a second
    /// poster's callback never starts before this one is confirmed done.
    pub fn post_sync<T, F>(&self, label: &'static str, callback: F) -> Result<T, MailboxError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_main_thread() {
            return Ok(callback());
        }
        log::debug!(target: "dispatch::mailbox", "post_sync {}", label);
        let _posting = self.enter_post(label)?;

        let (completion, waiter) = SyncCompletion::pair();
        self.deliver(
            Payload {
                label,
                callback: Box::new(move || completion.complete_with(callback)),
            },
            true,
        )?;

        match waiter.wait() {
            Ok(Reply::Done(output)) => Ok(output),
            Ok(Reply::Panicked) => Err(MailboxError::CallbackPanicked { label }),
            Err(_) => Err(MailboxError::MailboxRejected),
        }
    }

    /// Register a worker-side poster as waiting on the main thread, and
    /// diagnose the post if the main thread is blocked in `submit_sync`.
    ///
    /// Posts from threads that are not workers are never a hazard: the main
    /// thread serves them once its own call returns.
    fn enter_post(&self, label: &'static str) -> Result<Option<PostingGuard<'_>>, MailboxError> {
        let Some((posting, blocked_in)) = self.monitor.enter_post(label) else {
            return Ok(None);
        };
        if let Some(blocked_in) = blocked_in {
            self.monitor.record_hazard();
            log::error!(
                target: "dispatch::mailbox",
                "deadlock hazard: {} waits on the main thread, which is blocked in submit_sync({})",
                label,
                blocked_in
            );
            if self.monitor.policy() == ReentrancyPolicy::Reject {
                return Err(MailboxError::DeadlockHazard { label });
            }
        }
        Ok(Some(posting))
    }

    /// Wait for the slot, store `payload` and wake the main thread.
    ///
    /// `registered` says the caller already holds a waiting registration;
    /// otherwise one is taken only if the slot is occupied.
    fn deliver(&self, payload: Payload, registered: bool) -> Result<(), MailboxError> {
        let mut gate = self.lock_gate();
        let mut checked = registered;
        let mut _posting = None;
        loop {
            if gate.closed {
                log::warn!(target: "dispatch::mailbox", "rejected {}: mailbox closed", payload.label);
                return Err(MailboxError::MailboxRejected);
            }
            if !gate.occupied {
                break;
            }
            if !checked {
                checked = true;
                drop(gate);
                _posting = self.enter_post(payload.label)?;
                gate = self.lock_gate();
                continue;
            }
            gate = self.freed.wait(gate).unwrap_or_else(PoisonError::into_inner);
        }
        gate.occupied = true;
        // Stored under the gate so `close` can never miss it.
        *self.lock_slot() = Some(payload);
        self.pending.store(true, Ordering::Release);
        drop(gate);

        let _ = self.wake_tx.send(());
        Ok(())
    }

    /// Run the pending callback, if any, and free the slot. Main thread only.
    ///
    /// Returns whether a callback ran.
    pub fn run_pending(&self) -> bool {
        if !self.is_main_thread() {
            log::warn!(target: "dispatch::mailbox", "run_pending called off the main thread; ignored");
            return false;
        }
        if self
            .pending
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let Some(payload) = self.lock_slot().take() else {
            return false;
        };

        log::debug!(target: "dispatch::mailbox", "run {}", payload.label);
        // A sync callback reports to its poster before unwinding.
        if let Err(p) = panic::catch_unwind(AssertUnwindSafe(payload.callback)) {
            log::error!(
                target: "dispatch::mailbox",
                "callback {} panicked: {}",
                payload.label,
                panic_message(p.as_ref())
            );
        }
        self.release();
        true
    }

    /// Whether a stored callback is waiting for `run_pending`.
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    fn release(&self) {
        self.lock_gate().occupied = false;
        self.freed.notify_one();
    }

    /// Wait up to `timeout` for a wake, then run whatever is pending.
    ///
    /// Returns the number of callbacks that ran.
    pub fn pump_for(&self, timeout: Duration) -> usize {
        let mut ran = 0;
        if self.wake_rx.recv_timeout(timeout).is_ok() && self.run_pending() {
            ran += 1;
        }
        while self.wake_rx.try_recv().is_ok() {
            if self.run_pending() {
                ran += 1;
            }
        }
        ran
    }

    /// Reject all future posts and drop any callback not yet run.
    ///
    /// A `post_sync` waiting on a dropped callback returns
    /// [`MailboxError::MailboxRejected`].
    pub fn close(&self) {
        let mut gate = self.lock_gate();
        if gate.closed {
            return;
        }
        gate.closed = true;
        let dropped = self.lock_slot().take();
        drop(gate);
        self.freed.notify_all();

        match dropped {
            Some(payload) => log::info!(
                target: "dispatch::mailbox",
                "mailbox closed, dropped pending {}",
                payload.label
            ),
            None => log::info!(target: "dispatch::mailbox", "mailbox closed"),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock_gate().closed
    }
}

impl Default for MainThreadMailbox {
    fn default() -> Self {
        Self::new()
    }
}
