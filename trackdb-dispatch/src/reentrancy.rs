//! Deadlock-hazard diagnosis between the two directions.
//!
//! The cycle to catch is a worker waiting on the main thread (a mailbox
//! post) while the main thread waits on a worker (`submit_sync`). Either
//! side may arrive second, so both register here and check the other side
//! under the same lock. Whichever arrives second reports the hazard.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// What happens after a deadlock hazard is diagnosed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReentrancyPolicy {
    /// Log the hazard and proceed (the call will block).
    #[default]
    Warn,
    /// Log the hazard and fail the call that closed the cycle.
    Reject,
}

impl FromStr for ReentrancyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown reentrancy policy '{}'", other)),
        }
    }
}

#[derive(Debug, Default)]
struct Waits {
    /// Thread -> label of the `submit_sync` it is blocked in.
    blocked: HashMap<ThreadId, &'static str>,
    /// Worker threads of every engine sharing this monitor.
    workers: HashSet<ThreadId>,
    /// Worker thread -> label of the mailbox post it is waiting in.
    posting: HashMap<ThreadId, &'static str>,
}

#[derive(Debug, Default)]
pub struct ReentrancyMonitor {
    main_thread: Option<ThreadId>,
    policy: ReentrancyPolicy,
    waits: Mutex<Waits>,
    hazards: AtomicU64,
}

impl ReentrancyMonitor {
    /// A monitor with no main thread. Nothing can close the cycle against
    /// it, so it never reports a hazard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor for the mailbox served by `main_thread`.
    pub fn for_main_thread(main_thread: ThreadId, policy: ReentrancyPolicy) -> Self {
        Self {
            main_thread: Some(main_thread),
            policy,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Waits> {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> ReentrancyPolicy {
        self.policy
    }

    /// Register the current thread as a worker until the guard drops.
    pub(crate) fn register_worker(&self) -> WorkerGuard<'_> {
        let thread = thread::current().id();
        self.lock().workers.insert(thread);
        WorkerGuard {
            monitor: self,
            thread,
        }
    }

    pub fn is_worker(&self, thread: ThreadId) -> bool {
        self.lock().workers.contains(&thread)
    }

    /// Mark the current thread as blocked in `submit_sync(label)` until the
    /// returned guard drops.
    ///
    /// On the main thread, also returns the label of a post some worker is
    /// already waiting in, if any.
    pub(crate) fn enter_sync(&self, label: &'static str) -> (BlockedGuard<'_>, Option<&'static str>) {
        let thread = thread::current().id();
        let mut waits = self.lock();
        waits.blocked.insert(thread, label);
        let waiting_post = if Some(thread) == self.main_thread {
            waits.posting.values().next().copied()
        } else {
            None
        };
        drop(waits);
        (
            BlockedGuard {
                monitor: self,
                thread,
            },
            waiting_post,
        )
    }

    /// Mark the current worker thread as waiting on the main thread in
    /// post `label` until the returned guard drops.
    ///
    /// Returns `None` on a thread that is not a worker: such a poster
    /// cannot stall the main thread's `submit_sync`. Otherwise also returns
    /// the label of the `submit_sync` the main thread is blocked in, if any.
    pub(crate) fn enter_post(&self, label: &'static str) -> Option<(PostingGuard<'_>, Option<&'static str>)> {
        let main_thread = self.main_thread?;
        let thread = thread::current().id();
        let mut waits = self.lock();
        if !waits.workers.contains(&thread) {
            return None;
        }
        waits.posting.insert(thread, label);
        let blocked_in = waits.blocked.get(&main_thread).copied();
        drop(waits);
        Some((
            PostingGuard {
                monitor: self,
                thread,
            },
            blocked_in,
        ))
    }

    /// Label of the `submit_sync` that `thread` is blocked in, if any.
    pub fn blocked_in(&self, thread: ThreadId) -> Option<&'static str> {
        self.lock().blocked.get(&thread).copied()
    }

    pub(crate) fn record_hazard(&self) {
        self.hazards.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hazards(&self) -> u64 {
        self.hazards.load(Ordering::Relaxed)
    }
}

pub(crate) struct BlockedGuard<'a> {
    monitor: &'a ReentrancyMonitor,
    thread: ThreadId,
}

impl Drop for BlockedGuard<'_> {
    fn drop(&mut self) {
        self.monitor.lock().blocked.remove(&self.thread);
    }
}

pub(crate) struct PostingGuard<'a> {
    monitor: &'a ReentrancyMonitor,
    thread: ThreadId,
}

impl Drop for PostingGuard<'_> {
    fn drop(&mut self) {
        self.monitor.lock().posting.remove(&self.thread);
    }
}

pub(crate) struct WorkerGuard<'a> {
    monitor: &'a ReentrancyMonitor,
    thread: ThreadId,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        self.monitor.lock().workers.remove(&self.thread);
    }
}
