//! Dispatch counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct DispatchStats {
    enqueued: AtomicU64,
    executed: AtomicU64,
    inline_executed: AtomicU64,
    rejected: AtomicU64,
    discarded: AtomicU64,
    panicked: AtomicU64,
}

impl DispatchStats {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_inline(&self) {
        self.inline_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, count: usize) {
        self.discarded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            inline_executed: self.inline_executed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            ..StatsSnapshot::default()
        }
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Tasks accepted into the queue.
    pub enqueued: u64,
    /// Tasks the worker pulled from the queue and ran.
    pub executed: u64,
    /// `submit_sync` calls made on the worker thread and run in place.
    pub inline_executed: u64,
    /// Submissions refused because the queue was closed.
    pub rejected: u64,
    /// Queued tasks dropped unrun by a discarding shutdown.
    pub discarded: u64,
    /// Task bodies that panicked.
    pub panicked: u64,
    /// Cross-direction deadlock hazards diagnosed by the mailbox.
    pub deadlock_hazards: u64,
    /// Tasks pending right now.
    pub queue_len: usize,
    /// Most tasks ever pending at once.
    pub queue_high_water: usize,
}
