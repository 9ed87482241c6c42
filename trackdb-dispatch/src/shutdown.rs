//! Orderly stop of the worker and the mailbox.
//!
//! Shutdown closes the queue first, so every later submission fails fast
//! and every producer parked on a full queue is released. Under
//! [`ShutdownPolicy::Discard`] the tasks still queued are dropped, which
//! fails their sync callers. The worker then finishes what is left, drops
//! the resource on its own thread and exits. When shutdown runs on the
//! main thread it keeps serving the mailbox while it waits, so a worker
//! task that posts back to the main thread cannot wedge the join. The
//! mailbox is closed last.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{select, Receiver};

use crate::config::ShutdownPolicy;
use crate::dispatcher::Shared;
use crate::mailbox::MainThreadMailbox;
use crate::worker::{self, WorkerState};

/// What a completed shutdown did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks the worker ran over the engine's lifetime.
    pub executed: u64,
    /// Queued tasks dropped unrun.
    pub discarded: u64,
}

pub(crate) struct ShutdownCoordinator<R> {
    shared: Arc<Shared<R>>,
    handle: Option<JoinHandle<()>>,
    /// Disconnects when the worker thread exits.
    exited: Receiver<()>,
    mailbox: Option<Arc<MainThreadMailbox>>,
    policy: ShutdownPolicy,
    report: Option<ShutdownReport>,
}

impl<R> ShutdownCoordinator<R> {
    pub(crate) fn new(
        shared: Arc<Shared<R>>,
        handle: JoinHandle<()>,
        exited: Receiver<()>,
        mailbox: Option<Arc<MainThreadMailbox>>,
        policy: ShutdownPolicy,
    ) -> Self {
        Self {
            shared,
            handle: Some(handle),
            exited,
            mailbox,
            policy,
            report: None,
        }
    }

    pub(crate) fn policy(&self) -> ShutdownPolicy {
        self.policy
    }

    pub(crate) fn report(&self) -> Option<ShutdownReport> {
        self.report
    }

    /// Stop the engine. Later calls return the first call's report.
    pub(crate) fn shutdown(&mut self, policy: ShutdownPolicy) -> ShutdownReport {
        if let Some(report) = self.report {
            return report;
        }
        log::info!(target: "dispatch::shutdown", "shutting down ({:?})", policy);
        self.shared.state.set(WorkerState::Stopping);
        self.shared.queue.close();

        let mut discarded = 0;
        if policy == ShutdownPolicy::Discard {
            let pending = self.shared.queue.drain_pending();
            discarded = pending.len() as u64;
            for task in &pending {
                log::debug!(target: "dispatch::shutdown", "discard {}", task.label());
            }
            // Dropping the tasks drops their completions, which fails any
            // sync caller still waiting on them.
            drop(pending);
            self.shared.stats.record_discarded(discarded as usize);
            if discarded > 0 {
                log::warn!(target: "dispatch::shutdown", "discarded {} queued tasks", discarded);
            }
        }

        if worker::is_worker_thread(self.shared.id) {
            // Joining from here would wait on ourselves. The worker exits
            // on its own once the current task returns.
            log::error!(
                target: "dispatch::shutdown",
                "shutdown requested from the worker thread; not waiting for it to exit"
            );
            self.handle = None;
        } else {
            self.wait_for_worker();
        }

        if let Some(mailbox) = &self.mailbox {
            mailbox.close();
        }

        let report = ShutdownReport {
            executed: self.shared.stats.executed(),
            discarded,
        };
        log::info!(
            target: "dispatch::shutdown",
            "shutdown complete: {} executed, {} discarded",
            report.executed,
            report.discarded
        );
        self.report = Some(report);
        report
    }

    fn wait_for_worker(&mut self) {
        match &self.mailbox {
            Some(mailbox) if mailbox.is_main_thread() => {
                let wake = mailbox.wake_receiver();
                loop {
                    select! {
                        recv(self.exited) -> _ => break,
                        recv(wake) -> _ => {
                            mailbox.run_pending();
                        }
                    }
                }
            }
            _ => {}
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!(target: "dispatch::shutdown", "worker thread panicked during shutdown");
            }
        }
        self.shared.state.set(WorkerState::Stopped);
    }
}
