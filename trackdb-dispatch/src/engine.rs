//! Engine startup and ownership of the worker thread.

use std::fmt;
use std::sync::Arc;
use std::thread;

use crate::config::{DispatchConfig, ShutdownPolicy};
use crate::dispatcher::{BusyHook, Dispatcher, Shared};
use crate::error::DispatchError;
use crate::mailbox::MainThreadMailbox;
use crate::reentrancy::ReentrancyMonitor;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::stats::StatsSnapshot;
use crate::worker::{Worker, WorkerState};

type Opener<R> = Box<dyn FnOnce() -> Result<R, String> + Send + 'static>;

/// Configures and starts an [`Engine`].
pub struct EngineBuilder<R> {
    opener: Opener<R>,
    config: DispatchConfig,
    mailbox: Option<Arc<MainThreadMailbox>>,
    busy_hook: Option<BusyHook>,
}

impl<R: 'static> EngineBuilder<R> {
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach the main-thread mailbox. Shutdown on the main thread serves
    /// it while waiting for the worker and closes it afterwards.
    pub fn mailbox(mut self, mailbox: &Arc<MainThreadMailbox>) -> Self {
        self.mailbox = Some(Arc::clone(mailbox));
        self
    }

    /// Called on 0 -> 1 and 1 -> 0 transitions of the number of threads
    /// parked in `submit_sync`.
    pub fn on_busy_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.busy_hook = Some(Box::new(hook));
        self
    }

    /// Spawn the worker, open the resource on it and wait until it is ready.
    pub fn start(self) -> Result<Engine<R>, DispatchError> {
        let monitor = match &self.mailbox {
            Some(mailbox) => mailbox.monitor(),
            None => Arc::new(ReentrancyMonitor::new()),
        };
        let shared = Arc::new(Shared::new(self.config.queue_capacity, monitor, self.busy_hook));

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let (exit_tx, exit_rx) = crossbeam_channel::bounded::<()>(0);
        let worker = Worker::new(Arc::clone(&shared));
        let opener = self.opener;

        let handle = thread::Builder::new()
            .name(self.config.worker_name.clone())
            .spawn(move || {
                let _exit = exit_tx;
                let resource = match opener() {
                    Ok(resource) => resource,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                worker.run(resource);
            })
            .map_err(|e| DispatchError::Spawn(e.to_string()))?;

        let failure = match ready_rx.recv() {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some("worker exited while opening the resource".to_string()),
        };
        if let Some(reason) = failure {
            shared.queue.close();
            let _ = handle.join();
            shared.state.set(WorkerState::Stopped);
            log::error!(target: "dispatch", "engine failed to start: {}", reason);
            return Err(DispatchError::ResourceOpen(reason));
        }

        log::info!(
            target: "dispatch",
            "engine started: worker '{}', queue capacity {}, {:?} on shutdown",
            self.config.worker_name,
            shared.queue.capacity(),
            self.config.shutdown_policy
        );
        Ok(Engine {
            dispatcher: Dispatcher::new(Arc::clone(&shared)),
            coordinator: ShutdownCoordinator::new(
                shared,
                handle,
                exit_rx,
                self.mailbox,
                self.config.shutdown_policy,
            ),
        })
    }
}

/// A running worker plus the handles to reach it.
///
/// Dropping the engine shuts it down with the configured policy.
pub struct Engine<R> {
    dispatcher: Dispatcher<R>,
    coordinator: ShutdownCoordinator<R>,
}

impl<R: 'static> Engine<R> {
    /// Start building an engine whose resource is produced by `opener`.
    ///
    /// `opener` runs on the worker thread, so the resource never has to
    /// cross threads.
    pub fn builder<F, E>(opener: F) -> EngineBuilder<R>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        E: fmt::Display,
    {
        EngineBuilder {
            opener: Box::new(move || opener().map_err(|e| e.to_string())),
            config: DispatchConfig::default(),
            mailbox: None,
            busy_hook: None,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<R> {
        &self.dispatcher
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats()
    }
}

impl<R> Engine<R> {
    pub fn state(&self) -> WorkerState {
        self.dispatcher.state()
    }

    pub fn is_shut_down(&self) -> bool {
        self.coordinator.report().is_some()
    }

    /// Shut down with the configured policy.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let policy = self.coordinator.policy();
        self.coordinator.shutdown(policy)
    }

    /// Shut down with an explicit policy. Ignored if already shut down.
    pub fn shutdown_with(&mut self, policy: ShutdownPolicy) -> ShutdownReport {
        self.coordinator.shutdown(policy)
    }
}

impl<R> Drop for Engine<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn opener_runs_on_worker_thread() {
        let engine = Engine::builder(|| Ok::<_, String>(thread::current().name().map(String::from)))
            .config(DispatchConfig::default().worker_name("probe-worker"))
            .start()
            .unwrap();
        let name = engine
            .dispatcher()
            .submit_sync("name", |opened: &Option<String>| opened.clone())
            .unwrap();
        assert_eq!(name.as_deref(), Some("probe-worker"));
    }

    #[test]
    fn resource_need_not_be_send() {
        // Cell<u32> is !Sync, Rc would be !Send; neither ever leaves the worker.
        let engine = Engine::builder(|| Ok::<_, String>(std::rc::Rc::new(Cell::new(0u32))))
            .start()
            .unwrap();
        engine
            .dispatcher()
            .call_async("bump", |counter: &std::rc::Rc<Cell<u32>>| {
                counter.set(counter.get() + 1)
            })
            .unwrap();
        let seen = engine
            .dispatcher()
            .submit_sync("read", |counter: &std::rc::Rc<Cell<u32>>| counter.get())
            .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn failed_open_is_reported() {
        let result = Engine::<u32>::builder(|| Err::<u32, _>("disk on fire")).start();
        match result {
            Err(DispatchError::ResourceOpen(reason)) => assert_eq!(reason, "disk on fire"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("engine started without a resource"),
        }
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut engine = Engine::builder(|| Ok::<_, String>(())).start().unwrap();
        engine.dispatcher().call_async("noop", |_| {}).unwrap();
        let first = engine.shutdown();
        assert_eq!(first.executed, 1);
        assert_eq!(engine.state(), WorkerState::Stopped);
        assert_eq!(engine.shutdown_with(ShutdownPolicy::Discard), first);
        assert!(engine.is_shut_down());
    }
}
