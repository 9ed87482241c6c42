//! The worker thread: sole owner of the protected resource.
//!
//! The run loop pulls tasks from the shared queue and runs each one against
//! the resource. It waits on nothing but the queue and whatever the task
//! itself does.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use crate::dispatcher::Shared;
use crate::task::Task;

/// Lifecycle of the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Running = 0,
    Stopping = 1,
    Stopped = 2,
}

pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> WorkerState {
        match self.0.load(Ordering::Acquire) {
            0 => WorkerState::Running,
            1 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }

    pub(crate) fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Identity of one engine instance, used to match the thread-local
/// resource to the dispatcher asking for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EngineId(u64);

impl EngineId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

type ActiveSlot = Option<(EngineId, Rc<dyn Any>)>;

thread_local! {
    /// Resource owned by the worker running on this thread, if any.
    static ACTIVE: RefCell<ActiveSlot> = const { RefCell::new(None) };
}

/// Publishes the worker's resource on its own thread for the lifetime of the guard.
struct ActiveResource {
    previous: ActiveSlot,
}

impl ActiveResource {
    fn install<R: 'static>(id: EngineId, resource: &Rc<R>) -> Self {
        let erased: Rc<dyn Any> = Rc::clone(resource) as Rc<dyn Any>;
        let previous = ACTIVE.with(|active| active.borrow_mut().replace((id, erased)));
        Self { previous }
    }
}

impl Drop for ActiveResource {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|active| *active.borrow_mut() = previous);
    }
}

/// Run `f` against engine `id`'s resource if the calling thread is that
/// engine's worker. On any other thread `f` is handed back unrun.
pub(crate) fn with_active<R, T, F>(id: EngineId, f: F) -> Result<T, F>
where
    R: 'static,
    F: FnOnce(&R) -> T,
{
    // Cloned out so a nested call can look it up again while `f` runs.
    let resource = ACTIVE.with(|active| match &*active.borrow() {
        Some((active_id, resource)) if *active_id == id => Some(Rc::clone(resource)),
        _ => None,
    });
    match resource.as_deref().and_then(|r| r.downcast_ref::<R>()) {
        Some(resource) => Ok(f(resource)),
        None => Err(f),
    }
}

pub(crate) fn is_worker_thread(id: EngineId) -> bool {
    ACTIVE.with(|active| matches!(&*active.borrow(), Some((active_id, _)) if *active_id == id))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

pub(crate) struct Worker<R> {
    shared: Arc<Shared<R>>,
}

impl<R: 'static> Worker<R> {
    pub(crate) fn new(shared: Arc<Shared<R>>) -> Self {
        Self { shared }
    }

    /// Run until the queue is closed and empty, then release `resource`.
    pub(crate) fn run(self, resource: R) {
        let name = thread::current().name().unwrap_or("<unnamed>").to_string();
        log::info!(target: "dispatch::worker", "worker '{}' running", name);

        let resource = Rc::new(resource);
        {
            let _worker = self.shared.monitor.register_worker();
            let _active = ActiveResource::install(self.shared.id, &resource);
            while let Some(task) = self.shared.queue.dequeue() {
                self.execute(task, &resource);
            }
        }

        // Tasks only ever borrow the resource, so this is the last reference.
        drop(resource);
        self.shared.state.set(WorkerState::Stopped);
        log::info!(
            target: "dispatch::worker",
            "worker '{}' stopped after {} tasks, resource released",
            name,
            self.shared.stats.executed()
        );
    }

    fn execute(&self, task: Task<R>, resource: &R) {
        let (label, body) = task.into_parts();
        log::debug!(target: "dispatch::worker", "run {}", label);

        // A sync body reports its own output or panic to its waiter before
        // it returns or unwinds.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| body(resource))) {
            self.shared.stats.record_panicked();
            log::error!(
                target: "dispatch::worker",
                "task {} panicked: {}",
                label,
                panic_message(payload.as_ref())
            );
        }
        self.shared.stats.record_executed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_needs_matching_engine_and_type() {
        let id = EngineId::next();
        let other = EngineId::next();
        assert!(with_active::<u32, _, _>(id, |v: &u32| *v).is_err());

        let resource = Rc::new(5u32);
        let active = ActiveResource::install(id, &resource);
        assert_eq!(with_active::<u32, _, _>(id, |v: &u32| *v).ok(), Some(5));
        assert!(with_active::<u32, _, _>(other, |v: &u32| *v).is_err());
        assert!(with_active::<String, _, _>(id, |s: &String| s.len()).is_err());
        assert!(is_worker_thread(id));

        drop(active);
        assert!(!is_worker_thread(id));
        assert_eq!(Rc::strong_count(&resource), 1);
    }
}
