//! Units of work and their one-shot completion signals.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crossbeam_channel::{Receiver, RecvError, Sender};

type TaskBody<R> = Box<dyn FnOnce(&R) + Send + 'static>;

/// An owned unit of work to run against the protected resource `R`.
///
/// The body owns everything it captures. Results travel back through the
/// body's own captures (or, for [`Dispatcher::submit_sync`](crate::Dispatcher::submit_sync),
/// through its return value), never through references into the
/// submitting thread's stack.
pub struct Task<R> {
    label: &'static str,
    body: TaskBody<R>,
    sync: bool,
}

impl<R> Task<R> {
    /// Build a task. `label` names the call site in diagnostics.
    pub fn new<F>(label: &'static str, body: F) -> Self
    where
        F: FnOnce(&R) + Send + 'static,
    {
        Self {
            label,
            body: Box::new(body),
            sync: false,
        }
    }

    /// A task whose body reports to a waiting caller through a captured
    /// [`SyncCompletion`].
    pub(crate) fn sync<F>(label: &'static str, body: F) -> Self
    where
        F: FnOnce(&R) + Send + 'static,
    {
        Self {
            label,
            body: Box::new(body),
            sync: true,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_sync(&self) -> bool {
        self.sync
    }

    pub(crate) fn into_parts(self) -> (&'static str, TaskBody<R>) {
        (self.label, self.body)
    }
}

impl<R> fmt::Debug for Task<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("sync", &self.sync)
            .finish()
    }
}

/// What a waiting caller receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reply<T> {
    Done(T),
    Panicked,
}

/// Producer half of a one-shot completion carrying the body's output.
///
/// Consumed when it fires, so it fires at most once. Dropping it
/// unfired (the task was discarded) disconnects the waiter.
pub(crate) struct SyncCompletion<T> {
    tx: Sender<Reply<T>>,
}

/// Consumer half of a one-shot completion.
pub(crate) struct CompletionWaiter<T> {
    rx: Receiver<Reply<T>>,
}

impl<T> SyncCompletion<T> {
    pub(crate) fn pair() -> (SyncCompletion<T>, CompletionWaiter<T>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (SyncCompletion { tx }, CompletionWaiter { rx })
    }

    /// Run `f` and report its output, or report that it panicked and then
    /// resume the panic so the runner still sees it.
    pub(crate) fn complete_with<F>(self, f: F)
    where
        F: FnOnce() -> T,
    {
        // The waiter only goes away if the submitting thread itself died.
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => {
                let _ = self.tx.send(Reply::Done(value));
            }
            Err(payload) => {
                let _ = self.tx.send(Reply::Panicked);
                panic::resume_unwind(payload);
            }
        }
    }
}

impl<T> CompletionWaiter<T> {
    /// Block until the body has finished. `Err` means the completion was
    /// dropped without firing.
    pub(crate) fn wait(self) -> Result<Reply<T>, RecvError> {
        self.rx.recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_carries_the_value() {
        let (completion, waiter) = SyncCompletion::pair();
        completion.complete_with(|| 7);
        assert_eq!(waiter.wait(), Ok(Reply::Done(7)));
    }

    #[test]
    fn completion_reports_a_panic_and_resumes_it() {
        let (completion, waiter) = SyncCompletion::<u8>::pair();
        let resumed = panic::catch_unwind(AssertUnwindSafe(|| {
            completion.complete_with(|| panic!("boom"));
        }));
        assert!(resumed.is_err());
        assert_eq!(waiter.wait(), Ok(Reply::Panicked));
    }

    #[test]
    fn dropped_task_disconnects_waiter() {
        let (completion, waiter) = SyncCompletion::<()>::pair();
        let task: Task<()> = Task::sync("dropped", move |_| completion.complete_with(|| ()));
        assert!(task.is_sync());
        drop(task);
        assert!(waiter.wait().is_err());
    }

    #[test]
    fn debug_shows_label() {
        let task: Task<u32> = Task::new("Library::directories", |_| {});
        let shown = format!("{:?}", task);
        assert!(shown.contains("Library::directories"));
        assert!(shown.contains("sync: false"));
    }
}
