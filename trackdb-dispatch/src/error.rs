//! Engine-level errors.
//!
//! These are returned synchronously to whoever submitted work. Failures
//! inside a task body are not represented here: a task reports those
//! through its own output value.

use std::fmt;

use thiserror::Error;

/// Result of a submission through the [`Dispatcher`](crate::Dispatcher).
pub type DispatchResult<T = ()> = Result<T, DispatchError>;

/// Errors from the forward (caller -> worker) direction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The task queue was closed by shutdown before the task could run.
    #[error("task queue is closed: engine is shutting down")]
    QueueRejected,

    /// The task body panicked on the worker thread. The worker survives.
    #[error("task `{label}` panicked on the worker thread")]
    TaskPanicked { label: &'static str },

    /// The protected resource could not be opened on the worker thread.
    #[error("could not open protected resource: {0}")]
    ResourceOpen(String),

    /// The worker thread could not be spawned.
    #[error("could not spawn worker thread: {0}")]
    Spawn(String),

    /// The main thread called `submit_sync` while a worker waits on it in
    /// a mailbox post. Only produced under [`ReentrancyPolicy::Reject`](crate::ReentrancyPolicy::Reject).
    #[error("`{label}` would deadlock: a worker is waiting on the main thread")]
    DeadlockHazard { label: &'static str },
}

/// Errors from the reverse (worker -> main thread) direction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailboxError {
    /// The mailbox was closed at shutdown.
    #[error("main-thread mailbox is closed")]
    MailboxRejected,

    /// The callback panicked on the main thread.
    #[error("main-thread callback `{label}` panicked")]
    CallbackPanicked { label: &'static str },

    /// A worker posted while the main thread is blocked in `submit_sync`,
    /// so waiting on it would never return. Only produced under [`ReentrancyPolicy::Reject`](crate::ReentrancyPolicy::Reject).
    #[error("`{label}` would deadlock: the main thread is blocked in submit_sync")]
    DeadlockHazard { label: &'static str },
}

/// Error from [`BoundedTaskQueue::enqueue`](crate::BoundedTaskQueue::enqueue).
///
/// Hands the rejected item back to the producer.
#[derive(Error)]
pub enum QueueError<T> {
    #[error("queue is closed")]
    Closed(T),
}

impl<T> QueueError<T> {
    pub fn into_inner(self) -> T {
        match self {
            QueueError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for QueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}
