//! # trackdb-dispatch
//!
//! Cross-thread task dispatch around a single-owner resource. One worker
//! thread owns the resource (a database connection, say) and runs every
//! operation against it in submission order. Any thread may submit work
//! through a [`Dispatcher`]; worker-side code hands results back to the
//! application's main thread through a [`MainThreadMailbox`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trackdb_dispatch::{DispatchConfig, Engine, MainThreadMailbox};
//!
//! let mailbox = Arc::new(MainThreadMailbox::new());
//! let mut engine = Engine::builder(|| rusqlite::Connection::open("library.sqlite"))
//!     .config(DispatchConfig::default())
//!     .mailbox(&mailbox)
//!     .start()?;
//!
//! // Fire and forget
//! engine.dispatcher().call_async("vacuum", |conn| {
//!     let _ = conn.execute_batch("VACUUM");
//! })?;
//!
//! // Wait for a value
//! let count: i64 = engine.dispatcher().submit_sync("count", |conn| {
//!     conn.query_row("SELECT COUNT(*) FROM library", [], |r| r.get(0))
//! })??;
//!
//! // Main loop: select! on mailbox.wake_receiver(), then mailbox.run_pending()
//!
//! engine.shutdown();
//! ```
//!
//! ## Module Overview
//!
//! - [`queue`]: bounded blocking FIFO with close semantics
//! - [`task`]: task type and one-shot sync completion
//! - [`dispatcher`]: `submit_async` / `submit_sync`
//! - [`worker`]: the worker run loop and lifecycle state
//! - [`mailbox`]: single-slot main-thread mailbox
//! - [`shutdown`]: ordered stop with drain or discard
//! - [`reentrancy`]: deadlock-hazard diagnosis between the two directions
//! - [`engine`]: builder, startup and ownership of the worker thread
//!
//! ## Threading
//!
//! Tasks receive `&R`. The resource is created on the worker by the
//! opener closure and dropped there at shutdown, so `R` need not be
//! `Send` or `Sync`. A `submit_sync` issued from inside a running task
//! executes in place instead of queueing behind itself.

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod mailbox;
pub mod queue;
pub mod reentrancy;
pub mod shutdown;
pub mod stats;
pub mod task;
pub mod worker;

pub use config::{DispatchConfig, ShutdownPolicy, MAX_QUEUE_CAPACITY};
pub use dispatcher::{BusyHook, Dispatcher};
pub use engine::{Engine, EngineBuilder};
pub use error::{DispatchError, DispatchResult, MailboxError, QueueError};
pub use mailbox::MainThreadMailbox;
pub use queue::{BoundedTaskQueue, DEFAULT_QUEUE_CAPACITY};
pub use reentrancy::{ReentrancyMonitor, ReentrancyPolicy};
pub use shutdown::ShutdownReport;
pub use stats::StatsSnapshot;
pub use task::Task;
pub use worker::WorkerState;
