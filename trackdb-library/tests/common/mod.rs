#![allow(dead_code)]
//! Test harness utilities for trackdb-library integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use trackdb_dispatch::{DispatchConfig, MainThreadMailbox};
use trackdb_library::{Library, LibraryFeedback};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory library whose mailbox belongs to the calling (test) thread.
pub fn memory_library() -> (Library, Arc<MainThreadMailbox>) {
    let mailbox = Arc::new(MainThreadMailbox::new());
    let library = Library::open_in_memory(DispatchConfig::default(), &mailbox)
        .expect("in-memory library should open");
    (library, mailbox)
}

/// Wait for the first feedback event matching `pred`, discarding others.
pub fn wait_for_feedback<F>(library: &Library, mut pred: F) -> Option<LibraryFeedback>
where
    F: FnMut(&LibraryFeedback) -> bool,
{
    let rx = library.feedback_receiver();
    let deadline = Instant::now() + TIMEOUT;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(event) if pred(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
    None
}
